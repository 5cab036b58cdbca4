//! # Client Configuration Module
//!
//! Provides configuration management for the club portal core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! [`ClientConfig`] holding the backend location, request limits, the names
//! of the persisted credential keys, and the host bridges. It enforces
//! fail-fast validation so a misconfigured host fails at startup rather than
//! on the first login attempt.
//!
//! ## Required Dependencies
//!
//! - `HttpClient` - transport to the club backend (desktop default: reqwest)
//! - `SecureStore` - credential persistence (desktop default: JSON file in the data dir)
//! - `Navigator` - route changes requested by the core (desktop default: history stack)
//!
//! When the `desktop-shims` feature is enabled, desktop defaults are injected
//! automatically for any bridge that was not provided.
//!
//! ## Environment
//!
//! [`ClientConfigBuilder::from_env`] reads:
//!
//! | Variable                    | Meaning                        | Default                          |
//! |-----------------------------|--------------------------------|----------------------------------|
//! | `CLUB_API_URL`              | Base URL of the auth API       | `http://localhost:8080/api/auth` |
//! | `CLUB_REQUEST_TIMEOUT_SECS` | Per-request timeout in seconds | `15`                             |
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::ClientConfig;
//! use std::sync::Arc;
//!
//! let config = ClientConfig::builder()
//!     .api_base_url("https://clubs.example.com/api/auth")
//!     .http_client(Arc::new(MyHttpClient))
//!     .secure_store(Arc::new(MySecureStore))
//!     .navigator(Arc::new(MyRouter))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{HttpClient, Navigator, SecureStore};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Base URL used when nothing else is configured.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api/auth";

/// Per-request timeout used when nothing else is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub const MIN_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);
pub const MAX_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub const ENV_API_URL: &str = "CLUB_API_URL";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "CLUB_REQUEST_TIMEOUT_SECS";

/// Names of the three persisted credential entries.
///
/// These must stay stable within a deployment; changing them logs every user
/// out on the next start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    pub access_token: String,
    pub refresh_token: String,
    pub user: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            access_token: "club_platform_token".to_string(),
            refresh_token: "club_platform_refresh_token".to_string(),
            user: "club_platform_user".to_string(),
        }
    }
}

impl StorageKeys {
    /// Keys prefixed with `prefix_`, for hosts running several deployments
    /// against one store.
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            access_token: format!("{}_token", prefix),
            refresh_token: format!("{}_refresh_token", prefix),
            user: format!("{}_user", prefix),
        }
    }

    pub fn all(&self) -> [&str; 3] {
        [&self.access_token, &self.refresh_token, &self.user]
    }

    fn validate(&self) -> Result<()> {
        let keys = self.all();
        if keys.iter().any(|key| key.trim().is_empty()) {
            return Err(Error::Config("Storage keys cannot be empty".to_string()));
        }
        if keys[0] == keys[1] || keys[0] == keys[2] || keys[1] == keys[2] {
            return Err(Error::Config(
                "Storage keys must be distinct; the session would overwrite itself".to_string(),
            ));
        }
        Ok(())
    }
}

/// Core configuration for the club portal client.
///
/// Use [`ClientConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL every endpoint path is resolved against
    pub api_base_url: Url,

    /// Timeout applied to every request the core sends
    pub request_timeout: Duration,

    /// Names of the persisted credential entries
    pub storage_keys: StorageKeys,

    /// Route the host shows for sign-in; session loss navigates here
    pub login_route: String,

    /// Route shown after sign-in and for users lacking a required role
    pub root_route: String,

    pub http_client: Arc<dyn HttpClient>,
    pub secure_store: Arc<dyn SecureStore>,
    pub navigator: Arc<dyn Navigator>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_base_url", &self.api_base_url.as_str())
            .field("request_timeout", &self.request_timeout)
            .field("storage_keys", &self.storage_keys)
            .field("login_route", &self.login_route)
            .field("root_route", &self.root_route)
            .field("http_client", &"HttpClient { ... }")
            .field("secure_store", &"SecureStore { ... }")
            .field("navigator", &"Navigator { ... }")
            .finish()
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - The base URL uses `http` or `https` and has a host
    /// - The request timeout lies within 1–120 seconds
    /// - Storage keys are non-empty and distinct
    /// - Routes are absolute paths
    pub fn validate(&self) -> Result<()> {
        match self.api_base_url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::Config(format!(
                    "API base URL must use http or https, got '{}'",
                    other
                )))
            }
        }
        if self.api_base_url.host_str().is_none() {
            return Err(Error::Config("API base URL must include a host".to_string()));
        }

        if self.request_timeout < MIN_REQUEST_TIMEOUT || self.request_timeout > MAX_REQUEST_TIMEOUT
        {
            return Err(Error::Config(format!(
                "Request timeout must be between {}s and {}s, got {:?}",
                MIN_REQUEST_TIMEOUT.as_secs(),
                MAX_REQUEST_TIMEOUT.as_secs(),
                self.request_timeout
            )));
        }

        self.storage_keys.validate()?;

        for (name, route) in [("login", &self.login_route), ("root", &self.root_route)] {
            if !route.starts_with('/') {
                return Err(Error::Config(format!(
                    "The {} route must be an absolute path starting with '/', got '{}'",
                    name, route
                )));
            }
        }

        Ok(())
    }

    /// Resolves an endpoint path against the base URL.
    ///
    /// Absolute `http(s)` URLs pass through unchanged.
    pub fn endpoint(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.api_base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn capability_missing(capability: &str, purpose: &str, desktop_default: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "{} implementation is required {}. \
             Desktop: enable the 'desktop-shims' feature to use the default {}. \
             Other hosts: inject a platform implementation through the builder.",
            capability, purpose, desktop_default
        ),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::with_timeout(timeout)
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    Err(capability_missing(
        "HttpClient",
        "to reach the club backend",
        "ReqwestHttpClient",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    use bridge_desktop::FileSecureStore;

    Ok(Arc::new(FileSecureStore::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    Err(capability_missing(
        "SecureStore",
        "for credential persistence",
        "FileSecureStore",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_navigator(initial_route: &str) -> Result<Arc<dyn Navigator>> {
    use bridge_desktop::HistoryNavigator;

    Ok(Arc::new(HistoryNavigator::new(initial_route)))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_navigator(_initial_route: &str) -> Result<Arc<dyn Navigator>> {
    Err(capability_missing(
        "Navigator",
        "to redirect after session loss and OAuth completion",
        "HistoryNavigator",
    ))
}

/// Builder for constructing [`ClientConfig`] instances.
#[derive(Default)]
pub struct ClientConfigBuilder {
    api_base_url: Option<String>,
    request_timeout: Option<Duration>,
    storage_keys: Option<StorageKeys>,
    login_route: Option<String>,
    root_route: Option<String>,
    http_client: Option<Arc<dyn HttpClient>>,
    secure_store: Option<Arc<dyn SecureStore>>,
    navigator: Option<Arc<dyn Navigator>>,
}

impl ClientConfigBuilder {
    /// Builder seeded from `CLUB_API_URL` and `CLUB_REQUEST_TIMEOUT_SECS`.
    ///
    /// Unset variables leave the defaults in place; a timeout that is not a
    /// whole number of seconds is a configuration error.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::default();

        if let Some(url) = lookup(ENV_API_URL).filter(|value| !value.trim().is_empty()) {
            builder = builder.api_base_url(url.trim());
        }

        if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT_SECS).filter(|value| !value.trim().is_empty())
        {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                Error::Config(format!(
                    "{} must be a whole number of seconds, got '{}'",
                    ENV_REQUEST_TIMEOUT_SECS, raw
                ))
            })?;
            builder = builder.request_timeout(Duration::from_secs(secs));
        }

        Ok(builder)
    }

    /// Default: `http://localhost:8080/api/auth`
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    /// Default: 15 seconds. Must lie within 1–120 seconds.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn storage_keys(mut self, keys: StorageKeys) -> Self {
        self.storage_keys = Some(keys);
        self
    }

    /// Default: `/login`
    pub fn login_route(mut self, route: impl Into<String>) -> Self {
        self.login_route = Some(route.into());
        self
    }

    /// Default: `/`
    pub fn root_route(mut self, route: impl Into<String>) -> Self {
        self.root_route = Some(route.into());
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Builds the final `ClientConfig` instance.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] for an unparsable URL or out-of-range values
    /// - [`Error::CapabilityMissing`] for a bridge that was not provided and
    ///   has no desktop default
    pub fn build(self) -> Result<ClientConfig> {
        let raw_url = self
            .api_base_url
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let api_base_url = Url::parse(&raw_url)
            .map_err(|e| Error::Config(format!("Invalid API base URL '{}': {}", raw_url, e)))?;

        let request_timeout = self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        let login_route = self.login_route.unwrap_or_else(|| "/login".to_string());
        let root_route = self.root_route.unwrap_or_else(|| "/".to_string());

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(request_timeout)?,
        };

        let secure_store = match self.secure_store {
            Some(store) => store,
            None => provide_default_secure_store()?,
        };

        let navigator = match self.navigator {
            Some(navigator) => navigator,
            None => provide_default_navigator(&login_route)?,
        };

        let config = ClientConfig {
            api_base_url,
            request_timeout,
            storage_keys: self.storage_keys.unwrap_or_default(),
            login_route,
            root_route,
            http_client,
            secure_store,
            navigator,
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{
        BridgeError, HttpRequest, HttpResponse, NavigationMode, Navigator, SecureStore,
    };
    use std::collections::HashMap;

    struct MockSecureStore;

    #[async_trait]
    impl SecureStore for MockSecureStore {
        async fn set_secret(&self, _key: &str, _value: &[u8]) -> std::result::Result<(), BridgeError> {
            Ok(())
        }

        async fn get_secret(&self, _key: &str) -> std::result::Result<Option<Vec<u8>>, BridgeError> {
            Ok(None)
        }

        async fn delete_secret(&self, _key: &str) -> std::result::Result<(), BridgeError> {
            Ok(())
        }
    }

    struct MockHttpClient;

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn execute(
            &self,
            _request: HttpRequest,
        ) -> std::result::Result<HttpResponse, BridgeError> {
            Ok(HttpResponse::new(200, ""))
        }
    }

    struct MockNavigator;

    impl Navigator for MockNavigator {
        fn navigate(&self, _path: &str, _mode: NavigationMode) {}
    }

    fn with_mocks() -> ClientConfigBuilder {
        ClientConfig::builder()
            .http_client(Arc::new(MockHttpClient))
            .secure_store(Arc::new(MockSecureStore))
            .navigator(Arc::new(MockNavigator))
    }

    #[test]
    fn test_defaults() {
        let config = with_mocks().build().unwrap();

        assert_eq!(config.api_base_url.as_str(), "http://localhost:8080/api/auth");
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.storage_keys.access_token, "club_platform_token");
        assert_eq!(
            config.storage_keys.refresh_token,
            "club_platform_refresh_token"
        );
        assert_eq!(config.storage_keys.user, "club_platform_user");
        assert_eq!(config.login_route, "/login");
        assert_eq!(config.root_route, "/");
    }

    #[test]
    fn test_endpoint_resolution() {
        let config = with_mocks()
            .api_base_url("https://clubs.example.com/api/auth/")
            .build()
            .unwrap();

        assert_eq!(
            config.endpoint("/login"),
            "https://clubs.example.com/api/auth/login"
        );
        assert_eq!(
            config.endpoint("user/update"),
            "https://clubs.example.com/api/auth/user/update"
        );
        assert_eq!(
            config.endpoint("https://other.example.com/x"),
            "https://other.example.com/x"
        );
    }

    #[test]
    fn test_rejects_non_http_url() {
        let err = with_mocks().api_base_url("ftp://clubs.example.com").build();
        assert!(matches!(err, Err(Error::Config(_))));

        let err = with_mocks().api_base_url("not a url").build();
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn test_timeout_bounds() {
        assert!(with_mocks()
            .request_timeout(Duration::from_millis(500))
            .build()
            .is_err());
        assert!(with_mocks()
            .request_timeout(Duration::from_secs(121))
            .build()
            .is_err());
        assert!(with_mocks()
            .request_timeout(Duration::from_secs(120))
            .build()
            .is_ok());
    }

    #[test]
    fn test_storage_keys_must_be_distinct() {
        let keys = StorageKeys {
            access_token: "same".to_string(),
            refresh_token: "same".to_string(),
            user: "user".to_string(),
        };
        assert!(matches!(
            with_mocks().storage_keys(keys).build(),
            Err(Error::Config(_))
        ));

        let prefixed = StorageKeys::with_prefix("staging");
        assert_eq!(prefixed.refresh_token, "staging_refresh_token");
        assert!(with_mocks().storage_keys(prefixed).build().is_ok());
    }

    #[test]
    fn test_routes_must_be_absolute() {
        assert!(with_mocks().login_route("login").build().is_err());
    }

    #[test]
    fn test_from_lookup() {
        let env: HashMap<&str, &str> = [
            (ENV_API_URL, "https://clubs.example.com/api/auth"),
            (ENV_REQUEST_TIMEOUT_SECS, "30"),
        ]
        .into_iter()
        .collect();

        let config = ClientConfigBuilder::from_lookup(|name| env.get(name).map(|v| v.to_string()))
            .unwrap()
            .http_client(Arc::new(MockHttpClient))
            .secure_store(Arc::new(MockSecureStore))
            .navigator(Arc::new(MockNavigator))
            .build()
            .unwrap();

        assert_eq!(config.api_base_url.host_str(), Some("clubs.example.com"));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_from_lookup_rejects_bad_timeout() {
        let result = ClientConfigBuilder::from_lookup(|name| {
            (name == ENV_REQUEST_TIMEOUT_SECS).then(|| "fifteen".to_string())
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_bridges() {
        let result = ClientConfig::builder()
            .http_client(Arc::new(MockHttpClient))
            .navigator(Arc::new(MockNavigator))
            .build();

        match result {
            Err(Error::CapabilityMissing { capability, message }) => {
                assert_eq!(capability, "SecureStore");
                assert!(message.contains("desktop-shims"));
            }
            other => panic!("expected CapabilityMissing, got {:?}", other.map(|_| ())),
        }
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_build_with_desktop_defaults() {
        let config = ClientConfig::builder()
            .build()
            .expect("desktop defaults should succeed");
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn test_config_is_cloneable() {
        let config = with_mocks().build().unwrap();
        let cloned = config.clone();
        assert_eq!(cloned.api_base_url, config.api_base_url);
        assert!(format!("{:?}", cloned).contains("HttpClient { ... }"));
    }
}
