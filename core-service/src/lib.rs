//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, secure
//! storage, navigation) into the club portal core. Desktop apps typically
//! enable the `desktop-shims` feature (which depends on `bridge-desktop`);
//! `keyring-store` additionally keeps credentials in the OS keychain instead
//! of the data-directory file.

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::{http::HttpClient, navigation::Navigator, storage::SecureStore};
use core_auth::{AuthManager, Session};
use core_runtime::config::{ClientConfig, ClientConfigBuilder};
use core_runtime::events::{EventBus, EventStream, DEFAULT_EVENT_BUFFER_SIZE};
use tracing::info;

/// Aggregated handle to all bridge dependencies the core requires.
#[derive(Clone)]
pub struct CoreDependencies {
    pub http_client: Arc<dyn HttpClient>,
    pub secure_store: Arc<dyn SecureStore>,
    pub navigator: Arc<dyn Navigator>,
}

impl CoreDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        secure_store: Arc<dyn SecureStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            http_client,
            secure_store,
            navigator,
        }
    }

    fn apply(self, builder: ClientConfigBuilder) -> ClientConfigBuilder {
        builder
            .http_client(self.http_client)
            .secure_store(self.secure_store)
            .navigator(self.navigator)
    }
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct ClubCore {
    config: ClientConfig,
    events: EventBus,
    auth: Arc<AuthManager>,
}

impl ClubCore {
    /// Create the core from a validated configuration.
    pub fn new(config: ClientConfig) -> Self {
        let events = EventBus::new(DEFAULT_EVENT_BUFFER_SIZE);
        let auth = Arc::new(AuthManager::new(config.clone(), events.clone()));
        Self {
            config,
            events,
            auth,
        }
    }

    /// Build from the environment (`CLUB_API_URL`, `CLUB_REQUEST_TIMEOUT_SECS`)
    /// and explicit bridges.
    pub fn bootstrap(deps: CoreDependencies) -> Result<Self> {
        let builder = ClientConfigBuilder::from_env()?;
        let config = deps.apply(builder).build()?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn auth(&self) -> &Arc<AuthManager> {
        &self.auth
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    /// Restore a stored session, if any. Call once after construction.
    pub async fn start(&self) -> Option<Session> {
        let session = self.auth.restore_session().await;
        info!(
            api = %self.config.api_base_url,
            signed_in = session.is_some(),
            "Club core started"
        );
        session
    }
}

/// Convenience bootstrapper for desktop hosts.
///
/// Reads the environment and fills every bridge with its desktop default.
/// With `keyring-store`, credentials go to the OS keychain.
///
/// ```no_run
/// # #[cfg(feature = "desktop-shims")]
/// # async fn example() -> core_service::Result<()> {
/// let core = core_service::bootstrap_desktop()?;
/// if core.start().await.is_none() {
///     let _user = core.auth().login("kim@club.io", "hunter2").await?;
/// }
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "desktop-shims")]
pub fn bootstrap_desktop() -> Result<ClubCore> {
    let builder = ClientConfigBuilder::from_env()?;

    #[cfg(feature = "keyring-store")]
    let builder = builder.secure_store(Arc::new(bridge_desktop::KeyringSecureStore::new()));

    let config = builder.build()?;
    Ok(ClubCore::new(config))
}
