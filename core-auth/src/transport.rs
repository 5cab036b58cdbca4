//! Authenticated Transport
//!
//! Wraps the host [`HttpClient`] with what every club API call needs:
//! endpoint resolution against the configured base URL, the bearer token,
//! a per-request timeout, error normalization, and the hand-off to the
//! [`RefreshCoordinator`] when an authenticated request comes back `401`.
//!
//! ## Error normalization
//!
//! | Outcome                          | Error                              |
//! |----------------------------------|------------------------------------|
//! | no response                      | `NetworkUnreachable` / `Timeout`   |
//! | 401, refresh not possible        | `AuthenticationFailed`             |
//! | 403                              | `AuthorizationDenied`              |
//! | other 4xx                        | `ValidationFailed`                 |
//! | 5xx                              | `ServerError`                      |
//!
//! The message is taken from the JSON `message` field, else the raw body,
//! else [`FALLBACK_MESSAGE`](crate::error::FALLBACK_MESSAGE).

use crate::credential_store::CredentialStore;
use crate::error::{AuthError, Result, FALLBACK_MESSAGE};
use crate::refresh::RefreshCoordinator;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bytes::Bytes;
use core_runtime::config::ClientConfig;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Per-call transport behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    /// Never attach a token (login, refresh, OAuth exchange, password reset).
    pub anonymous: bool,
    /// Whether a `401` may trigger a refresh and replay.
    pub allow_refresh: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            anonymous: false,
            allow_refresh: true,
        }
    }
}

impl RequestOptions {
    pub fn anonymous() -> Self {
        Self {
            anonymous: true,
            allow_refresh: false,
        }
    }

    pub fn without_refresh() -> Self {
        Self {
            anonymous: false,
            allow_refresh: false,
        }
    }
}

/// A request as captured before dispatch, replayable once after a refresh.
///
/// The `Authorization` header is never stored here; it is attached from the
/// credential store on every dispatch.
#[derive(Clone)]
pub struct PendingRequest {
    pub id: Uuid,
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    pub retried: bool,
}

impl PendingRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            retried: false,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let bytes =
            serde_json::to_vec(body).map_err(|e| AuthError::serialization("request body", e))?;
        self.body = Some(Bytes::from(bytes));
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        Ok(self)
    }

    fn to_http(&self, token: Option<&str>, timeout: Duration) -> HttpRequest {
        let mut request = HttpRequest::new(self.method, self.url.clone()).timeout(timeout);
        for (key, value) in &self.headers {
            request = request.header(key.clone(), value.clone());
        }
        request.remove_header("Authorization");
        if let Some(body) = &self.body {
            request = request.body(body.clone());
        }
        match token {
            Some(token) => request.bearer_token(token),
            None => request,
        }
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("url", &self.url)
            .field("body_len", &self.body.as_ref().map(Bytes::len))
            .field("retried", &self.retried)
            .finish()
    }
}

/// HTTP transport that authenticates requests and recovers from expired
/// access tokens.
pub struct AuthTransport {
    http_client: Arc<dyn HttpClient>,
    config: ClientConfig,
    store: Arc<CredentialStore>,
    refresher: Arc<RefreshCoordinator>,
}

impl AuthTransport {
    pub fn new(
        config: ClientConfig,
        store: Arc<CredentialStore>,
        refresher: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            http_client: config.http_client.clone(),
            config,
            store,
            refresher,
        }
    }

    /// Absolute URL for an API path.
    pub fn endpoint(&self, path: &str) -> String {
        self.config.endpoint(path)
    }

    /// Send a captured request.
    ///
    /// A `401` on a request that carried a token triggers one refresh and
    /// one replay with the new token. A `401` on the replay is final.
    /// If the session is signed out or replaced while the refresh runs, the
    /// request fails with `NotAuthenticated` and is not replayed.
    #[instrument(
        skip(self, request),
        fields(request_id = %request.id, method = %request.method, url = %request.url)
    )]
    pub async fn send(
        &self,
        mut request: PendingRequest,
        options: RequestOptions,
    ) -> Result<HttpResponse> {
        // Read before the token: a session change in between shows up as a
        // mismatch, never as a replay into the new session.
        let generation = self.store.generation();
        let token = if options.anonymous {
            None
        } else {
            self.store.access_token().await
        };

        let response = self.dispatch(&request, token.as_deref()).await?;
        if response.is_success() {
            return Ok(response);
        }
        if response.status != 401 {
            return Err(error_from_response(&response));
        }

        let stale_token = match token {
            Some(token) if options.allow_refresh && !request.retried => token,
            _ => {
                debug!(authenticated = !options.anonymous, "401 not eligible for refresh");
                return Err(AuthError::AuthenticationFailed(response_message(&response)));
            }
        };

        request.retried = true;
        info!("Access token rejected, waiting for refresh");
        let tokens = self.refresher.recover(&stale_token, generation).await?;

        let replay = self.dispatch(&request, Some(&tokens.access_token)).await?;
        if replay.is_success() {
            debug!("Replay succeeded");
            return Ok(replay);
        }
        if replay.status == 401 {
            warn!("Replay rejected with refreshed token");
            return Err(AuthError::AuthenticationFailed(response_message(&replay)));
        }
        Err(error_from_response(&replay))
    }

    /// Send a JSON request to an API path and return the raw response.
    pub async fn send_json<B>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> Result<HttpResponse>
    where
        B: Serialize + ?Sized,
    {
        let mut pending = PendingRequest::new(method, self.endpoint(path))
            .header("Accept", "application/json");
        if let Some(body) = body {
            pending = pending.json(body)?;
        }
        self.send(pending, options).await
    }

    /// Send a JSON request to an API path and decode the JSON response.
    ///
    /// An empty response body decodes as JSON `null`, so `()` and
    /// `Option<_>` work for endpoints that return nothing.
    pub async fn request<B, T>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send_json(method, path, body, options).await?;
        decode_body(&response)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request::<(), T>(HttpMethod::Get, path, None, RequestOptions::default())
            .await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request(HttpMethod::Post, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request(HttpMethod::Put, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request::<(), T>(HttpMethod::Delete, path, None, RequestOptions::default())
            .await
    }

    async fn dispatch(&self, request: &PendingRequest, token: Option<&str>) -> Result<HttpResponse> {
        let http_request = request.to_http(token, self.config.request_timeout);

        let response = self
            .http_client
            .execute(http_request)
            .await
            .map_err(|e| {
                let err = AuthError::from_transport(e);
                warn!(error = %err, "Request produced no response");
                err
            })?;

        debug!(status = response.status, authenticated = token.is_some(), "Response received");
        Ok(response)
    }
}

/// Normalize a non-2xx response.
pub(crate) fn error_from_response(response: &HttpResponse) -> AuthError {
    let message = response_message(response);
    match response.status {
        401 => AuthError::AuthenticationExpired(message),
        403 => AuthError::AuthorizationDenied(message),
        status @ 400..=499 => AuthError::ValidationFailed { status, message },
        status => AuthError::ServerError { status, message },
    }
}

/// The user-facing message carried by a response.
pub(crate) fn response_message(response: &HttpResponse) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&response.body) {
        let message = value
            .get("message")
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|message| !message.is_empty());
        if let Some(message) = message {
            return message.to_string();
        }
    }

    let raw = String::from_utf8_lossy(&response.body);
    let raw = raw.trim();
    if raw.is_empty() {
        FALLBACK_MESSAGE.to_string()
    } else {
        raw.to_string()
    }
}

pub(crate) fn decode_body<T: DeserializeOwned>(response: &HttpResponse) -> Result<T> {
    let body: &[u8] = if response.body.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        response.body.as_ref()
    };
    serde_json::from_slice(body).map_err(|e| AuthError::serialization("response body", e))
}
