//! Refresh Coordinator
//!
//! Exchanges the refresh token for a new token pair after a `401` and lets
//! every request that failed in the meantime wait on that single exchange.
//!
//! ## States
//!
//! ```text
//!            401 (stored token == stale)
//!   Idle ─────────────────────────────────▶ Refreshing
//!    ▲                                        │    │
//!    │            success                     │    │ failure
//!    └────────────────────────────────────────┘    ▼
//!    ▲                                           Failed
//!    └───────────────── reset() ─────────────────┘
//! ```
//!
//! While `Refreshing`, the in-flight exchange is a
//! [`Shared`](futures::future::Shared) future; each waiter clones and awaits
//! it. A failure clears the credential store, emits
//! [`AuthEvent::SessionExpired`] and sends the host to the login route.
//!
//! Each exchange belongs to the credential store generation it started in.
//! If the session is signed out or replaced before the exchange finishes,
//! its result is dropped: no tokens are written, nothing is cleared, the
//! state is left to whoever changed the session, and waiters fail with
//! [`AuthError::NotAuthenticated`] instead of replaying.

use crate::credential_store::CredentialStore;
use crate::error::{AuthError, Result};
use crate::transport::{decode_body, error_from_response};
use crate::types::AuthTokens;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use bridge_traits::navigation::{NavigationMode, Navigator};
use core_runtime::config::ClientConfig;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// Endpoint path of the token exchange.
pub const REFRESH_PATH: &str = "/refresh-token";

type SharedRefresh = Shared<BoxFuture<'static, Result<AuthTokens>>>;

enum RefreshState {
    Idle,
    Refreshing {
        id: u64,
        generation: u64,
        refresh: SharedRefresh,
    },
    Failed(AuthError),
}

/// Observable coordinator state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshStatus {
    Idle,
    Refreshing,
    Failed(AuthError),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    #[serde(default, alias = "accessToken")]
    token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Everything the exchange needs, owned so the shared future is `'static`.
#[derive(Clone)]
struct RefreshContext {
    http_client: Arc<dyn HttpClient>,
    navigator: Arc<dyn Navigator>,
    store: Arc<CredentialStore>,
    event_bus: EventBus,
    state: Arc<Mutex<RefreshState>>,
    next_id: Arc<AtomicU64>,
    refresh_url: String,
    login_route: String,
    timeout: Duration,
}

/// Serializes token refreshes and fans the result out to waiting requests.
pub struct RefreshCoordinator {
    context: RefreshContext,
}

impl RefreshCoordinator {
    pub fn new(config: &ClientConfig, store: Arc<CredentialStore>, event_bus: EventBus) -> Self {
        Self {
            context: RefreshContext {
                http_client: config.http_client.clone(),
                navigator: config.navigator.clone(),
                store,
                event_bus,
                state: Arc::new(Mutex::new(RefreshState::Idle)),
                next_id: Arc::new(AtomicU64::new(0)),
                refresh_url: config.endpoint(REFRESH_PATH),
                login_route: config.login_route.clone(),
                timeout: config.request_timeout,
            },
        }
    }

    pub async fn status(&self) -> RefreshStatus {
        match &*self.context.state.lock().await {
            RefreshState::Idle => RefreshStatus::Idle,
            RefreshState::Refreshing { .. } => RefreshStatus::Refreshing,
            RefreshState::Failed(err) => RefreshStatus::Failed(err.clone()),
        }
    }

    /// Return to `Idle`. Called when a new session is established.
    pub async fn reset(&self) {
        let mut state = self.context.state.lock().await;
        if !matches!(*state, RefreshState::Idle) {
            debug!("Refresh coordinator reset");
        }
        *state = RefreshState::Idle;
    }

    /// Obtain a token pair usable for replaying a request that was rejected
    /// while carrying `stale_token` for the session of `generation`
    /// (see [`CredentialStore::generation`]).
    ///
    /// Joins the in-flight refresh if there is one. If the stored access
    /// token already differs from `stale_token`, a refresh landed after the
    /// request was sent and the stored pair is returned without a new
    /// exchange. In `Failed` the recorded error is returned. A request whose
    /// session was signed out or replaced gets `NotAuthenticated`.
    pub async fn recover(&self, stale_token: &str, generation: u64) -> Result<AuthTokens> {
        let refresh = {
            let mut state = self.context.state.lock().await;

            if self.context.store.generation() != generation {
                debug!("Session changed since the request was sent, not replaying");
                return Err(AuthError::NotAuthenticated);
            }

            match &*state {
                RefreshState::Failed(err) => {
                    debug!("Refresh previously failed, not retrying");
                    return Err(err.clone());
                }
                RefreshState::Refreshing {
                    generation: in_flight,
                    refresh,
                    ..
                } if *in_flight == generation => {
                    debug!("Joining in-flight refresh");
                    refresh.clone()
                }
                _ => {
                    if let Some(session) = self.context.store.current().await {
                        if session.tokens.access_token != stale_token {
                            debug!("Token already refreshed, replaying with stored token");
                            return Ok(session.tokens);
                        }
                    }
                    let id = self.context.next_id.fetch_add(1, Ordering::SeqCst);
                    let refresh = self.context.clone().run(id, generation).boxed().shared();
                    *state = RefreshState::Refreshing {
                        id,
                        generation,
                        refresh: refresh.clone(),
                    };
                    refresh
                }
            }
        };

        refresh.await
    }
}

impl RefreshContext {
    /// The body of the shared future. Performs the exchange, applies its side
    /// effects, then moves the state machine out of `Refreshing` unless
    /// another refresh or a `reset()` took over meanwhile.
    async fn run(self, id: u64, generation: u64) -> Result<AuthTokens> {
        let _ = self
            .event_bus
            .emit(CoreEvent::Auth(AuthEvent::TokenRefreshing));

        let outcome = async {
            let tokens = self.exchange().await?;
            self.store.update_tokens_for(generation, &tokens).await?;
            Ok::<_, AuthError>(tokens)
        }
        .await;

        let (result, next) = match outcome {
            Ok(tokens) => {
                info!("Access token refreshed");
                let _ = self
                    .event_bus
                    .emit(CoreEvent::Auth(AuthEvent::TokenRefreshed));
                (Ok(tokens), RefreshState::Idle)
            }
            Err(e) => match self.expire_session(e, generation).await {
                Some(err) => (Err(err.clone()), RefreshState::Failed(err)),
                None => (Err(AuthError::NotAuthenticated), RefreshState::Idle),
            },
        };

        let mut state = self.state.lock().await;
        if matches!(&*state, RefreshState::Refreshing { id: current, .. } if *current == id) {
            *state = next;
        }

        result
    }

    #[instrument(skip(self), fields(url = %self.refresh_url))]
    async fn exchange(&self) -> Result<AuthTokens> {
        let refresh_token = self
            .store
            .refresh_token()
            .await
            .ok_or(AuthError::NotAuthenticated)?;

        let request = HttpRequest::new(HttpMethod::Post, self.refresh_url.clone())
            .timeout(self.timeout)
            .header("Accept", "application/json")
            .json(&RefreshRequest {
                refresh_token: &refresh_token,
            })
            .map_err(|e| AuthError::serialization("refresh request", e))?;

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(AuthError::from_transport)?;

        if !response.is_success() {
            return Err(error_from_response(&response));
        }

        let body: RefreshResponse = decode_body(&response)?;
        let access_token = body
            .token
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| AuthError::InvalidSession("refresh response carried no token".to_string()))?;

        // The backend may keep the refresh token unchanged and omit it.
        let refresh_token = body
            .refresh_token
            .filter(|token| !token.trim().is_empty())
            .unwrap_or(refresh_token);

        Ok(AuthTokens::new(access_token, refresh_token))
    }

    /// Tear the session of `generation` down after a failed refresh and
    /// produce the error handed to every waiter.
    ///
    /// `None` when that session is already gone: the failure belongs to a
    /// signed-out or replaced session and has no side effects.
    async fn expire_session(&self, cause: AuthError, generation: u64) -> Option<AuthError> {
        match self.store.clear_for(generation).await {
            Ok(false) => {
                info!(error = %cause, "Session changed during refresh, discarding result");
                return None;
            }
            Ok(true) => {}
            Err(e) => warn!(error = %e, "Failed to clear credentials after refresh failure"),
        }

        error!(error = %cause, "Token refresh failed, session ended");

        let reason = match &cause {
            AuthError::NotAuthenticated => "No refresh token available".to_string(),
            other => other.message(),
        };

        let _ = self
            .event_bus
            .emit(CoreEvent::Auth(AuthEvent::SessionExpired {
                reason: reason.clone(),
            }));

        self.navigator
            .navigate(&self.login_route, NavigationMode::Replace);

        Some(AuthError::AuthenticationFailed(reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Session, StorageKeys, UserProfile};
    use async_trait::async_trait;
    use bridge_desktop::{HistoryNavigator, MemorySecureStore};
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::http::HttpResponse;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RefreshEndpoint {
        calls: AtomicUsize,
        reply: fn() -> BridgeResult<HttpResponse>,
    }

    #[async_trait]
    impl HttpClient for RefreshEndpoint {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
            assert!(request.url.ends_with("/refresh-token"));
            assert!(request.header_value("Authorization").is_none());
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            (self.reply)()
        }
    }

    struct Fixture {
        coordinator: RefreshCoordinator,
        store: Arc<CredentialStore>,
        http: Arc<RefreshEndpoint>,
        navigator: Arc<HistoryNavigator>,
        events: EventBus,
    }

    async fn fixture(reply: fn() -> BridgeResult<HttpResponse>) -> Fixture {
        let http = Arc::new(RefreshEndpoint {
            calls: AtomicUsize::new(0),
            reply,
        });
        let navigator = Arc::new(HistoryNavigator::new("/"));
        let config = ClientConfig::builder()
            .api_base_url("http://clubs.test/api/auth")
            .http_client(http.clone())
            .secure_store(Arc::new(MemorySecureStore::new()))
            .navigator(navigator.clone())
            .build()
            .unwrap();

        let store = Arc::new(CredentialStore::new(
            config.secure_store.clone(),
            StorageKeys::default(),
        ));
        store
            .save(&Session::new(AuthTokens::new("T1", "R1"), UserProfile::default()))
            .await
            .unwrap();

        let events = EventBus::new(16);
        Fixture {
            coordinator: RefreshCoordinator::new(&config, store.clone(), events.clone()),
            store,
            http,
            navigator,
            events,
        }
    }

    #[tokio::test]
    async fn test_refresh_success_keeps_old_refresh_token() {
        let f = fixture(|| Ok(HttpResponse::new(200, r#"{"token":"T2"}"#))).await;
        let mut events = f.events.subscribe();

        let tokens = f.coordinator.recover("T1", f.store.generation()).await.unwrap();

        assert_eq!(tokens, AuthTokens::new("T2", "R1"));
        assert_eq!(f.store.access_token().await.as_deref(), Some("T2"));
        assert_eq!(f.coordinator.status().await, RefreshStatus::Idle);
        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::Auth(AuthEvent::TokenRefreshing)
        );
        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::Auth(AuthEvent::TokenRefreshed)
        );
    }

    #[tokio::test]
    async fn test_concurrent_recoveries_share_one_exchange() {
        let f = fixture(|| {
            Ok(HttpResponse::new(200, r#"{"token":"T2","refreshToken":"R2"}"#))
        })
        .await;

        let (a, b, c) = tokio::join!(
            f.coordinator.recover("T1", f.store.generation()),
            f.coordinator.recover("T1", f.store.generation()),
            f.coordinator.recover("T1", f.store.generation())
        );

        assert_eq!(f.http.calls.load(Ordering::SeqCst), 1);
        for tokens in [a, b, c] {
            assert_eq!(tokens.unwrap(), AuthTokens::new("T2", "R2"));
        }
    }

    #[tokio::test]
    async fn test_stale_token_after_refresh_skips_exchange() {
        let f = fixture(|| Ok(HttpResponse::new(200, r#"{"token":"T2"}"#))).await;

        f.coordinator.recover("T1", f.store.generation()).await.unwrap();
        let tokens = f.coordinator.recover("T1", f.store.generation()).await.unwrap();

        assert_eq!(tokens.access_token, "T2");
        assert_eq!(f.http.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_clears_session_and_navigates() {
        let f = fixture(|| Ok(HttpResponse::new(401, r#"{"message":"Refresh token expired"}"#))).await;
        let mut events = f.events.subscribe();

        let err = f.coordinator.recover("T1", f.store.generation()).await.unwrap_err();

        assert_eq!(err, AuthError::AuthenticationFailed("Refresh token expired".into()));
        assert!(f.store.load().await.is_none());
        assert_eq!(f.navigator.current().as_deref(), Some("/login"));
        assert!(matches!(f.coordinator.status().await, RefreshStatus::Failed(_)));

        let _refreshing = events.recv().await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::Auth(AuthEvent::SessionExpired {
                reason: "Refresh token expired".into()
            })
        );
    }

    #[tokio::test]
    async fn test_failed_is_terminal_until_reset() {
        let f = fixture(|| Err(BridgeError::Network("connection refused".into()))).await;

        assert!(f.coordinator.recover("T1", f.store.generation()).await.is_err());
        assert!(f.coordinator.recover("T1", f.store.generation()).await.is_err());
        assert_eq!(f.http.calls.load(Ordering::SeqCst), 1);

        f.coordinator.reset().await;
        assert_eq!(f.coordinator.status().await, RefreshStatus::Idle);
    }

    #[tokio::test]
    async fn test_sign_out_during_exchange_discards_result() {
        let f = fixture(|| Ok(HttpResponse::new(200, r#"{"token":"T2"}"#))).await;
        let generation = f.store.generation();

        let (result, cleared) = tokio::join!(f.coordinator.recover("T1", generation), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            f.store.clear().await
        });

        cleared.unwrap();
        assert_eq!(result, Err(AuthError::NotAuthenticated));
        assert_eq!(f.coordinator.status().await, RefreshStatus::Idle);
        assert_eq!(f.navigator.current().as_deref(), Some("/"));

        f.store.invalidate_cache().await;
        assert!(f.store.load().await.is_none());
    }

    #[tokio::test]
    async fn test_request_from_replaced_session_is_not_replayed() {
        let f = fixture(|| Ok(HttpResponse::new(200, r#"{"token":"T2"}"#))).await;
        let old = f.store.generation();
        f.store
            .save(&Session::new(AuthTokens::new("N1", "N2"), UserProfile::default()))
            .await
            .unwrap();

        let err = f.coordinator.recover("T1", old).await.unwrap_err();

        assert_eq!(err, AuthError::NotAuthenticated);
        assert_eq!(f.http.calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.store.access_token().await.as_deref(), Some("N1"));
    }

    #[tokio::test]
    async fn test_missing_refresh_token_fails_without_exchange() {
        let f = fixture(|| Ok(HttpResponse::new(200, r#"{"token":"T2"}"#))).await;
        f.store.clear().await.unwrap();

        let err = f.coordinator.recover("T1", f.store.generation()).await.unwrap_err();

        assert_eq!(
            err,
            AuthError::AuthenticationFailed("No refresh token available".into())
        );
        assert_eq!(f.http.calls.load(Ordering::SeqCst), 0);
    }
}
