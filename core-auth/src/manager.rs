//! # Authentication Manager
//!
//! Account operations for the club portal, built on the auth components.
//!
//! ## Overview
//!
//! The `AuthManager` owns one instance of each component and wires them
//! together:
//!
//! - [`CredentialStore`] persists the session
//! - [`AuthTransport`] authenticates API calls and recovers from `401`
//! - [`RefreshCoordinator`] performs the token exchange
//! - [`OAuthRedirectHandler`] completes provider sign-in
//! - [`SessionGate`] guards host routes
//!
//! Every state change is published on the [`EventBus`] as a
//! [`CoreEvent::Auth`] event.
//!
//! ## Usage
//!
//! ```no_run
//! use core_auth::AuthManager;
//! use core_runtime::{config::ClientConfig, events::EventBus};
//!
//! # async fn example(config: ClientConfig) -> core_auth::Result<()> {
//! let manager = AuthManager::new(config, EventBus::new(100));
//!
//! if manager.restore_session().await.is_none() {
//!     let user = manager.login("kim@club.io", "hunter2").await?;
//!     println!("Welcome, {}", user.name);
//! }
//! # Ok(())
//! # }
//! ```

use crate::credential_store::CredentialStore;
use crate::error::{AuthError, Result};
use crate::gate::{Decision, RouteRule, SessionGate};
use crate::oauth::OAuthRedirectHandler;
use crate::refresh::RefreshCoordinator;
use crate::transport::{AuthTransport, RequestOptions};
use crate::types::{ProfileUpdate, ProviderKind, Registration, Session, SessionPayload, UserProfile};
use bridge_traits::http::HttpMethod;
use bridge_traits::navigation::NavigationMode;
use core_runtime::config::ClientConfig;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const PASSWORD_METHOD: &str = "password";
const RESTORE_METHOD: &str = "restore";

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordRequest<'a> {
    current_password: &'a str,
    new_password: &'a str,
}

#[derive(Serialize)]
struct ForgotPasswordRequest<'a> {
    email: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResetPasswordRequest<'a> {
    token: &'a str,
    new_password: &'a str,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum UserResponse {
    Wrapped { user: UserProfile },
    Bare(UserProfile),
}

impl UserResponse {
    fn into_user(self) -> UserProfile {
        match self {
            UserResponse::Wrapped { user } | UserResponse::Bare(user) => user,
        }
    }
}

/// Account operations and component wiring for a host.
pub struct AuthManager {
    config: ClientConfig,
    event_bus: EventBus,
    store: Arc<CredentialStore>,
    refresher: Arc<RefreshCoordinator>,
    transport: Arc<AuthTransport>,
    oauth: OAuthRedirectHandler,
    gate: SessionGate,
}

impl AuthManager {
    /// Create a manager guarding the default club portal routes.
    pub fn new(config: ClientConfig, event_bus: EventBus) -> Self {
        let gate = SessionGate::with_default_rules(
            config.login_route.clone(),
            config.root_route.clone(),
        );
        Self::with_gate(config, event_bus, gate)
    }

    /// Create a manager guarding a custom rule list.
    pub fn with_route_rules(config: ClientConfig, event_bus: EventBus, rules: Vec<RouteRule>) -> Self {
        let gate = SessionGate::new(rules, config.login_route.clone(), config.root_route.clone());
        Self::with_gate(config, event_bus, gate)
    }

    fn with_gate(config: ClientConfig, event_bus: EventBus, gate: SessionGate) -> Self {
        let store = Arc::new(CredentialStore::new(
            config.secure_store.clone(),
            config.storage_keys.clone(),
        ));
        let refresher = Arc::new(RefreshCoordinator::new(&config, store.clone(), event_bus.clone()));
        let transport = Arc::new(AuthTransport::new(config.clone(), store.clone(), refresher.clone()));
        let oauth = OAuthRedirectHandler::new(
            config.clone(),
            transport.clone(),
            store.clone(),
            refresher.clone(),
            event_bus.clone(),
        );

        debug!(api = %config.api_base_url, "AuthManager initialized");

        Self {
            config,
            event_bus,
            store,
            refresher,
            transport,
            oauth,
            gate,
        }
    }

    /// Transport for the host's own authenticated API calls.
    pub fn transport(&self) -> &Arc<AuthTransport> {
        &self.transport
    }

    pub fn credential_store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn refresh_coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.refresher
    }

    pub fn gate(&self) -> &SessionGate {
        &self.gate
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Sign in with email and password.
    #[instrument(skip(self, email, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile> {
        info!("Signing in with password");
        self.emit(AuthEvent::SigningIn {
            method: PASSWORD_METHOD.to_string(),
        });

        let result = async {
            let payload: SessionPayload = self
                .transport
                .request(
                    HttpMethod::Post,
                    "/login",
                    Some(&LoginRequest { email, password }),
                    RequestOptions::anonymous(),
                )
                .await?;
            let session = payload.into_session()?;
            self.establish(&session, PASSWORD_METHOD).await?;
            Ok::<_, AuthError>(session.user)
        }
        .await;

        if let Err(err) = &result {
            self.report(err);
        }
        result
    }

    /// Create an account. The new user is not signed in.
    #[instrument(skip(self, registration))]
    pub async fn register(&self, registration: &Registration) -> Result<UserProfile> {
        let response: UserResponse = self
            .transport
            .request(
                HttpMethod::Post,
                "/register",
                Some(registration),
                RequestOptions::anonymous(),
            )
            .await?;

        let user = response.into_user();
        info!(user_id = %user.display_id(), "Account registered");
        Ok(user)
    }

    /// Clear the session and send the host to the login route.
    ///
    /// The host is navigated and `SignedOut` emitted even if storage could
    /// not be cleared; the storage error is returned afterwards. A refresh
    /// still in flight is abandoned and its requests are not replayed.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        let user_id = self.store.current().await.map(|s| s.user.display_id());
        let cleared = self.store.clear().await;
        self.refresher.reset().await;
        if let Err(e) = &cleared {
            warn!(error = %e, "Credentials could not be fully removed");
        }

        self.emit(AuthEvent::SignedOut {
            user_id: user_id.clone(),
        });
        self.config
            .navigator
            .navigate(&self.config.login_route, NavigationMode::Replace);

        info!(user_id = ?user_id, "Signed out");
        cleared
    }

    /// Load a stored session at startup.
    #[instrument(skip(self))]
    pub async fn restore_session(&self) -> Option<Session> {
        let session = self.store.load().await?;
        info!(user_id = %session.user.display_id(), "Session restored");
        self.emit(AuthEvent::SignedIn {
            user_id: session.user.display_id(),
            method: RESTORE_METHOD.to_string(),
        });
        Some(session)
    }

    pub async fn session(&self) -> Option<Session> {
        self.store.current().await
    }

    pub async fn current_user(&self) -> Option<UserProfile> {
        self.store.current().await.map(|session| session.user)
    }

    pub async fn is_logged_in(&self) -> bool {
        self.store.current().await.is_some()
    }

    /// Update the signed-in user's profile.
    ///
    /// The `user` object returned by the server is merged over the stored
    /// profile; fields it omits keep their stored values.
    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile> {
        self.require_session().await?;

        let response: Value = self.transport.put("/user/update", update).await?;
        let changes = match response.get("user") {
            Some(user @ Value::Object(_)) => user.clone(),
            _ => {
                debug!("Update response carried no user, applying submitted fields");
                serde_json::to_value(update)
                    .map_err(|e| AuthError::serialization("profile update", e))?
            }
        };

        let current = self.require_session().await?.user;
        let merged = merge_profile(&current, changes)?;
        self.store.update_user(&merged).await?;

        info!(user_id = %merged.display_id(), "Profile updated");
        Ok(merged)
    }

    #[instrument(skip(self, current_password, new_password))]
    pub async fn change_password(&self, current_password: &str, new_password: &str) -> Result<()> {
        self.require_session().await?;
        self.transport
            .send_json(
                HttpMethod::Post,
                "/user/change-password",
                Some(&ChangePasswordRequest {
                    current_password,
                    new_password,
                }),
                RequestOptions::default(),
            )
            .await?;
        info!("Password changed");
        Ok(())
    }

    #[instrument(skip(self, email))]
    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        self.transport
            .send_json(
                HttpMethod::Post,
                "/forgot-password",
                Some(&ForgotPasswordRequest { email }),
                RequestOptions::anonymous(),
            )
            .await?;
        info!("Password reset requested");
        Ok(())
    }

    #[instrument(skip(self, token, new_password))]
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<()> {
        self.transport
            .send_json(
                HttpMethod::Post,
                "/reset-password",
                Some(&ResetPasswordRequest { token, new_password }),
                RequestOptions::anonymous(),
            )
            .await?;
        info!("Password reset completed");
        Ok(())
    }

    pub fn oauth_authorization_url(&self, provider: ProviderKind) -> String {
        self.oauth.authorization_url(provider)
    }

    /// Finish provider sign-in from the callback URL the host received.
    pub async fn complete_oauth(&self, callback_url: &str) -> Result<UserProfile> {
        self.oauth
            .complete(callback_url)
            .await
            .map(|session| session.user)
    }

    /// Gate decision for `path` given the current session.
    pub async fn evaluate_route(&self, path: &str) -> Decision {
        let session = self.store.current().await;
        self.gate.evaluate(path, session.as_ref())
    }

    /// Where to go after sign-in: the remembered location or the root route.
    pub fn post_login_route(&self) -> String {
        self.gate
            .take_return_to()
            .unwrap_or_else(|| self.config.root_route.clone())
    }

    async fn establish(&self, session: &Session, method: &str) -> Result<()> {
        self.store.save(session).await?;
        self.refresher.reset().await;
        self.emit(AuthEvent::SignedIn {
            user_id: session.user.display_id(),
            method: method.to_string(),
        });
        info!(user_id = %session.user.display_id(), method = %method, "Signed in");
        Ok(())
    }

    async fn require_session(&self) -> Result<Session> {
        self.store.current().await.ok_or(AuthError::NotAuthenticated)
    }

    fn report(&self, err: &AuthError) {
        warn!(error = %err, "Sign-in failed");
        self.emit(AuthEvent::AuthError {
            message: err.message(),
            recoverable: !err.is_terminal(),
        });
    }

    fn emit(&self, event: AuthEvent) {
        let _ = self.event_bus.emit(CoreEvent::Auth(event));
    }
}

fn merge_profile(current: &UserProfile, changes: Value) -> Result<UserProfile> {
    let mut merged =
        serde_json::to_value(current).map_err(|e| AuthError::serialization("user profile", e))?;

    if let (Value::Object(base), Value::Object(changes)) = (&mut merged, changes) {
        for (key, value) in changes {
            base.insert(key, value);
        }
    }

    serde_json::from_value(merged).map_err(|e| AuthError::serialization("merged user profile", e))
}
