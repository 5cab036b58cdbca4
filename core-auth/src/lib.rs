//! # Authentication Module
//!
//! Session handling for the club portal client.
//!
//! ## Overview
//!
//! This crate signs users in against the club backend, keeps the session in
//! host-provided secure storage, and authenticates API calls, recovering
//! from expired access tokens with a single coordinated refresh.
//!
//! ## Components
//!
//! - [`CredentialStore`]: access token, refresh token and profile persistence
//! - [`AuthTransport`]: bearer tokens, timeouts, error normalization
//! - [`RefreshCoordinator`]: one token exchange shared by every waiting request
//! - [`OAuthRedirectHandler`]: Google (implicit) and Kakao (authorization code) callbacks
//! - [`SessionGate`]: per-navigation route decisions
//! - [`AuthManager`]: login, registration, profile and password operations

pub mod credential_store;
pub mod error;
pub mod gate;
pub mod manager;
pub mod oauth;
pub mod refresh;
pub mod transport;
pub mod types;

pub use credential_store::CredentialStore;
pub use error::{AuthError, Result, FALLBACK_MESSAGE};
pub use gate::{default_rules, Access, Decision, RouteRule, SessionGate};
pub use manager::AuthManager;
pub use oauth::{authorization_url, parse_callback, CallbackParams, OAuthCallback, OAuthRedirectHandler};
pub use refresh::{RefreshCoordinator, RefreshStatus, REFRESH_PATH};
pub use transport::{AuthTransport, PendingRequest, RequestOptions};
pub use types::{
    AccessClaims, AuthTokens, OAuthFlow, ProfileUpdate, ProviderKind, Registration, Role, Session,
    StorageKeys, UserProfile,
};
