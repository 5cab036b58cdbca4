use bridge_traits::BridgeError;
use std::time::Duration;
use thiserror::Error;

/// Text used when neither the server nor the transport said anything useful.
pub const FALLBACK_MESSAGE: &str = "An unexpected error occurred while processing the request.";

/// Errors produced by the auth components.
///
/// `Clone` so a single refresh outcome can be handed to every request that
/// was waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No response was received (DNS, refused connection, TLS).
    #[error("Network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// 401 on an authenticated request; recoverable through a refresh.
    #[error("Session expired: {0}")]
    AuthenticationExpired(String),

    /// The refresh failed, the replay was rejected, or credentials were wrong.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Valid session without permission (403).
    #[error("Access denied: {0}")]
    AuthorizationDenied(String),

    #[error("Request rejected ({status}): {message}")]
    ValidationFailed { status: u16, message: String },

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("OAuth sign-in with {provider} failed: {reason}")]
    OAuthExchangeFailed { provider: String, reason: String },

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Stored session is invalid: {0}")]
    InvalidSession(String),

    #[error("Secure storage unavailable: {0}")]
    SecureStorageUnavailable(String),

    #[error("Serialization failed ({context}): {reason}")]
    Serialization { context: String, reason: String },

    #[error("{0}")]
    Other(String),
}

impl AuthError {
    /// The user-facing text for this error.
    ///
    /// Server-derived variants return the server's message verbatim; the rest
    /// fall back to their display text.
    pub fn message(&self) -> String {
        let text = match self {
            AuthError::NetworkUnreachable(msg)
            | AuthError::AuthenticationExpired(msg)
            | AuthError::AuthenticationFailed(msg)
            | AuthError::AuthorizationDenied(msg)
            | AuthError::InvalidSession(msg)
            | AuthError::Other(msg) => msg.clone(),
            AuthError::ValidationFailed { message, .. }
            | AuthError::ServerError { message, .. } => message.clone(),
            AuthError::OAuthExchangeFailed { reason, .. } => reason.clone(),
            other => other.to_string(),
        };

        if text.trim().is_empty() {
            FALLBACK_MESSAGE.to_string()
        } else {
            text
        }
    }

    /// Whether the host should send the user to the login surface.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AuthError::AuthenticationFailed(_)
                | AuthError::OAuthExchangeFailed { .. }
                | AuthError::NotAuthenticated
                | AuthError::InvalidSession(_)
        )
    }

    /// HTTP status behind this error, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::ValidationFailed { status, .. } | AuthError::ServerError { status, .. } => {
                Some(*status)
            }
            AuthError::AuthorizationDenied(_) => Some(403),
            AuthError::AuthenticationExpired(_) => Some(401),
            _ => None,
        }
    }

    pub(crate) fn oauth(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        AuthError::OAuthExchangeFailed {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn serialization(context: &str, err: impl std::fmt::Display) -> Self {
        AuthError::Serialization {
            context: context.to_string(),
            reason: err.to_string(),
        }
    }

    /// Map a transport error from the HTTP bridge.
    pub(crate) fn from_transport(err: BridgeError) -> Self {
        match err {
            BridgeError::Timeout(after) => AuthError::Timeout(after),
            BridgeError::Network(msg) => AuthError::NetworkUnreachable(msg),
            BridgeError::Io(io) => AuthError::NetworkUnreachable(io.to_string()),
            BridgeError::NotAvailable(msg) => AuthError::NetworkUnreachable(msg),
            BridgeError::OperationFailed(msg) => AuthError::Other(msg),
        }
    }

    /// Map a failure from the secure-store bridge.
    pub(crate) fn from_storage(err: BridgeError) -> Self {
        AuthError::SecureStorageUnavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
