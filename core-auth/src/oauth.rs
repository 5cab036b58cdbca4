//! OAuth Redirect Handling
//!
//! Sign-in with an external provider goes through the club backend:
//!
//! 1. The host opens [`authorization_url`] in a browser.
//! 2. The provider redirects to `/oauth/callback/{provider}` with either an
//!    authorization code in the query string (Kakao) or an access token in
//!    the fragment (Google).
//! 3. The host passes that URL to [`OAuthRedirectHandler::complete`], which
//!    forwards the credential to `POST /oauth2/callback/{provider}` and
//!    stores the resulting session.
//!
//! A provider error (`?error=access_denied`) fails in [`parse_callback`]
//! before any request is made.

use crate::credential_store::CredentialStore;
use crate::error::{AuthError, Result};
use crate::refresh::RefreshCoordinator;
use crate::transport::{AuthTransport, RequestOptions};
use crate::types::{OAuthFlow, ProviderKind, Session, SessionPayload};
use bridge_traits::http::HttpMethod;
use bridge_traits::navigation::NavigationMode;
use core_runtime::config::ClientConfig;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Credential carried by a provider redirect.
#[derive(Clone, PartialEq, Eq)]
pub enum CallbackParams {
    AuthorizationCode { code: String, state: Option<String> },
    Implicit { access_token: String, state: Option<String> },
}

impl std::fmt::Debug for CallbackParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallbackParams::AuthorizationCode { state, .. } => f
                .debug_struct("AuthorizationCode")
                .field("code", &"[REDACTED]")
                .field("state", state)
                .finish(),
            CallbackParams::Implicit { state, .. } => f
                .debug_struct("Implicit")
                .field("access_token", &"[REDACTED]")
                .field("state", state)
                .finish(),
        }
    }
}

/// A parsed provider redirect. Consumed once; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthCallback {
    pub provider: ProviderKind,
    pub params: CallbackParams,
}

#[derive(Debug, Default, Deserialize)]
struct RawParams {
    code: Option<String>,
    state: Option<String>,
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl RawParams {
    fn parse(encoded: Option<&str>, provider: &str) -> Result<Self> {
        match encoded {
            None | Some("") => Ok(Self::default()),
            Some(encoded) => serde_urlencoded::from_str(encoded).map_err(|e| {
                AuthError::oauth(provider, format!("Malformed callback parameters: {}", e))
            }),
        }
    }

    fn provider_error(&self) -> Option<String> {
        let error = self.error.as_deref().filter(|e| !e.is_empty())?;
        Some(match self.error_description.as_deref().filter(|d| !d.is_empty()) {
            Some(description) => format!("{}: {}", error, description),
            None => error.to_string(),
        })
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum ExchangeBody<'a> {
    Code {
        code: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        state: Option<&'a str>,
    },
    Implicit {
        access_token: &'a str,
    },
}

/// Where the host should send the browser to start provider sign-in.
pub fn authorization_url(config: &ClientConfig, provider: ProviderKind) -> String {
    config.endpoint(&format!("/oauth2/authorize/{}", provider.as_str()))
}

/// Parse a provider redirect (absolute URL or path with query/fragment).
///
/// The provider is the last non-empty path segment. Provider errors and
/// missing credentials fail with [`AuthError::OAuthExchangeFailed`].
pub fn parse_callback(callback_url: &str) -> Result<OAuthCallback> {
    let url = parse_url(callback_url)?;

    let segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or_default()
        .to_string();
    let provider = ProviderKind::parse(&segment).ok_or_else(|| {
        AuthError::oauth(
            if segment.is_empty() { "unknown" } else { segment.as_str() },
            "Unsupported OAuth provider",
        )
    })?;

    let query = RawParams::parse(url.query(), provider.as_str())?;
    let fragment = RawParams::parse(url.fragment(), provider.as_str())?;

    if let Some(error) = query.provider_error().or_else(|| fragment.provider_error()) {
        warn!(provider = %provider, error = %error, "Provider returned an error");
        return Err(AuthError::oauth(provider.as_str(), error));
    }

    let params = match provider.flow() {
        OAuthFlow::AuthorizationCode => {
            let code = query
                .code
                .filter(|code| !code.is_empty())
                .ok_or_else(|| {
                    AuthError::oauth(provider.as_str(), "Authorization code missing from callback")
                })?;
            CallbackParams::AuthorizationCode {
                code,
                state: query.state.or(fragment.state),
            }
        }
        OAuthFlow::Implicit => {
            // Some providers append padding to the token; keep what precedes
            // the first '='.
            let access_token = fragment
                .access_token
                .as_deref()
                .and_then(|raw| raw.split('=').next())
                .filter(|token| !token.is_empty())
                .map(str::to_string)
                .ok_or_else(|| {
                    AuthError::oauth(provider.as_str(), "Access token missing from callback")
                })?;
            CallbackParams::Implicit {
                access_token,
                state: fragment.state.or(query.state),
            }
        }
    };

    debug!(provider = %provider, "OAuth callback parsed");
    Ok(OAuthCallback { provider, params })
}

fn parse_url(callback_url: &str) -> Result<Url> {
    let malformed = |e: url::ParseError| {
        AuthError::oauth("unknown", format!("Malformed callback URL: {}", e))
    };

    match Url::parse(callback_url) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse("http://callback.invalid/")
            .and_then(|base| base.join(callback_url))
            .map_err(malformed),
        Err(e) => Err(malformed(e)),
    }
}

/// Completes provider sign-in against the club backend.
pub struct OAuthRedirectHandler {
    config: ClientConfig,
    transport: Arc<AuthTransport>,
    store: Arc<CredentialStore>,
    refresher: Arc<RefreshCoordinator>,
    event_bus: EventBus,
}

impl OAuthRedirectHandler {
    pub fn new(
        config: ClientConfig,
        transport: Arc<AuthTransport>,
        store: Arc<CredentialStore>,
        refresher: Arc<RefreshCoordinator>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            config,
            transport,
            store,
            refresher,
            event_bus,
        }
    }

    pub fn authorization_url(&self, provider: ProviderKind) -> String {
        authorization_url(&self.config, provider)
    }

    /// Route the host links to when a callback fails.
    pub fn login_route(&self) -> &str {
        &self.config.login_route
    }

    /// Parse the redirect, exchange its credential and store the session.
    ///
    /// On success the host is moved to the root route, replacing the
    /// callback entry. Failures emit [`AuthEvent::AuthError`] and are not
    /// retried.
    #[instrument(skip(self, callback_url))]
    pub async fn complete(&self, callback_url: &str) -> Result<Session> {
        match self.try_complete(callback_url).await {
            Ok(session) => Ok(session),
            Err(err) => {
                warn!(error = %err, "OAuth sign-in failed");
                let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::AuthError {
                    message: err.message(),
                    recoverable: !err.is_terminal(),
                }));
                Err(err)
            }
        }
    }

    async fn try_complete(&self, callback_url: &str) -> Result<Session> {
        let callback = parse_callback(callback_url)?;
        let provider = callback.provider;

        let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::SigningIn {
            method: provider.as_str().to_string(),
        }));

        let body = match &callback.params {
            CallbackParams::AuthorizationCode { code, state } => ExchangeBody::Code {
                code,
                state: state.as_deref(),
            },
            CallbackParams::Implicit { access_token, .. } => ExchangeBody::Implicit { access_token },
        };

        info!(provider = %provider, "Exchanging OAuth credential with backend");
        let payload: SessionPayload = self
            .transport
            .request(
                HttpMethod::Post,
                &format!("/oauth2/callback/{}", provider.as_str()),
                Some(&body),
                RequestOptions::anonymous(),
            )
            .await
            .map_err(|e| match e {
                transport @ (AuthError::NetworkUnreachable(_) | AuthError::Timeout(_)) => transport,
                other => AuthError::oauth(provider.as_str(), other.message()),
            })?;

        let session = payload
            .into_session()
            .map_err(|e| AuthError::oauth(provider.as_str(), e.message()))?;

        self.store.save(&session).await?;
        self.refresher.reset().await;

        let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::SignedIn {
            user_id: session.user.display_id(),
            method: provider.as_str().to_string(),
        }));

        self.config
            .navigator
            .navigate(&self.config.root_route, NavigationMode::Replace);

        info!(provider = %provider, user_id = %session.user.display_id(), "OAuth sign-in completed");
        Ok(session)
    }
}
