use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub use core_runtime::config::StorageKeys;

/// OAuth providers the club backend accepts.
///
/// Each provider redirects back with a different flow: Google returns an
/// access token in the URL fragment, Kakao an authorization code in the
/// query string.
///
/// # Examples
///
/// ```
/// use core_auth::{OAuthFlow, ProviderKind};
///
/// let provider = ProviderKind::parse("Kakao").unwrap();
/// assert_eq!(provider.flow(), OAuthFlow::AuthorizationCode);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Google,
    Kakao,
}

/// How a provider hands its result back to the callback route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthFlow {
    /// `?code=...&state=...`
    AuthorizationCode,
    /// `#access_token=...&state=...`
    Implicit,
}

impl ProviderKind {
    /// Path segment used by the backend (`/oauth2/authorize/{provider}`).
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Google => "google",
            ProviderKind::Kakao => "kakao",
        }
    }

    pub fn flow(&self) -> OAuthFlow {
        match self {
            ProviderKind::Google => OAuthFlow::Implicit,
            ProviderKind::Kakao => OAuthFlow::AuthorizationCode,
        }
    }

    /// Case-insensitive lookup by path segment.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" => Some(ProviderKind::Google),
            "kakao" => Some(ProviderKind::Kakao),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's role within the platform.
///
/// Parsed leniently (`"Member"`, `"club leader"`, `"ROLE_ADMIN"`); unknown
/// values are kept as [`Role::Other`] and only satisfy an identical
/// requirement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Role {
    #[default]
    Member,
    ClubLeader,
    Admin,
    Other(String),
}

impl Role {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let normalized = trimmed
            .to_ascii_uppercase()
            .replace([' ', '-'], "_");
        let normalized = normalized.strip_prefix("ROLE_").unwrap_or(&normalized);

        match normalized {
            "" | "MEMBER" | "USER" => Role::Member,
            "CLUB_LEADER" | "CLUBLEADER" | "LEADER" => Role::ClubLeader,
            "ADMIN" => Role::Admin,
            _ => Role::Other(trimmed.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::Member => "MEMBER",
            Role::ClubLeader => "CLUB_LEADER",
            Role::Admin => "ADMIN",
            Role::Other(raw) => raw,
        }
    }

    /// Whether a user holding `self` may access something requiring `required`.
    ///
    /// `ADMIN` satisfies everything and `CLUB_LEADER` satisfies `MEMBER`;
    /// otherwise the roles must match.
    pub fn satisfies(&self, required: &Role) -> bool {
        match (self, required) {
            (Role::Admin, _) => true,
            (Role::ClubLeader, Role::Member) => true,
            (held, needed) => held == needed,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Role::Other(_) => 0,
            Role::Member => 1,
            Role::ClubLeader => 2,
            Role::Admin => 3,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map(|value| Role::parse(&value)).unwrap_or_default())
    }
}

/// Profile of the signed-in user as returned by the backend.
///
/// The `role` here is informational only; authorization decisions use
/// [`Session::verified_role`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub club_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub club_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_date: Option<String>,
}

impl UserProfile {
    /// Identifier used in events and logs: the numeric id when known,
    /// otherwise the email.
    pub fn display_id(&self) -> String {
        self.id
            .map(|id| id.to_string())
            .unwrap_or_else(|| self.email.clone())
    }
}

/// Partial profile sent to `PUT /user/update`.
///
/// Absent fields are left untouched by the server. The role is not part of
/// the update: it is assigned server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub club_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub club_name: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self == &ProfileUpdate::default()
    }
}

/// Sign-up payload for `POST /register`.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("phone_number", &self.phone_number)
            .finish()
    }
}

/// The access/refresh token pair.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
}

impl AuthTokens {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// Both tokens present and non-blank.
    pub fn is_complete(&self) -> bool {
        !self.access_token.trim().is_empty() && !self.refresh_token.trim().is_empty()
    }
}

impl fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthTokens")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

/// An authenticated session: tokens plus the user they belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub tokens: AuthTokens,
    pub user: UserProfile,
}

impl Session {
    pub fn new(tokens: AuthTokens, user: UserProfile) -> Self {
        Self { tokens, user }
    }

    /// Claims carried by the access token, if it is a decodable JWT.
    pub fn claims(&self) -> Option<AccessClaims> {
        AccessClaims::decode(&self.tokens.access_token)
    }

    /// The role asserted by the access token.
    ///
    /// Tokens that are not JWTs or carry no role claim yield `MEMBER`, the
    /// least-privileged role. The stored profile is never consulted.
    pub fn verified_role(&self) -> Role {
        self.claims()
            .and_then(|claims| claims.role())
            .unwrap_or_default()
    }
}

/// Claims read from the access token payload.
///
/// The signature is not verified here; the backend remains the authority.
/// Reading the role from the token only prevents a client that edited its
/// stored profile from unlocking admin routes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AccessClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
    #[serde(default)]
    authorities: Vec<Authority>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
enum Authority {
    Name(String),
    Object { authority: String },
}

impl Authority {
    fn name(&self) -> &str {
        match self {
            Authority::Name(name) => name,
            Authority::Object { authority } => authority,
        }
    }
}

impl AccessClaims {
    /// Decode the payload segment of a JWT without verifying it.
    pub fn decode(token: &str) -> Option<Self> {
        let mut segments = token.split('.');
        let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);
        if segments.next().is_some() {
            return None;
        }

        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Highest-privileged role named by the `role`, `roles` or
    /// `authorities` claims.
    pub fn role(&self) -> Option<Role> {
        self.role
            .iter()
            .map(String::as_str)
            .chain(self.roles.iter().map(String::as_str))
            .chain(self.authorities.iter().map(Authority::name))
            .map(Role::parse)
            .max_by_key(Role::rank)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp
            .and_then(|exp| Utc.timestamp_opt(exp, 0).single())
    }
}

/// Body returned by `/login` and `/oauth2/callback/{provider}`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionPayload {
    #[serde(default, alias = "accessToken", alias = "access_token")]
    token: Option<String>,
    #[serde(default, alias = "refresh_token")]
    refresh_token: Option<String>,
    #[serde(default)]
    user: Option<UserProfile>,
}

impl SessionPayload {
    pub(crate) fn into_session(self) -> crate::error::Result<Session> {
        use crate::error::AuthError;

        let access_token = self
            .token
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| AuthError::InvalidSession("response carried no access token".to_string()))?;
        let refresh_token = self
            .refresh_token
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| AuthError::InvalidSession("response carried no refresh token".to_string()))?;
        let user = self
            .user
            .ok_or_else(|| AuthError::InvalidSession("response carried no user".to_string()))?;

        Ok(Session::new(AuthTokens::new(access_token, refresh_token), user))
    }
}
