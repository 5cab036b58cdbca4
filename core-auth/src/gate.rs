//! Session Gate
//!
//! Decides, per navigation, whether a route renders or where the host
//! should redirect instead. Evaluation is pure apart from remembering the
//! location a signed-out user was trying to reach.
//!
//! Rules are checked in order and the first matching pattern wins. Paths no
//! rule matches are public so the host can render its not-found view.
//!
//! ```
//! use core_auth::{Decision, SessionGate};
//!
//! let gate = SessionGate::with_default_rules("/login", "/");
//! assert_eq!(
//!     gate.evaluate("/admin/members", None),
//!     Decision::RedirectToLogin { return_to: "/admin/members".to_string() }
//! );
//! assert_eq!(gate.take_return_to().as_deref(), Some("/admin/members"));
//! ```

use crate::types::{Role, Session};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Who may see a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Public,
    /// Signed-in users are sent to the root route (login, register).
    GuestOnly,
    Authenticated,
    RequiresRole(Role),
}

/// A path pattern and the access it requires.
///
/// Patterns match segment-wise: `:name` matches exactly one segment and a
/// trailing `*` matches any remainder, including none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    pattern: Vec<String>,
    pub access: Access,
}

impl RouteRule {
    pub fn new(pattern: &str, access: Access) -> Self {
        Self {
            pattern: segments(pattern).map(str::to_string).collect(),
            access,
        }
    }

    pub fn pattern(&self) -> String {
        format!("/{}", self.pattern.join("/"))
    }

    pub fn matches(&self, path: &str) -> bool {
        let mut path_segments = segments(strip_query(path));

        for (index, part) in self.pattern.iter().enumerate() {
            if part == "*" && index == self.pattern.len() - 1 {
                return true;
            }
            match path_segments.next() {
                Some(segment) if part.starts_with(':') || part == segment => {}
                _ => return false,
            }
        }

        path_segments.next().is_none()
    }
}

/// Outcome of evaluating a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Render,
    RedirectToLogin { return_to: String },
    RedirectToRoot,
}

/// Route guard over an ordered rule list.
pub struct SessionGate {
    rules: Vec<RouteRule>,
    login_route: String,
    root_route: String,
    return_to: Mutex<Option<String>>,
}

impl SessionGate {
    pub fn new(rules: Vec<RouteRule>, login_route: impl Into<String>, root_route: impl Into<String>) -> Self {
        Self {
            rules,
            login_route: login_route.into(),
            root_route: root_route.into(),
            return_to: Mutex::new(None),
        }
    }

    /// The club portal's routes: guest-only sign-in pages, a public OAuth
    /// callback, an authenticated home, and admin-only administration.
    pub fn with_default_rules(login_route: impl Into<String>, root_route: impl Into<String>) -> Self {
        Self::new(default_rules(), login_route, root_route)
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    pub fn login_route(&self) -> &str {
        &self.login_route
    }

    pub fn root_route(&self) -> &str {
        &self.root_route
    }

    /// Decide whether `path` may render for `session`.
    ///
    /// Role checks use [`Session::verified_role`], never the stored profile.
    pub fn evaluate(&self, path: &str, session: Option<&Session>) -> Decision {
        let access = self
            .rules
            .iter()
            .find(|rule| rule.matches(path))
            .map(|rule| &rule.access)
            .unwrap_or(&Access::Public);

        let decision = match (access, session) {
            (Access::Public, _) => Decision::Render,
            (Access::GuestOnly, None) => Decision::Render,
            (Access::GuestOnly, Some(_)) => Decision::RedirectToRoot,
            (Access::Authenticated | Access::RequiresRole(_), None) => {
                *self.remembered() = Some(path.to_string());
                Decision::RedirectToLogin {
                    return_to: path.to_string(),
                }
            }
            (Access::Authenticated, Some(_)) => Decision::Render,
            (Access::RequiresRole(required), Some(session)) => {
                if session.verified_role().satisfies(required) {
                    Decision::Render
                } else {
                    Decision::RedirectToRoot
                }
            }
        };

        debug!(path = %path, access = ?access, decision = ?decision, "Route evaluated");
        decision
    }

    /// The location a signed-out user last tried to open, cleared on read.
    pub fn take_return_to(&self) -> Option<String> {
        self.remembered().take()
    }

    fn remembered(&self) -> MutexGuard<'_, Option<String>> {
        self.return_to
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub fn default_rules() -> Vec<RouteRule> {
    vec![
        RouteRule::new("/login", Access::GuestOnly),
        RouteRule::new("/register", Access::GuestOnly),
        RouteRule::new("/oauth/callback/:provider", Access::Public),
        RouteRule::new("/", Access::Authenticated),
        RouteRule::new("/admin", Access::RequiresRole(Role::Admin)),
        RouteRule::new("/admin/*", Access::RequiresRole(Role::Admin)),
    ]
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

fn strip_query(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_support::jwt;
    use crate::types::{AuthTokens, UserProfile};
    use serde_json::json;

    fn session_with_role(role: &str) -> Session {
        Session::new(
            AuthTokens::new(jwt(json!({ "sub": "9", "role": role })), "R"),
            UserProfile::default(),
        )
    }

    #[test]
    fn test_pattern_matching() {
        assert!(RouteRule::new("/", Access::Public).matches("/"));
        assert!(!RouteRule::new("/", Access::Public).matches("/clubs"));
        assert!(RouteRule::new("/oauth/callback/:provider", Access::Public)
            .matches("/oauth/callback/kakao?code=1"));
        assert!(!RouteRule::new("/oauth/callback/:provider", Access::Public)
            .matches("/oauth/callback"));
        assert!(RouteRule::new("/admin/*", Access::Public).matches("/admin/clubs/3"));
        assert!(RouteRule::new("/admin/*", Access::Public).matches("/admin"));
        assert_eq!(RouteRule::new("admin/*", Access::Public).pattern(), "/admin/*");
    }

    #[test]
    fn test_protected_route_without_session() {
        let gate = SessionGate::with_default_rules("/login", "/");
        assert_eq!(
            gate.evaluate("/", None),
            Decision::RedirectToLogin {
                return_to: "/".to_string()
            }
        );
        assert_eq!(gate.take_return_to().as_deref(), Some("/"));
        assert_eq!(gate.take_return_to(), None);
    }

    #[test]
    fn test_member_on_admin_route_goes_to_root() {
        let gate = SessionGate::with_default_rules("/login", "/");
        let member = session_with_role("MEMBER");
        assert_eq!(gate.evaluate("/admin", Some(&member)), Decision::RedirectToRoot);
        assert_eq!(gate.evaluate("/", Some(&member)), Decision::Render);
    }

    #[test]
    fn test_admin_renders_admin_routes() {
        let gate = SessionGate::with_default_rules("/login", "/");
        let admin = session_with_role("ADMIN");
        assert_eq!(gate.evaluate("/admin/clubs", Some(&admin)), Decision::Render);
    }

    #[test]
    fn test_profile_role_is_not_trusted() {
        let gate = SessionGate::with_default_rules("/login", "/");
        let forged = Session::new(
            AuthTokens::new("opaque", "R"),
            UserProfile {
                role: Role::Admin,
                ..Default::default()
            },
        );
        assert_eq!(gate.evaluate("/admin", Some(&forged)), Decision::RedirectToRoot);
    }

    #[test]
    fn test_guest_only_and_public_routes() {
        let gate = SessionGate::with_default_rules("/login", "/");
        let member = session_with_role("MEMBER");

        assert_eq!(gate.evaluate("/login", None), Decision::Render);
        assert_eq!(gate.evaluate("/register", Some(&member)), Decision::RedirectToRoot);
        assert_eq!(
            gate.evaluate("/oauth/callback/google#access_token=x", None),
            Decision::Render
        );
        assert_eq!(gate.evaluate("/no-such-page", None), Decision::Render);
    }

    #[test]
    fn test_club_leader_rule() {
        let gate = SessionGate::new(
            vec![RouteRule::new("/clubs/:id/manage", Access::RequiresRole(Role::ClubLeader))],
            "/login",
            "/",
        );
        assert_eq!(
            gate.evaluate("/clubs/4/manage", Some(&session_with_role("Club Leader"))),
            Decision::Render
        );
        assert_eq!(
            gate.evaluate("/clubs/4/manage", Some(&session_with_role("MEMBER"))),
            Decision::RedirectToRoot
        );
    }
}
