//! Navigation Abstraction
//!
//! The core never renders anything, but some auth outcomes must move the
//! host to another route: session loss sends the user to the login route,
//! a completed OAuth callback replaces the callback entry with the root.

use std::fmt;

/// How a navigation affects the host's history stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationMode {
    /// Append a new history entry.
    Push,
    /// Replace the current entry so "back" does not return to it.
    Replace,
}

impl fmt::Display for NavigationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavigationMode::Push => f.write_str("push"),
            NavigationMode::Replace => f.write_str("replace"),
        }
    }
}

/// Host router hook.
///
/// Implementations must be cheap and non-blocking; the core calls this from
/// inside async tasks.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::navigation::{Navigator, NavigationMode};
///
/// fn on_session_lost(navigator: &dyn Navigator) {
///     navigator.navigate("/login", NavigationMode::Replace);
/// }
/// ```
pub trait Navigator: Send + Sync {
    /// Move the host to `path`.
    fn navigate(&self, path: &str, mode: NavigationMode);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder(Mutex<Vec<(String, NavigationMode)>>);

    impl Navigator for Recorder {
        fn navigate(&self, path: &str, mode: NavigationMode) {
            self.0.lock().unwrap().push((path.to_string(), mode));
        }
    }

    #[test]
    fn test_navigator_is_object_safe() {
        let recorder = Recorder(Mutex::new(Vec::new()));
        let navigator: &dyn Navigator = &recorder;
        navigator.navigate("/login", NavigationMode::Replace);

        let calls = recorder.0.lock().unwrap();
        assert_eq!(calls.as_slice(), &[("/login".to_string(), NavigationMode::Replace)]);
        assert_eq!(NavigationMode::Replace.to_string(), "replace");
    }
}
