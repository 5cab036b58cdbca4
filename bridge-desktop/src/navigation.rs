//! Navigation history for shells without a router of their own

use bridge_traits::navigation::{NavigationMode, Navigator};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// [`Navigator`] that records a browser-style history stack.
///
/// CLI and desktop shells poll [`current`](Self::current) after each core
/// call to decide which screen to show.
#[derive(Debug)]
pub struct HistoryNavigator {
    entries: Mutex<Vec<String>>,
}

impl HistoryNavigator {
    /// Start with a single entry at `initial`.
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            entries: Mutex::new(vec![initial.into()]),
        }
    }

    fn entries(&self) -> MutexGuard<'_, Vec<String>> {
        // A poisoned lock only means another thread panicked mid-push; the
        // Vec itself is still consistent.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The path currently shown.
    pub fn current(&self) -> Option<String> {
        self.entries().last().cloned()
    }

    /// All entries, oldest first.
    pub fn history(&self) -> Vec<String> {
        self.entries().clone()
    }

    /// Pop the current entry, returning the new current path.
    pub fn back(&self) -> Option<String> {
        let mut entries = self.entries();
        if entries.len() > 1 {
            entries.pop();
        }
        entries.last().cloned()
    }
}

impl Default for HistoryNavigator {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Navigator for HistoryNavigator {
    fn navigate(&self, path: &str, mode: NavigationMode) {
        debug!(path, %mode, "Navigating");
        let mut entries = self.entries();
        if mode == NavigationMode::Replace {
            entries.pop();
        }
        entries.push(path.to_string());
    }
}
