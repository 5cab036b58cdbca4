//! # Host Bridge Traits
//!
//! Capabilities the club portal core needs from whatever shell embeds it.
//! The core never talks to the network, the keychain or the router directly;
//! it goes through these traits so a desktop app, a webview and a CLI can
//! each supply their own implementation.
//!
//! | Trait | Used by |
//! |-------|---------|
//! | [`HttpClient`](http::HttpClient) | authenticated transport, token refresh, OAuth exchange |
//! | [`SecureStore`](storage::SecureStore) | credential store (access token, refresh token, profile) |
//! | [`Navigator`](navigation::Navigator) | login redirect after session loss, root after OAuth |
//! | [`LoggerSink`](logging::LoggerSink) | forwarding `tracing` output to the host log |
//!
//! Implementations must be `Send + Sync` and report failures as
//! [`BridgeError`](error::BridgeError). The auth layer relies on the
//! distinction between [`BridgeError::Timeout`](error::BridgeError::Timeout)
//! and [`BridgeError::Network`](error::BridgeError::Network): a timeout never
//! triggers a token refresh.
//!
//! ## Example
//!
//! A navigator for a shell that has no router:
//!
//! ```
//! use bridge_traits::navigation::{NavigationMode, Navigator};
//!
//! struct PrintNavigator;
//!
//! impl Navigator for PrintNavigator {
//!     fn navigate(&self, path: &str, mode: NavigationMode) {
//!         println!("-> {path} ({mode:?})");
//!     }
//! }
//! ```

pub mod error;
pub mod http;
pub mod logging;
pub mod navigation;
pub mod storage;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use logging::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use navigation::{NavigationMode, Navigator};
pub use storage::SecureStore;
