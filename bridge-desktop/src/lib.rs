//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux) and for command-line shells.
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest` (rustls, retry for idempotent methods)
//! - `SecureStore` using the OS keychain via `keyring` (feature `secure-store`)
//! - `SecureStore` using a permission-restricted JSON file
//! - `SecureStore` in memory, for tests and ephemeral sessions
//! - `Navigator` recording a history stack
//!
//! ## Feature Flags
//!
//! - `secure-store`: Enable OS keychain integration (default)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{FileSecureStore, HistoryNavigator, ReqwestHttpClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let http_client = ReqwestHttpClient::new()?;
//!     let secure_store = FileSecureStore::new();
//!     let navigator = HistoryNavigator::new("/login");
//!
//!     // Hand these to the core configuration builder
//!     Ok(())
//! }
//! ```

mod file_store;
mod http;
mod memory_store;
mod navigation;

#[cfg(feature = "secure-store")]
mod secure_store;

pub use file_store::FileSecureStore;
pub use http::ReqwestHttpClient;
pub use memory_store::MemorySecureStore;
pub use navigation::HistoryNavigator;

#[cfg(feature = "secure-store")]
pub use secure_store::KeyringSecureStore;
