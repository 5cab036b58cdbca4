//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the club portal core:
//! - Logging and tracing infrastructure
//! - Client configuration (backend URL, timeouts, credential keys, bridges)
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the auth components depend
//! on. It establishes the logging conventions, configuration validation and
//! event broadcasting used throughout the system.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{ClientConfig, ClientConfigBuilder, StorageKeys};
pub use error::{Error, Result};
pub use events::{AuthEvent, CoreEvent, EventBus, EventStream};
