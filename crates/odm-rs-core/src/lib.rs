//! # odm-rs-core
//!
//! Core types, settings, logging, and error types for the odm-rs document mapper.
//! This crate knows nothing about documents or stores and provides the foundation
//! for all other crates.
//!
//! ## Modules
//!
//! - [`error`] - Error types and result aliases
//! - [`settings`] - Connection settings
//! - [`settings_loader`] - Loading settings from TOML, JSON, and the environment
//! - [`logging`] - Tracing-based logging integration
//! - [`messages`] - Message catalog used to render validation text

pub mod error;
pub mod logging;
pub mod messages;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use error::{ErrorKind, OdmError, OdmResult, ValidationError, ValidationIssue};
pub use messages::MessageCatalog;
pub use settings::Settings;
