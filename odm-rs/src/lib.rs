//! # odm-rs
//!
//! An async object-document mapper for Rust.
//!
//! This is the meta-crate that re-exports all sub-crates for convenient access.
//! You can depend on `odm-rs` to get everything, or depend on individual crates
//! for finer-grained control.
//!
//! When deriving through this crate, point the derive at the re-exported
//! document layer:
//!
//! ```ignore
//! use odm_rs::prelude::*;
//!
//! #[derive(Debug, Default, Serialize, Deserialize, Document)]
//! #[document(crate = "odm_rs::db")]
//! struct Note {
//!     #[serde(flatten)]
//!     base: DocumentBase,
//!     #[serde(default)]
//!     #[document(required)]
//!     body: String,
//! }
//! ```

/// Errors, settings, logging, and the validation message catalog.
pub use odm_rs_core as core;

/// Documents, relations, validation, the store trait, queries, and population.
pub use odm_rs_db as db;

/// `#[derive(Document)]`.
#[cfg(feature = "macros")]
pub use odm_rs_macros as macros;

/// Store backends.
#[cfg(feature = "memory")]
pub use odm_rs_db_backends as db_backends;

// Third-party crates used in public signatures.
pub use async_trait;
pub use chrono;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tracing;
pub use tracing_subscriber;

/// The commonly used types in one import.
pub mod prelude {
    pub use odm_rs_core::logging::setup_logging;
    pub use odm_rs_core::{
        MessageCatalog, OdmError, OdmResult, Settings, ValidationError, ValidationIssue,
    };
    pub use odm_rs_db::{
        Cardinality, Connection, ConnectionBuilder, Document, DocumentBase, DocumentExt,
        DocumentType, Many, Model, ObjectId, One, Query, Relation, RelationList, Store,
    };
    #[cfg(feature = "memory")]
    pub use odm_rs_db_backends::MemoryStore;
    #[cfg(feature = "macros")]
    pub use odm_rs_macros::Document;
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::json;
}
