//! # odm-rs-db
//!
//! Document layer for odm-rs. Application record types implement
//! [`Document`](document::Document) (usually via `#[derive(Document)]`), are
//! registered on a [`Connection`](connection::Connection), and are then saved,
//! validated, queried, and populated through the engine in this crate.
//!
//! ## Architecture
//!
//! Each document type carries a descriptor table ([`DocumentMeta`](document::DocumentMeta))
//! built once from its field annotations. Validation, saving, and population
//! walk that table instead of inspecting types at runtime. Relation fields are
//! typed ([`Relation`](relation::Relation), [`RelationList`](relation::RelationList))
//! and hold either reference form or populated form; the save path writes the
//! reference form while the caller keeps the populated one.
//!
//! ## Module Overview
//!
//! - [`document`] - The [`Document`](document::Document) trait, descriptor table, and base fields
//! - [`fields`] - Field descriptors, shapes, and schema errors
//! - [`relation`] - One and many relation values
//! - [`value`] - Read-only field views used by validators
//! - [`validators`] - Field validators
//! - [`object_id`] - Store identifiers
//! - [`store`] - The [`Store`](store::Store) trait implemented by backends
//! - [`registry`] - Type name to collection and constructor
//! - [`connection`] - Connections and their builder
//! - [`query`] - Model handles and the query builder

#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::result_large_err)]
// significant_drop_tightening: false positives with the staging guard
#![allow(clippy::significant_drop_tightening)]

pub mod connection;
pub mod document;
pub mod fields;
pub mod object_id;
pub mod query;
pub mod registry;
pub mod relation;
pub mod store;
pub mod validators;
pub mod value;

mod persist;
mod populate;
mod update;

#[cfg(test)]
mod testing;

// Re-export the most commonly used types at the crate root.
pub use connection::{Connection, ConnectionBuilder};
pub use document::{Document, DocumentBase, DocumentExt, DocumentMeta, DocumentType};
pub use fields::{Cardinality, FieldDescriptor, FieldShape, SchemaError};
pub use object_id::ObjectId;
pub use query::{Many, Model, One, Query};
pub use registry::{Registry, RegistryEntry};
pub use relation::{Relation, RelationList, RelationValue};
pub use store::{FindSpec, Store, StoreDocument, StoreError};
pub use value::{AsFieldValue, FieldValue};

/// Items used by code generated from `#[derive(Document)]`.
#[doc(hidden)]
pub mod __private {
    pub use odm_rs_core;
    pub use serde_json;
}
