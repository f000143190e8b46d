//! # odm-rs-db-backends
//!
//! Store implementations for odm-rs. Each backend implements the
//! [`Store`](odm_rs_db::Store) trait from `odm-rs-db`.
//!
//! Available backends:
//! - [`MemoryStore`] - an in-process document store with Mongo-style filters,
//!   sort, projection and unique indexes; used for tests and embedding

#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]

pub mod filter;
pub mod memory;

pub use filter::FilterError;
pub use memory::MemoryStore;
