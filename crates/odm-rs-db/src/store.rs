//! Store trait.
//!
//! This module defines the [`Store`] trait: the minimal async interface the
//! document layer needs from a document-oriented store. It is the bridge
//! between `odm-rs-db` and concrete stores in `odm-rs-db-backends`, kept here
//! so saving, querying, and population can be written without depending on a
//! particular driver.
//!
//! Filters, projections, and stored documents are JSON maps using the
//! store's native query operators (`$in`, `$gt`, ...). Identifiers travel in
//! their extended-JSON form, `{"$oid": "<hex>"}`.

use std::error::Error as StdError;
use std::fmt;

use async_trait::async_trait;
use odm_rs_core::OdmError;
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

use crate::object_id::ObjectId;

/// A stored document.
pub type StoreDocument = Map<String, JsonValue>;

/// Failures reported by a [`Store`].
#[derive(Error, Debug)]
pub enum StoreError {
    /// The read matched nothing and the store reports that as a failure.
    #[error("not found")]
    NotFound,

    /// A unique index rejected the write.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// Anything else, with the driver's error as the source.
    #[error(transparent)]
    Backend(Box<dyn StdError + Send + Sync>),
}

impl StoreError {
    /// Wraps a driver error.
    pub fn backend(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Backend(err.into())
    }
}

impl From<StoreError> for OdmError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound("No record found".to_string()),
            StoreError::DuplicateKey(key) => Self::Duplicate(key),
            StoreError::Backend(source) => Self::Store(source),
        }
    }
}

/// A filtered read.
///
/// # Examples
///
/// ```
/// use odm_rs_db::store::FindSpec;
/// use serde_json::json;
///
/// let spec = FindSpec::new(json!({"deleted": false}))
///     .sort(vec!["-createdAt".to_string()])
///     .limit(10);
/// assert_eq!(spec.limit, Some(10));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FindSpec {
    /// Filter predicate; `{}` matches every document.
    pub filter: JsonValue,
    /// Fields to include (`1`) or exclude (`0`).
    pub projection: Option<JsonValue>,
    /// Sort keys, `-field` for descending.
    pub sort: Vec<String>,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
    /// Number of matching documents to skip.
    pub skip: Option<usize>,
}

impl FindSpec {
    /// Creates a read for `filter` with no other options.
    pub fn new(filter: JsonValue) -> Self {
        Self {
            filter,
            projection: None,
            sort: Vec::new(),
            limit: None,
            skip: None,
        }
    }

    /// Sets the projection.
    #[must_use]
    pub fn projection(mut self, projection: JsonValue) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Sets the sort keys.
    #[must_use]
    pub fn sort(mut self, sort: Vec<String>) -> Self {
        self.sort = sort;
        self
    }

    /// Sets the limit.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the skip offset.
    #[must_use]
    pub const fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }
}

/// Minimal async store interface.
///
/// Implementations must be safe to share between tasks. [`isolated`](Self::isolated)
/// hands out an independent session for one save; dropping it releases the
/// session.
#[async_trait]
pub trait Store: Send + Sync + fmt::Debug {
    /// Runs a filtered read.
    async fn find(&self, collection: &str, spec: &FindSpec)
        -> Result<Vec<StoreDocument>, StoreError>;

    /// Counts documents matching `filter`.
    async fn count(&self, collection: &str, filter: &JsonValue) -> Result<u64, StoreError>;

    /// Inserts a new document.
    async fn insert(&self, collection: &str, document: StoreDocument) -> Result<(), StoreError>;

    /// Replaces the document with identifier `id`, inserting it if absent.
    async fn upsert_by_id(
        &self,
        collection: &str,
        id: &ObjectId,
        document: StoreDocument,
    ) -> Result<(), StoreError>;

    /// Physically removes every document matching `filter`, returning the count.
    async fn remove_all(&self, collection: &str, filter: &JsonValue) -> Result<u64, StoreError>;

    /// Returns an independent session on the same store.
    fn isolated(&self) -> Box<dyn Store>;

    /// Releases the connection.
    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
