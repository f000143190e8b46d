//! In-process document store.
//!
//! This module provides [`MemoryStore`], which implements the
//! [`Store`](odm_rs_db::Store) trait over collections held in memory behind a
//! `tokio::sync::RwLock`. Clones share the same collections, so a store handed
//! to a connection can still be inspected by the test that created it.
//!
//! Features:
//! - Mongo-style filters, sort, skip/limit and projection (see [`crate::filter`])
//! - Unique indexes reporting [`StoreError::DuplicateKey`]
//! - Read, write and session counters for asserting I/O in tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use odm_rs_db::{FindSpec, ObjectId, Store, StoreDocument, StoreError};
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;

use crate::filter;

#[derive(Debug, Default)]
struct Collection {
    documents: Vec<StoreDocument>,
    unique_keys: Vec<String>,
}

impl Collection {
    fn matching(&self, filter: &JsonValue) -> Result<Vec<&StoreDocument>, StoreError> {
        let mut found = Vec::new();
        for document in &self.documents {
            if filter::matches(document, filter).map_err(StoreError::backend)? {
                found.push(document);
            }
        }
        Ok(found)
    }

    /// Checks `document` against the unique indexes, ignoring the slot at `skip`.
    fn check_unique(&self, document: &StoreDocument, skip: Option<usize>) -> Result<(), StoreError> {
        let keys = std::iter::once("_id").chain(self.unique_keys.iter().map(String::as_str));
        for key in keys {
            let Some(value) = filter::lookup(document, key).filter(|v| !v.is_null()) else {
                continue;
            };
            let clash = self
                .documents
                .iter()
                .enumerate()
                .filter(|(i, _)| Some(*i) != skip)
                .any(|(_, existing)| filter::lookup(existing, key) == Some(value));
            if clash {
                return Err(StoreError::DuplicateKey(key.to_string()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct State {
    collections: RwLock<HashMap<String, Collection>>,
    reads: AtomicU64,
    writes: AtomicU64,
    sessions: AtomicU64,
}

/// A document store kept entirely in memory.
///
/// # Examples
///
/// ```
/// use odm_rs_db::{FindSpec, Store};
/// use odm_rs_db_backends::MemoryStore;
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let store = MemoryStore::new();
/// let doc = json!({"name": "Ada"}).as_object().cloned().unwrap();
/// store.insert("people", doc).await.unwrap();
///
/// let found = store
///     .find("people", &FindSpec::new(json!({"name": "Ada"})))
///     .await
///     .unwrap();
/// assert_eq!(found.len(), 1);
/// assert_eq!(store.read_count(), 1);
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<State>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a unique index on `key` (a dotted path) to `collection`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateKey`] if existing documents already
    /// share a value for `key`; the index is not created in that case.
    pub async fn ensure_unique_index(&self, collection: &str, key: &str) -> Result<(), StoreError> {
        let mut collections = self.state.collections.write().await;
        let entry = collections.entry(collection.to_string()).or_default();
        if entry.unique_keys.iter().any(|k| k == key) {
            return Ok(());
        }
        let mut seen: Vec<&JsonValue> = Vec::new();
        for document in &entry.documents {
            if let Some(value) = filter::lookup(document, key).filter(|v| !v.is_null()) {
                if seen.contains(&value) {
                    return Err(StoreError::DuplicateKey(key.to_string()));
                }
                seen.push(value);
            }
        }
        entry.unique_keys.push(key.to_string());
        tracing::debug!(collection, key, "unique index created");
        Ok(())
    }

    /// Returns a copy of every document in `collection`, in insertion order.
    pub async fn documents(&self, collection: &str) -> Vec<StoreDocument> {
        self.state
            .collections
            .read()
            .await
            .get(collection)
            .map(|c| c.documents.clone())
            .unwrap_or_default()
    }

    /// Number of `find` and `count` calls served.
    pub fn read_count(&self) -> u64 {
        self.state.reads.load(Ordering::SeqCst)
    }

    /// Number of successful writes.
    pub fn write_count(&self) -> u64 {
        self.state.writes.load(Ordering::SeqCst)
    }

    /// Number of sessions handed out by `isolated`.
    pub fn sessions_opened(&self) -> u64 {
        self.state.sessions.load(Ordering::SeqCst)
    }

    /// Resets all counters to zero.
    pub fn reset_counters(&self) {
        self.state.reads.store(0, Ordering::SeqCst);
        self.state.writes.store(0, Ordering::SeqCst);
        self.state.sessions.store(0, Ordering::SeqCst);
    }

    fn record_write(&self) {
        self.state.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find(
        &self,
        collection: &str,
        spec: &FindSpec,
    ) -> Result<Vec<StoreDocument>, StoreError> {
        self.state.reads.fetch_add(1, Ordering::SeqCst);
        let collections = self.state.collections.read().await;
        let Some(entry) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut found: Vec<StoreDocument> =
            entry.matching(&spec.filter)?.into_iter().cloned().collect();
        drop(collections);

        filter::sort_documents(&mut found, &spec.sort);
        let skip = spec.skip.unwrap_or(0);
        let limit = spec.limit.unwrap_or(usize::MAX);
        let page = found.into_iter().skip(skip).take(limit);

        let result = match &spec.projection {
            Some(projection) => page
                .map(|d| filter::project(d, projection).map_err(StoreError::backend))
                .collect::<Result<Vec<_>, _>>()?,
            None => page.collect(),
        };
        tracing::trace!(collection, matched = result.len(), "find");
        Ok(result)
    }

    async fn count(&self, collection: &str, filter: &JsonValue) -> Result<u64, StoreError> {
        self.state.reads.fetch_add(1, Ordering::SeqCst);
        let collections = self.state.collections.read().await;
        match collections.get(collection) {
            Some(entry) => Ok(entry.matching(filter)?.len() as u64),
            None => Ok(0),
        }
    }

    async fn insert(&self, collection: &str, document: StoreDocument) -> Result<(), StoreError> {
        let mut collections = self.state.collections.write().await;
        let entry = collections.entry(collection.to_string()).or_default();
        entry.check_unique(&document, None)?;
        entry.documents.push(document);
        self.record_write();
        Ok(())
    }

    async fn upsert_by_id(
        &self,
        collection: &str,
        id: &ObjectId,
        document: StoreDocument,
    ) -> Result<(), StoreError> {
        let key = id.to_json();
        let mut collections = self.state.collections.write().await;
        let entry = collections.entry(collection.to_string()).or_default();
        let slot = entry
            .documents
            .iter()
            .position(|d| d.get("_id") == Some(&key));
        entry.check_unique(&document, slot)?;
        match slot {
            Some(index) => entry.documents[index] = document,
            None => entry.documents.push(document),
        }
        self.record_write();
        Ok(())
    }

    async fn remove_all(&self, collection: &str, filter: &JsonValue) -> Result<u64, StoreError> {
        let mut collections = self.state.collections.write().await;
        let Some(entry) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let mut keep = Vec::with_capacity(entry.documents.len());
        for document in &entry.documents {
            keep.push(!filter::matches(document, filter).map_err(StoreError::backend)?);
        }
        let before = entry.documents.len();
        let mut flags = keep.into_iter();
        entry.documents.retain(|_| flags.next().unwrap_or(true));
        let removed = (before - entry.documents.len()) as u64;
        self.record_write();
        tracing::debug!(collection, removed, "documents removed");
        Ok(removed)
    }

    fn isolated(&self) -> Box<dyn Store> {
        self.state.sessions.fetch_add(1, Ordering::SeqCst);
        Box::new(self.clone())
    }
}
