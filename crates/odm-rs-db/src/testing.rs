//! Test fixtures: two hand-written document types and a small in-process store.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex};

use async_trait::async_trait;
use odm_rs_core::{OdmResult, Settings};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::connection::Connection;
use crate::document::{Document, DocumentBase, DocumentMeta, DocumentType};
use crate::fields::{Cardinality, FieldDescriptor, FieldShape, SchemaError};
use crate::object_id::ObjectId;
use crate::relation::{Relation, RelationList, RelationValue};
use crate::store::{FindSpec, Store, StoreDocument, StoreError};
use crate::value::{AsFieldValue, FieldValue};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Author {
    #[serde(flatten)]
    pub base: DocumentBase,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

impl Author {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

impl DocumentType for Author {
    fn describe() -> Result<DocumentMeta, SchemaError> {
        DocumentMeta::new(
            "Author",
            vec![
                FieldDescriptor::new("name", FieldShape::Text)
                    .required()
                    .min_len(2),
                FieldDescriptor::new("email", FieldShape::Text).validation("email"),
            ],
        )
    }

    fn document_meta() -> &'static DocumentMeta {
        static META: LazyLock<DocumentMeta> =
            LazyLock::new(|| Author::describe().expect("valid Author schema"));
        &META
    }
}

impl Document for Author {
    fn meta(&self) -> &'static DocumentMeta {
        Self::document_meta()
    }

    fn base(&self) -> &DocumentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut DocumentBase {
        &mut self.base
    }

    fn field_value(&self, field: &str) -> Option<FieldValue<'_>> {
        match field {
            "name" => Some(self.name.as_field_value()),
            "email" => Some(self.email.as_field_value()),
            _ => None,
        }
    }

    fn relation(&self, _field: &str) -> Option<&dyn RelationValue> {
        None
    }

    fn relation_mut(&mut self, _field: &str) -> Option<&mut dyn RelationValue> {
        None
    }

    fn to_store(&self) -> OdmResult<Map<String, JsonValue>> {
        match serde_json::to_value(self)? {
            JsonValue::Object(map) => Ok(map),
            _ => unreachable!("structs serialize to maps"),
        }
    }

    fn merge_fields(&mut self, fields: &Map<String, JsonValue>) -> OdmResult<()> {
        for (key, value) in fields {
            if key.eq_ignore_ascii_case("name") {
                self.name = serde_json::from_value(value.clone())?;
            } else if key.eq_ignore_ascii_case("email") {
                self.email = serde_json::from_value(value.clone())?;
            }
        }
        Ok(())
    }

    fn as_document(&self) -> &dyn Document {
        self
    }

    fn as_document_mut(&mut self) -> &mut dyn Document {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Post {
    #[serde(flatten)]
    pub base: DocumentBase,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: Relation<Author>,
    #[serde(default)]
    pub reviewers: RelationList<Author>,
}

impl DocumentType for Post {
    fn describe() -> Result<DocumentMeta, SchemaError> {
        DocumentMeta::new(
            "Post",
            vec![
                FieldDescriptor::new("title", FieldShape::Text)
                    .required()
                    .max_len(40),
                FieldDescriptor::new("author", FieldShape::Reference(Cardinality::One))
                    .model("Author")
                    .autosave(),
                FieldDescriptor::new("reviewers", FieldShape::Reference(Cardinality::Many))
                    .model("Author")
                    .cardinality(Cardinality::Many),
            ],
        )
    }

    fn document_meta() -> &'static DocumentMeta {
        static META: LazyLock<DocumentMeta> =
            LazyLock::new(|| Post::describe().expect("valid Post schema"));
        &META
    }
}

impl Document for Post {
    fn meta(&self) -> &'static DocumentMeta {
        Self::document_meta()
    }

    fn base(&self) -> &DocumentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut DocumentBase {
        &mut self.base
    }

    fn field_value(&self, field: &str) -> Option<FieldValue<'_>> {
        match field {
            "title" => Some(self.title.as_field_value()),
            "author" => Some(self.author.as_field_value()),
            "reviewers" => Some(self.reviewers.as_field_value()),
            _ => None,
        }
    }

    fn relation(&self, field: &str) -> Option<&dyn RelationValue> {
        match field {
            "author" => Some(&self.author),
            "reviewers" => Some(&self.reviewers),
            _ => None,
        }
    }

    fn relation_mut(&mut self, field: &str) -> Option<&mut dyn RelationValue> {
        match field {
            "author" => Some(&mut self.author),
            "reviewers" => Some(&mut self.reviewers),
            _ => None,
        }
    }

    fn to_store(&self) -> OdmResult<Map<String, JsonValue>> {
        match serde_json::to_value(self)? {
            JsonValue::Object(map) => Ok(map),
            _ => unreachable!("structs serialize to maps"),
        }
    }

    fn merge_fields(&mut self, fields: &Map<String, JsonValue>) -> OdmResult<()> {
        for (key, value) in fields {
            if key.eq_ignore_ascii_case("title") {
                self.title = serde_json::from_value(value.clone())?;
            } else if key.eq_ignore_ascii_case("author") {
                self.author = serde_json::from_value(value.clone())?;
            } else if key.eq_ignore_ascii_case("reviewers") {
                self.reviewers = serde_json::from_value(value.clone())?;
            }
        }
        Ok(())
    }

    fn as_document(&self) -> &dyn Document {
        self
    }

    fn as_document_mut(&mut self) -> &mut dyn Document {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

/// Understands `{}`, top-level equality, and `{"$in": [...]}`.
#[derive(Debug, Clone, Default)]
pub(crate) struct TestStore {
    collections: Arc<Mutex<HashMap<String, Vec<StoreDocument>>>>,
    reads: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
    sessions: Arc<AtomicUsize>,
    fail_writes: Arc<AtomicBool>,
}

impl TestStore {
    pub fn documents(&self, collection: &str) -> Vec<StoreDocument> {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn matches(document: &StoreDocument, filter: &JsonValue) -> bool {
        let Some(filter) = filter.as_object() else {
            return false;
        };
        filter.iter().all(|(key, expected)| {
            let actual = document.get(key).unwrap_or(&JsonValue::Null);
            match expected.get("$in").and_then(JsonValue::as_array) {
                Some(candidates) => candidates.contains(actual),
                None => actual == expected,
            }
        })
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::backend("write refused"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Store for TestStore {
    async fn find(
        &self,
        collection: &str,
        spec: &FindSpec,
    ) -> Result<Vec<StoreDocument>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let mut found: Vec<StoreDocument> = self
            .documents(collection)
            .into_iter()
            .filter(|d| Self::matches(d, &spec.filter))
            .skip(spec.skip.unwrap_or(0))
            .collect();
        if let Some(limit) = spec.limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn count(&self, collection: &str, filter: &JsonValue) -> Result<u64, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let count = self
            .documents(collection)
            .iter()
            .filter(|d| Self::matches(d, filter))
            .count();
        Ok(count as u64)
    }

    async fn insert(&self, collection: &str, document: StoreDocument) -> Result<(), StoreError> {
        self.check_writable()?;
        self.collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .push(document);
        Ok(())
    }

    async fn upsert_by_id(
        &self,
        collection: &str,
        id: &ObjectId,
        document: StoreDocument,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        let key = id.to_json();
        let mut collections = self.collections.lock().unwrap();
        let documents = collections.entry(collection.to_string()).or_default();
        match documents.iter_mut().find(|d| d.get("_id") == Some(&key)) {
            Some(existing) => *existing = document,
            None => documents.push(document),
        }
        Ok(())
    }

    async fn remove_all(&self, collection: &str, filter: &JsonValue) -> Result<u64, StoreError> {
        self.check_writable()?;
        let mut collections = self.collections.lock().unwrap();
        let documents = collections.entry(collection.to_string()).or_default();
        let before = documents.len();
        documents.retain(|d| !Self::matches(d, filter));
        Ok((before - documents.len()) as u64)
    }

    fn isolated(&self) -> Box<dyn Store> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        Box::new(self.clone())
    }
}

pub(crate) fn connect() -> (Connection, TestStore) {
    let store = TestStore::default();
    let mut builder = Connection::builder(Settings::default(), store.clone());
    builder
        .register::<Author>("authors")
        .unwrap()
        .register::<Post>("posts")
        .unwrap();
    (builder.build().unwrap(), store)
}
