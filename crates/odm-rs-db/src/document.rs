//! Document trait and metadata.
//!
//! The [`Document`] trait is the core abstraction that every mapped record type
//! implements, usually through `#[derive(Document)]`. It gives the engine
//! object-safe access to a record's descriptor table, its reserved base fields,
//! and its relation fields, so saving, validating and populating work on
//! `&mut dyn Document` without knowing the concrete type.
//!
//! [`DocumentMeta`] is the per-type descriptor table. [`DocumentBase`] holds the
//! reserved fields every record carries: identifier, timestamps, and the
//! soft-delete flag.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use odm_rs_core::{MessageCatalog, OdmResult, ValidationIssue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::connection::Connection;
use crate::fields::{FieldDescriptor, RelationDef, SchemaError};
use crate::object_id::ObjectId;
use crate::relation::RelationValue;
use crate::value::FieldValue;

/// Stored keys of the reserved base fields.
pub const RESERVED_KEYS: [&str; 5] = ["_id", "id", "createdAt", "updatedAt", "deleted"];

/// The descriptor table of one document type.
///
/// # Examples
///
/// ```
/// use odm_rs_db::document::DocumentMeta;
/// use odm_rs_db::fields::{Cardinality, FieldDescriptor, FieldShape};
///
/// let meta = DocumentMeta::new(
///     "Post",
///     vec![
///         FieldDescriptor::new("title", FieldShape::Text).required().max_len(120),
///         FieldDescriptor::new("author", FieldShape::Reference(Cardinality::One)).model("User"),
///     ],
/// )
/// .unwrap();
/// assert_eq!(meta.type_key(), "post");
/// assert_eq!(meta.relations().count(), 1);
/// ```
#[derive(Debug)]
pub struct DocumentMeta {
    type_name: String,
    fields: Vec<FieldDescriptor>,
}

impl DocumentMeta {
    /// Builds and checks the descriptor table for `type_name`.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] if any descriptor is inconsistent or two fields
    /// share a name or stored key.
    pub fn new(
        type_name: impl Into<String>,
        fields: Vec<FieldDescriptor>,
    ) -> Result<Self, SchemaError> {
        let mut compiled: Vec<FieldDescriptor> = Vec::with_capacity(fields.len());
        for descriptor in fields {
            if compiled
                .iter()
                .any(|d| d.field == descriptor.field || d.key == descriptor.key)
            {
                return Err(SchemaError::DuplicateField(descriptor.field));
            }
            compiled.push(descriptor.compile()?);
        }
        Ok(Self {
            type_name: type_name.into(),
            fields: compiled,
        })
    }

    /// Returns the type name as registered.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the lower-cased type name used for registry lookups and
    /// wrapped update input.
    pub fn type_key(&self) -> String {
        self.type_name.to_lowercase()
    }

    /// Returns the descriptors in declared field order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Looks up a descriptor by field name or stored key.
    ///
    /// Exact matches win; otherwise the first ASCII case-insensitive match.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|d| d.field == name || d.key == name)
            .or_else(|| {
                self.fields.iter().find(|d| {
                    d.field.eq_ignore_ascii_case(name) || d.key.eq_ignore_ascii_case(name)
                })
            })
    }

    /// Iterates over relation fields with their relation settings.
    pub fn relations(&self) -> impl Iterator<Item = (&FieldDescriptor, RelationDef<'_>)> {
        self.fields
            .iter()
            .filter_map(|d| d.relation().map(|relation| (d, relation)))
    }
}

/// Ties a record to its connection and collection.
#[derive(Clone)]
pub struct Binding {
    connection: Connection,
    collection: Arc<str>,
}

impl Binding {
    pub(crate) fn new(connection: Connection, collection: Arc<str>) -> Self {
        Self {
            connection,
            collection,
        }
    }

    /// Returns the connection.
    pub const fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Returns the collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

/// The reserved fields every record carries.
///
/// Embed it with `#[serde(flatten)]` and mark it `#[document(base)]`. The
/// identifier is assigned on first save and the timestamps are managed by the
/// save path; none of them can be set through a partial update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentBase {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    #[serde(rename = "createdAt", default)]
    created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt", default)]
    updated_at: DateTime<Utc>,
    #[serde(default)]
    deleted: bool,
    #[serde(skip)]
    binding: Option<Binding>,
}

/// The base fields at one point in time, used to undo a failed insert.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BaseSnapshot {
    id: Option<ObjectId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DocumentBase {
    /// Returns the identifier, or `None` before the first save.
    pub const fn id(&self) -> Option<ObjectId> {
        self.id
    }

    /// Returns the creation timestamp.
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last modification timestamp.
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns `true` if the record has been soft-deleted.
    pub const fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Returns `true` if the record is bound to a connection and collection.
    pub const fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Returns the binding, if any.
    pub const fn binding(&self) -> Option<&Binding> {
        self.binding.as_ref()
    }

    pub(crate) fn bind(&mut self, binding: Binding) {
        self.binding = Some(binding);
    }

    pub(crate) fn set_deleted(&mut self, deleted: bool) {
        self.deleted = deleted;
    }

    pub(crate) fn mark_inserted(&mut self, id: ObjectId, now: DateTime<Utc>) {
        self.id = Some(id);
        self.created_at = now;
        self.updated_at = now;
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    pub(crate) const fn snapshot(&self) -> BaseSnapshot {
        BaseSnapshot {
            id: self.id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub(crate) fn restore(&mut self, snapshot: BaseSnapshot) {
        self.id = snapshot.id;
        self.created_at = snapshot.created_at;
        self.updated_at = snapshot.updated_at;
    }
}

impl PartialEq for DocumentBase {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.created_at == other.created_at
            && self.updated_at == other.updated_at
            && self.deleted == other.deleted
    }
}

/// Object-safe access to a mapped record.
///
/// Implemented by `#[derive(Document)]`. Manual implementations follow the
/// same pattern: a `LazyLock` descriptor table and `match`-based field lookup.
pub trait Document: Any + Send + Sync + fmt::Debug {
    /// Returns the descriptor table of this record's type.
    fn meta(&self) -> &'static DocumentMeta;

    /// Returns the reserved base fields.
    fn base(&self) -> &DocumentBase;

    /// Returns the reserved base fields mutably.
    fn base_mut(&mut self) -> &mut DocumentBase;

    /// Returns a view of the named field, or `None` if there is no such field.
    fn field_value(&self, field: &str) -> Option<FieldValue<'_>>;

    /// Returns the named relation field.
    fn relation(&self, field: &str) -> Option<&dyn RelationValue>;

    /// Returns the named relation field mutably.
    fn relation_mut(&mut self, field: &str) -> Option<&mut dyn RelationValue>;

    /// Serializes the record into its stored form.
    fn to_store(&self) -> OdmResult<Map<String, JsonValue>>;

    /// Overwrites fields whose stored key matches an entry of `fields`
    /// (ASCII case-insensitive). Unknown keys are ignored.
    fn merge_fields(&mut self, fields: &Map<String, JsonValue>) -> OdmResult<()>;

    /// Validates the record.
    ///
    /// Override to add checks on top of the descriptor-driven rules; call
    /// [`validate_fields`](crate::validators::validate_fields) to keep them.
    fn validate(&self, messages: &MessageCatalog) -> Vec<ValidationIssue> {
        crate::validators::validate_fields(self.as_document(), messages)
    }

    /// Upcasts to `&dyn Document`.
    fn as_document(&self) -> &dyn Document;

    /// Upcasts to `&mut dyn Document`.
    fn as_document_mut(&mut self) -> &mut dyn Document;

    /// Upcasts to `&dyn Any`.
    fn as_any(&self) -> &dyn Any;

    /// Converts a boxed record into `Box<dyn Any>` for downcasting.
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

/// Static entry points of a mapped record type.
pub trait DocumentType: Document + Default + Serialize + DeserializeOwned {
    /// Builds the descriptor table, reporting annotation defects.
    fn describe() -> Result<DocumentMeta, SchemaError>;

    /// Returns the cached descriptor table.
    ///
    /// # Panics
    ///
    /// Panics if [`describe`](Self::describe) fails. Registration calls
    /// `describe` first, so a registered type never panics here.
    fn document_meta() -> &'static DocumentMeta;

    /// Decodes a record from its stored form.
    fn from_store(map: Map<String, JsonValue>) -> OdmResult<Self> {
        Ok(serde_json::from_value(JsonValue::Object(map))?)
    }
}

/// Returns the binding of `document`.
///
/// # Panics
///
/// Panics if the record was never bound to a collection.
pub(crate) fn expect_binding(document: &dyn Document, operation: &str) -> Binding {
    document.base().binding().cloned().unwrap_or_else(|| {
        panic!(
            "cannot {operation} a '{}' document that was not created through its model",
            document.meta().type_name()
        )
    })
}

/// Converts every valid text reference into a typed identifier.
pub(crate) fn normalize_references(document: &mut dyn Document) {
    let meta = document.meta();
    for (descriptor, _) in meta.relations() {
        if let Some(relation) = document.relation_mut(&descriptor.field) {
            relation.normalize();
        }
    }
}

// ── Record operations ───────────────────────────────────────────────

/// Operations available on every bound record.
///
/// # Examples
///
/// ```rust,ignore
/// let mut user: User = connection.model("User").new();
/// user.name = "Ada".into();
/// user.save().await?;
/// user.populate(&["messages"]).await?;
/// ```
#[async_trait]
pub trait DocumentExt: Document {
    /// Validates and writes the record.
    async fn save(&mut self) -> OdmResult<()>;

    /// Soft-deletes the record by flipping its delete flag and saving.
    async fn delete(&mut self) -> OdmResult<()>;

    /// Resolves the named relation fields into populated form.
    async fn populate(&mut self, fields: &[&str]) -> OdmResult<()>;

    /// Runs validation, returning whether it passed and every issue found.
    fn validate_document(&self) -> (bool, Vec<ValidationIssue>);

    /// Merges partial-update input into the record.
    fn update(&mut self, content: JsonValue) -> OdmResult<Option<Map<String, JsonValue>>>;

    /// Parses JSON bytes and merges them into the record.
    fn update_from_slice(&mut self, content: &[u8]) -> OdmResult<Option<Map<String, JsonValue>>>;

    /// Returns the stored identifier.
    fn id(&self) -> Option<ObjectId>;

    /// Returns `true` if the record is bound to a collection.
    fn is_bound(&self) -> bool;
}

#[async_trait]
impl<T: Document + ?Sized> DocumentExt for T {
    async fn save(&mut self) -> OdmResult<()> {
        crate::persist::save_document(self.as_document_mut()).await
    }

    async fn delete(&mut self) -> OdmResult<()> {
        crate::persist::delete_document(self.as_document_mut()).await
    }

    async fn populate(&mut self, fields: &[&str]) -> OdmResult<()> {
        crate::populate::populate_document(self.as_document_mut(), fields).await
    }

    fn validate_document(&self) -> (bool, Vec<ValidationIssue>) {
        let issues = match self.base().binding() {
            Some(binding) => self.validate(binding.connection().messages()),
            None => self.validate(&MessageCatalog::default()),
        };
        (issues.is_empty(), issues)
    }

    fn update(&mut self, content: JsonValue) -> OdmResult<Option<Map<String, JsonValue>>> {
        crate::update::apply_update(self.as_document_mut(), content)
    }

    fn update_from_slice(&mut self, content: &[u8]) -> OdmResult<Option<Map<String, JsonValue>>> {
        let content: JsonValue = serde_json::from_slice(content)?;
        crate::update::apply_update(self.as_document_mut(), content)
    }

    fn id(&self) -> Option<ObjectId> {
        self.base().id()
    }

    fn is_bound(&self) -> bool {
        self.base().is_bound()
    }
}
