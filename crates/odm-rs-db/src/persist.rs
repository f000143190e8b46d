//! Save and soft-delete.
//!
//! Saving runs in a fixed order:
//!
//! 1. Validate; a failure returns every issue and nothing is written.
//! 2. Open an isolated store session for this call.
//! 3. Normalize each relation field to reference form. Related records are
//!    saved first when the field has `autosave`. The original value of every
//!    rewritten field is staged.
//! 4. Insert (first save: new identifier and both timestamps) or upsert by
//!    identifier (later saves: modification timestamp only).
//! 5. Restore every staged field, on every exit path.
//!
//! There is no multi-document transaction. A cascade writes the related
//! records and then the parent as independent writes, so a failure part way
//! leaves the earlier writes in place.

use chrono::Utc;
use futures::future::BoxFuture;
use odm_rs_core::logging::operation_span;
use odm_rs_core::{OdmError, OdmResult, ValidationError};
use tracing::{debug, Instrument};

use crate::document::{expect_binding, Binding, Document};
use crate::fields::RelationDef;
use crate::object_id::ObjectId;
use crate::relation::{RelationElement, StagedValue};
use crate::store::Store;

/// A record whose relation fields are temporarily in reference form.
///
/// Dropping it puts the original values back.
struct StagedDocument<'a> {
    document: &'a mut dyn Document,
    staged: Vec<(String, StagedValue)>,
}

impl<'a> StagedDocument<'a> {
    fn new(document: &'a mut dyn Document) -> Self {
        Self {
            document,
            staged: Vec::new(),
        }
    }
}

impl Drop for StagedDocument<'_> {
    fn drop(&mut self) {
        for (field, original) in self.staged.drain(..).rev() {
            if let Some(relation) = self.document.relation_mut(&field) {
                relation.restore(original);
            }
        }
    }
}

/// Validates and writes `document`.
pub(crate) async fn save_document(document: &mut dyn Document) -> OdmResult<()> {
    save_boxed(document).await
}

/// Soft-deletes `document` by setting its delete flag and saving it.
///
/// # Errors
///
/// Returns [`OdmError::InvalidReference`] without writing if the record was
/// never saved. If the save fails the flag is reverted.
pub(crate) async fn delete_document(document: &mut dyn Document) -> OdmResult<()> {
    if document.base().id().is_none() {
        return Err(OdmError::InvalidReference("Invalid object id".to_string()));
    }
    let was_deleted = document.base().is_deleted();
    document.base_mut().set_deleted(true);
    let result = save_boxed(document).await;
    if result.is_err() {
        document.base_mut().set_deleted(was_deleted);
    }
    result
}

// Boxed so cascaded saves can recurse.
fn save_boxed(document: &mut dyn Document) -> BoxFuture<'_, OdmResult<()>> {
    let binding = expect_binding(document, "save");
    let span = operation_span("save", binding.collection());
    Box::pin(save_bound(document, binding).instrument(span))
}

async fn save_bound(document: &mut dyn Document, binding: Binding) -> OdmResult<()> {
    let connection = binding.connection();
    let issues = document.validate(connection.messages());
    if !issues.is_empty() {
        debug!(issues = issues.len(), "document failed validation");
        return Err(ValidationError::new("Document could not be validated", issues).into());
    }

    let session = connection.store().isolated();
    let mut staged = StagedDocument::new(document);

    let meta = staged.document.meta();
    for (descriptor, relation) in meta.relations() {
        let Some(value) = staged.document.relation_mut(&descriptor.field) else {
            panic!(
                "'{}' declares relation '{}' but does not expose it",
                meta.type_name(),
                descriptor.field
            );
        };
        assert!(
            value.cardinality() == relation.cardinality,
            "relation '{}' of '{}' is declared '{}' but holds a {} value",
            descriptor.field,
            meta.type_name(),
            relation.cardinality,
            value.cardinality()
        );
        if !value.is_set() {
            value.initialize_empty();
            continue;
        }

        let mut ids = Vec::new();
        for element in value.elements_mut() {
            ids.push(resolve_reference(element, &descriptor.field, relation, &binding).await?);
        }
        let original = value.replace_with_references(ids);
        staged.staged.push((descriptor.field.clone(), original));
    }

    let snapshot = staged.document.base().snapshot();
    let written = write(staged.document, &binding, session.as_ref()).await;
    if written.is_err() {
        staged.document.base_mut().restore(snapshot);
    }
    written
}

async fn resolve_reference(
    element: RelationElement<'_>,
    field: &str,
    relation: RelationDef<'_>,
    binding: &Binding,
) -> OdmResult<ObjectId> {
    match element {
        RelationElement::Id(id) => Ok(id),
        RelationElement::Text(text) => ObjectId::parse_str(text),
        RelationElement::Record(record) => {
            if relation.autosave {
                if !record.base().is_bound() {
                    let child = binding.connection().binding_for(relation.model);
                    record.base_mut().bind(child);
                }
                save_boxed(&mut *record).await?;
            }
            Ok(record.base().id().unwrap_or_else(|| {
                panic!(
                    "related '{}' in field '{field}' has no identifier; save it first or enable autosave",
                    record.meta().type_name()
                )
            }))
        }
    }
}

async fn write(document: &mut dyn Document, binding: &Binding, session: &dyn Store) -> OdmResult<()> {
    let now = Utc::now();
    match document.base().id() {
        None => {
            let id = ObjectId::new();
            document.base_mut().mark_inserted(id, now);
            let stored = document.to_store()?;
            session.insert(binding.collection(), stored).await?;
            debug!(%id, "inserted document");
        }
        Some(id) => {
            document.base_mut().touch(now);
            let stored = document.to_store()?;
            session.upsert_by_id(binding.collection(), &id, stored).await?;
            debug!(%id, "updated document");
        }
    }
    Ok(())
}
