//! Population.
//!
//! Resolves reference-form relation fields into populated form, one level
//! deep. Related records keep their own relations in whatever form the store
//! returned. Nothing is cached: populating again queries the store again.
//!
//! All requested fields are fetched concurrently and assigned only once every
//! fetch has succeeded, so a failed population leaves the record unchanged.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::try_join_all;
use odm_rs_core::logging::operation_span;
use odm_rs_core::{OdmError, OdmResult};
use serde_json::{json, Value as JsonValue};
use tracing::{debug, Instrument};

use crate::connection::Connection;
use crate::document::{expect_binding, normalize_references, Binding, Document};
use crate::fields::Cardinality;
use crate::object_id::ObjectId;
use crate::registry::RegistryEntry;
use crate::store::{FindSpec, StoreError};

/// One field to resolve.
struct Plan<'a> {
    field: &'a str,
    cardinality: Cardinality,
    entry: &'a RegistryEntry,
    ids: Vec<ObjectId>,
}

/// Populates the named relation fields of `document`.
///
/// # Errors
///
/// Returns [`OdmError::NotFound`] if a one-cardinality reference has no
/// matching record, [`OdmError::InvalidReference`] if a text reference is
/// malformed, and any store failure unchanged.
///
/// # Panics
///
/// Panics if the record is unbound, or if a name is not a relation field of
/// the record's type.
pub(crate) async fn populate_document(
    document: &mut dyn Document,
    fields: &[&str],
) -> OdmResult<()> {
    let binding = expect_binding(document, "populate");
    let span = operation_span("populate", binding.collection());
    populate_bound(document, fields, binding).instrument(span).await
}

async fn populate_bound(
    document: &mut dyn Document,
    fields: &[&str],
    binding: Binding,
) -> OdmResult<()> {
    let connection = binding.connection();
    let meta = document.meta();

    let mut plans = Vec::with_capacity(fields.len());
    for name in fields {
        let descriptor = meta.field(name).unwrap_or_else(|| {
            panic!("'{}' has no field '{name}' to populate", meta.type_name())
        });
        let relation = descriptor.relation().unwrap_or_else(|| {
            panic!(
                "field '{}' of '{}' is not a relation and cannot be populated",
                descriptor.field,
                meta.type_name()
            )
        });
        let value = document.relation(&descriptor.field).unwrap_or_else(|| {
            panic!(
                "'{}' declares relation '{}' but does not expose it",
                meta.type_name(),
                descriptor.field
            )
        });
        if !value.is_set() {
            continue;
        }
        let ids = value.reference_ids()?;
        if ids.is_empty() && relation.cardinality == Cardinality::One {
            continue;
        }
        plans.push(Plan {
            field: descriptor.field.as_str(),
            cardinality: relation.cardinality,
            entry: connection.registry().resolve(relation.model),
            ids,
        });
    }

    let fetched = try_join_all(plans.iter().map(|plan| fetch(connection, plan))).await?;

    for (plan, records) in plans.iter().zip(fetched) {
        debug!(field = plan.field, records = records.len(), "populated relation");
        if let Some(relation) = document.relation_mut(plan.field) {
            relation.assign_populated(records);
        }
    }
    Ok(())
}

async fn fetch(connection: &Connection, plan: &Plan<'_>) -> OdmResult<Vec<Box<dyn Document>>> {
    let store = connection.store();
    let collection = &*plan.entry.collection;
    match plan.cardinality {
        Cardinality::One => {
            let id = plan.ids[0];
            let spec = FindSpec::new(json!({ "_id": id.to_json() })).limit(1);
            let found = match store.find(collection, &spec).await {
                Ok(found) => found,
                Err(StoreError::NotFound) => Vec::new(),
                Err(err) => return Err(err.into()),
            };
            let Some(stored) = found.into_iter().next() else {
                return Err(OdmError::NotFound(format!(
                    "No {} found for '{}' with id {id}",
                    plan.entry.type_name, plan.field
                )));
            };
            Ok(vec![decode(connection, plan.entry, stored)?])
        }
        Cardinality::Many => {
            if plan.ids.is_empty() {
                return Ok(Vec::new());
            }
            let candidates: Vec<JsonValue> = plan.ids.iter().map(ObjectId::to_json).collect();
            let spec = FindSpec::new(json!({ "_id": { "$in": candidates } }));
            let found = match store.find(collection, &spec).await {
                Ok(found) => found,
                Err(StoreError::NotFound) => return Ok(Vec::new()),
                Err(err) => return Err(err.into()),
            };
            let mut by_id = HashMap::with_capacity(found.len());
            for stored in found {
                let record = decode(connection, plan.entry, stored)?;
                if let Some(id) = record.base().id() {
                    by_id.insert(id, record);
                }
            }
            let mut seen = HashSet::with_capacity(plan.ids.len());
            Ok(plan
                .ids
                .iter()
                .filter(|id| seen.insert(**id))
                .filter_map(|id| by_id.remove(id))
                .collect())
        }
    }
}

fn decode(
    connection: &Connection,
    entry: &RegistryEntry,
    stored: serde_json::Map<String, JsonValue>,
) -> OdmResult<Box<dyn Document>> {
    let mut record = (entry.decoder)(stored)?;
    normalize_references(record.as_mut());
    record
        .base_mut()
        .bind(Binding::new(connection.clone(), Arc::clone(&entry.collection)));
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentExt;
    use crate::relation::{Relation, RelationList};
    use crate::testing::{connect, Author, Post};
    use odm_rs_core::ErrorKind;

    async fn saved_author(connection: &Connection, name: &str) -> Author {
        let mut author: Author = connection.model("Author").new();
        author.name = name.to_string();
        author.save().await.unwrap();
        author
    }

    #[tokio::test]
    async fn test_populate_one() {
        let (connection, _store) = connect();
        let ada = saved_author(&connection, "Ada").await;
        let mut post: Post = connection.model("Post").new();
        post.author = Relation::from(ada.base.id().unwrap());

        post.populate(&["author"]).await.unwrap();
        let author = post.author.get().unwrap();
        assert_eq!(author.name, "Ada");
        assert!(author.base.is_bound());
    }

    #[tokio::test]
    async fn test_populate_one_missing_keeps_reference() {
        let (connection, _store) = connect();
        let id = ObjectId::new();
        let mut post: Post = connection.model("Post").new();
        post.author = Relation::from(id);

        let err = post.populate(&["author"]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(post.author, Relation::Id(id));
    }

    #[tokio::test]
    async fn test_populate_many_keeps_reference_order() {
        let (connection, store) = connect();
        let a = saved_author(&connection, "Ada").await;
        let b = saved_author(&connection, "Grace").await;
        let (a, b) = (a.base.id().unwrap(), b.base.id().unwrap());

        let mut post: Post = connection.model("Post").new();
        post.reviewers = RelationList::Ids(vec![b, a, b]);
        let reads = store.reads();
        post.populate(&["reviewers"]).await.unwrap();

        assert_eq!(store.reads(), reads + 1);
        let names: Vec<&str> = post
            .reviewers
            .records()
            .unwrap()
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["Grace", "Ada"]);
    }

    #[tokio::test]
    async fn test_populate_many_without_matches_is_empty() {
        let (connection, _store) = connect();
        let mut post: Post = connection.model("Post").new();
        post.reviewers = RelationList::Ids(vec![ObjectId::new()]);
        post.populate(&["reviewers"]).await.unwrap();
        assert_eq!(post.reviewers, RelationList::Populated(Vec::new()));
    }

    #[tokio::test]
    async fn test_populate_empty_many_needs_no_read() {
        let (connection, store) = connect();
        let mut post: Post = connection.model("Post").new();
        post.reviewers = RelationList::Ids(Vec::new());
        post.populate(&["reviewers"]).await.unwrap();
        assert_eq!(store.reads(), 0);
        assert_eq!(post.reviewers, RelationList::Populated(Vec::new()));
    }

    #[tokio::test]
    async fn test_populate_skips_unset_fields() {
        let (connection, store) = connect();
        let mut post: Post = connection.model("Post").new();
        post.populate(&["author", "reviewers"]).await.unwrap();
        assert_eq!(store.reads(), 0);
        assert_eq!(post.author, Relation::Unset);
    }

    #[tokio::test]
    async fn test_failed_field_leaves_others_untouched() {
        let (connection, _store) = connect();
        let ada = saved_author(&connection, "Ada").await;
        let mut post: Post = connection.model("Post").new();
        post.author = Relation::from(ObjectId::new());
        post.reviewers = RelationList::Ids(vec![ada.base.id().unwrap()]);

        assert!(post.populate(&["reviewers", "author"]).await.is_err());
        assert!(!post.reviewers.is_populated());
    }

    #[tokio::test]
    async fn test_malformed_text_reference() {
        let (connection, _store) = connect();
        let mut post: Post = connection.model("Post").new();
        post.author = Relation::from("not-an-id");
        let err = post.populate(&["author"]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidReference);
    }

    #[tokio::test]
    #[should_panic(expected = "has no field 'editor'")]
    async fn test_unknown_field_panics() {
        let (connection, _store) = connect();
        let mut post: Post = connection.model("Post").new();
        let _ = post.populate(&["editor"]).await;
    }

    #[tokio::test]
    #[should_panic(expected = "is not a relation")]
    async fn test_plain_field_panics() {
        let (connection, _store) = connect();
        let mut post: Post = connection.model("Post").new();
        let _ = post.populate(&["title"]).await;
    }
}
