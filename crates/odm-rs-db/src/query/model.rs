//! Model handles.
//!
//! A [`Model`] is the entry point for one registered document type: it builds
//! bound records and starts queries against the type's collection. It holds no
//! query state and is cheap to clone.

use std::fmt;
use std::sync::Arc;

use odm_rs_core::{OdmError, OdmResult};
use serde_json::{json, Map, Value as JsonValue};
use tracing::{debug, Instrument};

use super::builder::{Many, One, Query};
use crate::connection::Connection;
use crate::document::{Binding, Document, DocumentType};
use crate::object_id::ObjectId;
use crate::registry::RegistryEntry;

/// The handle for one registered document type.
///
/// # Examples
///
/// ```rust,ignore
/// let users = connection.model("User");
/// let mut ada: User = users.new();
/// ada.name = "Ada".into();
/// ada.save().await?;
///
/// let found = users.find_id(ada.id().unwrap()).exec::<User>().await?;
/// ```
#[derive(Clone)]
pub struct Model {
    connection: Connection,
    type_name: String,
    collection: Arc<str>,
}

impl Model {
    pub(crate) fn from_entry(connection: Connection, entry: &RegistryEntry) -> Self {
        Self {
            connection,
            type_name: entry.type_name.clone(),
            collection: Arc::clone(&entry.collection),
        }
    }

    /// Returns the registered type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns the connection.
    pub const fn connection(&self) -> &Connection {
        &self.connection
    }

    pub(crate) fn type_key(&self) -> String {
        self.type_name.to_lowercase()
    }

    pub(crate) fn assert_type(&self, meta_type: &str) {
        assert!(
            meta_type.eq_ignore_ascii_case(&self.type_name),
            "'{meta_type}' records cannot be used with the '{}' model",
            self.type_name
        );
    }

    /// Returns an empty record bound to this model's collection.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not this model's type.
    #[allow(clippy::new_ret_no_self)]
    pub fn new<T: DocumentType>(&self) -> T {
        let mut record = T::default();
        self.bind(&mut record);
        record
    }

    /// Binds an existing record to this model's collection.
    ///
    /// # Panics
    ///
    /// Panics if the record is not of this model's type.
    pub fn bind(&self, document: &mut dyn Document) {
        self.assert_type(document.meta().type_name());
        document
            .base_mut()
            .bind(Binding::new(self.connection.clone(), Arc::clone(&self.collection)));
    }

    /// Builds a bound record from partial-update input.
    ///
    /// Returns the record together with the wrapper map, if the input was
    /// wrapped under the lower-cased type name.
    ///
    /// # Errors
    ///
    /// Returns a mapping or serialization error if the input does not fit.
    pub fn create<T: DocumentType>(
        &self,
        content: JsonValue,
    ) -> OdmResult<(T, Option<Map<String, JsonValue>>)> {
        let mut record: T = self.new();
        let wrapper = crate::update::apply_update(&mut record, content)?;
        Ok((record, wrapper))
    }

    /// Starts a read returning every match.
    ///
    /// # Panics
    ///
    /// Panics if `filter` is neither an object nor `null`.
    pub fn find(&self, filter: JsonValue) -> Query<Many> {
        Query::new(self.clone(), filter)
    }

    /// Starts a read returning every record.
    pub fn find_all(&self) -> Query<Many> {
        Query::new(self.clone(), JsonValue::Null)
    }

    /// Starts a read returning the first match.
    ///
    /// # Panics
    ///
    /// Panics if `filter` is neither an object nor `null`.
    pub fn find_one(&self, filter: JsonValue) -> Query<One> {
        Query::new(self.clone(), filter)
    }

    /// Starts a read for the record with identifier `id`.
    pub fn find_id(&self, id: ObjectId) -> Query<One> {
        Query::new(self.clone(), json!({ "_id": id.to_json() }))
    }

    /// Counts the records matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub async fn count(&self, filter: JsonValue) -> OdmResult<u64> {
        self.find(filter).count().await
    }

    /// Physically removes every record matching `filter`.
    ///
    /// This bypasses soft delete.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub async fn remove_all(&self, filter: JsonValue) -> OdmResult<u64> {
        let filter = super::builder::normalize_filter(filter);
        let span = odm_rs_core::logging::operation_span("remove_all", &self.collection);
        async {
            let removed = self
                .connection
                .store()
                .remove_all(&self.collection, &filter)
                .await?;
            debug!(removed, "removed documents");
            Ok::<_, OdmError>(removed)
        }
        .instrument(span)
        .await
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("type_name", &self.type_name)
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentExt;
    use crate::testing::{connect, Author, Post};

    #[test]
    fn test_new_is_bound() {
        let (connection, _store) = connect();
        let author: Author = connection.model("author").new();
        assert!(author.is_bound());
        assert_eq!(author.base.binding().unwrap().collection(), "authors");
    }

    #[test]
    #[should_panic(expected = "cannot be used with the 'Author' model")]
    fn test_new_with_wrong_type_panics() {
        let (connection, _store) = connect();
        let _post: Post = connection.model("Author").new();
    }

    #[test]
    fn test_create_from_wrapped_input() {
        let (connection, _store) = connect();
        let (author, wrapper) = connection
            .model("Author")
            .create::<Author>(json!({"author": {"name": "Ada"}, "next": "/home"}))
            .unwrap();
        assert_eq!(author.name, "Ada");
        assert!(author.is_bound());
        assert_eq!(wrapper.unwrap()["next"], json!("/home"));
    }

    #[tokio::test]
    async fn test_count_and_remove_all() {
        let (connection, store) = connect();
        let authors = connection.model("Author");
        for name in ["Ada", "Grace", "Edsger"] {
            let mut author: Author = authors.new();
            author.name = name.to_string();
            author.save().await.unwrap();
        }
        assert_eq!(authors.count(JsonValue::Null).await.unwrap(), 3);
        assert_eq!(authors.count(json!({"name": "Ada"})).await.unwrap(), 1);

        assert_eq!(authors.remove_all(json!({"name": "Ada"})).await.unwrap(), 1);
        assert_eq!(store.documents("authors").len(), 2);
    }
}
