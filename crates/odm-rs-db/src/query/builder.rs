//! Query builder and executor.
//!
//! A [`Query`] describes one read: filter, projection, sort keys, limit,
//! skip, and the relation fields to populate on every result. Whether it
//! expects one result or many is part of its type, so executing a single-result
//! query into a sequence (or the reverse) does not compile.
//!
//! Executing a query runs the read, decodes each stored document, converts
//! text references to typed identifiers, binds the record to its model, and
//! populates the requested fields.

use std::fmt;
use std::marker::PhantomData;

use odm_rs_core::logging::operation_span;
use odm_rs_core::{OdmError, OdmResult};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, Instrument};

use super::model::Model;
use crate::document::{normalize_references, DocumentType};
use crate::populate::populate_document;
use crate::store::{FindSpec, StoreDocument};

mod sealed {
    pub trait Sealed {}
}

/// Result multiplicity of a [`Query`].
pub trait Multiplicity: sealed::Sealed + Send + Sync + 'static {
    /// `true` when the query returns every match.
    const MANY: bool;
}

/// Marker for queries returning a single record.
#[derive(Debug, Clone, Copy)]
pub struct One;

/// Marker for queries returning every match.
#[derive(Debug, Clone, Copy)]
pub struct Many;

impl sealed::Sealed for One {}
impl sealed::Sealed for Many {}

impl Multiplicity for One {
    const MANY: bool = false;
}

impl Multiplicity for Many {
    const MANY: bool = true;
}

pub(crate) fn normalize_filter(filter: JsonValue) -> JsonValue {
    match filter {
        JsonValue::Null => JsonValue::Object(Map::new()),
        JsonValue::Object(_) => filter,
        other => panic!("query filter must be a JSON object, got {other}"),
    }
}

/// A read against one model's collection.
///
/// Builder methods consume and return the query; calling one twice with the
/// same arguments leaves the query as after the first call.
///
/// # Examples
///
/// ```rust,ignore
/// let recent: Vec<Post> = connection
///     .model("Post")
///     .find(json!({"deleted": false}))
///     .sort(["-createdAt"])
///     .limit(20)
///     .populate(["author"])
///     .exec()
///     .await?;
/// ```
pub struct Query<M: Multiplicity> {
    model: Model,
    filter: JsonValue,
    projection: Option<JsonValue>,
    sort: Vec<String>,
    limit: Option<usize>,
    skip: Option<usize>,
    populate: Vec<String>,
    multiplicity: PhantomData<M>,
}

impl<M: Multiplicity> Query<M> {
    pub(crate) fn new(model: Model, filter: JsonValue) -> Self {
        Self {
            model,
            filter: normalize_filter(filter),
            projection: None,
            sort: Vec::new(),
            limit: None,
            skip: None,
            populate: Vec::new(),
            multiplicity: PhantomData,
        }
    }

    /// Restricts the returned fields, using the store's projection syntax.
    #[must_use]
    pub fn select(mut self, projection: JsonValue) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Sets the sort keys, replacing any previous ones. Prefix a key with `-`
    /// for descending order.
    #[must_use]
    pub fn sort<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sort = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Limits the number of results.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `skip` matches.
    #[must_use]
    pub const fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Adds relation fields to populate on every result.
    #[must_use]
    pub fn populate<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for field in fields {
            let field = field.into();
            if !self.populate.contains(&field) {
                self.populate.push(field);
            }
        }
        self
    }

    /// Returns the filter.
    pub const fn filter(&self) -> &JsonValue {
        &self.filter
    }

    /// Returns the fields to populate, in the order they were added.
    pub fn populate_fields(&self) -> &[String] {
        &self.populate
    }

    /// Returns `true` if this query returns every match.
    pub const fn is_many(&self) -> bool {
        M::MANY
    }

    /// Returns the read handed to the store.
    pub fn find_spec(&self) -> FindSpec {
        FindSpec {
            filter: self.filter.clone(),
            projection: self.projection.clone(),
            sort: self.sort.clone(),
            limit: if M::MANY { self.limit } else { Some(1) },
            skip: self.skip,
        }
    }

    /// Counts the matches of the filter, ignoring limit and skip.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub async fn count(&self) -> OdmResult<u64> {
        let span = operation_span("count", self.model.collection());
        let count = self
            .model
            .connection()
            .store()
            .count(self.model.collection(), &self.filter)
            .instrument(span)
            .await?;
        Ok(count)
    }

    async fn fetch<T: DocumentType>(&self) -> OdmResult<Vec<T>> {
        self.model.assert_type(T::document_meta().type_name());
        let spec = self.find_spec();
        let stored = self
            .model
            .connection()
            .store()
            .find(self.model.collection(), &spec)
            .await?;
        debug!(results = stored.len(), "read documents");

        let mut records = Vec::with_capacity(stored.len());
        for document in stored {
            records.push(self.materialize::<T>(document).await?);
        }
        Ok(records)
    }

    async fn materialize<T: DocumentType>(&self, stored: StoreDocument) -> OdmResult<T> {
        let mut record = T::from_store(stored)?;
        normalize_references(&mut record);
        self.model.bind(&mut record);
        if !self.populate.is_empty() {
            let fields: Vec<&str> = self.populate.iter().map(String::as_str).collect();
            populate_document(&mut record, &fields).await?;
        }
        Ok(record)
    }
}

impl Query<One> {
    /// Runs the read and returns the first match.
    ///
    /// # Errors
    ///
    /// Returns [`OdmError::NotFound`] if nothing matched, and any store,
    /// decoding, or population failure.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not the model's type.
    pub async fn exec<T: DocumentType>(self) -> OdmResult<T> {
        let span = operation_span("find_one", self.model.collection());
        let records = self.fetch::<T>().instrument(span).await?;
        records.into_iter().next().ok_or_else(|| {
            OdmError::NotFound(format!("No {} record found", self.model.type_name()))
        })
    }

    /// Runs the read and stores the first match in `target`.
    ///
    /// # Errors
    ///
    /// Same as [`exec`](Self::exec); `target` is left unchanged on error.
    pub async fn exec_into<T: DocumentType>(self, target: &mut T) -> OdmResult<()> {
        *target = self.exec().await?;
        Ok(())
    }
}

impl Query<Many> {
    /// Runs the read and returns every match.
    ///
    /// # Errors
    ///
    /// Returns [`OdmError::NotFound`] if the store reports the read as not
    /// found, and any store, decoding, or population failure.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not the model's type.
    pub async fn exec<T: DocumentType>(self) -> OdmResult<Vec<T>> {
        let span = operation_span("find", self.model.collection());
        self.fetch::<T>().instrument(span).await
    }

    /// Runs the read and replaces the contents of `target` with every match.
    ///
    /// # Errors
    ///
    /// Same as [`exec`](Self::exec); `target` is left unchanged on error.
    pub async fn exec_into<T: DocumentType>(self, target: &mut Vec<T>) -> OdmResult<()> {
        *target = self.exec().await?;
        Ok(())
    }
}

impl<M: Multiplicity> Clone for Query<M> {
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
            filter: self.filter.clone(),
            projection: self.projection.clone(),
            sort: self.sort.clone(),
            limit: self.limit,
            skip: self.skip,
            populate: self.populate.clone(),
            multiplicity: PhantomData,
        }
    }
}

impl<M: Multiplicity> fmt::Debug for Query<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("collection", &self.model.collection())
            .field("many", &M::MANY)
            .field("filter", &self.filter)
            .field("projection", &self.projection)
            .field("sort", &self.sort)
            .field("limit", &self.limit)
            .field("skip", &self.skip)
            .field("populate", &self.populate)
            .finish()
    }
}
