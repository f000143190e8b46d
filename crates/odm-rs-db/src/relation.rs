//! Relation values.
//!
//! A relation field is either in *reference form* (identifiers only) or in
//! *populated form* (the related records themselves). [`Relation`] models a
//! one-cardinality field and [`RelationList`] a many-cardinality field; the
//! variant currently held is the shape, there is no separate flag.
//!
//! The save path and the population engine never see the concrete types. They
//! drive every relation field through the object-safe [`RelationValue`] trait.

use std::any::Any;
use std::fmt;
use std::mem;

use odm_rs_core::OdmResult;
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::document::Document;
use crate::fields::Cardinality;
use crate::object_id::{ObjectId, OID_KEY};
use crate::value::{AsFieldValue, FieldValue};

/// An original relation value held aside while the field is normalized.
pub type StagedValue = Box<dyn Any + Send>;

/// One element of a relation, as seen by the save path.
pub enum RelationElement<'a> {
    /// A full related record.
    Record(&'a mut dyn Document),
    /// A typed identifier.
    Id(ObjectId),
    /// An identifier in text form, not yet checked.
    Text(&'a str),
}

/// Object-safe access to a relation field.
pub trait RelationValue: Send + Sync + fmt::Debug {
    /// The cardinality implied by the field's shape.
    fn cardinality(&self) -> Cardinality;

    /// Returns `true` if the field holds a reference or a populated record.
    fn is_set(&self) -> bool;

    /// Number of references or records held.
    fn len(&self) -> usize;

    /// Returns `true` if nothing is referenced, including an empty list.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the field is in populated form.
    fn is_populated(&self) -> bool;

    /// Returns the references currently held as text.
    fn text_references(&self) -> Vec<&str>;

    /// Returns every element for resolution to an identifier.
    fn elements_mut(&mut self) -> Vec<RelationElement<'_>>;

    /// Turns an unset many-relation into an empty reference sequence.
    fn initialize_empty(&mut self);

    /// Replaces the field with reference form, returning the original.
    fn replace_with_references(&mut self, ids: Vec<ObjectId>) -> StagedValue;

    /// Puts back a value returned by [`replace_with_references`](Self::replace_with_references).
    fn restore(&mut self, staged: StagedValue);

    /// Returns the identifiers this field refers to.
    ///
    /// # Errors
    ///
    /// Returns [`OdmError::InvalidReference`](odm_rs_core::OdmError::InvalidReference)
    /// if a text reference is malformed.
    fn reference_ids(&self) -> OdmResult<Vec<ObjectId>>;

    /// Converts valid text references into typed identifiers.
    fn normalize(&mut self);

    /// Moves fetched records into the field.
    ///
    /// # Panics
    ///
    /// Panics if a record is not of the field's target type.
    fn assign_populated(&mut self, records: Vec<Box<dyn Document>>);
}

fn downcast_record<T: Document>(record: Box<dyn Document>) -> Box<T> {
    let type_name = record.meta().type_name().to_string();
    record.into_any().downcast::<T>().unwrap_or_else(|_| {
        panic!(
            "related record of type '{type_name}' cannot be stored in a relation to {}",
            std::any::type_name::<T>()
        )
    })
}

fn restore_from<T: Any>(staged: StagedValue) -> T {
    match staged.downcast::<T>() {
        Ok(original) => *original,
        Err(_) => panic!("staged value is not a {}", std::any::type_name::<T>()),
    }
}

enum RawReference {
    Id(ObjectId),
    Text(String),
    Document(serde_json::Value),
}

fn classify(value: serde_json::Value) -> Result<Option<RawReference>, String> {
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) => Ok(Some(RawReference::Text(s))),
        serde_json::Value::Object(ref map) if map.len() == 1 && map.contains_key(OID_KEY) => {
            serde_json::from_value(value)
                .map(|id| Some(RawReference::Id(id)))
                .map_err(|e| e.to_string())
        }
        serde_json::Value::Object(_) => Ok(Some(RawReference::Document(value))),
        other => Err(format!("expected a reference or a document, got {other}")),
    }
}

// ── Relation ────────────────────────────────────────────────────────

/// A one-cardinality relation field.
///
/// # Examples
///
/// ```
/// use odm_rs_db::object_id::ObjectId;
/// use odm_rs_db::relation::Relation;
/// # #[derive(Debug, PartialEq)] struct Author;
///
/// let id = ObjectId::new();
/// let author: Relation<Author> = Relation::from(id);
/// assert_eq!(author, Relation::Id(id));
/// assert!(author.is_set());
/// assert!(!author.is_populated());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Relation<T> {
    /// No related record.
    Unset,
    /// Reference form.
    Id(ObjectId),
    /// Reference form as received from external input, not yet checked.
    Text(String),
    /// Populated form.
    Populated(Box<T>),
}

impl<T> Default for Relation<T> {
    fn default() -> Self {
        Self::Unset
    }
}

impl<T> Relation<T> {
    /// Wraps a related record in populated form.
    pub fn new(record: T) -> Self {
        Self::Populated(Box::new(record))
    }

    /// Returns `true` if a record is referenced or held.
    pub const fn is_set(&self) -> bool {
        !matches!(self, Self::Unset)
    }

    /// Returns `true` if the related record is held.
    pub const fn is_populated(&self) -> bool {
        matches!(self, Self::Populated(_))
    }

    /// Returns the related record, if populated.
    pub fn get(&self) -> Option<&T> {
        match self {
            Self::Populated(record) => Some(record),
            _ => None,
        }
    }

    /// Returns the related record mutably, if populated.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        match self {
            Self::Populated(record) => Some(record),
            _ => None,
        }
    }
}

impl<T: Document> Relation<T> {
    /// Returns the referenced identifier, from whichever form is held.
    pub fn id(&self) -> Option<ObjectId> {
        match self {
            Self::Unset => None,
            Self::Id(id) => Some(*id),
            Self::Text(text) => ObjectId::parse_str(text).ok(),
            Self::Populated(record) => record.base().id(),
        }
    }
}

impl<T: Document> AsFieldValue for Relation<T> {
    fn as_field_value(&self) -> FieldValue<'_> {
        FieldValue::Relation(self)
    }
}

impl<T> From<ObjectId> for Relation<T> {
    fn from(id: ObjectId) -> Self {
        Self::Id(id)
    }
}

impl<T> From<&str> for Relation<T> {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl<T: Serialize> Serialize for Relation<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unset => serializer.serialize_none(),
            Self::Id(id) => id.serialize(serializer),
            Self::Text(text) => serializer.serialize_str(text),
            Self::Populated(record) => record.serialize(serializer),
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Relation<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match classify(value).map_err(de::Error::custom)? {
            None => Ok(Self::Unset),
            Some(RawReference::Id(id)) => Ok(Self::Id(id)),
            Some(RawReference::Text(text)) => Ok(Self::Text(text)),
            Some(RawReference::Document(doc)) => serde_json::from_value(doc)
                .map(|record| Self::Populated(Box::new(record)))
                .map_err(de::Error::custom),
        }
    }
}

impl<T: Document> RelationValue for Relation<T> {
    fn cardinality(&self) -> Cardinality {
        Cardinality::One
    }

    fn is_set(&self) -> bool {
        Self::is_set(self)
    }

    fn len(&self) -> usize {
        usize::from(Self::is_set(self))
    }

    fn is_populated(&self) -> bool {
        Self::is_populated(self)
    }

    fn text_references(&self) -> Vec<&str> {
        match self {
            Self::Text(text) => vec![text.as_str()],
            _ => Vec::new(),
        }
    }

    fn elements_mut(&mut self) -> Vec<RelationElement<'_>> {
        match self {
            Self::Unset => Vec::new(),
            Self::Id(id) => vec![RelationElement::Id(*id)],
            Self::Text(text) => vec![RelationElement::Text(text)],
            Self::Populated(record) => vec![RelationElement::Record(&mut **record)],
        }
    }

    fn initialize_empty(&mut self) {}

    fn replace_with_references(&mut self, ids: Vec<ObjectId>) -> StagedValue {
        let next = ids.into_iter().next().map_or(Self::Unset, Self::Id);
        Box::new(mem::replace(self, next))
    }

    fn restore(&mut self, staged: StagedValue) {
        *self = restore_from::<Self>(staged);
    }

    fn reference_ids(&self) -> OdmResult<Vec<ObjectId>> {
        Ok(match self {
            Self::Unset => Vec::new(),
            Self::Id(id) => vec![*id],
            Self::Text(text) => vec![ObjectId::parse_str(text)?],
            Self::Populated(record) => record.base().id().into_iter().collect(),
        })
    }

    fn normalize(&mut self) {
        if let Self::Text(text) = self {
            if let Ok(id) = ObjectId::parse_str(text) {
                *self = Self::Id(id);
            }
        }
    }

    fn assign_populated(&mut self, records: Vec<Box<dyn Document>>) {
        if let Some(record) = records.into_iter().next() {
            *self = Self::Populated(downcast_record(record));
        }
    }
}

// ── RelationList ────────────────────────────────────────────────────

/// A many-cardinality relation field.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationList<T> {
    /// No related records.
    Unset,
    /// Reference form.
    Ids(Vec<ObjectId>),
    /// Reference form as received from external input, not yet checked.
    Texts(Vec<String>),
    /// Populated form.
    Populated(Vec<T>),
}

impl<T> Default for RelationList<T> {
    fn default() -> Self {
        Self::Unset
    }
}

impl<T> RelationList<T> {
    /// Returns `true` if the field holds references or records, even none.
    pub const fn is_set(&self) -> bool {
        !matches!(self, Self::Unset)
    }

    /// Returns `true` if the related records are held.
    pub const fn is_populated(&self) -> bool {
        matches!(self, Self::Populated(_))
    }

    /// Returns the number of referenced or held records.
    pub fn len(&self) -> usize {
        match self {
            Self::Unset => 0,
            Self::Ids(ids) => ids.len(),
            Self::Texts(texts) => texts.len(),
            Self::Populated(records) => records.len(),
        }
    }

    /// Returns `true` if nothing is referenced or held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the related records, if populated.
    pub fn records(&self) -> Option<&[T]> {
        match self {
            Self::Populated(records) => Some(records),
            _ => None,
        }
    }

    /// Returns the related records mutably, if populated.
    pub fn records_mut(&mut self) -> Option<&mut Vec<T>> {
        match self {
            Self::Populated(records) => Some(records),
            _ => None,
        }
    }

    /// Returns the identifiers, if held in typed reference form.
    pub fn ids(&self) -> Option<&[ObjectId]> {
        match self {
            Self::Ids(ids) => Some(ids),
            _ => None,
        }
    }
}

impl<T: Document> AsFieldValue for RelationList<T> {
    fn as_field_value(&self) -> FieldValue<'_> {
        FieldValue::Relation(self)
    }
}

impl<T> From<Vec<T>> for RelationList<T> {
    fn from(records: Vec<T>) -> Self {
        Self::Populated(records)
    }
}

impl<T> FromIterator<ObjectId> for RelationList<T> {
    fn from_iter<I: IntoIterator<Item = ObjectId>>(iter: I) -> Self {
        Self::Ids(iter.into_iter().collect())
    }
}

impl<T: Serialize> Serialize for RelationList<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unset => serializer.serialize_none(),
            Self::Ids(ids) => ids.serialize(serializer),
            Self::Texts(texts) => texts.serialize(serializer),
            Self::Populated(records) => records.serialize(serializer),
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for RelationList<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let items = match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Null => return Ok(Self::Unset),
            serde_json::Value::Array(items) => items,
            other => {
                return Err(de::Error::custom(format!(
                    "expected a sequence of references or documents, got {other}"
                )))
            }
        };

        let mut raw = Vec::with_capacity(items.len());
        for item in items {
            match classify(item).map_err(de::Error::custom)? {
                Some(reference) => raw.push(reference),
                None => return Err(de::Error::custom("null inside a relation sequence")),
            }
        }

        if raw.iter().any(|r| matches!(r, RawReference::Document(_))) {
            let mut records = Vec::with_capacity(raw.len());
            for reference in raw {
                let RawReference::Document(doc) = reference else {
                    return Err(de::Error::custom(
                        "relation sequence mixes documents and references",
                    ));
                };
                records.push(serde_json::from_value(doc).map_err(de::Error::custom)?);
            }
            return Ok(Self::Populated(records));
        }

        if raw.iter().any(|r| matches!(r, RawReference::Text(_))) {
            let texts = raw
                .into_iter()
                .map(|reference| match reference {
                    RawReference::Id(id) => id.to_hex(),
                    RawReference::Text(text) => text,
                    RawReference::Document(_) => unreachable!("documents handled above"),
                })
                .collect();
            return Ok(Self::Texts(texts));
        }

        Ok(Self::Ids(
            raw.into_iter()
                .filter_map(|reference| match reference {
                    RawReference::Id(id) => Some(id),
                    _ => None,
                })
                .collect(),
        ))
    }
}

impl<T: Document> RelationValue for RelationList<T> {
    fn cardinality(&self) -> Cardinality {
        Cardinality::Many
    }

    fn is_set(&self) -> bool {
        Self::is_set(self)
    }

    fn len(&self) -> usize {
        Self::len(self)
    }

    fn is_populated(&self) -> bool {
        Self::is_populated(self)
    }

    fn text_references(&self) -> Vec<&str> {
        match self {
            Self::Texts(texts) => texts.iter().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    fn elements_mut(&mut self) -> Vec<RelationElement<'_>> {
        match self {
            Self::Unset => Vec::new(),
            Self::Ids(ids) => ids.iter().copied().map(RelationElement::Id).collect(),
            Self::Texts(texts) => texts
                .iter()
                .map(|text| RelationElement::Text(text))
                .collect(),
            Self::Populated(records) => records
                .iter_mut()
                .map(|record| RelationElement::Record(record))
                .collect(),
        }
    }

    fn initialize_empty(&mut self) {
        if !self.is_set() {
            *self = Self::Ids(Vec::new());
        }
    }

    fn replace_with_references(&mut self, ids: Vec<ObjectId>) -> StagedValue {
        Box::new(mem::replace(self, Self::Ids(ids)))
    }

    fn restore(&mut self, staged: StagedValue) {
        *self = restore_from::<Self>(staged);
    }

    fn reference_ids(&self) -> OdmResult<Vec<ObjectId>> {
        match self {
            Self::Unset => Ok(Vec::new()),
            Self::Ids(ids) => Ok(ids.clone()),
            Self::Texts(texts) => texts.iter().map(|text| ObjectId::parse_str(text)).collect(),
            Self::Populated(records) => Ok(records
                .iter()
                .filter_map(|record| record.base().id())
                .collect()),
        }
    }

    fn normalize(&mut self) {
        if let Self::Texts(texts) = self {
            let parsed: Option<Vec<ObjectId>> = texts
                .iter()
                .map(|text| ObjectId::parse_str(text).ok())
                .collect();
            if let Some(ids) = parsed {
                *self = Self::Ids(ids);
            }
        }
    }

    fn assign_populated(&mut self, records: Vec<Box<dyn Document>>) {
        *self = Self::Populated(
            records
                .into_iter()
                .map(|record| *downcast_record::<T>(record))
                .collect(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Author;
    use serde_json::json;

    #[test]
    fn test_relation_deserializes_each_form() {
        let id = ObjectId::new();
        let r: Relation<Author> = serde_json::from_value(json!(null)).unwrap();
        assert_eq!(r, Relation::Unset);
        let r: Relation<Author> = serde_json::from_value(id.to_json()).unwrap();
        assert_eq!(r, Relation::Id(id));
        let r: Relation<Author> = serde_json::from_value(json!(id.to_hex())).unwrap();
        assert_eq!(r, Relation::Text(id.to_hex()));
        let r: Relation<Author> = serde_json::from_value(json!({"name": "Ada"})).unwrap();
        assert_eq!(r.get().unwrap().name, "Ada");
        assert!(serde_json::from_value::<Relation<Author>>(json!(3)).is_err());
    }

    #[test]
    fn test_relation_list_mixed_references_become_texts() {
        let id = ObjectId::new();
        let list: RelationList<Author> =
            serde_json::from_value(json!([id.to_json(), "abc"])).unwrap();
        assert_eq!(list, RelationList::Texts(vec![id.to_hex(), "abc".to_string()]));

        let list: RelationList<Author> = serde_json::from_value(json!([id.to_json()])).unwrap();
        assert_eq!(list.ids(), Some(&[id][..]));
    }

    #[test]
    fn test_relation_list_rejects_documents_mixed_with_references() {
        let id = ObjectId::new();
        let result: Result<RelationList<Author>, _> =
            serde_json::from_value(json!([{"name": "Ada"}, id.to_json()]));
        assert!(result.is_err());
    }

    #[test]
    fn test_normalize_converts_valid_text_only() {
        let id = ObjectId::new();
        let mut one: Relation<Author> = Relation::from(id.to_hex().as_str());
        one.normalize();
        assert_eq!(one, Relation::Id(id));

        let mut bad: Relation<Author> = Relation::from("zzz");
        bad.normalize();
        assert_eq!(bad, Relation::Text("zzz".to_string()));

        let mut many: RelationList<Author> = RelationList::Texts(vec![id.to_hex(), "zzz".into()]);
        many.normalize();
        assert!(matches!(many, RelationList::Texts(_)));
    }

    #[test]
    fn test_replace_and_restore() {
        let mut list: RelationList<Author> = RelationList::from(vec![Author::named("Ada")]);
        let id = ObjectId::new();
        let staged = list.replace_with_references(vec![id]);
        assert_eq!(list, RelationList::Ids(vec![id]));
        list.restore(staged);
        assert_eq!(list.records().unwrap()[0].name, "Ada");
    }

    #[test]
    fn test_initialize_empty_only_touches_unset() {
        let mut list: RelationList<Author> = RelationList::Unset;
        list.initialize_empty();
        assert_eq!(list, RelationList::Ids(Vec::new()));

        let id = ObjectId::new();
        let mut list: RelationList<Author> = std::iter::once(id).collect();
        list.initialize_empty();
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_reference_ids_reports_malformed_text() {
        let list: RelationList<Author> = RelationList::Texts(vec!["zzz".into()]);
        let err = list.reference_ids().unwrap_err();
        assert_eq!(err.kind(), odm_rs_core::ErrorKind::InvalidReference);
    }

    #[test]
    fn test_assign_populated() {
        let mut one: Relation<Author> = Relation::from(ObjectId::new());
        one.assign_populated(vec![Box::new(Author::named("Ada")) as Box<dyn Document>]);
        assert_eq!(one.get().unwrap().name, "Ada");

        let mut many: RelationList<Author> = RelationList::Ids(vec![ObjectId::new()]);
        many.assign_populated(Vec::new());
        assert_eq!(many, RelationList::Populated(Vec::new()));
    }

    #[test]
    fn test_unset_serializes_as_null() {
        let one: Relation<Author> = Relation::Unset;
        assert_eq!(serde_json::to_value(&one).unwrap(), json!(null));
        let id = ObjectId::new();
        let many: RelationList<Author> = RelationList::Ids(vec![id]);
        assert_eq!(serde_json::to_value(&many).unwrap(), json!([id.to_json()]));
    }
}
