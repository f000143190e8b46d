//! Document registry.
//!
//! The [`Registry`] maps a type name (case-insensitive) to the collection its
//! records live in and to functions that construct and decode records of that
//! type. The query executor and the population engine use it to instantiate
//! related types without static type knowledge. It is filled once while the
//! connection is built and read-only afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use odm_rs_core::OdmResult;
use serde_json::{Map, Value as JsonValue};

use crate::document::{Document, DocumentMeta, DocumentType};

/// Builds an empty record.
pub type DocumentFactory = fn() -> Box<dyn Document>;

/// Decodes a record from its stored form.
pub type DocumentDecoder = fn(Map<String, JsonValue>) -> OdmResult<Box<dyn Document>>;

/// One registered document type.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    /// The type name as declared.
    pub type_name: String,
    /// The collection holding records of this type.
    pub collection: Arc<str>,
    /// The descriptor table.
    pub meta: &'static DocumentMeta,
    /// Zero-value constructor.
    pub factory: DocumentFactory,
    /// Stored-form decoder.
    pub decoder: DocumentDecoder,
}

fn factory<T: DocumentType>() -> Box<dyn Document> {
    Box::new(T::default())
}

fn decoder<T: DocumentType>(map: Map<String, JsonValue>) -> OdmResult<Box<dyn Document>> {
    Ok(Box::new(T::from_store(map)?))
}

impl RegistryEntry {
    /// Creates the entry for `T` stored in `collection`.
    pub fn of<T: DocumentType>(collection: &str) -> Self {
        let meta = T::document_meta();
        Self {
            type_name: meta.type_name().to_string(),
            collection: Arc::from(collection),
            meta,
            factory: factory::<T>,
            decoder: decoder::<T>,
        }
    }
}

/// Type name to collection and constructor.
///
/// # Examples
///
/// ```rust,ignore
/// let mut registry = Registry::new();
/// registry.insert(RegistryEntry::of::<User>("users"));
/// assert_eq!(&*registry.resolve("USER").collection, "users");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: HashMap<String, RegistryEntry>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry. Returns `false`, leaving the existing entry in place, if
    /// the type name is already registered.
    pub fn insert(&mut self, entry: RegistryEntry) -> bool {
        let key = entry.type_name.to_lowercase();
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, entry);
        true
    }

    /// Looks up a type name, ignoring case.
    pub fn get(&self, type_name: &str) -> Option<&RegistryEntry> {
        self.entries.get(&type_name.to_lowercase())
    }

    /// Looks up a type name, ignoring case.
    ///
    /// # Panics
    ///
    /// Panics if the type was never registered. That is a wiring defect in
    /// the application's startup code, not a runtime condition.
    pub fn resolve(&self, type_name: &str) -> &RegistryEntry {
        self.get(type_name).unwrap_or_else(|| {
            panic!("document type '{type_name}' is not registered with this connection")
        })
    }

    /// Returns `true` if the type name is registered.
    pub fn contains(&self, type_name: &str) -> bool {
        self.get(type_name).is_some()
    }

    /// Returns the number of registered types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the registered entries in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.values()
    }
}
