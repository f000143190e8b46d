//! Connections.
//!
//! A [`Connection`] bundles everything the document layer shares between
//! calls: the [`Store`], the [`Registry`] of document types, the
//! [`MessageCatalog`] used to render validation text, and the [`Settings`] it
//! was built from. It is cheap to clone and every bound record holds one.
//!
//! Connections are assembled with a [`ConnectionBuilder`]: register each
//! document type once, then [`build`](ConnectionBuilder::build). After that the
//! registry and the catalog are read-only, so concurrent use needs no locking.

use std::fmt;
use std::sync::Arc;

use odm_rs_core::messages::DEFAULT_LOCALE;
use odm_rs_core::{MessageCatalog, OdmError, OdmResult, Settings};
use tracing::{info, warn};

use crate::document::{Binding, Document, DocumentType};
use crate::query::Model;
use crate::registry::{Registry, RegistryEntry};
use crate::store::Store;

struct ConnectionInner {
    settings: Settings,
    store: Arc<dyn Store>,
    messages: MessageCatalog,
    registry: Registry,
}

/// A shared handle to a store and its registered document types.
///
/// # Examples
///
/// ```rust,ignore
/// let mut builder = Connection::builder(settings, MemoryStore::new());
/// builder.register::<User>("users")?.register::<Message>("messages")?;
/// let connection = builder.build()?;
///
/// let users = connection.model("User").find_all().exec::<User>().await?;
/// ```
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Starts building a connection over `store`.
    pub fn builder(settings: Settings, store: impl Store + 'static) -> ConnectionBuilder {
        ConnectionBuilder {
            settings,
            store: Arc::new(store),
            messages: None,
            registry: Registry::new(),
        }
    }

    /// Returns the settings this connection was built from.
    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    /// Returns the store.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.inner.store
    }

    /// Returns the message catalog used for validation text.
    pub fn messages(&self) -> &MessageCatalog {
        &self.inner.messages
    }

    /// Returns the document registry.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Returns the model handle for a registered type name (case-insensitive).
    ///
    /// # Panics
    ///
    /// Panics if the type is not registered.
    pub fn model(&self, type_name: &str) -> Model {
        let entry = self.inner.registry.resolve(type_name);
        Model::from_entry(self.clone(), entry)
    }

    /// Returns the model handle for a type name, or `None` if unregistered.
    pub fn try_model(&self, type_name: &str) -> Option<Model> {
        self.inner
            .registry
            .get(type_name)
            .map(|entry| Model::from_entry(self.clone(), entry))
    }

    /// Builds an empty record of a registered type, already bound.
    ///
    /// # Panics
    ///
    /// Panics if the type is not registered.
    pub fn document(&self, type_name: &str) -> Box<dyn Document> {
        let entry = self.inner.registry.resolve(type_name);
        let mut record = (entry.factory)();
        record
            .base_mut()
            .bind(Binding::new(self.clone(), Arc::clone(&entry.collection)));
        record
    }

    pub(crate) fn binding_for(&self, type_name: &str) -> Binding {
        let entry = self.inner.registry.resolve(type_name);
        Binding::new(self.clone(), Arc::clone(&entry.collection))
    }

    /// Releases the store connection.
    ///
    /// # Errors
    ///
    /// Returns the store's error if closing fails.
    pub async fn close(&self) -> OdmResult<()> {
        self.inner.store.close().await?;
        info!(database = %self.inner.settings.database_name, "connection closed");
        Ok(())
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("database", &self.inner.settings.database_name)
            .field("store", &self.inner.store)
            .field("locale", &self.inner.messages.locale())
            .field("types", &self.inner.registry.len())
            .finish()
    }
}

/// Assembles a [`Connection`].
pub struct ConnectionBuilder {
    settings: Settings,
    store: Arc<dyn Store>,
    messages: Option<MessageCatalog>,
    registry: Registry,
}

impl ConnectionBuilder {
    /// Registers document type `T` stored in `collection`.
    ///
    /// Registering the same type name twice logs a warning and keeps the
    /// first registration.
    ///
    /// # Errors
    ///
    /// Returns [`OdmError::ImproperlyConfigured`](odm_rs_core::OdmError::ImproperlyConfigured)
    /// if the type's field annotations are inconsistent.
    pub fn register<T: DocumentType>(&mut self, collection: &str) -> OdmResult<&mut Self> {
        let meta = T::describe()?;
        if self.registry.contains(meta.type_name()) {
            warn!(
                type_name = meta.type_name(),
                collection, "document type is already registered, ignoring"
            );
            return Ok(self);
        }
        self.registry.insert(RegistryEntry::of::<T>(collection));
        info!(
            type_name = meta.type_name(),
            collection,
            fields = meta.fields().len(),
            "registered document type"
        );
        Ok(self)
    }

    /// Uses `catalog` instead of loading one from the settings.
    #[must_use]
    pub fn messages(mut self, catalog: MessageCatalog) -> Self {
        self.messages = Some(catalog);
        self
    }

    /// Finishes the connection.
    ///
    /// The message catalog is, in order of preference, the one passed to
    /// [`messages`](Self::messages), the settings' `messages_file` for the
    /// configured locale, or the built-in catalog. Per-key overrides from the
    /// settings are applied on top.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a registered type refers to a type
    /// that was never registered, or if the message file cannot be loaded.
    pub fn build(self) -> OdmResult<Connection> {
        for entry in self.registry.entries() {
            for (descriptor, relation) in entry.meta.relations() {
                if !self.registry.contains(relation.model) {
                    return Err(OdmError::ImproperlyConfigured(format!(
                        "'{}.{}' refers to unregistered type '{}'",
                        entry.type_name, descriptor.field, relation.model
                    )));
                }
            }
        }

        let mut messages = match (self.messages, &self.settings.messages_file) {
            (Some(catalog), _) => catalog,
            (None, Some(path)) => MessageCatalog::from_json_file(path, &self.settings.locale)?,
            (None, None) => {
                if self.settings.locale != DEFAULT_LOCALE {
                    warn!(
                        locale = %self.settings.locale,
                        "no message file configured, using built-in {DEFAULT_LOCALE} messages"
                    );
                }
                MessageCatalog::default()
            }
        };
        messages.merge(self.settings.messages.clone());

        info!(
            database = %self.settings.database_name,
            types = self.registry.len(),
            locale = messages.locale(),
            "connection ready"
        );
        Ok(Connection {
            inner: Arc::new(ConnectionInner {
                settings: self.settings,
                store: self.store,
                messages,
                registry: self.registry,
            }),
        })
    }
}

impl fmt::Debug for ConnectionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionBuilder")
            .field("store", &self.store)
            .field("types", &self.registry.len())
            .finish_non_exhaustive()
    }
}
