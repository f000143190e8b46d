//! Message catalog used to render validation text.
//!
//! A [`MessageCatalog`] maps message keys such as `validation.field_required` to
//! templates with positional `{0}`, `{1}` placeholders. Each connection owns its
//! own catalog, so two connections can render messages in different locales.
//!
//! ## JSON Format
//!
//! ```json
//! {
//!   "en-US": {
//!     "validation.field_required": "Field '{0}' is required."
//!   },
//!   "de-DE": {
//!     "validation.field_required": "Feld '{0}' ist erforderlich."
//!   }
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::error::OdmError;

/// Locale of the built-in messages.
pub const DEFAULT_LOCALE: &str = "en-US";

const DEFAULT_MESSAGES: &[(&str, &str)] = &[
    ("validation.field_required", "Field '{0}' is required."),
    ("validation.field_invalid", "Field '{0}' has an invalid value."),
    (
        "validation.field_invalid_id",
        "Field '{0}' contains an invalid object id value.",
    ),
    (
        "validation.field_minlen",
        "Field '{0}' must be at least {1} characters long.",
    ),
    (
        "validation.field_maxlen",
        "Field '{0}' can be maximum {1} characters long.",
    ),
    (
        "validation.field_invalid_relation",
        "Field '{0}' holds a {1} value but is declared as a '{2}' relation.",
    ),
    ("validation.entry_exists", "{0} already exists for value '{1}'."),
    (
        "validation.field_not_exclusive",
        "Only one of both fields can be set: '{0}' or '{1}'.",
    ),
    (
        "validation.field_required_exclusive",
        "Field '{0}' is required or '{1}' has to be set.",
    ),
];

/// Templates for rendering validation messages in one locale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageCatalog {
    locale: String,
    messages: HashMap<String, String>,
}

impl MessageCatalog {
    /// Creates an empty catalog for `locale`.
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            messages: HashMap::new(),
        }
    }

    /// Loads the catalog for `locale` from a JSON document keyed by locale.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the JSON is malformed or has no entry
    /// for `locale`.
    pub fn from_json_str(json_str: &str, locale: &str) -> Result<Self, OdmError> {
        let mut all: HashMap<String, HashMap<String, String>> = serde_json::from_str(json_str)
            .map_err(|e| OdmError::ConfigurationError(format!("Failed to parse messages: {e}")))?;
        let messages = all.remove(locale).ok_or_else(|| {
            OdmError::ConfigurationError(format!("No messages found for locale '{locale}'"))
        })?;
        Ok(Self {
            locale: locale.to_string(),
            messages,
        })
    }

    /// Loads the catalog for `locale` from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>, locale: &str) -> Result<Self, OdmError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            OdmError::ConfigurationError(format!(
                "Failed to read message file '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_json_str(&content, locale)
    }

    /// Returns the locale of this catalog.
    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Adds or replaces one message template.
    pub fn insert(&mut self, key: impl Into<String>, template: impl Into<String>) {
        self.messages.insert(key.into(), template.into());
    }

    /// Adds or replaces every template in `overrides`.
    pub fn merge<K, V>(&mut self, overrides: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (key, template) in overrides {
            self.insert(key, template);
        }
    }

    /// Returns the raw template for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.messages.get(key).map(String::as_str)
    }

    /// Renders `key` with positional arguments.
    ///
    /// Unknown keys render as the key itself so a missing translation never
    /// hides the underlying failure.
    ///
    /// # Examples
    ///
    /// ```
    /// use odm_rs_core::MessageCatalog;
    ///
    /// let catalog = MessageCatalog::default();
    /// assert_eq!(
    ///     catalog.format("validation.field_minlen", &[&"name", &2]),
    ///     "Field 'name' must be at least 2 characters long."
    /// );
    /// assert_eq!(catalog.format("no.such.key", &[]), "no.such.key");
    /// ```
    pub fn format(&self, key: &str, args: &[&dyn fmt::Display]) -> String {
        let Some(template) = self.get(key) else {
            return key.to_string();
        };
        args.iter()
            .enumerate()
            .fold(template.to_string(), |text, (i, arg)| {
                text.replace(&format!("{{{i}}}"), &arg.to_string())
            })
    }
}

impl Default for MessageCatalog {
    /// The built-in `en-US` catalog.
    fn default() -> Self {
        let mut catalog = Self::new(DEFAULT_LOCALE);
        catalog.merge(DEFAULT_MESSAGES.iter().copied());
        catalog
    }
}
