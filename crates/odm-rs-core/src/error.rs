//! Core error types for odm-rs.
//!
//! [`OdmError`] is the single error type returned by every public operation.
//! Callers branch on [`OdmError::kind`] to tell "no records matched" apart from
//! deeper store or validation failures.

use std::fmt;

use thiserror::Error;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// The stored key of the field that failed.
    pub field: String,
    /// The message catalog key identifying the failed rule (e.g. `validation.field_required`).
    pub code: String,
    /// The rendered, human-readable message.
    pub message: String,
}

impl ValidationIssue {
    /// Creates a new issue for `field`.
    pub fn new(
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Aggregates every issue found while validating a document.
///
/// Issues are kept in the order they were found: declared field order first,
/// then rule order within a field.
///
/// # Examples
///
/// ```
/// use odm_rs_core::error::{ValidationError, ValidationIssue};
///
/// let err = ValidationError::new(
///     "Document could not be validated",
///     vec![ValidationIssue::new("name", "validation.field_required", "Field 'name' is required.")],
/// );
/// assert_eq!(err.issues.len(), 1);
/// assert!(err.has_field("name"));
/// ```
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The summary message.
    pub message: String,
    /// Every issue, in the order found.
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    /// Creates a new `ValidationError` from a summary message and its issues.
    pub fn new(message: impl Into<String>, issues: Vec<ValidationIssue>) -> Self {
        Self {
            message: message.into(),
            issues,
        }
    }

    /// Returns `true` if any issue names `field`.
    pub fn has_field(&self, field: &str) -> bool {
        self.issues.iter().any(|issue| issue.field == field)
    }

    /// Returns the issues reported for `field`.
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a ValidationIssue> {
        self.issues.iter().filter(move |issue| issue.field == field)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        for (i, issue) in self.issues.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Broad category of an [`OdmError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No record matched a read that expected at least one.
    NotFound,
    /// The store rejected a write because of a uniqueness constraint.
    Duplicate,
    /// The document failed validation.
    Validation,
    /// A textual relation value is not a valid identifier.
    InvalidReference,
    /// A store, serialization, or I/O failure passed through from below.
    Store,
    /// Input handed to a partial update could not be mapped onto the document.
    Mapping,
    /// Settings, schema, or registration were misconfigured.
    Configuration,
}

/// The primary error type for odm-rs.
#[derive(Error, Debug)]
pub enum OdmError {
    // ── Read / write outcomes ────────────────────────────────────────

    /// A read expected at least one match but found none.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint in the store rejected an insert or update.
    #[error("Duplicate key: {0}")]
    Duplicate(String),

    /// One or more fields failed validation.
    #[error("Validation error: {0}")]
    Validation(ValidationError),

    /// A relation value is not a syntactically valid identifier.
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    // ── Propagated failures ──────────────────────────────────────────

    /// Any other store failure. The original cause is kept as the source.
    #[error("Store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// An error occurred during serialization or deserialization.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Partial-update input was not an object or not shaped as expected.
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ── Configuration ────────────────────────────────────────────────

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// A document schema or registration is invalid.
    #[error("Improperly configured: {0}")]
    ImproperlyConfigured(String),
}

impl OdmError {
    /// Returns the category of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Duplicate(_) => ErrorKind::Duplicate,
            Self::Validation(_) => ErrorKind::Validation,
            Self::InvalidReference(_) => ErrorKind::InvalidReference,
            Self::Store(_) | Self::Serialization(_) | Self::Io(_) => ErrorKind::Store,
            Self::Mapping(_) => ErrorKind::Mapping,
            Self::ConfigurationError(_) | Self::ImproperlyConfigured(_) => {
                ErrorKind::Configuration
            }
        }
    }

    /// Returns `true` if no records matched.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns `true` if a uniqueness constraint was violated.
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }

    /// Returns the validation error, if this is one.
    pub const fn validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for OdmError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}

/// A convenience type alias for `Result<T, OdmError>`.
pub type OdmResult<T> = Result<T, OdmError>;
