//! Field descriptors.
//!
//! Every document type exposes an ordered table of [`FieldDescriptor`]s, one per
//! field, describing its validation rules and relation wiring. Descriptors are
//! computed once per type and never change afterward.

pub mod descriptor;

use std::fmt;

use thiserror::Error;

pub use descriptor::{FieldDescriptor, RelationDef, ValidationRule};

/// Whether a relation refers to one record or a sequence of records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Cardinality {
    /// A single related record.
    #[default]
    One,
    /// A sequence of related records.
    Many,
}

impl Cardinality {
    /// Parses a cardinality annotation. Accepts `one`/`many` and the short
    /// forms `11`/`1n`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "one" | "11" => Some(Self::One),
            "many" | "1n" => Some(Self::Many),
            _ => None,
        }
    }

    /// Returns the annotation spelling.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::One => "one",
            Self::Many => "many",
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The static shape of a field, derived from its Rust type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldShape {
    /// `String` or `Option<String>`.
    Text,
    /// Signed or unsigned integers.
    Integer,
    /// Floating point numbers.
    Float,
    /// `bool`.
    Bool,
    /// `Vec<T>` and other sequences.
    Sequence,
    /// `HashMap`/`BTreeMap`.
    Mapping,
    /// Timestamps.
    Timestamp,
    /// A bare [`ObjectId`](crate::object_id::ObjectId).
    Identifier,
    /// Arbitrary JSON.
    Json,
    /// Any other embedded struct.
    Embedded,
    /// A relation field: `Relation<T>` for one, `RelationList<T>` for many.
    Reference(Cardinality),
}

impl FieldShape {
    /// Returns the cardinality implied by a relation shape.
    pub const fn reference_cardinality(self) -> Option<Cardinality> {
        match self {
            Self::Reference(cardinality) => Some(cardinality),
            _ => None,
        }
    }
}

impl fmt::Display for FieldShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference(Cardinality::One) => f.write_str("scalar reference"),
            Self::Reference(Cardinality::Many) => f.write_str("reference sequence"),
            other => write!(f, "{}", format!("{other:?}").to_lowercase()),
        }
    }
}

/// A defect in a document type's field annotations.
///
/// These are raised when a type is described, which happens when it is
/// registered with a connection, so a broken schema fails at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// A length bound is not a number.
    #[error("annotation '{annotation}' on field '{field}' must be numeric, got '{value}'")]
    NotNumeric {
        field: String,
        annotation: String,
        value: String,
    },

    /// A flag annotation is not a boolean.
    #[error("annotation '{annotation}' on field '{field}' must be a boolean, got '{value}'")]
    NotBoolean {
        field: String,
        annotation: String,
        value: String,
    },

    /// The relation annotation is not a known cardinality.
    #[error("unknown relation cardinality '{value}' on field '{field}'")]
    UnknownCardinality { field: String, value: String },

    /// The declared cardinality disagrees with the field's shape.
    #[error("field '{field}' is declared as a '{declared}' relation but its shape is a {shape}")]
    CardinalityMismatch {
        field: String,
        declared: Cardinality,
        shape: FieldShape,
    },

    /// Relation annotations on a field that cannot hold a relation.
    #[error("field '{field}' has relation annotations but its shape is {shape}")]
    NotARelation { field: String, shape: FieldShape },

    /// A relation-shaped field without a target model.
    #[error("relation field '{field}' does not name a target model")]
    MissingModel { field: String },

    /// The validation annotation is neither a keyword nor a delimited pattern.
    #[error("unknown validation '{value}' on field '{field}'")]
    UnknownValidation { field: String, value: String },

    /// The delimited pattern does not compile.
    #[error("invalid pattern on field '{field}': {message}")]
    InvalidPattern { field: String, message: String },

    /// Two fields share the same name or stored key.
    #[error("duplicate field '{0}'")]
    DuplicateField(String),
}

impl From<SchemaError> for odm_rs_core::OdmError {
    fn from(err: SchemaError) -> Self {
        Self::ImproperlyConfigured(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cardinality_parse() {
        assert_eq!(Cardinality::parse("one"), Some(Cardinality::One));
        assert_eq!(Cardinality::parse("MANY"), Some(Cardinality::Many));
        assert_eq!(Cardinality::parse("11"), Some(Cardinality::One));
        assert_eq!(Cardinality::parse("1n"), Some(Cardinality::Many));
        assert_eq!(Cardinality::parse("several"), None);
    }

    #[test]
    fn test_shape_display() {
        assert_eq!(FieldShape::Text.to_string(), "text");
        assert_eq!(
            FieldShape::Reference(Cardinality::Many).to_string(),
            "reference sequence"
        );
    }

    #[test]
    fn test_schema_error_converts_to_configuration_error() {
        let err: odm_rs_core::OdmError = SchemaError::DuplicateField("name".into()).into();
        assert_eq!(err.kind(), odm_rs_core::ErrorKind::Configuration);
        assert!(err.to_string().contains("duplicate field 'name'"));
    }
}
