//! Field validators.
//!
//! Each [`Validator`] checks one rule against a [`FieldValue`]. A descriptor
//! builds its validators once, in the order they run: the relation-cardinality
//! check first, then `required`, the length bounds, the text rule, and finally
//! the reference-shape check. [`validate_fields`] walks a document's
//! descriptors in declared order and renders every violation through the
//! connection's [`MessageCatalog`].

use std::fmt;
use std::sync::LazyLock;

use odm_rs_core::{MessageCatalog, ValidationIssue};
use regex::Regex;

use crate::document::Document;
use crate::fields::Cardinality;
use crate::object_id::ObjectId;
use crate::value::FieldValue;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}$").expect("valid regex")
});

/// A failed rule: the message key and the arguments after the field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Message catalog key.
    pub code: &'static str,
    /// Extra message arguments.
    pub params: Vec<String>,
}

impl Violation {
    /// Creates a violation without extra arguments.
    pub const fn new(code: &'static str) -> Self {
        Self {
            code,
            params: Vec::new(),
        }
    }

    /// Appends a message argument.
    #[must_use]
    pub fn with_param(mut self, param: impl ToString) -> Self {
        self.params.push(param.to_string());
        self
    }

    /// Renders the violation for `field`.
    pub fn to_issue(&self, field: &str, messages: &MessageCatalog) -> ValidationIssue {
        let mut args: Vec<&dyn fmt::Display> = Vec::with_capacity(self.params.len() + 1);
        args.push(&field);
        args.extend(self.params.iter().map(|p| p as &dyn fmt::Display));
        ValidationIssue::new(field, self.code, messages.format(self.code, &args))
    }
}

/// A trait for validating field values.
///
/// # Examples
///
/// ```
/// use odm_rs_db::validators::{MinLengthValidator, Validator};
/// use odm_rs_db::value::FieldValue;
///
/// let v = MinLengthValidator::new(2);
/// assert!(v.validate(&FieldValue::Text("ok")).is_ok());
/// assert!(v.validate(&FieldValue::Text("x")).is_err());
/// ```
pub trait Validator: Send + Sync + fmt::Debug {
    /// Validates the given value, returning the violated rule if invalid.
    fn validate(&self, value: &FieldValue<'_>) -> Result<(), Violation>;

    /// Returns a human-readable name for this validator.
    fn name(&self) -> &str;
}

/// Rejects relation values whose shape disagrees with the declared cardinality.
#[derive(Debug, Clone, Copy)]
pub struct CardinalityValidator {
    /// The declared cardinality.
    pub expected: Cardinality,
}

impl CardinalityValidator {
    /// Creates a new `CardinalityValidator`.
    pub const fn new(expected: Cardinality) -> Self {
        Self { expected }
    }
}

impl Validator for CardinalityValidator {
    fn validate(&self, value: &FieldValue<'_>) -> Result<(), Violation> {
        let Some(relation) = value.as_relation() else {
            return Ok(());
        };
        let actual = relation.cardinality();
        if actual == self.expected {
            return Ok(());
        }
        let held = match actual {
            Cardinality::One => "scalar",
            Cardinality::Many => "sequence",
        };
        Err(Violation::new("validation.field_invalid_relation")
            .with_param(held)
            .with_param(self.expected))
    }

    fn name(&self) -> &str {
        "CardinalityValidator"
    }
}

/// Requires the field to be set.
#[derive(Debug, Clone, Copy)]
pub struct RequiredValidator;

impl Validator for RequiredValidator {
    fn validate(&self, value: &FieldValue<'_>) -> Result<(), Violation> {
        if value.is_set() {
            Ok(())
        } else {
            Err(Violation::new("validation.field_required"))
        }
    }

    fn name(&self) -> &str {
        "RequiredValidator"
    }
}

/// Validates that set text meets a minimum length in characters.
#[derive(Debug, Clone, Copy)]
pub struct MinLengthValidator {
    /// The minimum required length.
    pub min_length: usize,
}

impl MinLengthValidator {
    /// Creates a new `MinLengthValidator` with the given minimum length.
    pub const fn new(min_length: usize) -> Self {
        Self { min_length }
    }
}

impl Validator for MinLengthValidator {
    fn validate(&self, value: &FieldValue<'_>) -> Result<(), Violation> {
        match value.as_text() {
            Some(s) if !s.is_empty() && s.chars().count() < self.min_length => {
                Err(Violation::new("validation.field_minlen").with_param(self.min_length))
            }
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "MinLengthValidator"
    }
}

/// Validates that text does not exceed a maximum length in characters.
#[derive(Debug, Clone, Copy)]
pub struct MaxLengthValidator {
    /// The maximum allowed length.
    pub max_length: usize,
}

impl MaxLengthValidator {
    /// Creates a new `MaxLengthValidator` with the given maximum length.
    pub const fn new(max_length: usize) -> Self {
        Self { max_length }
    }
}

impl Validator for MaxLengthValidator {
    fn validate(&self, value: &FieldValue<'_>) -> Result<(), Violation> {
        match value.as_text() {
            Some(s) if s.chars().count() > self.max_length => {
                Err(Violation::new("validation.field_maxlen").with_param(self.max_length))
            }
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "MaxLengthValidator"
    }
}

/// Validates set text against a pattern.
#[derive(Debug, Clone)]
pub struct PatternValidator {
    regex: Regex,
}

impl PatternValidator {
    /// Creates a new `PatternValidator`.
    pub const fn new(regex: Regex) -> Self {
        Self { regex }
    }
}

impl Validator for PatternValidator {
    fn validate(&self, value: &FieldValue<'_>) -> Result<(), Violation> {
        match value.as_text() {
            Some(s) if !s.is_empty() && !self.regex.is_match(s) => {
                Err(Violation::new("validation.field_invalid"))
            }
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "PatternValidator"
    }
}

/// Validates that set text looks like an email address.
#[derive(Debug, Clone, Copy)]
pub struct EmailValidator;

impl Validator for EmailValidator {
    fn validate(&self, value: &FieldValue<'_>) -> Result<(), Violation> {
        match value.as_text() {
            Some(s) if !s.is_empty() && !EMAIL_RE.is_match(s) => {
                Err(Violation::new("validation.field_invalid"))
            }
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "EmailValidator"
    }
}

/// Validates that text references are well-formed identifiers.
///
/// Stops at the first malformed element of a sequence.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceValidator;

impl Validator for ReferenceValidator {
    fn validate(&self, value: &FieldValue<'_>) -> Result<(), Violation> {
        let Some(relation) = value.as_relation() else {
            return Ok(());
        };
        if relation
            .text_references()
            .into_iter()
            .any(|text| !ObjectId::is_valid_hex(text))
        {
            return Err(Violation::new("validation.field_invalid_id"));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "ReferenceValidator"
    }
}

/// Validates every field of `document` in declared order.
///
/// Never mutates the document.
///
/// # Panics
///
/// Panics if the document has no value for one of its own descriptors, which
/// means its `Document` implementation disagrees with its descriptor table.
pub fn validate_fields(document: &dyn Document, messages: &MessageCatalog) -> Vec<ValidationIssue> {
    let meta = document.meta();
    let mut issues = Vec::new();
    for descriptor in meta.fields() {
        let value = document.field_value(&descriptor.field).unwrap_or_else(|| {
            panic!(
                "'{}' has no value for its declared field '{}'",
                meta.type_name(),
                descriptor.field
            )
        });
        for validator in descriptor.validators() {
            if let Err(violation) = validator.validate(&value) {
                issues.push(violation.to_issue(&descriptor.key, messages));
            }
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required() {
        assert!(RequiredValidator.validate(&FieldValue::Text("")).is_err());
        assert!(RequiredValidator.validate(&FieldValue::Null).is_err());
        assert!(RequiredValidator.validate(&FieldValue::Int(0)).is_err());
        assert!(RequiredValidator.validate(&FieldValue::Int(3)).is_ok());
    }

    #[test]
    fn test_required_many_relation_needs_an_element() {
        use crate::object_id::ObjectId;
        use crate::relation::RelationList;
        use crate::testing::Author;

        let unset = RelationList::<Author>::Unset;
        let no_ids = RelationList::<Author>::Ids(Vec::new());
        let no_records = RelationList::<Author>::Populated(Vec::new());
        for empty in [&unset, &no_ids, &no_records] {
            let value = FieldValue::Relation(empty);
            assert!(RequiredValidator.validate(&value).is_err(), "{empty:?}");
        }

        let one_id: RelationList<Author> = std::iter::once(ObjectId::new()).collect();
        assert!(RequiredValidator
            .validate(&FieldValue::Relation(&one_id))
            .is_ok());
        let one_record = RelationList::from(vec![Author::named("Ada")]);
        assert!(RequiredValidator
            .validate(&FieldValue::Relation(&one_record))
            .is_ok());
    }

    #[test]
    fn test_min_length_skips_unset_text() {
        let v = MinLengthValidator::new(2);
        assert!(v.validate(&FieldValue::Text("")).is_ok());
        assert!(v.validate(&FieldValue::Int(1)).is_ok());
        let err = v.validate(&FieldValue::Text("M")).unwrap_err();
        assert_eq!(err.code, "validation.field_minlen");
        assert_eq!(err.params, vec!["2"]);
    }

    #[test]
    fn test_length_counts_characters() {
        let v = MaxLengthValidator::new(3);
        assert!(v.validate(&FieldValue::Text("äöü")).is_ok());
        assert!(v.validate(&FieldValue::Text("äöüß")).is_err());
    }

    #[test]
    fn test_email() {
        assert!(EmailValidator.validate(&FieldValue::Text("ada@example.com")).is_ok());
        assert!(EmailValidator.validate(&FieldValue::Text("Ada@Example.COM")).is_ok());
        assert!(EmailValidator.validate(&FieldValue::Text("ada@example")).is_err());
        assert!(EmailValidator.validate(&FieldValue::Text("")).is_ok());
    }

    #[test]
    fn test_pattern() {
        let v = PatternValidator::new(Regex::new("^[0-9]{5}$").unwrap());
        assert!(v.validate(&FieldValue::Text("12345")).is_ok());
        assert_eq!(
            v.validate(&FieldValue::Text("1234")).unwrap_err().code,
            "validation.field_invalid"
        );
    }

    #[test]
    fn test_violation_to_issue() {
        let catalog = MessageCatalog::default();
        let issue = Violation::new("validation.field_minlen")
            .with_param(2)
            .to_issue("name", &catalog);
        assert_eq!(issue.field, "name");
        assert_eq!(issue.code, "validation.field_minlen");
        assert_eq!(issue.message, "Field 'name' must be at least 2 characters long.");
    }

    #[test]
    fn test_validate_fields_in_declared_order() {
        use crate::testing::Author;

        let author = Author {
            name: "M".to_string(),
            email: "not-an-address".to_string(),
            ..Author::default()
        };
        let issues = validate_fields(&author, &MessageCatalog::default());
        let codes: Vec<(&str, &str)> = issues
            .iter()
            .map(|i| (i.field.as_str(), i.code.as_str()))
            .collect();
        assert_eq!(
            codes,
            vec![
                ("name", "validation.field_minlen"),
                ("email", "validation.field_invalid"),
            ]
        );
    }

    #[test]
    fn test_reference_text_is_checked() {
        use crate::relation::{Relation, RelationList};
        use crate::testing::{Author, Post};

        let post = Post {
            title: "Hello".to_string(),
            author: Relation::from("nope"),
            reviewers: RelationList::Texts(vec!["bad".into(), "worse".into()]),
            ..Post::default()
        };
        let issues = validate_fields(&post, &MessageCatalog::default());
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.code == "validation.field_invalid_id"));
        assert_eq!(issues[1].field, "reviewers");

        let fine = Post {
            title: "Hello".to_string(),
            author: Relation::new(Author::named("Ada")),
            ..Post::default()
        };
        assert!(validate_fields(&fine, &MessageCatalog::default()).is_empty());
    }

    #[test]
    fn test_validation_does_not_mutate() {
        use crate::testing::Post;

        let post = Post::default();
        let before = post.clone();
        let first = validate_fields(&post, &MessageCatalog::default());
        let second = validate_fields(&post, &MessageCatalog::default());
        assert_eq!(first, second);
        assert_eq!(post, before);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].code, "validation.field_required");
    }
}
