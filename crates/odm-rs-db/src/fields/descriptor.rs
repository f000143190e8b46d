//! The [`FieldDescriptor`] builder.
//!
//! A descriptor captures the annotations of one field: its stored key, shape,
//! validation rules, and relation wiring. Descriptors are built with chained
//! methods (or parsed from string annotations with
//! [`FieldDescriptor::from_annotations`]) and checked when the owning
//! [`DocumentMeta`](crate::document::DocumentMeta) is built.

use std::fmt;
use std::sync::Arc;

use regex::{Regex, RegexBuilder};

use super::{Cardinality, FieldShape, SchemaError};
use crate::validators::{
    CardinalityValidator, EmailValidator, MaxLengthValidator, MinLengthValidator,
    PatternValidator, ReferenceValidator, RequiredValidator, Validator,
};

/// The text rule named by a `validation` annotation.
#[derive(Debug, Clone)]
pub enum ValidationRule {
    /// The `email` keyword.
    Email,
    /// A `/pattern/flags` annotation.
    Pattern(Regex),
}

impl ValidationRule {
    /// Parses a `validation` annotation.
    ///
    /// Accepts the keyword `email` (any case) or a pattern delimited by slashes
    /// with optional `i`, `m`, `s`, `x`, `g` flags; `g` is accepted and ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use odm_rs_db::fields::ValidationRule;
    ///
    /// assert!(matches!(ValidationRule::parse("email"), Ok(Some(ValidationRule::Email))));
    /// assert!(matches!(ValidationRule::parse("/^[a-z]+$/i"), Ok(Some(ValidationRule::Pattern(_)))));
    /// assert!(matches!(ValidationRule::parse(""), Ok(None)));
    /// assert!(ValidationRule::parse("phone").is_err());
    /// ```
    pub fn parse(annotation: &str) -> Result<Option<Self>, String> {
        let annotation = annotation.trim();
        if annotation.is_empty() {
            return Ok(None);
        }
        if annotation.eq_ignore_ascii_case("email") {
            return Ok(Some(Self::Email));
        }
        let Some((body, flags)) = split_delimited(annotation) else {
            return Err(format!("unknown validation '{annotation}'"));
        };
        RegexBuilder::new(body)
            .case_insensitive(flags.contains('i'))
            .multi_line(flags.contains('m'))
            .dot_matches_new_line(flags.contains('s'))
            .ignore_whitespace(flags.contains('x'))
            .build()
            .map(|regex| Some(Self::Pattern(regex)))
            .map_err(|e| e.to_string())
    }
}

fn split_delimited(annotation: &str) -> Option<(&str, &str)> {
    let rest = annotation.strip_prefix('/')?;
    let end = rest.rfind('/')?;
    let (body, flags) = (&rest[..end], &rest[end + 1..]);
    flags
        .chars()
        .all(|c| matches!(c, 'i' | 'm' | 's' | 'x' | 'g'))
        .then_some((body, flags))
}

/// The relation settings of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationDef<'a> {
    /// Target type name, resolved through the registry.
    pub model: &'a str,
    /// One or many.
    pub cardinality: Cardinality,
    /// Whether saving the parent saves related records first.
    pub autosave: bool,
}

/// Metadata for one document field.
///
/// # Examples
///
/// ```
/// use odm_rs_db::fields::{Cardinality, FieldDescriptor, FieldShape};
///
/// let name = FieldDescriptor::new("name", FieldShape::Text).required().min_len(2);
/// assert!(name.required);
/// assert_eq!(name.min_len, Some(2));
///
/// let messages = FieldDescriptor::new("messages", FieldShape::Reference(Cardinality::Many))
///     .model("Message")
///     .cardinality(Cardinality::Many)
///     .autosave();
/// assert_eq!(messages.relation().unwrap().cardinality, Cardinality::Many);
/// ```
#[derive(Clone)]
pub struct FieldDescriptor {
    /// The Rust field name.
    pub field: String,
    /// The stored key; defaults to the field name.
    pub key: String,
    /// The static shape of the field.
    pub shape: FieldShape,
    /// Whether the field must be set.
    pub required: bool,
    /// Minimum text length in characters.
    pub min_len: Option<usize>,
    /// Maximum text length in characters.
    pub max_len: Option<usize>,
    /// The raw `validation` annotation.
    pub validation: Option<String>,
    /// Target type name for relation fields.
    pub target_model: Option<String>,
    /// Declared cardinality; `one` when a model is set and this is omitted.
    pub declared_cardinality: Option<Cardinality>,
    /// Whether related records are saved with the parent.
    pub autosave: bool,
    rule: Option<ValidationRule>,
    validators: Vec<Arc<dyn Validator>>,
}

impl FieldDescriptor {
    /// Creates a descriptor with no rules.
    pub fn new(field: impl Into<String>, shape: FieldShape) -> Self {
        let field = field.into();
        Self {
            key: field.clone(),
            field,
            shape,
            required: false,
            min_len: None,
            max_len: None,
            validation: None,
            target_model: None,
            declared_cardinality: None,
            autosave: false,
            rule: None,
            validators: Vec::new(),
        }
    }

    /// Parses string annotations into a descriptor.
    ///
    /// Recognized annotations are `required`, `minLen`, `maxLen`, `validation`,
    /// `model`, `relation`, and `autosave`; others are ignored.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] if a length bound is not numeric, a flag is not
    /// a boolean, or the relation cardinality is unknown.
    pub fn from_annotations(
        field: impl Into<String>,
        shape: FieldShape,
        annotations: &[(&str, &str)],
    ) -> Result<Self, SchemaError> {
        let mut descriptor = Self::new(field, shape);
        for (annotation, value) in annotations {
            match *annotation {
                "key" => descriptor.key = (*value).to_string(),
                "required" => descriptor.required = descriptor.parse_bool(annotation, value)?,
                "autosave" => descriptor.autosave = descriptor.parse_bool(annotation, value)?,
                "minLen" => descriptor.min_len = Some(descriptor.parse_len(annotation, value)?),
                "maxLen" => descriptor.max_len = Some(descriptor.parse_len(annotation, value)?),
                "validation" => descriptor.validation = Some((*value).to_string()),
                "model" => descriptor.target_model = Some((*value).to_string()),
                "relation" => {
                    let cardinality = Cardinality::parse(value).ok_or_else(|| {
                        SchemaError::UnknownCardinality {
                            field: descriptor.field.clone(),
                            value: (*value).to_string(),
                        }
                    })?;
                    descriptor.declared_cardinality = Some(cardinality);
                }
                _ => {}
            }
        }
        Ok(descriptor)
    }

    fn parse_bool(&self, annotation: &str, value: &str) -> Result<bool, SchemaError> {
        match value {
            "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
            "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
            _ => Err(SchemaError::NotBoolean {
                field: self.field.clone(),
                annotation: annotation.to_string(),
                value: value.to_string(),
            }),
        }
    }

    fn parse_len(&self, annotation: &str, value: &str) -> Result<usize, SchemaError> {
        value.trim().parse().map_err(|_| SchemaError::NotNumeric {
            field: self.field.clone(),
            annotation: annotation.to_string(),
            value: value.to_string(),
        })
    }

    /// Sets the stored key.
    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Marks the field as required.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets the minimum text length.
    #[must_use]
    pub const fn min_len(mut self, min: usize) -> Self {
        self.min_len = Some(min);
        self
    }

    /// Sets the maximum text length.
    #[must_use]
    pub const fn max_len(mut self, max: usize) -> Self {
        self.max_len = Some(max);
        self
    }

    /// Sets the `validation` annotation (`email` or `/pattern/flags`).
    #[must_use]
    pub fn validation(mut self, validation: impl Into<String>) -> Self {
        self.validation = Some(validation.into());
        self
    }

    /// Sets the relation target type.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.target_model = Some(model.into());
        self
    }

    /// Declares the relation cardinality.
    #[must_use]
    pub const fn cardinality(mut self, cardinality: Cardinality) -> Self {
        self.declared_cardinality = Some(cardinality);
        self
    }

    /// Saves related records together with the parent.
    #[must_use]
    pub const fn autosave(mut self) -> Self {
        self.autosave = true;
        self
    }

    /// Returns the relation settings, if this is a relation field.
    pub fn relation(&self) -> Option<RelationDef<'_>> {
        let model = self.target_model.as_deref().filter(|m| !m.is_empty())?;
        Some(RelationDef {
            model,
            cardinality: self.declared_cardinality.unwrap_or_default(),
            autosave: self.autosave,
        })
    }

    /// Returns `true` if this is a relation field.
    pub fn is_relation(&self) -> bool {
        self.relation().is_some()
    }

    /// Returns the parsed text rule.
    pub const fn rule(&self) -> Option<&ValidationRule> {
        self.rule.as_ref()
    }

    /// Returns the validators in the order they run.
    pub fn validators(&self) -> &[Arc<dyn Validator>] {
        &self.validators
    }

    /// Checks the annotations against the shape and builds the validators.
    pub(crate) fn compile(mut self) -> Result<Self, SchemaError> {
        let declared = self.relation().map(|relation| relation.cardinality);
        match (self.shape.reference_cardinality(), declared) {
            (Some(shape_cardinality), Some(declared)) => {
                if declared != shape_cardinality {
                    return Err(SchemaError::CardinalityMismatch {
                        field: self.field,
                        declared,
                        shape: self.shape,
                    });
                }
            }
            (Some(_), None) => return Err(SchemaError::MissingModel { field: self.field }),
            (None, Some(_)) => {
                return Err(SchemaError::NotARelation {
                    field: self.field,
                    shape: self.shape,
                })
            }
            (None, None) => {
                if self.declared_cardinality.is_some() || self.autosave {
                    return Err(SchemaError::NotARelation {
                        field: self.field,
                        shape: self.shape,
                    });
                }
            }
        }

        self.rule = match self.validation.as_deref() {
            None => None,
            Some(annotation) => {
                ValidationRule::parse(annotation).map_err(|message| {
                    if message.starts_with("unknown validation") {
                        SchemaError::UnknownValidation {
                            field: self.field.clone(),
                            value: annotation.to_string(),
                        }
                    } else {
                        SchemaError::InvalidPattern {
                            field: self.field.clone(),
                            message,
                        }
                    }
                })?
            }
        };

        self.validators = self.build_validators();
        Ok(self)
    }

    fn build_validators(&self) -> Vec<Arc<dyn Validator>> {
        let mut validators: Vec<Arc<dyn Validator>> = Vec::new();
        let relation = self.relation();

        if let Some(relation) = relation {
            validators.push(Arc::new(CardinalityValidator::new(relation.cardinality)));
        }
        if self.required {
            validators.push(Arc::new(RequiredValidator));
        }
        if let Some(min) = self.min_len.filter(|min| *min > 0) {
            validators.push(Arc::new(MinLengthValidator::new(min)));
        }
        if let Some(max) = self.max_len.filter(|max| *max > 0) {
            validators.push(Arc::new(MaxLengthValidator::new(max)));
        }
        match &self.rule {
            Some(ValidationRule::Pattern(regex)) => {
                validators.push(Arc::new(PatternValidator::new(regex.clone())));
            }
            Some(ValidationRule::Email) => validators.push(Arc::new(EmailValidator)),
            None => {}
        }
        if relation.is_some() {
            validators.push(Arc::new(ReferenceValidator));
        }
        validators
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("field", &self.field)
            .field("key", &self.key)
            .field("shape", &self.shape)
            .field("required", &self.required)
            .field("min_len", &self.min_len)
            .field("max_len", &self.max_len)
            .field("validation", &self.validation)
            .field("relation", &self.relation())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(descriptor: FieldDescriptor) -> Result<FieldDescriptor, SchemaError> {
        descriptor.compile()
    }

    #[test]
    fn test_builder_defaults() {
        let d = FieldDescriptor::new("title", FieldShape::Text);
        assert_eq!(d.key, "title");
        assert!(!d.required);
        assert!(!d.is_relation());
        assert!(d.validators().is_empty());
    }

    #[test]
    fn test_key_override() {
        let d = FieldDescriptor::new("created_by", FieldShape::Text).key("createdBy");
        assert_eq!(d.field, "created_by");
        assert_eq!(d.key, "createdBy");
    }

    #[test]
    fn test_relation_defaults_to_one() {
        let d = FieldDescriptor::new("author", FieldShape::Reference(Cardinality::One)).model("User");
        let relation = d.relation().unwrap();
        assert_eq!(relation.model, "User");
        assert_eq!(relation.cardinality, Cardinality::One);
        assert!(!relation.autosave);
        assert!(compile(d).is_ok());
    }

    #[test]
    fn test_empty_model_is_not_a_relation() {
        let d = FieldDescriptor::new("note", FieldShape::Text).model("");
        assert!(!d.is_relation());
    }

    #[test]
    fn test_sequence_declared_one_is_rejected() {
        let d = FieldDescriptor::new("tags", FieldShape::Reference(Cardinality::Many)).model("Tag");
        assert!(matches!(
            compile(d),
            Err(SchemaError::CardinalityMismatch {
                declared: Cardinality::One,
                ..
            })
        ));
    }

    #[test]
    fn test_scalar_declared_many_is_rejected() {
        let d = FieldDescriptor::new("author", FieldShape::Reference(Cardinality::One))
            .model("User")
            .cardinality(Cardinality::Many);
        assert!(matches!(
            compile(d),
            Err(SchemaError::CardinalityMismatch { .. })
        ));
    }

    #[test]
    fn test_model_on_text_field_is_rejected() {
        let d = FieldDescriptor::new("author", FieldShape::Text).model("User");
        assert!(matches!(compile(d), Err(SchemaError::NotARelation { .. })));
    }

    #[test]
    fn test_autosave_without_model_is_rejected() {
        let d = FieldDescriptor::new("name", FieldShape::Text).autosave();
        assert!(matches!(compile(d), Err(SchemaError::NotARelation { .. })));
    }

    #[test]
    fn test_reference_without_model_is_rejected() {
        let d = FieldDescriptor::new("author", FieldShape::Reference(Cardinality::One));
        assert!(matches!(compile(d), Err(SchemaError::MissingModel { .. })));
    }

    #[test]
    fn test_from_annotations() {
        let d = FieldDescriptor::from_annotations(
            "messages",
            FieldShape::Reference(Cardinality::Many),
            &[("model", "Message"), ("relation", "1n"), ("autosave", "true"), ("color", "red")],
        )
        .unwrap();
        let relation = d.relation().unwrap();
        assert_eq!(relation.cardinality, Cardinality::Many);
        assert!(relation.autosave);
    }

    #[test]
    fn test_from_annotations_non_numeric_length() {
        let err = FieldDescriptor::from_annotations("name", FieldShape::Text, &[("minLen", "two")])
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::NotNumeric {
                field: "name".into(),
                annotation: "minLen".into(),
                value: "two".into(),
            }
        );
    }

    #[test]
    fn test_from_annotations_non_boolean_required() {
        let err = FieldDescriptor::from_annotations("name", FieldShape::Text, &[("required", "yes")])
            .unwrap_err();
        assert!(matches!(err, SchemaError::NotBoolean { .. }));
    }

    #[test]
    fn test_from_annotations_unknown_cardinality() {
        let err = FieldDescriptor::from_annotations(
            "tags",
            FieldShape::Reference(Cardinality::Many),
            &[("model", "Tag"), ("relation", "some")],
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownCardinality { .. }));
    }

    #[test]
    fn test_unknown_validation_keyword() {
        let d = FieldDescriptor::new("phone", FieldShape::Text).validation("phone");
        assert!(matches!(compile(d), Err(SchemaError::UnknownValidation { .. })));
    }

    #[test]
    fn test_invalid_pattern() {
        let d = FieldDescriptor::new("code", FieldShape::Text).validation("/([a-z]/");
        assert!(matches!(compile(d), Err(SchemaError::InvalidPattern { .. })));
    }

    #[test]
    fn test_pattern_flags() {
        let Ok(Some(ValidationRule::Pattern(regex))) = ValidationRule::parse("/^abc$/i") else {
            panic!("expected a pattern");
        };
        assert!(regex.is_match("ABC"));
        assert!(ValidationRule::parse("/abc/q").is_err());
    }

    #[test]
    fn test_validator_order() {
        let d = compile(
            FieldDescriptor::new("author", FieldShape::Reference(Cardinality::One))
                .model("User")
                .required(),
        )
        .unwrap();
        let names: Vec<&str> = d.validators().iter().map(|v| v.name()).collect();
        assert_eq!(
            names,
            vec!["CardinalityValidator", "RequiredValidator", "ReferenceValidator"]
        );

        let d = compile(
            FieldDescriptor::new("email", FieldShape::Text)
                .required()
                .min_len(3)
                .max_len(64)
                .validation("email"),
        )
        .unwrap();
        let names: Vec<&str> = d.validators().iter().map(|v| v.name()).collect();
        assert_eq!(
            names,
            vec![
                "RequiredValidator",
                "MinLengthValidator",
                "MaxLengthValidator",
                "EmailValidator"
            ]
        );
    }
}
