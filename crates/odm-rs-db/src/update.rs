//! Partial updates from external input.
//!
//! Input is either a bare field map or a map holding a single entry keyed by
//! the lower-cased type name that wraps the field map. Reserved fields
//! (identifier, timestamps, delete flag) are stripped, then matching keys are
//! overwritten on the record. Unknown keys are ignored; nested values replace
//! the field wholesale rather than being patched.

use odm_rs_core::{OdmError, OdmResult};
use serde_json::{Map, Value as JsonValue};

use crate::document::{Document, RESERVED_KEYS};

/// Merges `content` into `document`.
///
/// Returns the wrapper map when the input was wrapped, so callers can read
/// entries that sit next to the wrapped fields.
///
/// # Errors
///
/// Returns [`OdmError::Mapping`] if `content` is not an object, and a
/// serialization error if a value does not fit its field.
pub(crate) fn apply_update(
    document: &mut dyn Document,
    content: JsonValue,
) -> OdmResult<Option<Map<String, JsonValue>>> {
    let mut outer = match content {
        JsonValue::Object(map) => map,
        other => {
            return Err(OdmError::Mapping(format!(
                "expected an object to update '{}', got {}",
                document.meta().type_name(),
                json_kind(&other)
            )))
        }
    };

    let type_key = document.meta().type_key();
    let (mut fields, wrapper) = match outer.remove(&type_key) {
        Some(JsonValue::Object(inner)) => (inner, Some(outer)),
        Some(other) => {
            outer.insert(type_key, other);
            (outer, None)
        }
        None => (outer, None),
    };

    fields.retain(|key, _| {
        !RESERVED_KEYS
            .iter()
            .any(|reserved| reserved.eq_ignore_ascii_case(key))
    });
    document.merge_fields(&fields)?;
    Ok(wrapper)
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentExt;
    use crate::object_id::ObjectId;
    use crate::relation::Relation;
    use crate::testing::{Author, Post};
    use odm_rs_core::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_bare_map() {
        let mut author = Author::default();
        let wrapper = author
            .update(json!({"name": "Ada", "email": "ada@example.com", "unknown": 1}))
            .unwrap();
        assert!(wrapper.is_none());
        assert_eq!(author.name, "Ada");
        assert_eq!(author.email, "ada@example.com");
    }

    #[test]
    fn test_wrapped_map_returns_wrapper() {
        let mut author = Author::default();
        let wrapper = author
            .update(json!({"author": {"name": "Ada"}, "csrf": "abc"}))
            .unwrap()
            .unwrap();
        assert_eq!(author.name, "Ada");
        assert_eq!(wrapper.get("csrf"), Some(&json!("abc")));
        assert!(!wrapper.contains_key("author"));
    }

    #[test]
    fn test_reserved_fields_are_stripped() {
        let mut author = Author::default();
        let id = ObjectId::new();
        author
            .update(json!({
                "_id": id.to_hex(),
                "ID": id.to_hex(),
                "createdAt": "2020-01-01T00:00:00Z",
                "Deleted": true,
                "name": "Ada"
            }))
            .unwrap();
        assert!(author.base.id().is_none());
        assert!(!author.base.is_deleted());
        assert_eq!(author.name, "Ada");
    }

    #[test]
    fn test_keys_match_case_insensitively() {
        let mut author = Author::default();
        author.update(json!({"NAME": "Ada"})).unwrap();
        assert_eq!(author.name, "Ada");
    }

    #[test]
    fn test_relation_from_text() {
        let mut post = Post::default();
        let id = ObjectId::new();
        post.update(json!({"post": {"author": id.to_hex()}})).unwrap();
        assert_eq!(post.author, Relation::Text(id.to_hex()));
    }

    #[test]
    fn test_non_object_is_a_mapping_error() {
        let mut author = Author::default();
        let err = author.update(json!(["name"])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Mapping);
    }

    #[test]
    fn test_from_slice() {
        let mut author = Author::default();
        author.update_from_slice(br#"{"name": "Ada"}"#).unwrap();
        assert_eq!(author.name, "Ada");
        assert!(author.update_from_slice(b"{").is_err());
    }
}
