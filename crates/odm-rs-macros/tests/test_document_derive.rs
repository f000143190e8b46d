//! Tests for `#[derive(Document)]`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use odm_rs_core::MessageCatalog;
use odm_rs_db::fields::{Cardinality, FieldShape};
use odm_rs_db::{Document, DocumentBase, DocumentType, FieldValue, ObjectId, Relation, RelationList};
use odm_rs_macros::Document;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub city: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Document)]
#[document(name = "Person")]
pub struct Profile {
    #[serde(flatten)]
    pub base: DocumentBase,
    #[serde(default)]
    #[document(required, min_len = 2, max_len = 20)]
    pub name: String,
    #[serde(default, rename = "contactEmail")]
    #[document(validation = "email")]
    pub email: String,
    #[serde(default)]
    #[document(validation = "/^[a-z]+$/i")]
    pub handle: Option<String>,
    #[serde(default)]
    pub age: u32,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub extra: HashMap<String, String>,
    #[serde(default)]
    pub birthday: Option<DateTime<Utc>>,
    #[serde(default)]
    pub avatar: Option<ObjectId>,
    #[serde(default)]
    pub settings: serde_json::Value,
    #[serde(default)]
    pub address: Option<Address>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Document)]
pub struct Group {
    #[serde(flatten)]
    #[document(base)]
    pub base: DocumentBase,
    #[serde(default)]
    #[document(required)]
    pub title: String,
    #[serde(default)]
    #[document(model = "Person", relation = "one")]
    pub leader: Relation<Profile>,
    #[serde(default)]
    #[document(model = "Person", relation = "many", autosave)]
    pub members: RelationList<Profile>,
}

#[test]
fn test_descriptor_table() {
    let meta = Profile::describe().unwrap();
    assert_eq!(meta.type_name(), "Person");
    assert_eq!(meta.type_key(), "person");

    let shapes: Vec<(&str, FieldShape)> = meta
        .fields()
        .iter()
        .map(|d| (d.field.as_str(), d.shape))
        .collect();
    assert_eq!(
        shapes,
        vec![
            ("name", FieldShape::Text),
            ("email", FieldShape::Text),
            ("handle", FieldShape::Text),
            ("age", FieldShape::Integer),
            ("score", FieldShape::Float),
            ("active", FieldShape::Bool),
            ("tags", FieldShape::Sequence),
            ("extra", FieldShape::Mapping),
            ("birthday", FieldShape::Timestamp),
            ("avatar", FieldShape::Identifier),
            ("settings", FieldShape::Json),
            ("address", FieldShape::Embedded),
        ]
    );

    let name = meta.field("name").unwrap();
    assert!(name.required);
    assert_eq!(name.min_len, Some(2));
    assert_eq!(name.max_len, Some(20));
    assert_eq!(meta.field("email").unwrap().key, "contactEmail");
    assert_eq!(meta.field("contactEmail").unwrap().field, "email");
}

#[test]
fn test_relation_descriptors() {
    let meta = Group::document_meta();
    let relations: Vec<(&str, &str, Cardinality, bool)> = meta
        .relations()
        .map(|(d, r)| (d.field.as_str(), r.model, r.cardinality, r.autosave))
        .collect();
    assert_eq!(
        relations,
        vec![
            ("leader", "Person", Cardinality::One, false),
            ("members", "Person", Cardinality::Many, true),
        ]
    );
}

#[test]
fn test_base_detected_by_type() {
    let profile = Profile::default();
    assert!(profile.base().id().is_none());
    assert!(profile.field_value("base").is_none());
}

#[test]
fn test_field_views() {
    let profile = Profile {
        name: "Ada".to_string(),
        age: 36,
        tags: vec!["math".to_string()],
        address: Some(Address {
            city: "London".to_string(),
        }),
        ..Profile::default()
    };
    assert!(matches!(profile.field_value("name"), Some(FieldValue::Text("Ada"))));
    assert!(matches!(profile.field_value("tags"), Some(FieldValue::Sequence(1))));
    assert!(matches!(profile.field_value("address"), Some(FieldValue::Embedded(true))));
    assert!(matches!(profile.field_value("handle"), Some(FieldValue::Null)));
    assert!(profile.field_value("missing").is_none());
}

#[test]
fn test_relation_accessors() {
    let mut group = Group::default();
    assert!(group.relation("leader").is_some());
    assert!(group.relation("members").is_some());
    assert!(group.relation("title").is_none());
    assert!(group.relation_mut("members").is_some());
}

#[test]
fn test_generated_validation() {
    let profile = Profile {
        name: "A".to_string(),
        email: "nope".to_string(),
        handle: Some("abc1".to_string()),
        ..Profile::default()
    };
    let issues = profile.validate(&MessageCatalog::default());
    let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
    assert_eq!(fields, vec!["name", "contactEmail", "handle"]);
}

#[test]
fn test_to_store_uses_serde_keys() {
    let profile = Profile {
        name: "Ada".to_string(),
        email: "ada@example.com".to_string(),
        ..Profile::default()
    };
    let stored = profile.to_store().unwrap();
    assert_eq!(stored["contactEmail"], json!("ada@example.com"));
    assert_eq!(stored["deleted"], json!(false));
    assert!(!stored.contains_key("_id"));
}

#[test]
fn test_merge_fields_matches_keys_case_insensitively() {
    let mut profile = Profile::default();
    let update = json!({"NAME": "Grace", "contactemail": "g@example.com", "age": 85, "unknown": 1});
    profile
        .merge_fields(update.as_object().unwrap())
        .unwrap();
    assert_eq!(profile.name, "Grace");
    assert_eq!(profile.email, "g@example.com");
    assert_eq!(profile.age, 85);
}

#[test]
fn test_merge_fields_reports_type_errors() {
    let mut profile = Profile::default();
    let update = json!({"age": "old"});
    assert!(profile.merge_fields(update.as_object().unwrap()).is_err());
}

#[test]
fn test_downcasting() {
    let boxed: Box<dyn Document> = Box::new(Group {
        title: "Core".to_string(),
        ..Group::default()
    });
    assert!(boxed.as_any().is::<Group>());
    let group = boxed.into_any().downcast::<Group>().unwrap();
    assert_eq!(group.title, "Core");
}
