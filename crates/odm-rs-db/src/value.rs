//! Runtime view of a field's content.
//!
//! [`FieldValue`] is a borrowed, shape-level view of one field of a document.
//! The validator only needs to know whether a field is set, its text, and for
//! relation fields how the relation is currently held, so documents hand out
//! this view instead of their concrete field types.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};

use crate::object_id::ObjectId;
use crate::relation::RelationValue;

/// A borrowed view of one field's current content.
#[derive(Clone, Copy)]
pub enum FieldValue<'a> {
    /// An absent optional value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// An unsigned integer.
    UInt(u64),
    /// A float.
    Float(f64),
    /// Text.
    Text(&'a str),
    /// A sequence with the given length.
    Sequence(usize),
    /// A mapping with the given number of entries.
    Mapping(usize),
    /// An embedded value; the flag says whether it is set.
    Embedded(bool),
    /// A relation field.
    Relation(&'a dyn RelationValue),
}

impl FieldValue<'_> {
    /// Returns `true` if the field holds something other than its zero value.
    ///
    /// Sequences and mappings count as set when non-empty; relation fields when
    /// they hold at least one reference or populated record.
    pub fn is_set(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::UInt(u) => *u != 0,
            Self::Float(f) => *f != 0.0,
            Self::Text(s) => !s.is_empty(),
            Self::Sequence(len) | Self::Mapping(len) => *len > 0,
            Self::Embedded(set) => *set,
            Self::Relation(relation) => !relation.is_empty(),
        }
    }

    /// Returns the text, if this is a text value.
    pub const fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(*s),
            _ => None,
        }
    }

    /// Returns the relation, if this is a relation field.
    pub fn as_relation(&self) -> Option<&dyn RelationValue> {
        match self {
            Self::Relation(relation) => Some(*relation),
            _ => None,
        }
    }
}

impl fmt::Debug for FieldValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Int(i) => write!(f, "Int({i})"),
            Self::UInt(u) => write!(f, "UInt({u})"),
            Self::Float(v) => write!(f, "Float({v})"),
            Self::Text(s) => write!(f, "Text({s:?})"),
            Self::Sequence(len) => write!(f, "Sequence(len={len})"),
            Self::Mapping(len) => write!(f, "Mapping(len={len})"),
            Self::Embedded(set) => write!(f, "Embedded(set={set})"),
            Self::Relation(relation) => write!(f, "Relation({relation:?})"),
        }
    }
}

/// Conversion of a concrete field into a [`FieldValue`] view.
///
/// The document derive calls this for every field of a recognized type.
pub trait AsFieldValue {
    /// Returns the view of this value.
    fn as_field_value(&self) -> FieldValue<'_>;
}

impl AsFieldValue for String {
    fn as_field_value(&self) -> FieldValue<'_> {
        FieldValue::Text(self)
    }
}

impl AsFieldValue for bool {
    fn as_field_value(&self) -> FieldValue<'_> {
        FieldValue::Bool(*self)
    }
}

macro_rules! impl_signed {
    ($($t:ty),*) => {
        $(impl AsFieldValue for $t {
            fn as_field_value(&self) -> FieldValue<'_> {
                FieldValue::Int(i64::from(*self))
            }
        })*
    };
}

macro_rules! impl_unsigned {
    ($($t:ty),*) => {
        $(impl AsFieldValue for $t {
            fn as_field_value(&self) -> FieldValue<'_> {
                FieldValue::UInt(u64::from(*self))
            }
        })*
    };
}

impl_signed!(i8, i16, i32, i64);
impl_unsigned!(u8, u16, u32, u64);

impl AsFieldValue for isize {
    fn as_field_value(&self) -> FieldValue<'_> {
        FieldValue::Int(i64::try_from(*self).unwrap_or(i64::MAX))
    }
}

impl AsFieldValue for usize {
    fn as_field_value(&self) -> FieldValue<'_> {
        FieldValue::UInt(u64::try_from(*self).unwrap_or(u64::MAX))
    }
}

impl AsFieldValue for f32 {
    fn as_field_value(&self) -> FieldValue<'_> {
        FieldValue::Float(f64::from(*self))
    }
}

impl AsFieldValue for f64 {
    fn as_field_value(&self) -> FieldValue<'_> {
        FieldValue::Float(*self)
    }
}

impl<T> AsFieldValue for Vec<T> {
    fn as_field_value(&self) -> FieldValue<'_> {
        FieldValue::Sequence(self.len())
    }
}

impl<K, V, S> AsFieldValue for HashMap<K, V, S> {
    fn as_field_value(&self) -> FieldValue<'_> {
        FieldValue::Mapping(self.len())
    }
}

impl<K, V> AsFieldValue for BTreeMap<K, V> {
    fn as_field_value(&self) -> FieldValue<'_> {
        FieldValue::Mapping(self.len())
    }
}

impl AsFieldValue for DateTime<Utc> {
    fn as_field_value(&self) -> FieldValue<'_> {
        FieldValue::Embedded(*self != DateTime::<Utc>::default())
    }
}

impl AsFieldValue for ObjectId {
    fn as_field_value(&self) -> FieldValue<'_> {
        FieldValue::Embedded(true)
    }
}

impl AsFieldValue for serde_json::Value {
    fn as_field_value(&self) -> FieldValue<'_> {
        match self {
            Self::Null => FieldValue::Null,
            Self::Bool(b) => FieldValue::Bool(*b),
            Self::Number(n) => n
                .as_i64()
                .map(FieldValue::Int)
                .or_else(|| n.as_u64().map(FieldValue::UInt))
                .unwrap_or_else(|| FieldValue::Float(n.as_f64().unwrap_or_default())),
            Self::String(s) => FieldValue::Text(s),
            Self::Array(items) => FieldValue::Sequence(items.len()),
            Self::Object(map) => FieldValue::Mapping(map.len()),
        }
    }
}

impl<T: AsFieldValue> AsFieldValue for Option<T> {
    fn as_field_value(&self) -> FieldValue<'_> {
        self.as_ref()
            .map_or(FieldValue::Null, AsFieldValue::as_field_value)
    }
}
