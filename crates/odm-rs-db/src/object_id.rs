//! Store identifiers.
//!
//! An [`ObjectId`] is a 12-byte value: a 4-byte big-endian creation time in
//! seconds, 5 random bytes chosen once per process, and a 3-byte counter. Its
//! text form is 24 lowercase hex digits and its wire form is `{"$oid": "<hex>"}`.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::LazyLock;

use chrono::{DateTime, TimeZone, Utc};
use odm_rs_core::OdmError;
use rand::Rng;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The key used for identifiers in extended JSON.
pub const OID_KEY: &str = "$oid";

static PROCESS_UNIQUE: LazyLock<[u8; 5]> = LazyLock::new(rand::random);

static COUNTER: LazyLock<AtomicU32> =
    LazyLock::new(|| AtomicU32::new(rand::thread_rng().gen_range(0..0x00FF_FFFF)));

/// A globally unique document identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    /// Generates a fresh identifier.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let secs = u32::try_from(Utc::now().timestamp()).unwrap_or(u32::MAX);
        let count = COUNTER.fetch_add(1, Ordering::Relaxed) & 0x00FF_FFFF;

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(&*PROCESS_UNIQUE);
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes)
    }

    /// Wraps raw bytes.
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Parses a 24-digit hex string.
    ///
    /// # Errors
    ///
    /// Returns [`OdmError::InvalidReference`] if `s` is not exactly 24 hex digits.
    ///
    /// # Examples
    ///
    /// ```
    /// use odm_rs_db::object_id::ObjectId;
    ///
    /// let id = ObjectId::parse_str("5f1d7f0e2a9b3c4d5e6f7a8b").unwrap();
    /// assert_eq!(id.to_hex(), "5f1d7f0e2a9b3c4d5e6f7a8b");
    /// assert!(ObjectId::parse_str("not-an-id").is_err());
    /// ```
    pub fn parse_str(s: &str) -> Result<Self, OdmError> {
        if !Self::is_valid_hex(s) {
            return Err(OdmError::InvalidReference(format!(
                "'{s}' is not a valid object id"
            )));
        }
        let decoded = hex::decode(s)
            .map_err(|e| OdmError::InvalidReference(format!("'{s}': {e}")))?;
        let bytes: [u8; 12] = decoded
            .try_into()
            .map_err(|_| OdmError::InvalidReference(format!("'{s}' is not 12 bytes long")))?;
        Ok(Self(bytes))
    }

    /// Returns `true` if `s` is the text form of an identifier.
    pub fn is_valid_hex(s: &str) -> bool {
        s.len() == 24 && s.bytes().all(|b| b.is_ascii_hexdigit())
    }

    /// Returns the raw bytes.
    pub const fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Returns the 24-digit lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Returns the creation time encoded in the identifier.
    pub fn timestamp(&self) -> DateTime<Utc> {
        let secs = u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]);
        Utc.timestamp_opt(i64::from(secs), 0)
            .single()
            .unwrap_or_default()
    }

    /// Returns the extended JSON form used in filters.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ OID_KEY: self.to_hex() })
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId(\"{}\")", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = OdmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}

impl From<ObjectId> for serde_json::Value {
    fn from(id: ObjectId) -> Self {
        id.to_json()
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(OID_KEY, &self.to_hex())?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ObjectIdVisitor)
    }
}

struct ObjectIdVisitor;

impl<'de> Visitor<'de> for ObjectIdVisitor {
    type Value = ObjectId;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a 24-digit hex string or {\"$oid\": <hex>}")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        ObjectId::parse_str(v).map_err(E::custom)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut id = None;
        while let Some(key) = map.next_key::<String>()? {
            if key == OID_KEY {
                let hex: String = map.next_value()?;
                id = Some(ObjectId::parse_str(&hex).map_err(de::Error::custom)?);
            } else {
                return Err(de::Error::unknown_field(&key, &[OID_KEY]));
            }
        }
        id.ok_or_else(|| de::Error::missing_field(OID_KEY))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ids_are_unique_and_valid() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        assert_ne!(a, b);
        assert!(ObjectId::is_valid_hex(&a.to_hex()));
    }

    #[test]
    fn test_timestamp_is_now() {
        let id = ObjectId::new();
        let delta = Utc::now() - id.timestamp();
        assert!(delta.num_seconds().abs() <= 2);
    }

    #[test]
    fn test_is_valid_hex() {
        assert!(ObjectId::is_valid_hex("5f1d7f0e2a9b3c4d5e6f7a8b"));
        assert!(ObjectId::is_valid_hex("5F1D7F0E2A9B3C4D5E6F7A8B"));
        assert!(!ObjectId::is_valid_hex("5f1d7f0e2a9b3c4d5e6f7a8"));
        assert!(!ObjectId::is_valid_hex("zz1d7f0e2a9b3c4d5e6f7a8b"));
        assert!(!ObjectId::is_valid_hex(""));
    }

    #[test]
    fn test_parse_str_error_kind() {
        let err = ObjectId::parse_str("abc").unwrap_err();
        assert_eq!(err.kind(), odm_rs_core::ErrorKind::InvalidReference);
    }

    #[test]
    fn test_serialize_as_extended_json() {
        let id = ObjectId::parse_str("5f1d7f0e2a9b3c4d5e6f7a8b").unwrap();
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json, serde_json::json!({"$oid": "5f1d7f0e2a9b3c4d5e6f7a8b"}));
        assert_eq!(json, id.to_json());
    }

    #[test]
    fn test_deserialize_accepts_both_forms() {
        let from_map: ObjectId =
            serde_json::from_value(serde_json::json!({"$oid": "5f1d7f0e2a9b3c4d5e6f7a8b"}))
                .unwrap();
        let from_str: ObjectId =
            serde_json::from_value(serde_json::json!("5f1d7f0e2a9b3c4d5e6f7a8b")).unwrap();
        assert_eq!(from_map, from_str);
    }

    #[test]
    fn test_deserialize_rejects_garbage() {
        assert!(serde_json::from_value::<ObjectId>(serde_json::json!("nope")).is_err());
        assert!(serde_json::from_value::<ObjectId>(serde_json::json!({"id": "x"})).is_err());
        assert!(serde_json::from_value::<ObjectId>(serde_json::json!(12)).is_err());
    }

    #[test]
    fn test_display_and_debug() {
        let id = ObjectId::from_bytes([0xab; 12]);
        assert_eq!(id.to_string(), "abababababababababababab");
        assert_eq!(format!("{id:?}"), "ObjectId(\"abababababababababababab\")");
    }
}
