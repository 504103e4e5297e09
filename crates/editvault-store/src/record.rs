//! Record trait and the versioned envelope every value is stored in.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// A value that can live in a [`Collection`](crate::Collection).
///
/// `KIND` and `SCHEMA_VERSION` are written into the stored envelope and
/// checked on every read, so a collection never silently deserializes a
/// record of a different shape.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: &'static str;
    const SCHEMA_VERSION: u32;

    /// Primary key. Must satisfy the store's key rules.
    fn primary_key(&self) -> String;

    /// Names of the secondary indexes this record type supports.
    fn indexes() -> &'static [&'static str] {
        &[]
    }

    /// Value of a secondary index for this record, if it has one.
    fn index_value(&self, _index: &str) -> Option<IndexKey> {
        None
    }
}

/// A comparable secondary-index value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKey {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl From<bool> for IndexKey {
    fn from(value: bool) -> Self {
        IndexKey::Bool(value)
    }
}

impl From<i64> for IndexKey {
    fn from(value: i64) -> Self {
        IndexKey::Int(value)
    }
}

impl From<u64> for IndexKey {
    fn from(value: u64) -> Self {
        IndexKey::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<&str> for IndexKey {
    fn from(value: &str) -> Self {
        IndexKey::Text(value.to_string())
    }
}

impl From<String> for IndexKey {
    fn from(value: String) -> Self {
        IndexKey::Text(value)
    }
}

/// Iteration order for scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    kind: String,
    schema_version: u32,
    key: String,
    payload: serde_json::Value,
}

pub(crate) fn encode<T: Record>(collection: &str, record: &T) -> Result<(String, Vec<u8>)> {
    let key = record.primary_key();
    validate_key(&key)?;

    let payload =
        serde_json::to_value(record).map_err(|e| StoreError::write(collection, &key, e))?;
    let envelope = Envelope {
        kind: T::KIND.to_string(),
        schema_version: T::SCHEMA_VERSION,
        key: key.clone(),
        payload,
    };
    let bytes =
        serde_json::to_vec(&envelope).map_err(|e| StoreError::write(collection, &key, e))?;

    Ok((key, bytes))
}

pub(crate) fn decode<T: Record>(collection: &str, key: &str, bytes: &[u8]) -> Result<T> {
    let envelope: Envelope =
        serde_json::from_slice(bytes).map_err(|e| StoreError::read(collection, key, e))?;

    if envelope.kind != T::KIND {
        return Err(StoreError::read(
            collection,
            key,
            format!("expected kind {}, found {}", T::KIND, envelope.kind),
        ));
    }
    if envelope.schema_version != T::SCHEMA_VERSION {
        return Err(StoreError::read(
            collection,
            key,
            format!(
                "unsupported schema version {} (expected {})",
                envelope.schema_version,
                T::SCHEMA_VERSION
            ),
        ));
    }
    if envelope.key != key {
        return Err(StoreError::read(
            collection,
            key,
            format!("envelope key mismatch: {}", envelope.key),
        ));
    }

    serde_json::from_value(envelope.payload).map_err(|e| StoreError::read(collection, key, e))
}

/// Keys double as file names, so they are restricted to a portable set.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key.len() <= 200
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: String,
        body: String,
    }

    impl Record for Note {
        const KIND: &'static str = "note";
        const SCHEMA_VERSION: u32 = 1;

        fn primary_key(&self) -> String {
            self.id.clone()
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct OtherNote {
        id: String,
        body: String,
    }

    impl Record for OtherNote {
        const KIND: &'static str = "other";
        const SCHEMA_VERSION: u32 = 1;

        fn primary_key(&self) -> String {
            self.id.clone()
        }
    }

    #[test]
    fn test_encode_decode() {
        let note = Note {
            id: "n1".to_string(),
            body: "hello".to_string(),
        };
        let (key, bytes) = encode("notes", &note).unwrap();
        assert_eq!(key, "n1");

        let back: Note = decode("notes", "n1", &bytes).unwrap();
        assert_eq!(back, note);
    }

    #[test]
    fn test_decode_rejects_other_kind() {
        let note = Note {
            id: "n1".to_string(),
            body: "hello".to_string(),
        };
        let (_, bytes) = encode("notes", &note).unwrap();

        let result = decode::<OtherNote>("notes", "n1", &bytes);
        assert!(matches!(result, Err(StoreError::Read { .. })));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let result = decode::<Note>("notes", "n1", b"not json");
        assert!(matches!(result, Err(StoreError::Read { .. })));
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("snap-0a1b").is_ok());
        assert!(validate_key("0000001697000000-000001").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("../escape").is_err());
        assert!(validate_key(".hidden").is_err());
        assert!(validate_key("has space").is_err());
    }

    #[test]
    fn test_index_key_ordering() {
        assert!(IndexKey::Int(1) < IndexKey::Int(2));
        assert!(IndexKey::from("a") < IndexKey::from("b"));
        assert!(IndexKey::Bool(false) < IndexKey::Bool(true));
    }
}
