use thiserror::Error;

/// Errors raised by the durable store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage unavailable at {location}: {reason}")]
    Unavailable { location: String, reason: String },

    #[error("Failed to write {collection}/{key}: {reason}")]
    Write {
        collection: String,
        key: String,
        reason: String,
    },

    #[error("Failed to read {collection}/{key}: {reason}")]
    Read {
        collection: String,
        key: String,
        reason: String,
    },

    #[error("Invalid key {0:?}: keys must be non-empty and use only ASCII letters, digits, '-', '_' or '.'")]
    InvalidKey(String),

    #[error("Collection {collection} has no index named {index}")]
    UnknownIndex { collection: String, index: String },
}

impl StoreError {
    pub(crate) fn write(collection: &str, key: &str, reason: impl ToString) -> Self {
        StoreError::Write {
            collection: collection.to_string(),
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn read(collection: &str, key: &str, reason: impl ToString) -> Self {
        StoreError::Read {
            collection: collection.to_string(),
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    /// True when the store as a whole cannot be used.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
