use editvault_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Snapshot not found: {0}")]
    NotFound(String),

    #[error("Invalid snapshot bundle: {0}")]
    ImportFormat(String),

    #[error("Failed to serialize snapshot bundle: {0}")]
    Export(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, SnapshotError>;
