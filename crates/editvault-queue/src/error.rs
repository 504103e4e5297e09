use editvault_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Offline queue storage failed: {0}")]
    Storage(#[from] StoreError),

    #[error("Offline queue worker has stopped")]
    WorkerStopped,
}

pub type Result<T> = std::result::Result<T, QueueError>;
