use editvault_store::StoreError;
use thiserror::Error;

/// Errors from explicit cache maintenance. Lookups and stores never fail.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Persistent cache tier is unavailable")]
    Unavailable,

    #[error(transparent)]
    Storage(#[from] StoreError),
}
