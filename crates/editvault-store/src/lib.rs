//! Durable key-value collections for editvault.
//!
//! Every persistent component (snapshots, response cache, offline queue)
//! stores its records through this crate. A [`Store`] hands out typed
//! [`Collection`]s, each an isolated key space with optional secondary
//! indexes declared by the [`Record`] type.
//!
//! Two backends are provided:
//! - [`FileBackend`]: one JSON file per key, written atomically
//! - [`MemoryBackend`]: process-local, used for tests and as the fallback
//!   when persistent storage cannot be opened

mod backend;
mod collection;
mod error;
mod file;
mod record;

pub use backend::{Backend, MemoryBackend};
pub use collection::{Collection, Listing, Scan, Store};
pub use error::{Result, StoreError};
pub use file::FileBackend;
pub use record::{Direction, IndexKey, Record};
