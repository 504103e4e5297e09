//! Editvault cache system for assistant responses
//!
//! This crate caches assistant replies keyed by a fingerprint of the
//! conversation and editor context, so repeated questions are answered
//! without a network round trip. A bounded memory tier sits in front of the
//! durable store; an optional fuzzy tier reuses answers for requests with
//! the same intent.

pub mod cache;
pub mod cleanup;
pub mod entry;
pub mod error;
pub mod intent;
pub mod key;
pub mod memory;
pub mod stats;

pub use cache::{CacheConfig, CacheHit, FuzzyMode, ResponseCache};
pub use cleanup::{CleanupPolicy, CleanupStats};
pub use entry::{CacheEntry, CachedResponse};
pub use error::CacheError;
pub use intent::{Intent, IntentClassifier};
pub use key::{CacheKeyGenerator, CACHE_VERSION};
pub use memory::MemoryTier;
pub use stats::{CacheStats, CacheTier, HitCounts};
