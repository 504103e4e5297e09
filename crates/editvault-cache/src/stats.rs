//! Hit and request counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Tier that served a cache hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    Memory,
    Persistent,
    Fuzzy,
}

impl std::fmt::Display for CacheTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CacheTier::Memory => "memory",
            CacheTier::Persistent => "persistent",
            CacheTier::Fuzzy => "fuzzy",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    total: AtomicU64,
    memory_hits: AtomicU64,
    persistent_hits: AtomicU64,
    fuzzy_hits: AtomicU64,
}

impl Counters {
    pub(crate) fn record_request(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_hit(&self, tier: CacheTier) {
        let counter = match tier {
            CacheTier::Memory => &self.memory_hits,
            CacheTier::Persistent => &self.persistent_hits,
            CacheTier::Fuzzy => &self.fuzzy_hits,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reset(&self) {
        self.total.store(0, Ordering::Relaxed);
        self.memory_hits.store(0, Ordering::Relaxed);
        self.persistent_hits.store(0, Ordering::Relaxed);
        self.fuzzy_hits.store(0, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> HitCounts {
        let memory_hits = self.memory_hits.load(Ordering::Relaxed);
        let persistent_hits = self.persistent_hits.load(Ordering::Relaxed);
        let fuzzy_hits = self.fuzzy_hits.load(Ordering::Relaxed);
        HitCounts {
            total_requests: self.total.load(Ordering::Relaxed),
            hits: memory_hits + persistent_hits + fuzzy_hits,
            memory_hits,
            persistent_hits,
            fuzzy_hits,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HitCounts {
    pub total_requests: u64,
    pub hits: u64,
    pub memory_hits: u64,
    pub persistent_hits: u64,
    pub fuzzy_hits: u64,
}

impl HitCounts {
    /// `hits / total_requests`, 0 when nothing was requested
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_requests as f64
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    #[serde(flatten)]
    pub counts: HitCounts,
    pub hit_rate: f64,
    pub memory_entries: usize,
    pub memory_capacity: usize,
    /// `None` when the persistent tier could not be read
    pub persistent_entries: Option<usize>,
}
