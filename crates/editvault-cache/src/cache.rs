//! The two-tier response cache

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use editvault_core::{last_user_text, ChatMessage};
use editvault_store::{Collection, Direction, Store};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::cleanup::{CleanupPolicy, CleanupStats};
use crate::entry::{CacheEntry, CachedResponse};
use crate::error::CacheError;
use crate::intent::IntentClassifier;
use crate::key::CacheKeyGenerator;
use crate::memory::MemoryTier;
use crate::stats::{CacheStats, CacheTier, Counters};

/// How eagerly the fuzzy tier answers with a response cached for a
/// different request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuzzyMode {
    /// Exact matches only
    Disabled,
    /// Same intent and identical context
    #[default]
    SameContext,
    /// Same intent regardless of context
    SameIntent,
}

impl fmt::Display for FuzzyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FuzzyMode::Disabled => "disabled",
            FuzzyMode::SameContext => "same_context",
            FuzzyMode::SameIntent => "same_intent",
        };
        f.write_str(name)
    }
}

impl FromStr for FuzzyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "disabled" | "off" => Ok(FuzzyMode::Disabled),
            "same_context" => Ok(FuzzyMode::SameContext),
            "same_intent" => Ok(FuzzyMode::SameIntent),
            other => Err(format!("unknown fuzzy mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_memory_entries: usize,
    pub warm_start_entries: usize,
    pub fuzzy_mode: FuzzyMode,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_memory_entries: 100,
            warm_start_entries: 50,
            fuzzy_mode: FuzzyMode::default(),
        }
    }
}

/// A response served from cache
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    pub key: String,
    pub response: CachedResponse,
    pub tier: CacheTier,
    /// Hit count of the entry after this hit
    pub hits: u64,
}

/// Memory tier in front of a persistent tier, with an optional fuzzy
/// fallback over the memory tier.
///
/// Failures of the persistent tier are logged and otherwise ignored: a
/// broken cache only makes responses slower.
pub struct ResponseCache {
    config: CacheConfig,
    key_gen: CacheKeyGenerator,
    classifier: IntentClassifier,
    memory: Mutex<MemoryTier>,
    persistent: Option<Collection<CacheEntry>>,
    counters: Counters,
    enabled: AtomicBool,
}

impl ResponseCache {
    pub const COLLECTION: &'static str = "response_cache";

    /// Create a cache over `store`. Runs memory-only when the persistent
    /// collection cannot be opened.
    pub async fn open(store: &Store, config: CacheConfig) -> Self {
        let persistent = match store.collection::<CacheEntry>(Self::COLLECTION).await {
            Ok(collection) => Some(collection),
            Err(e) => {
                log::warn!("Response cache running memory-only: {}", e);
                None
            }
        };

        Self::with_parts(config, persistent, CacheKeyGenerator::new())
    }

    /// Create a cache with a custom key generator
    pub async fn with_key_generator(
        store: &Store,
        config: CacheConfig,
        key_gen: CacheKeyGenerator,
    ) -> Self {
        let mut cache = Self::open(store, config).await;
        cache.key_gen = key_gen;
        cache
    }

    fn with_parts(
        config: CacheConfig,
        persistent: Option<Collection<CacheEntry>>,
        key_gen: CacheKeyGenerator,
    ) -> Self {
        Self {
            memory: Mutex::new(MemoryTier::new(config.max_memory_entries)),
            enabled: AtomicBool::new(config.enabled),
            config,
            key_gen,
            classifier: IntentClassifier::new(),
            persistent,
            counters: Counters::default(),
        }
    }

    /// Disable the cache (no-op operations)
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    /// Enable the cache
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    /// Check if cache is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn fuzzy_mode(&self) -> FuzzyMode {
        self.config.fuzzy_mode
    }

    pub fn key_generator(&self) -> &CacheKeyGenerator {
        &self.key_gen
    }

    /// Look up a response, trying the memory, persistent and fuzzy tiers in
    /// that order and stopping at the first hit.
    pub async fn lookup(&self, messages: &[ChatMessage], context: &str) -> Option<CacheHit> {
        if !self.is_enabled() {
            return None;
        }

        self.counters.record_request();
        let key = self.key_gen.generate_key(messages, context);
        log::debug!("Cache lookup: key={}", short(&key));

        if let Some(entry) = self.lookup_memory(&key).await {
            return Some(self.hit(entry, CacheTier::Memory).await);
        }

        if let Some(entry) = self.lookup_persistent(&key).await {
            return Some(self.hit(entry, CacheTier::Persistent).await);
        }

        if let Some(entry) = self.lookup_fuzzy(messages, context).await {
            return Some(self.hit(entry, CacheTier::Fuzzy).await);
        }

        log::debug!("Cache miss: {}", short(&key));
        None
    }

    async fn lookup_memory(&self, key: &str) -> Option<CacheEntry> {
        let mut memory = self.memory.lock().await;
        let entry = memory.get_mut(key)?;
        entry.record_access();
        Some(entry.clone())
    }

    async fn lookup_persistent(&self, key: &str) -> Option<CacheEntry> {
        let collection = self.persistent.as_ref()?;

        let mut entry = match collection.get(key).await {
            Ok(entry) => entry?,
            Err(e) => {
                log::warn!("Persistent cache read failed for {}: {}", short(key), e);
                return None;
            }
        };

        entry.record_access();
        let evicted = self.memory.lock().await.insert(entry.clone());
        if let Some(evicted) = evicted {
            log::debug!("Evicted {} from memory tier", evicted.short_key());
        }
        Some(entry)
    }

    async fn lookup_fuzzy(&self, messages: &[ChatMessage], context: &str) -> Option<CacheEntry> {
        let mode = self.config.fuzzy_mode;
        if mode == FuzzyMode::Disabled {
            return None;
        }

        let intent = self.classifier.classify(last_user_text(messages)?)?;
        let digest = self.key_gen.context_digest(context);

        let mut memory = self.memory.lock().await;
        let key = memory
            .iter()
            .find(|entry| {
                entry.intent == Some(intent)
                    && (mode == FuzzyMode::SameIntent || entry.context_digest == digest)
            })
            .map(|entry| entry.key.clone())?;

        let entry = memory.get_mut(&key)?;
        entry.record_access();
        log::debug!("Fuzzy match on intent {} -> {}", intent, entry.short_key());
        Some(entry.clone())
    }

    async fn hit(&self, entry: CacheEntry, tier: CacheTier) -> CacheHit {
        self.counters.record_hit(tier);
        self.persist(&entry).await;
        log::info!("Cache hit ({}): {}", tier, entry.short_key());

        CacheHit {
            key: entry.key,
            response: entry.response,
            tier,
            hits: entry.hits,
        }
    }

    async fn persist(&self, entry: &CacheEntry) {
        if let Some(collection) = &self.persistent {
            if let Err(e) = collection.put(entry).await {
                log::warn!("Persistent cache write failed for {}: {}", entry.short_key(), e);
            }
        }
    }

    /// Store a response in both tiers with a hit count of zero.
    /// Returns the entry key, or `None` when the cache is disabled.
    pub async fn cache_response(
        &self,
        messages: &[ChatMessage],
        context: &str,
        response: CachedResponse,
    ) -> Option<String> {
        if !self.is_enabled() {
            return None;
        }

        let key = self.key_gen.generate_key(messages, context);
        let intent = last_user_text(messages).and_then(|text| self.classifier.classify(text));
        let entry = CacheEntry::new(
            key.clone(),
            response,
            intent,
            self.key_gen.context_digest(context),
            self.key_gen.version().to_string(),
        );

        let evicted = self.memory.lock().await.insert(entry.clone());
        if let Some(evicted) = evicted {
            log::debug!("Evicted {} from memory tier", evicted.short_key());
        }
        self.persist(&entry).await;

        log::info!("Cache stored: {}", short(&key));
        Some(key)
    }

    /// Load the `top_n` most-hit persistent entries into the memory tier.
    /// Returns how many were loaded.
    pub async fn warm_start(&self, top_n: usize) -> usize {
        let Some(collection) = &self.persistent else {
            return 0;
        };

        let ranked = match collection.get_all(Some("hits"), Direction::Descending).await {
            Ok(ranked) => ranked,
            Err(e) => {
                log::warn!("Cache warm start failed: {}", e);
                return 0;
            }
        };

        let mut memory = self.memory.lock().await;
        let limit = top_n.min(memory.capacity());
        let selected: Vec<CacheEntry> = ranked
            .into_iter()
            .filter(|entry| entry.version == self.key_gen.version())
            .take(limit)
            .collect();

        // least-hit first, so the most popular entries are evicted last
        let loaded = selected.len();
        for entry in selected.into_iter().rev() {
            memory.insert(entry);
        }

        log::debug!("Warm start loaded {} cache entries", loaded);
        loaded
    }

    /// Warm start with the configured entry count
    pub async fn warm_start_default(&self) -> usize {
        self.warm_start(self.config.warm_start_entries).await
    }

    pub async fn stats(&self) -> CacheStats {
        let counts = self.counters.snapshot();
        let (memory_entries, memory_capacity) = {
            let memory = self.memory.lock().await;
            (memory.len(), memory.capacity())
        };

        let persistent_entries = match &self.persistent {
            Some(collection) => collection.count().await.ok(),
            None => None,
        };

        CacheStats {
            enabled: self.is_enabled(),
            hit_rate: counts.hit_rate(),
            counts,
            memory_entries,
            memory_capacity,
            persistent_entries,
        }
    }

    /// Remove every entry from both tiers and reset the counters.
    /// Returns the number of entries removed from the persistent tier.
    pub async fn clear(&self) -> Result<usize, CacheError> {
        let in_memory = self.memory.lock().await.clear();
        self.counters.reset();

        let removed = match &self.persistent {
            Some(collection) => collection.clear().await?,
            None => in_memory,
        };

        log::info!("Cleared {} cache entries", removed);
        Ok(removed)
    }

    /// Remove entries the policy considers stale from both tiers
    pub async fn prune_stale(&self, policy: &CleanupPolicy) -> Result<CleanupStats, CacheError> {
        let collection = self.persistent.as_ref().ok_or(CacheError::Unavailable)?;

        let entries = collection.get_all(None, Direction::Ascending).await?;
        let doomed = policy.select_for_removal(&entries, self.key_gen.version());

        let mut memory = self.memory.lock().await;
        for key in &doomed {
            collection.delete(key).await?;
            memory.remove(key);
            log::debug!("Removed stale cache entry: {}", short(key));
        }

        Ok(CleanupStats {
            scanned: entries.len(),
            removed_count: doomed.len(),
        })
    }
}

fn short(key: &str) -> &str {
    key.get(..8).unwrap_or(key)
}
