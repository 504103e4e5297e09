//! Cache entry structure and metadata

use chrono::{DateTime, Utc};
use editvault_core::{extract_code_block, AssistantReply};
use editvault_store::{IndexKey, Record};
use serde::{Deserialize, Serialize};

use crate::intent::Intent;

/// The part of an assistant reply worth replaying from cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub content: String,

    /// First fenced code block of `content`, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,
}

impl CachedResponse {
    pub fn new(content: impl Into<String>, tokens: Option<u64>) -> Self {
        let content = content.into();
        let code = extract_code_block(&content);
        Self {
            content,
            code,
            tokens,
        }
    }
}

impl From<&AssistantReply> for CachedResponse {
    fn from(reply: &AssistantReply) -> Self {
        Self::new(reply.content.clone(), reply.tokens)
    }
}

/// A cached assistant response and its bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// SHA256 fingerprint of the normalized conversation and context
    pub key: String,

    pub response: CachedResponse,

    /// When this entry was first stored
    pub timestamp: DateTime<Utc>,

    /// Last time this entry was served
    pub last_accessed: DateTime<Utc>,

    /// Number of times this entry has been served
    pub hits: u64,

    /// Intent of the request that produced this entry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,

    /// Fingerprint of the context alone
    pub context_digest: String,

    /// Key layout version this entry was stored under
    pub version: String,
}

impl CacheEntry {
    /// Create a new cache entry
    pub fn new(
        key: String,
        response: CachedResponse,
        intent: Option<Intent>,
        context_digest: String,
        version: String,
    ) -> Self {
        let now = Utc::now();

        Self {
            key,
            response,
            timestamp: now,
            last_accessed: now,
            hits: 0,
            intent,
            context_digest,
            version,
        }
    }

    /// Update access metadata
    pub fn record_access(&mut self) {
        self.last_accessed = Utc::now();
        self.hits += 1;
    }

    /// Get age in days since creation
    pub fn age_days(&self) -> i64 {
        (Utc::now() - self.timestamp).num_days()
    }

    /// Get idle days since last access
    pub fn idle_days(&self) -> i64 {
        (Utc::now() - self.last_accessed).num_days()
    }

    pub fn short_key(&self) -> &str {
        self.key.get(..8).unwrap_or(&self.key)
    }
}

impl Record for CacheEntry {
    const KIND: &'static str = "cache_entry";
    const SCHEMA_VERSION: u32 = 1;

    fn primary_key(&self) -> String {
        self.key.clone()
    }

    fn indexes() -> &'static [&'static str] {
        &["hits", "timestamp", "intent"]
    }

    fn index_value(&self, index: &str) -> Option<IndexKey> {
        match index {
            "hits" => Some(self.hits.into()),
            "timestamp" => Some(self.timestamp.timestamp_millis().into()),
            "intent" => self.intent.map(|intent| intent.as_str().into()),
            _ => None,
        }
    }
}
