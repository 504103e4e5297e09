//! Cache key generation using SHA256 hashing

use editvault_core::ChatMessage;
use sha2::{Digest, Sha256};

/// Current cache version - increment when the key layout changes
pub const CACHE_VERSION: &str = "2.0.0";

/// Generates deterministic cache keys from a conversation and its context
#[derive(Debug, Clone)]
pub struct CacheKeyGenerator {
    version: String,
}

impl CacheKeyGenerator {
    /// Create a new key generator with the current version
    pub fn new() -> Self {
        Self {
            version: CACHE_VERSION.to_string(),
        }
    }

    /// Create a key generator with a custom version
    pub fn with_version(version: String) -> Self {
        Self { version }
    }

    /// Generate a cache key from the conversation and editor context
    ///
    /// The key is a SHA256 hash of:
    /// - Cache version (to invalidate on layout changes)
    /// - Every message, as its lowercase role name and trimmed content
    /// - The editor context, trimmed
    ///
    /// Each field is prefixed with its length so that moving text across a
    /// field boundary always changes the key.
    pub fn generate_key(&self, messages: &[ChatMessage], context: &str) -> String {
        let mut hasher = Sha256::new();

        update_field(&mut hasher, self.version.as_bytes());
        update_field(&mut hasher, messages.len().to_string().as_bytes());

        for message in messages {
            update_field(&mut hasher, message.role.as_str().as_bytes());
            update_field(&mut hasher, message.content.trim().as_bytes());
        }

        update_field(&mut hasher, context.trim().as_bytes());

        format!("{:x}", hasher.finalize())
    }

    /// Fingerprint of the context alone, used to scope fuzzy matches
    pub fn context_digest(&self, context: &str) -> String {
        let mut hasher = Sha256::new();
        update_field(&mut hasher, context.trim().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Get the current version
    pub fn version(&self) -> &str {
        &self.version
    }
}

impl Default for CacheKeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}
