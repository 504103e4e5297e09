//! Cache cleanup policy

use serde::{Deserialize, Serialize};

use crate::entry::CacheEntry;

/// Cleanup statistics
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct CleanupStats {
    /// Number of persistent entries examined
    pub scanned: usize,
    /// Number of entries removed
    pub removed_count: usize,
}

/// Cleanup policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupPolicy {
    /// Maximum age in days before entry is considered stale
    pub max_age_days: usize,

    /// Maximum idle days (since last access) before entry is stale
    pub max_idle_days: usize,

    /// Remove entries with version mismatch
    pub remove_version_mismatch: bool,

    /// Keep at most this many persistent entries, least recently used first out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_entries: Option<usize>,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self {
            max_age_days: 90,
            max_idle_days: 30,
            remove_version_mismatch: true,
            max_entries: None,
        }
    }
}

impl CleanupPolicy {
    /// Check if an entry is stale according to the policy
    pub fn is_stale(&self, entry: &CacheEntry, current_version: &str) -> bool {
        // Version mismatch
        if self.remove_version_mismatch && entry.version != current_version {
            return true;
        }

        // Age check
        if entry.age_days() > self.max_age_days as i64 {
            return true;
        }

        // Idle check
        if entry.idle_days() > self.max_idle_days as i64 {
            return true;
        }

        false
    }

    /// Keys to remove from `entries`: stale ones first, then the least
    /// recently used survivors beyond `max_entries`.
    pub fn select_for_removal(&self, entries: &[CacheEntry], current_version: &str) -> Vec<String> {
        let (stale, mut fresh): (Vec<&CacheEntry>, Vec<&CacheEntry>) = entries
            .iter()
            .partition(|entry| self.is_stale(entry, current_version));

        let mut keys: Vec<String> = stale.into_iter().map(|e| e.key.clone()).collect();

        if let Some(max_entries) = self.max_entries {
            if fresh.len() > max_entries {
                // LRU
                fresh.sort_by_key(|entry| entry.last_accessed);
                let excess = fresh.len() - max_entries;
                keys.extend(fresh.into_iter().take(excess).map(|e| e.key.clone()));
            }
        }

        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::CachedResponse;
    use chrono::Utc;

    fn entry(key: &str, version: &str) -> CacheEntry {
        CacheEntry::new(
            key.to_string(),
            CachedResponse::new("test", None),
            None,
            String::new(),
            version.to_string(),
        )
    }

    #[test]
    fn test_cleanup_policy_stale_by_age() {
        let policy = CleanupPolicy {
            max_age_days: 90,
            max_idle_days: 300,
            remove_version_mismatch: true,
            max_entries: None,
        };

        let mut old_entry = entry("abc123", "1.0.0");

        // Simulate old entry
        old_entry.timestamp = Utc::now() - chrono::Duration::days(100);

        assert!(policy.is_stale(&old_entry, "1.0.0"));
        assert!(!policy.is_stale(&entry("def456", "1.0.0"), "1.0.0"));
    }

    #[test]
    fn test_cleanup_policy_stale_by_idle() {
        let policy = CleanupPolicy::default();

        let mut idle = entry("abc123", "1.0.0");
        idle.last_accessed = Utc::now() - chrono::Duration::days(31);

        assert!(policy.is_stale(&idle, "1.0.0"));
    }

    #[test]
    fn test_cleanup_policy_stale_by_version() {
        let policy = CleanupPolicy::default();

        assert!(policy.is_stale(&entry("abc123", "0.9.0"), "1.0.0"));

        let lenient = CleanupPolicy {
            remove_version_mismatch: false,
            ..CleanupPolicy::default()
        };
        assert!(!lenient.is_stale(&entry("abc123", "0.9.0"), "1.0.0"));
    }

    #[test]
    fn test_select_for_removal_applies_entry_limit() {
        let policy = CleanupPolicy {
            max_entries: Some(2),
            ..CleanupPolicy::default()
        };

        let now = Utc::now();
        let mut entries = Vec::new();
        for (i, key) in ["a", "b", "c", "d"].iter().enumerate() {
            let mut e = entry(key, "1.0.0");
            e.last_accessed = now - chrono::Duration::hours(10 - i as i64);
            entries.push(e);
        }
        entries.push(entry("old", "0.1.0"));

        let removed = policy.select_for_removal(&entries, "1.0.0");
        assert_eq!(removed, vec!["old", "a", "b"]);
    }
}
