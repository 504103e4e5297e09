use std::fmt;

use editvault_core::RequestDescriptor;
use editvault_store::{IndexKey, Record};
use serde::{Deserialize, Serialize};

/// A request that could not be sent and waits for replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// `"{millis:013}-{seq:06}"`; lexical order is creation order.
    pub id: String,
    pub timestamp: i64,
    pub request: RequestDescriptor,
    /// Replay attempts made so far.
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Record for QueueItem {
    const KIND: &'static str = "queue_item";
    const SCHEMA_VERSION: u32 = 1;

    fn primary_key(&self) -> String {
        self.id.clone()
    }

    fn indexes() -> &'static [&'static str] {
        &["timestamp"]
    }

    fn index_value(&self, index: &str) -> Option<IndexKey> {
        match index {
            "timestamp" => Some(self.timestamp.into()),
            _ => None,
        }
    }
}

/// A queued request dropped to make room for a newer one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvictionRecord {
    pub id: String,
    pub evicted_at: i64,
    pub method: String,
    pub url: String,
}

impl EvictionRecord {
    pub(crate) fn for_item(item: &QueueItem, evicted_at: i64) -> Self {
        Self {
            id: item.id.clone(),
            evicted_at,
            method: item.request.method.clone(),
            url: item.request.url.clone(),
        }
    }
}

impl Record for EvictionRecord {
    const KIND: &'static str = "queue_eviction";
    const SCHEMA_VERSION: u32 = 1;

    fn primary_key(&self) -> String {
        self.id.clone()
    }
}

/// What prompted a replay pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayTrigger {
    ConnectivityRestored,
    UserRetry,
    ForegroundSuccess,
}

impl fmt::Display for ReplayTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReplayTrigger::ConnectivityRestored => "connectivity restored",
            ReplayTrigger::UserRetry => "user retry",
            ReplayTrigger::ForegroundSuccess => "foreground success",
        };
        f.write_str(name)
    }
}

/// Outcome of one replay pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub trigger: ReplayTrigger,
    pub attempted: usize,
    pub delivered: Vec<String>,
    pub failed: Vec<String>,
    /// Stored items that could not be decoded and were skipped.
    pub unreadable: Vec<String>,
    /// Queue depth after the pass.
    pub remaining: usize,
}

/// Notifications published by the queue worker. Delivery is best-effort:
/// slow subscribers may miss events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    Queued { id: String, depth: usize },
    Delivered { id: String },
    Evicted { id: String, url: String },
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub max_queue_size: usize,
    pub max_in_flight: usize,
    /// Eviction records kept for `lost()`.
    pub max_evictions: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 50,
            max_in_flight: 4,
            max_evictions: 100,
        }
    }
}

/// Allocates queue item ids.
///
/// Ids are `"{millis:013}-{seq:06}"` where `millis` never decreases and
/// `seq` counts ids issued within the same millisecond.
#[derive(Debug, Default)]
pub(crate) struct IdGenerator {
    last_millis: i64,
    seq: u32,
}

const MAX_SEQ: u32 = 999_999;

impl IdGenerator {
    /// Resume after the newest existing id.
    pub(crate) fn resume_after(id: Option<&str>) -> Self {
        let parsed = id.and_then(|id| {
            let (millis, seq) = id.split_once('-')?;
            Some((millis.parse().ok()?, seq.parse().ok()?))
        });
        match parsed {
            Some((last_millis, seq)) => Self { last_millis, seq },
            None => Self::default(),
        }
    }

    pub(crate) fn next(&mut self, now: i64) -> (String, i64) {
        if now > self.last_millis {
            self.last_millis = now;
            self.seq = 0;
        } else if self.seq >= MAX_SEQ {
            self.last_millis += 1;
            self.seq = 0;
        } else {
            self.seq += 1;
        }

        (
            format!("{:013}-{:06}", self.last_millis, self.seq),
            self.last_millis,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_sort_in_creation_order() {
        let mut ids = IdGenerator::default();
        let mut issued = Vec::new();
        for now in [5, 5, 5, 4, 6, 6] {
            issued.push(ids.next(now).0);
        }

        assert_eq!(issued[0], "0000000000005-000000");
        assert_eq!(issued[3], "0000000000005-000003");
        assert_eq!(issued[4], "0000000000006-000000");

        let mut sorted = issued.clone();
        sorted.sort();
        assert_eq!(sorted, issued);
    }

    #[test]
    fn test_resume_after_existing_id() {
        let mut ids = IdGenerator::resume_after(Some("0000000000010-000004"));
        assert_eq!(ids.next(10).0, "0000000000010-000005");
        assert_eq!(ids.next(3).0, "0000000000010-000006");

        let mut fresh = IdGenerator::resume_after(Some("garbage"));
        assert_eq!(fresh.next(1).0, "0000000000001-000000");
    }

    #[test]
    fn test_sequence_overflow_moves_to_next_millisecond() {
        let mut ids = IdGenerator {
            last_millis: 7,
            seq: MAX_SEQ,
        };
        assert_eq!(ids.next(7).0, "0000000000008-000000");
    }
}
