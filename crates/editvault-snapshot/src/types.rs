//! Snapshot records and drafts.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use editvault_store::{IndexKey, Record};
use flate2::write::DeflateEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

/// Caller-asserted health of the code in a snapshot. Not verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotStatus {
    Working,
    Broken,
    Testing,
}

impl SnapshotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotStatus::Working => "working",
            SnapshotStatus::Broken => "broken",
            SnapshotStatus::Testing => "testing",
        }
    }
}

impl fmt::Display for SnapshotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "working" => Ok(SnapshotStatus::Working),
            "broken" => Ok(SnapshotStatus::Broken),
            "testing" => Ok(SnapshotStatus::Testing),
            other => Err(format!(
                "unknown status '{}' (expected working, broken or testing)",
                other
            )),
        }
    }
}

/// A persisted, immutable checkpoint of editor content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    /// Creation time in epoch milliseconds.
    pub timestamp: i64,
    /// Store-wide insertion counter; orders snapshots sharing a timestamp.
    pub sequence: u64,
    pub label: String,
    pub status: SnapshotStatus,
    /// Content of the primary file.
    pub code: String,
    pub files: BTreeMap<String, String>,
    pub original_size: u64,
    pub compressed_size: u64,
    pub is_milestone: bool,
    pub auto_save: bool,
}

impl Snapshot {
    pub(crate) fn from_draft(draft: SnapshotDraft, id: String, timestamp: i64, sequence: u64) -> Self {
        let (original_size, compressed_size) = content_sizes(&draft.code, &draft.files);
        let label = if draft.label.trim().is_empty() {
            default_label(timestamp, draft.auto_save)
        } else {
            draft.label
        };

        Self {
            id,
            timestamp,
            sequence,
            label,
            status: draft.status,
            code: draft.code,
            files: draft.files,
            original_size,
            compressed_size,
            is_milestone: draft.is_milestone,
            auto_save: draft.auto_save,
        }
    }

    /// `(timestamp, sequence)`, the total order of the timeline.
    pub fn order_key(&self) -> (i64, u64) {
        (self.timestamp, self.sequence)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }

    /// Percentage saved by compression, 0 when there is no content.
    pub fn compression_ratio(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        100.0 - (self.compressed_size as f64 / self.original_size as f64) * 100.0
    }
}

impl Record for Snapshot {
    const KIND: &'static str = "snapshot";
    const SCHEMA_VERSION: u32 = 1;

    fn primary_key(&self) -> String {
        self.id.clone()
    }

    fn indexes() -> &'static [&'static str] {
        &["timestamp", "status", "label", "milestone", "auto_save"]
    }

    fn index_value(&self, index: &str) -> Option<IndexKey> {
        match index {
            "timestamp" => Some(self.timestamp.into()),
            "status" => Some(self.status.as_str().into()),
            "label" => Some(self.label.as_str().into()),
            "milestone" => Some(self.is_milestone.into()),
            "auto_save" => Some(self.auto_save.into()),
            _ => None,
        }
    }
}

/// Caller-supplied content for a new snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotDraft {
    /// Empty labels are replaced with a generated one.
    pub label: String,
    pub status: SnapshotStatus,
    pub code: String,
    pub files: BTreeMap<String, String>,
    pub is_milestone: bool,
    pub auto_save: bool,
}

impl SnapshotDraft {
    pub fn new(label: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            status: SnapshotStatus::Working,
            code: code.into(),
            files: BTreeMap::new(),
            is_milestone: false,
            auto_save: false,
        }
    }

    pub fn with_status(mut self, status: SnapshotStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    pub fn with_files(mut self, files: BTreeMap<String, String>) -> Self {
        self.files = files;
        self
    }

    pub fn milestone(mut self) -> Self {
        self.is_milestone = true;
        self
    }

    pub fn auto_save(mut self) -> Self {
        self.auto_save = true;
        self
    }
}

fn default_label(timestamp: i64, auto_save: bool) -> String {
    let time = DateTime::from_timestamp_millis(timestamp)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_string());

    if auto_save {
        format!("Auto-save {}", time)
    } else {
        format!("Snapshot {}", time)
    }
}

/// Raw and deflate-compressed size of the snapshot content in bytes.
fn content_sizes(code: &str, files: &BTreeMap<String, String>) -> (u64, u64) {
    let mut raw = Vec::with_capacity(code.len());
    raw.extend_from_slice(code.as_bytes());
    for (path, content) in files {
        raw.extend_from_slice(path.as_bytes());
        raw.extend_from_slice(content.as_bytes());
    }
    let original = raw.len() as u64;

    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    let compressed = encoder
        .write_all(&raw)
        .and_then(|_| encoder.finish())
        .map(|bytes| bytes.len() as u64)
        .unwrap_or(original);

    (original, compressed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        assert_eq!("working".parse::<SnapshotStatus>(), Ok(SnapshotStatus::Working));
        assert_eq!(" BROKEN ".parse::<SnapshotStatus>(), Ok(SnapshotStatus::Broken));
        assert!("fine".parse::<SnapshotStatus>().is_err());
    }

    #[test]
    fn test_from_draft_computes_sizes() {
        let code = "fn main() { println!(\"hello\"); }\n".repeat(50);
        let draft = SnapshotDraft::new("v1", code.clone()).with_file("src/main.rs", code.clone());

        let snapshot = Snapshot::from_draft(draft, "snap-1".to_string(), 1_700_000_000_000, 0);

        let expected = (code.len() * 2 + "src/main.rs".len()) as u64;
        assert_eq!(snapshot.original_size, expected);
        assert!(snapshot.compressed_size < snapshot.original_size);
        assert!(snapshot.compression_ratio() > 0.0);
    }

    #[test]
    fn test_empty_label_is_generated() {
        let snapshot = Snapshot::from_draft(
            SnapshotDraft::new("  ", "x").auto_save(),
            "snap-1".to_string(),
            0,
            0,
        );
        assert_eq!(snapshot.label, "Auto-save 1970-01-01 00:00:00");

        let snapshot =
            Snapshot::from_draft(SnapshotDraft::new("", "x"), "snap-2".to_string(), 0, 1);
        assert!(snapshot.label.starts_with("Snapshot "));
    }

    #[test]
    fn test_empty_content_ratio() {
        let snapshot = Snapshot::from_draft(SnapshotDraft::new("e", ""), "snap-1".to_string(), 0, 0);
        assert_eq!(snapshot.original_size, 0);
        assert_eq!(snapshot.compression_ratio(), 0.0);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&SnapshotStatus::Testing).unwrap();
        assert_eq!(json, "\"testing\"");
    }
}
