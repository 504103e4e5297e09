//! Portable export format for snapshot timelines.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SnapshotError};
use crate::types::{Snapshot, SnapshotDraft, SnapshotStatus};
use crate::workspace::is_contained;

pub const BUNDLE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotBundle {
    pub version: u32,
    pub exported_at: i64,
    pub snapshots: Vec<ExportedSnapshot>,
}

/// One snapshot as it appears in a bundle. Ids are not exported; imports
/// always allocate fresh ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedSnapshot {
    pub label: String,
    pub status: SnapshotStatus,
    pub timestamp: i64,
    pub code: String,
    /// `[path, content]` pairs sorted by path.
    #[serde(default)]
    pub files: Vec<(String, String)>,
    #[serde(default)]
    pub is_milestone: bool,
    #[serde(default)]
    pub auto_save: bool,
}

impl SnapshotBundle {
    pub fn from_snapshots(snapshots: &[Snapshot], exported_at: i64) -> Self {
        Self {
            version: BUNDLE_VERSION,
            exported_at,
            snapshots: snapshots.iter().map(ExportedSnapshot::from).collect(),
        }
    }

    /// Parse and validate a bundle.
    pub fn parse(data: &str) -> Result<Self> {
        let bundle: SnapshotBundle = serde_json::from_str(data)
            .map_err(|e| SnapshotError::ImportFormat(e.to_string()))?;
        bundle.validate()?;
        Ok(bundle)
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != BUNDLE_VERSION {
            return Err(SnapshotError::ImportFormat(format!(
                "unsupported bundle version {} (expected {})",
                self.version, BUNDLE_VERSION
            )));
        }

        for (i, snapshot) in self.snapshots.iter().enumerate() {
            let mut seen = HashSet::new();
            for (path, _) in &snapshot.files {
                if path.trim().is_empty() {
                    return Err(SnapshotError::ImportFormat(format!(
                        "snapshot {} has an empty file path",
                        i
                    )));
                }
                if !is_contained(path) {
                    return Err(SnapshotError::ImportFormat(format!(
                        "snapshot {} has a path outside the workspace: '{}'",
                        i, path
                    )));
                }
                if !seen.insert(path.as_str()) {
                    return Err(SnapshotError::ImportFormat(format!(
                        "snapshot {} lists '{}' more than once",
                        i, path
                    )));
                }
            }
        }

        Ok(())
    }
}

impl From<&Snapshot> for ExportedSnapshot {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            label: snapshot.label.clone(),
            status: snapshot.status,
            timestamp: snapshot.timestamp,
            code: snapshot.code.clone(),
            // BTreeMap iteration is already path-ordered
            files: snapshot
                .files
                .iter()
                .map(|(path, content)| (path.clone(), content.clone()))
                .collect(),
            is_milestone: snapshot.is_milestone,
            auto_save: snapshot.auto_save,
        }
    }
}

impl ExportedSnapshot {
    pub fn into_draft(self) -> SnapshotDraft {
        let files: BTreeMap<String, String> = self.files.into_iter().collect();
        SnapshotDraft {
            label: self.label,
            status: self.status,
            code: self.code,
            files,
            is_milestone: self.is_milestone,
            auto_save: self.auto_save,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle_json(version: u32, files: &str) -> String {
        format!(
            r#"{{"version":{},"exported_at":0,"snapshots":[
                {{"label":"a","status":"working","timestamp":1,"code":"x","files":{}}}
            ]}}"#,
            version, files
        )
    }

    #[test]
    fn test_parse_valid_bundle() {
        let bundle = SnapshotBundle::parse(&bundle_json(1, r#"[["a.rs","1"],["b.rs","2"]]"#)).unwrap();
        assert_eq!(bundle.snapshots.len(), 1);
        assert!(!bundle.snapshots[0].is_milestone);

        let draft = bundle.snapshots[0].clone().into_draft();
        assert_eq!(draft.files.get("b.rs").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_rejects_unknown_version() {
        let result = SnapshotBundle::parse(&bundle_json(2, "[]"));
        assert!(matches!(result, Err(SnapshotError::ImportFormat(_))));
    }

    #[test]
    fn test_rejects_duplicate_paths() {
        let result = SnapshotBundle::parse(&bundle_json(1, r#"[["a.rs","1"],["a.rs","2"]]"#));
        assert!(matches!(result, Err(SnapshotError::ImportFormat(_))));
    }

    #[test]
    fn test_rejects_escaping_paths() {
        for files in [
            r#"[["../escaped.txt","x"]]"#,
            r#"[["src/../../escaped.txt","x"]]"#,
            r#"[["/etc/escaped.txt","x"]]"#,
        ] {
            let result = SnapshotBundle::parse(&bundle_json(1, files));
            assert!(
                matches!(result, Err(SnapshotError::ImportFormat(_))),
                "accepted {}",
                files
            );
        }
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(matches!(
            SnapshotBundle::parse("{\"version\": 1"),
            Err(SnapshotError::ImportFormat(_))
        ));
        assert!(matches!(
            SnapshotBundle::parse(r#"{"version":1,"exported_at":0,"snapshots":[{"label":"a"}]}"#),
            Err(SnapshotError::ImportFormat(_))
        ));
    }
}
