//! Snapshot timeline for the editor.
//!
//! The [`SnapshotManager`] checkpoints editor content into the durable
//! store, keeps the timeline bounded (auto-saves and the overall count are
//! capped, milestones never expire), restores earlier states behind an undo
//! point, and moves snapshots between stores as portable bundles.
//!
//! The live editor content is an explicitly owned [`Workspace`] shared with
//! the manager at construction. [`RecoverySlot`] keeps the single
//! last-known-good copy written when a session fails unexpectedly.

mod bundle;
mod error;
mod manager;
mod recovery;
mod types;
mod workspace;

pub use bundle::{ExportedSnapshot, SnapshotBundle, BUNDLE_VERSION};
pub use error::{Result, SnapshotError};
pub use manager::{RetentionLimits, SnapshotManager, SnapshotStats};
pub use recovery::{CrashRecord, RecoverySlot};
pub use types::{Snapshot, SnapshotDraft, SnapshotStatus};
pub use workspace::{DirSync, SharedWorkspace, Workspace};
