//! The snapshot timeline.

use std::sync::atomic::{AtomicU64, Ordering};

use editvault_core::{now_millis, MonotonicClock};
use editvault_store::{Collection, Direction, Listing, Store};
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::bundle::SnapshotBundle;
use crate::error::{Result, SnapshotError};
use crate::types::{Snapshot, SnapshotDraft, SnapshotStatus};
use crate::workspace::SharedWorkspace;

/// Count-based retention. Milestones are exempt from both caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionLimits {
    /// Upper bound on non-milestone snapshots.
    pub max_snapshots: usize,
    /// Upper bound on non-milestone auto-saves.
    pub max_auto_saves: usize,
}

impl Default for RetentionLimits {
    fn default() -> Self {
        Self {
            max_snapshots: 50,
            max_auto_saves: 10,
        }
    }
}

impl RetentionLimits {
    pub fn new(max_snapshots: usize, max_auto_saves: usize) -> Self {
        Self {
            max_snapshots: max_snapshots.max(1),
            max_auto_saves: max_auto_saves.max(1),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SnapshotStats {
    pub total: usize,
    pub milestones: usize,
    pub auto_saves: usize,
    pub working: usize,
    pub broken: usize,
    pub testing: usize,
    pub original_bytes: u64,
    pub compressed_bytes: u64,
    pub oldest: Option<i64>,
    pub newest: Option<i64>,
    /// Stored snapshots that could not be decoded.
    pub unreadable: usize,
}

pub struct SnapshotManager {
    snapshots: Collection<Snapshot>,
    limits: RetentionLimits,
    workspace: SharedWorkspace,
    clock: MonotonicClock,
    next_sequence: AtomicU64,
    // serializes save + eviction so caps hold under concurrent saves
    write_lock: Mutex<()>,
}

impl SnapshotManager {
    pub const COLLECTION: &'static str = "snapshots";

    pub async fn open(
        store: &Store,
        limits: RetentionLimits,
        workspace: SharedWorkspace,
    ) -> Result<Self> {
        let snapshots = store.collection::<Snapshot>(Self::COLLECTION).await?;

        // an unreadable record must not keep the timeline from opening
        let existing =
            report_unreadable(snapshots.get_all_lossy(None, Direction::Ascending).await?);
        let last_timestamp = existing.iter().map(|s| s.timestamp).max().unwrap_or(0);
        let next_sequence = existing
            .iter()
            .map(|s| s.sequence + 1)
            .max()
            .unwrap_or(0);

        debug!(
            "Opened snapshot timeline with {} snapshots (next sequence {})",
            existing.len(),
            next_sequence
        );

        Ok(Self {
            snapshots,
            limits: RetentionLimits::new(limits.max_snapshots, limits.max_auto_saves),
            workspace,
            clock: MonotonicClock::starting_at(last_timestamp),
            next_sequence: AtomicU64::new(next_sequence),
            write_lock: Mutex::new(()),
        })
    }

    pub fn limits(&self) -> RetentionLimits {
        self.limits
    }

    pub fn workspace(&self) -> &SharedWorkspace {
        &self.workspace
    }

    /// Persist a new snapshot and apply retention.
    pub async fn save_snapshot(&self, draft: SnapshotDraft) -> Result<Snapshot> {
        let _guard = self.write_lock.lock().await;

        let auto_save = draft.auto_save;
        let id = format!("snap-{}", Uuid::new_v4());
        let timestamp = self.clock.tick();
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let snapshot = Snapshot::from_draft(draft, id, timestamp, sequence);

        self.snapshots.put(&snapshot).await?;
        debug!(
            "Saved snapshot {} '{}' ({} bytes, {} compressed)",
            snapshot.id, snapshot.label, snapshot.original_size, snapshot.compressed_size
        );

        if auto_save {
            self.enforce_auto_save_cap().await?;
        }
        self.enforce_total_cap().await?;

        Ok(snapshot)
    }

    async fn enforce_auto_save_cap(&self) -> Result<()> {
        let mut auto_saves: Vec<Snapshot> = report_unreadable(
            self.snapshots.find_lossy("auto_save", true).await?,
        )
        .into_iter()
            .filter(|s| !s.is_milestone)
            .collect();

        if auto_saves.len() <= self.limits.max_auto_saves {
            return Ok(());
        }

        auto_saves.sort_by_key(Snapshot::order_key);
        let excess = auto_saves.len() - self.limits.max_auto_saves;
        for snapshot in auto_saves.into_iter().take(excess) {
            debug!("Evicting auto-save {} '{}'", snapshot.id, snapshot.label);
            self.snapshots.delete(&snapshot.id).await?;
        }
        Ok(())
    }

    async fn enforce_total_cap(&self) -> Result<()> {
        let mut candidates =
            report_unreadable(self.snapshots.find_lossy("milestone", false).await?);
        if candidates.len() <= self.limits.max_snapshots {
            return Ok(());
        }

        candidates.sort_by_key(Snapshot::order_key);
        let excess = candidates.len() - self.limits.max_snapshots;
        for snapshot in candidates.into_iter().take(excess) {
            debug!("Evicting snapshot {} '{}'", snapshot.id, snapshot.label);
            self.snapshots.delete(&snapshot.id).await?;
        }
        Ok(())
    }

    pub async fn get_snapshot(&self, id: &str) -> Result<Option<Snapshot>> {
        Ok(self.snapshots.get(id).await?)
    }

    /// Every readable snapshot, newest first.
    pub async fn get_all_snapshots(&self) -> Result<Vec<Snapshot>> {
        let mut all =
            report_unreadable(self.snapshots.get_all_lossy(None, Direction::Ascending).await?);
        sort_newest_first(&mut all);
        Ok(all)
    }

    pub async fn get_last_working_snapshot(&self) -> Result<Option<Snapshot>> {
        let working = report_unreadable(
            self.snapshots
                .find_lossy("status", SnapshotStatus::Working.as_str())
                .await?,
        );
        Ok(working.into_iter().max_by_key(Snapshot::order_key))
    }

    /// Milestones, newest first.
    pub async fn get_milestones(&self) -> Result<Vec<Snapshot>> {
        let mut milestones =
            report_unreadable(self.snapshots.find_lossy("milestone", true).await?);
        sort_newest_first(&mut milestones);
        Ok(milestones)
    }

    /// Look up `id` and return it for the caller to apply.
    ///
    /// The current workspace is saved first as a `testing` snapshot so the
    /// restore can be undone. Nothing is written when `id` does not exist.
    pub async fn restore_snapshot(&self, id: &str) -> Result<Snapshot> {
        let target = self
            .snapshots
            .get(id)
            .await?
            .ok_or_else(|| SnapshotError::NotFound(id.to_string()))?;

        let backup = {
            let workspace = self.workspace.read().await;
            workspace
                .to_draft(format!("Before restoring: {}", target.label))
                .with_status(SnapshotStatus::Testing)
        };
        let backup = self.save_snapshot(backup).await?;

        info!(
            "Restoring snapshot {} '{}' (undo point {})",
            target.id, target.label, backup.id
        );
        Ok(target)
    }

    /// Delete a snapshot. Deleting an unknown id succeeds.
    pub async fn delete_snapshot(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.snapshots.delete(id).await?;
        Ok(())
    }

    /// Serialize the whole timeline as a portable bundle.
    pub async fn export_snapshots(&self) -> Result<String> {
        let mut all =
            report_unreadable(self.snapshots.get_all_lossy(None, Direction::Ascending).await?);
        all.sort_by_key(Snapshot::order_key);

        let bundle = SnapshotBundle::from_snapshots(&all, now_millis());
        Ok(serde_json::to_string_pretty(&bundle)?)
    }

    /// Import a bundle produced by [`SnapshotManager::export_snapshots`].
    ///
    /// The whole bundle is validated before anything is written. Records are
    /// then saved oldest first under fresh ids; individual failures are
    /// logged and skipped. Returns the number imported.
    pub async fn import_snapshots(&self, data: &str) -> Result<usize> {
        let bundle = SnapshotBundle::parse(data)?;

        let mut entries = bundle.snapshots;
        entries.sort_by_key(|s| s.timestamp);

        let total = entries.len();
        let mut imported = 0;
        for entry in entries {
            let label = entry.label.clone();
            match self.save_snapshot(entry.into_draft()).await {
                Ok(_) => imported += 1,
                Err(e) => warn!("Failed to import snapshot '{}': {}", label, e),
            }
        }

        info!("Imported {}/{} snapshots", imported, total);
        Ok(imported)
    }

    /// Remove every snapshot, milestones included.
    pub async fn clear_all(&self) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let removed = self.snapshots.clear().await?;
        info!("Cleared {} snapshots", removed);
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<SnapshotStats> {
        let listing = self.snapshots.get_all_lossy(None, Direction::Ascending).await?;
        let all = listing.records;

        let mut stats = SnapshotStats {
            total: all.len(),
            unreadable: listing.unreadable.len(),
            ..Default::default()
        };
        for snapshot in &all {
            if snapshot.is_milestone {
                stats.milestones += 1;
            }
            if snapshot.auto_save {
                stats.auto_saves += 1;
            }
            match snapshot.status {
                SnapshotStatus::Working => stats.working += 1,
                SnapshotStatus::Broken => stats.broken += 1,
                SnapshotStatus::Testing => stats.testing += 1,
            }
            stats.original_bytes += snapshot.original_size;
            stats.compressed_bytes += snapshot.compressed_size;
        }
        stats.oldest = all.iter().map(|s| s.timestamp).min();
        stats.newest = all.iter().map(|s| s.timestamp).max();

        Ok(stats)
    }
}

fn report_unreadable(listing: Listing<Snapshot>) -> Vec<Snapshot> {
    if !listing.unreadable.is_empty() {
        warn!(
            "Ignoring {} unreadable snapshots: {}",
            listing.unreadable.len(),
            listing.unreadable.join(", ")
        );
    }
    listing.records
}

fn sort_newest_first(snapshots: &mut [Snapshot]) {
    snapshots.sort_by_key(|s| std::cmp::Reverse(s.order_key()));
}
