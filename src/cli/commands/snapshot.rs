//! Snapshot timeline commands

use anyhow::{Context, Result};
use editvault_snapshot::{Snapshot, SnapshotStatus, Workspace};
use std::path::Path;

use super::{confirm, format_millis};
use crate::cli::args::{SnapshotAction, StatusArg};
use crate::config::EditvaultConfig;
use crate::session::Session;

impl From<StatusArg> for SnapshotStatus {
    fn from(status: StatusArg) -> Self {
        match status {
            StatusArg::Working => SnapshotStatus::Working,
            StatusArg::Broken => SnapshotStatus::Broken,
            StatusArg::Testing => SnapshotStatus::Testing,
        }
    }
}

/// Execute snapshot command
pub async fn handle_snapshot_command(
    action: &SnapshotAction,
    session: &Session,
    config: &EditvaultConfig,
) -> Result<()> {
    let manager = session.snapshots();

    match action {
        SnapshotAction::Save {
            label,
            status,
            milestone,
            auto,
        } => {
            let workspace = load_workspace(session, config).await?;
            if workspace.is_empty() {
                anyhow::bail!(
                    "Workspace {} has no readable files",
                    config.snapshots.workspace_dir.display()
                );
            }

            let mut draft = workspace
                .to_draft(label.clone().unwrap_or_default())
                .with_status((*status).into());
            if *milestone {
                draft = draft.milestone();
            }
            if *auto {
                draft = draft.auto_save();
            }

            let snapshot = manager.save_snapshot(draft).await?;
            println!("✅ Saved {} '{}'", snapshot.id, snapshot.label);
            println!(
                "   {} files, {} bytes ({:.1}% saved by compression)",
                snapshot.files.len(),
                snapshot.original_size,
                snapshot.compression_ratio()
            );
        }

        SnapshotAction::List { json } => {
            let snapshots = manager.get_all_snapshots().await?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&snapshots)?);
            } else if snapshots.is_empty() {
                println!("No snapshots yet");
            } else {
                for snapshot in &snapshots {
                    print_summary(snapshot);
                }
            }
        }

        SnapshotAction::Show { id, content } => {
            let snapshot = manager
                .get_snapshot(id)
                .await?
                .with_context(|| format!("Snapshot not found: {}", id))?;
            print_summary(&snapshot);
            println!("   Created: {}", format_millis(snapshot.timestamp));
            println!(
                "   Size: {} bytes, {} compressed",
                snapshot.original_size, snapshot.compressed_size
            );
            for (path, text) in &snapshot.files {
                println!("   - {} ({} bytes)", path, text.len());
                if *content {
                    println!("{}", text);
                }
            }
        }

        SnapshotAction::Restore { id } => {
            let previous = load_workspace(session, config).await?;
            let target = manager.restore_snapshot(id).await?;
            apply_snapshot(session, config, &target, &previous).await?;
        }

        SnapshotAction::Delete { id } => {
            manager.delete_snapshot(id).await?;
            println!("🗑️  Deleted {}", id);
        }

        SnapshotAction::LastWorking { restore } => {
            match manager.get_last_working_snapshot().await? {
                Some(snapshot) => {
                    print_summary(&snapshot);
                    if *restore {
                        let previous = load_workspace(session, config).await?;
                        let target = manager.restore_snapshot(&snapshot.id).await?;
                        apply_snapshot(session, config, &target, &previous).await?;
                    }
                }
                None => println!("No snapshot is marked working"),
            }
        }

        SnapshotAction::Milestones => {
            let milestones = manager.get_milestones().await?;
            if milestones.is_empty() {
                println!("No milestones yet");
            }
            for snapshot in &milestones {
                print_summary(snapshot);
            }
        }

        SnapshotAction::Export { output } => {
            let bundle = manager.export_snapshots().await?;
            match output {
                Some(path) => {
                    std::fs::write(path, &bundle)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("📦 Exported timeline to {}", path.display());
                }
                None => println!("{}", bundle),
            }
        }

        SnapshotAction::Import { input } => {
            let data = std::fs::read_to_string(input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let imported = manager.import_snapshots(&data).await?;
            println!("✅ Imported {} snapshots", imported);
        }

        SnapshotAction::Stats => {
            let stats = manager.stats().await?;
            let limits = manager.limits();
            println!("📊 Snapshot statistics");
            println!("   Total: {}", stats.total);
            println!("   Milestones: {}", stats.milestones);
            println!(
                "   Auto-saves: {} (cap {})",
                stats.auto_saves, limits.max_auto_saves
            );
            println!(
                "   Non-milestone cap: {}",
                limits.max_snapshots
            );
            println!(
                "   Status: {} working, {} broken, {} testing",
                stats.working, stats.broken, stats.testing
            );
            println!(
                "   Content: {} bytes, {} compressed",
                stats.original_bytes, stats.compressed_bytes
            );
            if stats.unreadable > 0 {
                println!("   Unreadable: {} (skipped)", stats.unreadable);
            }
            if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
                println!(
                    "   Span: {} .. {}",
                    format_millis(oldest),
                    format_millis(newest)
                );
            }
        }

        SnapshotAction::Reset { yes } => {
            println!("⚠️  Warning: This will delete ALL snapshots, milestones included");
            if !yes && !confirm("Continue?")? {
                println!("   Aborted");
                return Ok(());
            }
            let removed = manager.clear_all().await?;
            println!("✅ Removed {} snapshots", removed);
        }
    }

    Ok(())
}

fn print_summary(snapshot: &Snapshot) {
    let mut tags = Vec::new();
    if snapshot.is_milestone {
        tags.push("milestone");
    }
    if snapshot.auto_save {
        tags.push("auto");
    }
    let tags = if tags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", tags.join(", "))
    };

    println!(
        "{}  {:<8} {}{}",
        snapshot.id,
        snapshot.status.as_str(),
        snapshot.label,
        tags
    );
}

/// Read the workspace directory into the session.
async fn load_workspace(session: &Session, config: &EditvaultConfig) -> Result<Workspace> {
    let dir = &config.snapshots.workspace_dir;
    let workspace = Workspace::from_dir(dir, config.snapshots.main_file.as_deref())
        .with_context(|| format!("Failed to read workspace {}", dir.display()))?;
    session.set_workspace(workspace.clone()).await;
    Ok(workspace)
}

/// Load `target` into the live workspace and make the directory match it.
async fn apply_snapshot(
    session: &Session,
    config: &EditvaultConfig,
    target: &Snapshot,
    previous: &Workspace,
) -> Result<()> {
    let dir: &Path = &config.snapshots.workspace_dir;
    let workspace = {
        let mut live = session.workspace().write().await;
        live.load_snapshot(target);
        live.clone()
    };

    let sync = workspace
        .replace_in_dir(dir, previous)
        .with_context(|| format!("Failed to write workspace {}", dir.display()))?;
    println!(
        "♻️  Restored '{}' ({} files written, {} removed in {})",
        target.label,
        sync.written,
        sync.removed,
        dir.display()
    );
    println!("   The previous state was saved as a testing snapshot");
    Ok(())
}
