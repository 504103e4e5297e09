//! Crash recovery commands

use anyhow::{Context, Result};

use super::format_millis;
use crate::cli::args::RecoverAction;
use crate::config::EditvaultConfig;
use crate::session::Session;

pub async fn handle_recover_command(
    action: &RecoverAction,
    session: &Session,
    config: &EditvaultConfig,
) -> Result<()> {
    let slot = session.recovery();

    match action {
        RecoverAction::Show => match slot.peek().await? {
            Some(record) => {
                println!("Captured: {}", format_millis(record.captured_at));
                println!("Reason: {}", record.reason);
                if let Some(main) = &record.workspace.main_path {
                    println!("Main file: {}", main);
                }
                for (path, content) in &record.workspace.files {
                    println!("   - {} ({} bytes)", path, content.len());
                }
            }
            None => println!("Nothing to recover"),
        },

        RecoverAction::Restore => {
            let Some(record) = slot.peek().await? else {
                println!("Nothing to recover");
                return Ok(());
            };
            let dir = &config.snapshots.workspace_dir;
            let written = record
                .workspace
                .write_to_dir(dir)
                .with_context(|| format!("Failed to write workspace {}", dir.display()))?;
            // only empty the slot once the files are safely on disk
            slot.take().await?;
            session.set_workspace(record.workspace).await;
            println!("♻️  Recovered {} files into {}", written, dir.display());
        }

        RecoverAction::Discard => {
            if slot.discard().await? {
                println!("🗑️  Discarded preserved workspace");
            } else {
                println!("Nothing to recover");
            }
        }
    }

    Ok(())
}
