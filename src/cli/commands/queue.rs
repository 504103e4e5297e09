//! Offline queue commands

use anyhow::Result;
use editvault_queue::ReplayTrigger;

use super::{confirm, format_millis};
use crate::cli::args::{QueueAction, TriggerArg};
use crate::session::Session;

impl From<TriggerArg> for ReplayTrigger {
    fn from(trigger: TriggerArg) -> Self {
        match trigger {
            TriggerArg::UserRetry => ReplayTrigger::UserRetry,
            TriggerArg::ConnectivityRestored => ReplayTrigger::ConnectivityRestored,
        }
    }
}

pub async fn handle_queue_command(action: &QueueAction, session: &Session) -> Result<()> {
    let queue = session.queue();

    match action {
        QueueAction::List => {
            let items = queue.list().await?;
            if items.is_empty() {
                println!("Offline queue is empty");
            }
            for item in &items {
                println!(
                    "{}  {} {}  ({} bytes, {} attempts)",
                    item.id,
                    item.request.method,
                    item.request.url,
                    item.request.body_len(),
                    item.attempts
                );
                if let Some(error) = &item.last_error {
                    println!("   last error: {}", error);
                }
            }
        }

        QueueAction::Replay { trigger } => {
            let report = session.replay((*trigger).into()).await?;
            if report.attempted == 0 && report.unreadable.is_empty() {
                println!("Nothing to replay");
                return Ok(());
            }
            println!("🔁 Replay ({})", report.trigger);
            println!("   Attempted: {}", report.attempted);
            println!("   Delivered: {}", report.delivered.len());
            for id in &report.failed {
                println!("   Still queued: {}", id);
            }
            for id in &report.unreadable {
                println!("   Unreadable, skipped: {}", id);
            }
            println!("   Remaining: {}", report.remaining);
        }

        QueueAction::Clear { yes } => {
            let depth = queue.depth().await?;
            if depth == 0 {
                println!("Offline queue is empty");
                return Ok(());
            }
            println!("⚠️  Warning: {} queued requests will never be sent", depth);
            if !yes && !confirm("Continue?")? {
                println!("   Aborted");
                return Ok(());
            }
            let removed = queue.clear().await?;
            println!("✅ Removed {} requests", removed);
        }

        QueueAction::Lost => {
            let lost = queue.lost().await?;
            if lost.is_empty() {
                println!("No requests were dropped");
            }
            for record in &lost {
                println!(
                    "{}  {} {}  (dropped {})",
                    record.id,
                    record.method,
                    record.url,
                    format_millis(record.evicted_at)
                );
            }
        }
    }

    Ok(())
}
