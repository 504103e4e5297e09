pub mod cache;
pub mod chat;
pub mod queue;
pub mod recover;
pub mod snapshot;

pub use cache::handle_cache_command;
pub use chat::handle_chat_command;
pub use queue::handle_queue_command;
pub use recover::handle_recover_command;
pub use snapshot::handle_snapshot_command;

use anyhow::Result;
use std::io::{self, Write};

/// Ask a yes/no question on stdin; anything but `y` declines.
pub(crate) fn confirm(prompt: &str) -> Result<bool> {
    print!("   {} [y/N]: ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// Render epoch milliseconds as UTC text.
pub(crate) fn format_millis(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| millis.to_string())
}
