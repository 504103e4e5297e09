use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = None
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory of the durable store
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Keep all state in memory for this run
    #[arg(long, global = true)]
    pub memory: bool,

    /// Workspace directory captured by snapshots
    #[arg(short, long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Primary file of the workspace, relative to it
    #[arg(long, global = true)]
    pub main_file: Option<String>,

    /// Answer chat requests with the built-in mock assistant
    #[arg(long, global = true)]
    pub mock: bool,

    /// Bypass the response cache
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Print the default configuration and exit
    #[arg(long)]
    pub generate_config: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage workspace snapshots
    Snapshot {
        #[command(subcommand)]
        action: SnapshotAction,
    },
    /// Manage the response cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Inspect and replay the offline request queue
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
    /// Ask the assistant (served from cache when possible)
    Chat {
        /// The question
        message: String,

        /// Free-form context sent with the question
        #[arg(long)]
        context: Option<String>,

        /// Read the context from a file
        #[arg(long, conflicts_with = "context")]
        context_file: Option<PathBuf>,

        /// System instruction prepended to the conversation
        #[arg(long)]
        system: Option<String>,
    },
    /// Inspect the workspace preserved by a failed run
    Recover {
        #[command(subcommand)]
        action: RecoverAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum SnapshotAction {
    /// Snapshot the workspace directory
    Save {
        /// Label (generated when omitted)
        #[arg(short, long)]
        label: Option<String>,

        #[arg(short, long, value_enum, default_value_t = StatusArg::Working)]
        status: StatusArg,

        /// Exempt from count-based eviction
        #[arg(long)]
        milestone: bool,

        /// Mark as an automatic save (tighter retention)
        #[arg(long, conflicts_with = "milestone")]
        auto: bool,
    },
    /// List snapshots, newest first
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show one snapshot
    Show {
        id: String,

        /// Print file contents
        #[arg(long)]
        content: bool,
    },
    /// Restore a snapshot into the workspace directory
    Restore {
        id: String,
    },
    /// Delete a snapshot
    Delete {
        id: String,
    },
    /// Show the newest snapshot marked working
    LastWorking {
        /// Restore it into the workspace directory
        #[arg(long)]
        restore: bool,
    },
    /// List milestone snapshots
    Milestones,
    /// Export all snapshots as JSON
    Export {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Import snapshots from an export bundle
    Import {
        input: PathBuf,
    },
    /// Snapshot counts and sizes
    Stats,
    /// Delete every snapshot
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusArg {
    Working,
    Broken,
    Testing,
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show cache statistics
    Stats,
    /// Remove every cached response
    Clear {
        #[arg(short, long)]
        yes: bool,
    },
    /// Remove stale cached responses
    Prune {
        /// Override max age in days
        #[arg(long)]
        max_age: Option<usize>,

        /// Override max idle days
        #[arg(long)]
        max_idle: Option<usize>,

        /// Keep at most this many entries
        #[arg(long)]
        max_entries: Option<usize>,
    },
}

#[derive(Subcommand, Debug)]
pub enum QueueAction {
    /// List queued requests, oldest first
    List,
    /// Attempt every queued request once
    Replay {
        #[arg(long, value_enum, default_value_t = TriggerArg::UserRetry)]
        trigger: TriggerArg,
    },
    /// Drop every queued request
    Clear {
        #[arg(short, long)]
        yes: bool,
    },
    /// Requests dropped because the queue was full
    Lost,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerArg {
    UserRetry,
    ConnectivityRestored,
}

#[derive(Subcommand, Debug)]
pub enum RecoverAction {
    /// Show the preserved workspace
    Show,
    /// Write the preserved workspace into the workspace directory and clear it
    Restore,
    /// Throw the preserved workspace away
    Discard,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_snapshot_save() {
        let args = Args::parse_from([
            "editvault", "-vv", "snapshot", "save", "-l", "green", "--status", "broken", "--milestone",
        ]);
        assert_eq!(args.verbosity, 2);
        match args.command {
            Some(Commands::Snapshot {
                action: SnapshotAction::Save { label, status, milestone, auto },
            }) => {
                assert_eq!(label.as_deref(), Some("green"));
                assert_eq!(status, StatusArg::Broken);
                assert!(milestone);
                assert!(!auto);
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_milestone_and_auto_conflict() {
        let result = Args::try_parse_from(["editvault", "snapshot", "save", "--milestone", "--auto"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::parse_from(["editvault", "queue", "replay", "--data-dir", "/tmp/v", "--trigger", "connectivity-restored"]);
        assert_eq!(args.data_dir, Some(PathBuf::from("/tmp/v")));
        assert!(matches!(
            args.command,
            Some(Commands::Queue {
                action: QueueAction::Replay { trigger: TriggerArg::ConnectivityRestored }
            })
        ));
    }
}
