use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use editvault_store::Store;

use crate::assistant::{Assistant, HttpAssistant, HttpTransport, MockAssistant};
use crate::cli::args::{Args, Commands};
use crate::cli::commands::{
    handle_cache_command, handle_chat_command, handle_queue_command, handle_recover_command,
    handle_snapshot_command,
};
use crate::config::EditvaultConfig;
use crate::session::Session;

pub struct RootCommand;

impl RootCommand {
    pub async fn execute() -> Result<()> {
        let args = Args::parse();
        init_logging(args.verbosity);

        if args.generate_config {
            print!("{}", EditvaultConfig::generate_default_config());
            return Ok(());
        }

        let Some(command) = &args.command else {
            Args::command().print_help()?;
            return Ok(());
        };

        let env_vars: HashMap<String, String> = std::env::vars().collect();
        let config = EditvaultConfig::load_with_precedence(args.config.clone(), &args, &env_vars)?;

        let session = open_session(&config).await?;

        if !matches!(command, Commands::Recover { .. }) {
            if let Some(record) = session.pending_recovery().await {
                eprintln!(
                    "⚠️  A workspace from a failed run was preserved ({} files): {}",
                    record.workspace.files.len(),
                    record.reason
                );
                eprintln!("   Run `editvault recover show` to inspect it.");
            }
        }

        let result = session.guard(dispatch(command, &session, &config)).await;
        session.close().await;
        result
    }
}

async fn dispatch(command: &Commands, session: &Session, config: &EditvaultConfig) -> Result<()> {
    match command {
        Commands::Snapshot { action } => handle_snapshot_command(action, session, config).await,
        Commands::Cache { action } => handle_cache_command(action, session, config).await,
        Commands::Queue { action } => handle_queue_command(action, session).await,
        Commands::Chat {
            message,
            context,
            context_file,
            system,
        } => {
            let context = match (context, context_file) {
                (Some(text), _) => text.clone(),
                (None, Some(path)) => std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read context file {}", path.display()))?,
                (None, None) => String::new(),
            };
            handle_chat_command(message, &context, system.as_deref(), session).await
        }
        Commands::Recover { action } => handle_recover_command(action, session, config).await,
    }
}

/// `RUST_LOG` wins; otherwise `-v` raises the level step by step.
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn open_store(config: &EditvaultConfig) -> Store {
    if config.storage.memory_only {
        tracing::info!("Running with in-memory storage");
        Store::memory()
    } else {
        Store::open_or_memory(&config.storage.data_dir).await
    }
}

async fn open_session(config: &EditvaultConfig) -> Result<Session> {
    let store = open_store(config).await;
    let timeout = Duration::from_secs(config.assistant.timeout_secs);
    let api_key = config.assistant.api_key();

    let transport = Arc::new(
        HttpTransport::new(timeout, api_key.clone()).context("Failed to build HTTP client")?,
    );

    let assistant: Arc<dyn Assistant> = if config.assistant.mock {
        Arc::new(MockAssistant::new())
    } else if config.assistant.endpoint.trim().is_empty() {
        tracing::warn!("No assistant endpoint configured, using the fallback assistant");
        Arc::new(MockAssistant::fallback())
    } else {
        let http = HttpTransport::new(timeout, api_key).context("Failed to build HTTP client")?;
        Arc::new(HttpAssistant::new(
            config.assistant.endpoint.clone(),
            config.assistant.model.clone(),
            http,
        ))
    };

    Session::open(store, config, assistant, transport).await
}
