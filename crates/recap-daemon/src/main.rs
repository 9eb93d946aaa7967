//! Recap
//!
//! Incremental conversational-memory summarization engine.
//!
//! # Usage
//!
//! ```bash
//! recap process --thread t1 --user-text "..." --assistant-text "..."
//! recap digest t1
//! recap show t1 [--json]
//! recap events t1
//! recap stats
//! recap reconcile t1
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/recap/config.toml)
//! 3. Environment variables (RECAP_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use recap_daemon::{
    handle_digest, handle_events, handle_process, handle_reconcile, handle_show, handle_stats,
    Cli, Commands,
};
use recap_types::RecapConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = RecapConfig::load(cli.config.as_deref())?;
    if let Some(log_level) = &cli.log_level {
        config.log_level = log_level.clone();
    }
    if let Some(db_path) = &cli.db_path {
        config.db_path = db_path.clone();
    }

    init_tracing(&config.log_level);

    match cli.command {
        Commands::Process {
            thread,
            user_text,
            assistant_text,
            assistant_id,
        } => {
            handle_process(&config, &thread, &user_text, &assistant_text, assistant_id).await?;
        }
        Commands::Digest { thread } => {
            handle_digest(&config, &thread)?;
        }
        Commands::Show { thread, json } => {
            handle_show(&config, &thread, json)?;
        }
        Commands::Events { thread } => {
            handle_events(&config, &thread)?;
        }
        Commands::Stats => {
            handle_stats(&config)?;
        }
        Commands::Reconcile { thread } => {
            handle_reconcile(&config, &thread)?;
        }
    }

    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
