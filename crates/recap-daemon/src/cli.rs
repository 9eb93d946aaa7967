//! CLI argument parsing for the recap binary.

use clap::{Parser, Subcommand};

/// Recap
///
/// Incremental conversational-memory summarization: processes one turn
/// at a time into a versioned, merged summary per thread.
#[derive(Parser, Debug)]
#[command(name = "recap")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/recap/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override database path
    #[arg(long, global = true)]
    pub db_path: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Recap commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process one turn through the full pipeline
    Process {
        /// Thread to merge into
        #[arg(short, long)]
        thread: String,

        /// Text of the user message
        #[arg(long)]
        user_text: String,

        /// Text of the assistant reply
        #[arg(long)]
        assistant_text: String,

        /// Explicit assistant message id (generated if omitted). Reusing
        /// an id demonstrates the idempotent no-op path.
        #[arg(long)]
        assistant_id: Option<String>,
    },

    /// Print the current digest for a thread
    Digest {
        /// Thread to read
        thread: String,
    },

    /// Print the full summary for a thread
    Show {
        /// Thread to read
        thread: String,

        /// Emit raw JSON instead of a readable rendering
        #[arg(long)]
        json: bool,
    },

    /// List the event log for a thread
    Events {
        /// Thread to read
        thread: String,
    },

    /// Show store statistics
    Stats,

    /// Recompute a thread's digest from its structured fields and rewrite
    /// it if it drifted
    Reconcile {
        /// Thread to reconcile
        thread: String,
    },
}
