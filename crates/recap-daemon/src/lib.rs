//! CLI surface for the recap engine.
//!
//! Exposes a `recap` binary for local operation and inspection: feed a
//! turn through the full pipeline, read digests, dump summaries and the
//! event log, and run admin tasks (stats, digest reconciliation).

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands};
pub use commands::{
    handle_digest, handle_events, handle_process, handle_reconcile, handle_show, handle_stats,
};
