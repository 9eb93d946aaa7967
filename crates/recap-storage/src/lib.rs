//! Durable storage for thread summaries and the summary event log.
//!
//! Provides:
//! - One versioned summary row per thread with compare-and-set saves
//! - An append-only event log keyed by (thread, time)
//! - Idempotency lookups against the last processed message id

pub mod column_families;
pub mod db;
pub mod error;
pub mod keys;

pub use db::{StoreStats, SummaryStore};
pub use error::StoreError;
