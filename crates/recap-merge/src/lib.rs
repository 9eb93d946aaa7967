//! Pure merge and digest logic for thread summaries.
//!
//! Both entry points are deterministic, side-effect-free functions:
//! - [`merge_with`] folds one extracted [`recap_types::Candidate`] into a
//!   [`recap_types::ThreadSummary`] under the per-field policy
//! - [`digest::compile_with`] renders the bounded text digest
//!
//! Neither function touches `version`, `digest_text` (merge), or
//! `last_processed_message_id`; the pipeline orchestrator finalizes those.

pub mod digest;
pub mod merge;

pub use digest::{compile, compile_with, DigestOptions};
pub use merge::{merge, merge_with, MergeOptions};
