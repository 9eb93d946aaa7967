//! Pipeline error taxonomy.

use thiserror::Error;

use recap_extraction::ExtractionError;
use recap_storage::StoreError;

/// Errors surfaced by one `process_turn` invocation.
///
/// Input-validation failures are rejected before any event is logged;
/// every other variant leaves an `error` event in the audit log (storage
/// failures permitting).
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing or empty turn text, or malformed identifiers. Rejected
    /// synchronously, never logged as a summary event.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No active extraction template is configured. Fatal for the call.
    #[error("no active extraction template")]
    MissingTemplate,

    /// The extraction oracle failed or returned malformed output. The
    /// summary is left unchanged.
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    /// A collaborator (conversation store, template provider) failed.
    #[error("collaborator error: {0}")]
    Collaborator(String),

    /// Version conflicts persisted past the retry bound.
    #[error("gave up after {attempts} version-conflict retries")]
    ConflictRetriesExhausted {
        /// Save attempts made before giving up
        attempts: u32,
    },

    /// The store failed. Transient; the caller may retry the whole call
    /// safely thanks to the idempotency check.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}
