//! Extraction client: typed interface to the extraction oracle.
//!
//! Converts one message pair plus the active template into a
//! [`recap_types::Candidate`] or an explicit failure. Partial candidates
//! (sections absent) are valid; malformed output is always reported as a
//! failure, never silently coerced.

mod api;
mod mock;

pub use api::{ApiExtractor, ApiExtractorConfig};
pub use mock::MockExtractor;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use recap_types::Candidate;

/// Error type for extraction operations.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("API request failed: {0}")]
    Api(String),

    #[error("Failed to parse extraction output: {0}")]
    Parse(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Timeout waiting for response")]
    Timeout,
}

/// The active extraction template.
///
/// Carries the instruction text and model configuration. Where the
/// template comes from (settings storage, defaults) is the template
/// provider's concern; the extractor only consumes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionTemplate {
    /// Instruction text prepended to the message pair
    pub instructions: String,

    /// Model to use (e.g. "gpt-4o-mini", "claude-3-haiku-20240307")
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Output token cap
    pub max_output_tokens: u32,
}

impl ExtractionTemplate {
    pub fn new(instructions: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            model: model.into(),
            temperature: 0.2,
            max_output_tokens: 1024,
        }
    }
}

/// Pluggable extraction oracle client.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract a structured candidate from one message pair.
    ///
    /// Returns `Ok` only for a well-formed candidate; anything else is an
    /// explicit [`ExtractionError`].
    async fn extract(
        &self,
        user_text: &str,
        assistant_text: &str,
        template: &ExtractionTemplate,
    ) -> Result<Candidate, ExtractionError>;
}
