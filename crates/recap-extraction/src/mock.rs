//! Mock extractor for testing.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use recap_types::Candidate;

use super::{ExtractionError, ExtractionTemplate, Extractor};

/// Scripted extractor that returns queued responses in order.
///
/// Useful for testing the pipeline without making API calls. When the
/// script is exhausted, further calls return an empty candidate.
#[derive(Default)]
pub struct MockExtractor {
    script: Mutex<VecDeque<Result<Candidate, ExtractionError>>>,
}

impl MockExtractor {
    /// Create a mock with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a candidate to return on the next unscripted call.
    pub fn enqueue(self, candidate: Candidate) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(Ok(candidate));
        self
    }

    /// Queue a failure to return on the next unscripted call.
    pub fn enqueue_failure(self, message: impl Into<String>) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(Err(ExtractionError::Api(message.into())));
        self
    }
}

#[async_trait]
impl Extractor for MockExtractor {
    async fn extract(
        &self,
        _user_text: &str,
        _assistant_text: &str,
        _template: &ExtractionTemplate,
    ) -> Result<Candidate, ExtractionError> {
        let next = self
            .script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();

        match next {
            Some(result) => result,
            None => Ok(Candidate::default()),
        }
    }
}
