//! Shared harness for recap end-to-end tests.

use std::sync::Arc;

use tempfile::TempDir;

use recap_extraction::{ExtractionTemplate, MockExtractor};
use recap_pipeline::{InMemoryConversations, Pipeline, ProcessRequest, StaticTemplates};
use recap_storage::SummaryStore;

/// A store plus the collaborators every scenario needs.
pub struct TestHarness {
    pub store: Arc<SummaryStore>,
    pub conversations: Arc<InMemoryConversations>,
    _temp: TempDir,
}

impl TestHarness {
    /// Create a harness over a fresh temp-dir store.
    pub fn new() -> Self {
        let temp = TempDir::new().expect("temp dir");
        let store = Arc::new(SummaryStore::open(temp.path()).expect("open store"));
        Self {
            store,
            conversations: Arc::new(InMemoryConversations::new()),
            _temp: temp,
        }
    }

    /// Build a pipeline over this harness with the given scripted
    /// extractor.
    pub fn pipeline(&self, extractor: MockExtractor) -> Arc<Pipeline> {
        Arc::new(Pipeline::new(
            self.store.clone(),
            self.conversations.clone(),
            Arc::new(StaticTemplates::new(test_template())),
            Arc::new(extractor),
        ))
    }

    /// Store a message pair and return a process request for it.
    pub fn seed_turn(&self, thread_id: &str, user_text: &str, assistant_text: &str) -> ProcessRequest {
        let user_id = ulid::Ulid::new().to_string();
        let assistant_id = ulid::Ulid::new().to_string();
        self.conversations.insert(&user_id, user_text);
        self.conversations.insert(&assistant_id, assistant_text);
        ProcessRequest::new(thread_id, user_id, assistant_id)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Template used by every scenario.
pub fn test_template() -> ExtractionTemplate {
    ExtractionTemplate::new("extract structured facts as JSON", "mock-model")
}
