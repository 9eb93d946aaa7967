//! The per-turn processing pipeline.
//!
//! One invocation moves through: input validation -> summary load ->
//! idempotency check -> extraction -> merge -> digest -> compare-and-set
//! save -> event log. The extraction call is the only I/O-bound
//! suspension point and holds no store lock; the summary is read before
//! it and written after.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use recap_extraction::Extractor;
use recap_merge::{compile_with, merge_with, DigestOptions, MergeOptions};
use recap_storage::{StoreError, SummaryStore};
use recap_types::{SummaryEvent, SummaryEventType, ThreadSummary};

use crate::contracts::{ConversationStore, TemplateProvider};
use crate::error::PipelineError;

/// Save attempts per invocation before a version conflict is surfaced.
const MAX_SAVE_ATTEMPTS: u32 = 3;

/// One turn to process: a thread plus the user/assistant message pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    /// Thread the turn belongs to
    pub thread_id: String,
    /// Id of the user message
    pub user_message_id: String,
    /// Id of the assistant reply; doubles as the idempotency key
    pub assistant_message_id: String,
}

impl ProcessRequest {
    pub fn new(
        thread_id: impl Into<String>,
        user_message_id: impl Into<String>,
        assistant_message_id: impl Into<String>,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            user_message_id: user_message_id.into(),
            assistant_message_id: assistant_message_id.into(),
        }
    }
}

/// Result of a successful `process_turn` call.
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    /// The summary was merged and persisted at a new version.
    Updated(ThreadSummary),
    /// The turn was already processed; the stored summary is returned
    /// unchanged and nothing was logged.
    Unchanged(ThreadSummary),
}

impl ProcessOutcome {
    /// The summary, whether freshly updated or unchanged.
    pub fn summary(&self) -> &ThreadSummary {
        match self {
            ProcessOutcome::Updated(summary) => summary,
            ProcessOutcome::Unchanged(summary) => summary,
        }
    }
}

/// The pipeline orchestrator.
///
/// Collaborators are injected per construction; the pipeline owns no
/// global state and is safe to share behind an `Arc`.
pub struct Pipeline {
    store: Arc<SummaryStore>,
    conversations: Arc<dyn ConversationStore>,
    templates: Arc<dyn TemplateProvider>,
    extractor: Arc<dyn Extractor>,
    merge_options: MergeOptions,
    digest_options: DigestOptions,
}

impl Pipeline {
    /// Create a pipeline with default merge and digest options.
    pub fn new(
        store: Arc<SummaryStore>,
        conversations: Arc<dyn ConversationStore>,
        templates: Arc<dyn TemplateProvider>,
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        Self::with_options(
            store,
            conversations,
            templates,
            extractor,
            MergeOptions::default(),
            DigestOptions::default(),
        )
    }

    /// Create a pipeline with explicit merge and digest options.
    pub fn with_options(
        store: Arc<SummaryStore>,
        conversations: Arc<dyn ConversationStore>,
        templates: Arc<dyn TemplateProvider>,
        extractor: Arc<dyn Extractor>,
        merge_options: MergeOptions,
        digest_options: DigestOptions,
    ) -> Self {
        Self {
            store,
            conversations,
            templates,
            extractor,
            merge_options,
            digest_options,
        }
    }

    /// Process one completed turn.
    ///
    /// Duplicate requests (same assistant message id as the last
    /// processed one) are free and safe: they return the stored summary
    /// unchanged and log nothing.
    pub async fn process_turn(
        &self,
        request: &ProcessRequest,
    ) -> Result<ProcessOutcome, PipelineError> {
        if request.thread_id.trim().is_empty() {
            return Err(PipelineError::InvalidInput("thread_id is empty".to_string()));
        }

        let user_text = self.require_text(&request.user_message_id, "user").await?;
        let assistant_text = self
            .require_text(&request.assistant_message_id, "assistant")
            .await?;

        let mut current = self.store.get_or_create(&request.thread_id)?;

        if self
            .store
            .is_already_processed(&request.thread_id, &request.assistant_message_id)?
        {
            debug!(
                thread_id = %request.thread_id,
                message_id = %request.assistant_message_id,
                "Turn already processed, returning summary unchanged"
            );
            return Ok(ProcessOutcome::Unchanged(current));
        }

        let template = match self.templates.active_template().await {
            Ok(Some(template)) => template,
            Ok(None) => {
                self.log_error_event(request, current.version, "no active extraction template");
                return Err(PipelineError::MissingTemplate);
            }
            Err(e) => return Err(PipelineError::Collaborator(e.to_string())),
        };

        let candidate = match self
            .extractor
            .extract(&user_text, &assistant_text, &template)
            .await
        {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!(
                    thread_id = %request.thread_id,
                    error = %e,
                    "Extraction failed, summary left unchanged"
                );
                self.log_error_event(request, current.version, &format!("extraction failed: {}", e));
                return Err(e.into());
            }
        };

        let mut attempts = 0u32;
        loop {
            attempts += 1;

            let mut next = merge_with(
                &current,
                &candidate,
                &request.assistant_message_id,
                Utc::now(),
                &self.merge_options,
            );
            next.digest_text = Some(compile_with(&next, &self.digest_options));
            next.last_processed_message_id = Some(request.assistant_message_id.clone());

            let expected = current.version;
            match self.store.save(&next, expected) {
                Ok(saved) => {
                    let event_type = if expected == 0 {
                        SummaryEventType::Created
                    } else {
                        SummaryEventType::Updated
                    };
                    let details = saved
                        .deltas
                        .back()
                        .map(|d| d.details.clone())
                        .unwrap_or_default();
                    self.append_event_or_warn(SummaryEvent::new(
                        &request.thread_id,
                        event_type,
                        expected,
                        saved.version,
                        details,
                        vec![
                            request.user_message_id.clone(),
                            request.assistant_message_id.clone(),
                        ],
                    ));
                    info!(
                        thread_id = %request.thread_id,
                        version = saved.version,
                        event = %event_type,
                        "Summary persisted"
                    );
                    return Ok(ProcessOutcome::Updated(saved));
                }
                Err(StoreError::VersionConflict { actual, .. }) => {
                    if attempts >= MAX_SAVE_ATTEMPTS {
                        self.log_error_event(
                            request,
                            actual,
                            &format!("version conflicts exhausted after {} attempts", attempts),
                        );
                        return Err(PipelineError::ConflictRetriesExhausted { attempts });
                    }
                    debug!(
                        thread_id = %request.thread_id,
                        attempt = attempts,
                        "Version conflict, reloading and re-merging"
                    );
                    current = self.store.get_or_create(&request.thread_id)?;
                    // The racing writer may have been a duplicate of this
                    // very turn; re-check before re-merging.
                    if current.last_processed_message_id.as_deref()
                        == Some(request.assistant_message_id.as_str())
                    {
                        return Ok(ProcessOutcome::Unchanged(current));
                    }
                }
                Err(e) => return Err(PipelineError::Store(e)),
            }
        }
    }

    /// Digest read path for the digest consumer. Returns `None` when no
    /// summary exists for the thread yet.
    pub fn digest(&self, thread_id: &str) -> Result<Option<String>, PipelineError> {
        Ok(self.store.get(thread_id)?.and_then(|s| s.digest_text))
    }

    /// Recompute the digest from the stored structured fields and rewrite
    /// it if it drifted (e.g. after a digest-options change). Logs a
    /// `reconcile` event when a rewrite happens.
    pub fn reconcile_digest(
        &self,
        thread_id: &str,
    ) -> Result<Option<ThreadSummary>, PipelineError> {
        let Some(mut current) = self.store.get(thread_id)? else {
            return Ok(None);
        };

        let mut attempts = 0u32;
        loop {
            let expected_digest = compile_with(&current, &self.digest_options);
            if current.digest_text.as_deref() == Some(expected_digest.as_str()) {
                return Ok(Some(current));
            }

            attempts += 1;
            let mut next = current.clone();
            next.digest_text = Some(expected_digest);

            match self.store.save(&next, current.version) {
                Ok(saved) => {
                    self.append_event_or_warn(SummaryEvent::new(
                        thread_id,
                        SummaryEventType::Reconcile,
                        current.version,
                        saved.version,
                        "digest recompiled",
                        Vec::new(),
                    ));
                    info!(thread_id = %thread_id, version = saved.version, "Digest reconciled");
                    return Ok(Some(saved));
                }
                Err(StoreError::VersionConflict { .. }) if attempts < MAX_SAVE_ATTEMPTS => {
                    let Some(reloaded) = self.store.get(thread_id)? else {
                        return Ok(None);
                    };
                    current = reloaded;
                }
                Err(StoreError::VersionConflict { .. }) => {
                    return Err(PipelineError::ConflictRetriesExhausted { attempts });
                }
                Err(e) => return Err(PipelineError::Store(e)),
            }
        }
    }

    async fn require_text(&self, message_id: &str, role: &str) -> Result<String, PipelineError> {
        if message_id.trim().is_empty() {
            return Err(PipelineError::InvalidInput(format!(
                "{} message id is empty",
                role
            )));
        }

        let text = self
            .conversations
            .message_text(message_id)
            .await
            .map_err(|e| PipelineError::Collaborator(e.to_string()))?
            .ok_or_else(|| {
                PipelineError::InvalidInput(format!("{} message {} not found", role, message_id))
            })?;

        if text.trim().is_empty() {
            return Err(PipelineError::InvalidInput(format!(
                "{} turn text is empty",
                role
            )));
        }

        Ok(text)
    }

    fn log_error_event(&self, request: &ProcessRequest, version: u64, details: &str) {
        self.append_event_or_warn(SummaryEvent::new(
            &request.thread_id,
            SummaryEventType::Error,
            version,
            version,
            details,
            vec![
                request.user_message_id.clone(),
                request.assistant_message_id.clone(),
            ],
        ));
    }

    /// Event logging is best-effort on failure paths: a broken event log
    /// must not mask the original outcome.
    fn append_event_or_warn(&self, event: SummaryEvent) {
        if let Err(e) = self.store.append_event(&event) {
            warn!(
                thread_id = %event.thread_id,
                error = %e,
                "Failed to append summary event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recap_extraction::{ExtractionTemplate, MockExtractor};
    use recap_types::{Candidate, FactValue};
    use tempfile::TempDir;

    use crate::contracts::{InMemoryConversations, StaticTemplates};

    struct Fixture {
        pipeline: Pipeline,
        store: Arc<SummaryStore>,
        conversations: Arc<InMemoryConversations>,
        _temp: TempDir,
    }

    fn fixture(extractor: MockExtractor) -> Fixture {
        fixture_with_templates(extractor, StaticTemplates::new(test_template()))
    }

    fn fixture_with_templates(extractor: MockExtractor, templates: StaticTemplates) -> Fixture {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(SummaryStore::open(temp.path()).unwrap());
        let conversations = Arc::new(InMemoryConversations::new());

        let pipeline = Pipeline::new(
            store.clone(),
            conversations.clone(),
            Arc::new(templates),
            Arc::new(extractor),
        );

        Fixture {
            pipeline,
            store,
            conversations,
            _temp: temp,
        }
    }

    fn test_template() -> ExtractionTemplate {
        ExtractionTemplate::new("extract structured facts", "mock-model")
    }

    fn seed_turn(fixture: &Fixture, suffix: &str, user_text: &str, assistant_text: &str) -> ProcessRequest {
        let user_id = format!("u-{}", suffix);
        let assistant_id = format!("a-{}", suffix);
        fixture.conversations.insert(&user_id, user_text);
        fixture.conversations.insert(&assistant_id, assistant_text);
        ProcessRequest::new("thread-1", user_id, assistant_id)
    }

    #[tokio::test]
    async fn test_first_turn_creates_summary_at_version_one() {
        let fixture = fixture(MockExtractor::new().enqueue(
            Candidate::default()
                .with_goal("ship v1")
                .with_fact("budget", FactValue::text("$500")),
        ));
        let request = seed_turn(&fixture, "1", "what's our plan?", "ship v1 with a $500 budget");

        let outcome = fixture.pipeline.process_turn(&request).await.unwrap();
        let summary = match outcome {
            ProcessOutcome::Updated(s) => s,
            other => panic!("expected Updated, got {:?}", other),
        };

        assert_eq!(summary.version, 1);
        assert_eq!(summary.goals, vec!["ship v1".to_string()]);
        assert_eq!(
            summary.facts["budget"].source_message_ids,
            vec![request.assistant_message_id.clone()]
        );
        assert_eq!(
            summary.last_processed_message_id.as_deref(),
            Some(request.assistant_message_id.as_str())
        );
        assert!(summary.digest_text.as_deref().unwrap().contains("ship v1"));

        let events = fixture.store.events_for_thread("thread-1").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, SummaryEventType::Created);
        assert_eq!(events[0].from_version, 0);
        assert_eq!(events[0].to_version, 1);
        assert_eq!(
            events[0].message_ids,
            vec![request.user_message_id.clone(), request.assistant_message_id.clone()]
        );
    }

    #[tokio::test]
    async fn test_second_turn_updates_fact_and_version() {
        let fixture = fixture(
            MockExtractor::new()
                .enqueue(Candidate::default().with_fact("budget", FactValue::text("$500")))
                .enqueue(Candidate::default().with_fact("budget", FactValue::text("$600"))),
        );

        let first = seed_turn(&fixture, "1", "budget?", "the budget is $500");
        fixture.pipeline.process_turn(&first).await.unwrap();

        let second = seed_turn(&fixture, "2", "update?", "budget is now $600");
        let outcome = fixture.pipeline.process_turn(&second).await.unwrap();
        let summary = outcome.summary().clone();

        assert_eq!(summary.version, 2);
        assert_eq!(summary.facts.len(), 1);
        assert_eq!(summary.facts["budget"].value, FactValue::text("$600"));
        assert_eq!(summary.facts["budget"].source_message_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_turn_is_a_noop() {
        let fixture =
            fixture(MockExtractor::new().enqueue(Candidate::default().with_goal("ship v1")));
        let request = seed_turn(&fixture, "1", "plan?", "ship v1");

        let first = fixture.pipeline.process_turn(&request).await.unwrap();
        let second = fixture.pipeline.process_turn(&request).await.unwrap();

        assert!(matches!(first, ProcessOutcome::Updated(_)));
        let unchanged = match second {
            ProcessOutcome::Unchanged(s) => s,
            other => panic!("expected Unchanged, got {:?}", other),
        };
        assert_eq!(unchanged, first.summary().clone());

        // Exactly one event, not two
        let events = fixture.store.events_for_thread("thread-1").unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_message_is_invalid_input_without_event() {
        let fixture = fixture(MockExtractor::new());
        let request = ProcessRequest::new("thread-1", "u-missing", "a-missing");

        let result = fixture.pipeline.process_turn(&request).await;
        assert!(matches!(result, Err(PipelineError::InvalidInput(_))));

        assert!(fixture.store.events_for_thread("thread-1").unwrap().is_empty());
        assert!(fixture.store.get("thread-1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_turn_text_is_invalid_input() {
        let fixture = fixture(MockExtractor::new());
        let request = seed_turn(&fixture, "1", "   ", "an answer");

        let result = fixture.pipeline.process_turn(&request).await;
        assert!(matches!(result, Err(PipelineError::InvalidInput(_))));
        assert!(fixture.store.events_for_thread("thread-1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_template_is_fatal_and_logged() {
        let fixture = fixture_with_templates(MockExtractor::new(), StaticTemplates::none());
        let request = seed_turn(&fixture, "1", "plan?", "ship v1");

        let result = fixture.pipeline.process_turn(&request).await;
        assert!(matches!(result, Err(PipelineError::MissingTemplate)));

        let events = fixture.store.events_for_thread("thread-1").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, SummaryEventType::Error);
        assert!(events[0].details.contains("template"));
    }

    #[tokio::test]
    async fn test_extraction_failure_leaves_summary_unchanged() {
        let fixture = fixture(
            MockExtractor::new()
                .enqueue(Candidate::default().with_goal("ship v1"))
                .enqueue_failure("oracle down"),
        );

        let first = seed_turn(&fixture, "1", "plan?", "ship v1");
        fixture.pipeline.process_turn(&first).await.unwrap();
        let before = fixture.store.get("thread-1").unwrap().unwrap();

        let second = seed_turn(&fixture, "2", "more?", "more details");
        let result = fixture.pipeline.process_turn(&second).await;
        assert!(matches!(result, Err(PipelineError::Extraction(_))));

        // Summary untouched, error event recorded
        let after = fixture.store.get("thread-1").unwrap().unwrap();
        assert_eq!(after, before);

        let events = fixture.store.events_for_thread("thread-1").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_type, SummaryEventType::Error);
        assert!(events[1].details.contains("extraction failed"));
    }

    #[tokio::test]
    async fn test_digest_read_path() {
        let fixture =
            fixture(MockExtractor::new().enqueue(Candidate::default().with_goal("ship v1")));

        assert_eq!(fixture.pipeline.digest("thread-1").unwrap(), None);

        let request = seed_turn(&fixture, "1", "plan?", "ship v1");
        fixture.pipeline.process_turn(&request).await.unwrap();

        let digest = fixture.pipeline.digest("thread-1").unwrap().unwrap();
        assert!(digest.contains("Goals: ship v1"));
    }

    #[tokio::test]
    async fn test_reconcile_digest_rewrites_drifted_digest() {
        let fixture =
            fixture(MockExtractor::new().enqueue(Candidate::default().with_goal("ship v1")));
        let request = seed_turn(&fixture, "1", "plan?", "ship v1");
        fixture.pipeline.process_turn(&request).await.unwrap();

        // Simulate drift by rewriting the digest out-of-band
        let mut drifted = fixture.store.get("thread-1").unwrap().unwrap();
        drifted.digest_text = Some("stale".to_string());
        let drifted = fixture.store.save(&drifted, drifted.version).unwrap();

        let reconciled = fixture
            .pipeline
            .reconcile_digest("thread-1")
            .unwrap()
            .unwrap();
        assert_eq!(reconciled.version, drifted.version + 1);
        assert!(reconciled.digest_text.unwrap().contains("ship v1"));

        let events = fixture.store.events_for_thread("thread-1").unwrap();
        assert_eq!(
            events.last().unwrap().event_type,
            SummaryEventType::Reconcile
        );
    }

    #[tokio::test]
    async fn test_reconcile_digest_noop_when_consistent() {
        let fixture =
            fixture(MockExtractor::new().enqueue(Candidate::default().with_goal("ship v1")));
        let request = seed_turn(&fixture, "1", "plan?", "ship v1");
        fixture.pipeline.process_turn(&request).await.unwrap();

        let before = fixture.store.get("thread-1").unwrap().unwrap();
        let after = fixture
            .pipeline
            .reconcile_digest("thread-1")
            .unwrap()
            .unwrap();

        assert_eq!(after, before);
        let events = fixture.store.events_for_thread("thread-1").unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_digest_unknown_thread() {
        let fixture = fixture(MockExtractor::new());
        assert!(fixture.pipeline.reconcile_digest("nope").unwrap().is_none());
    }
}
