//! Collaborator contracts consumed by the pipeline.
//!
//! The pipeline reads message text from the conversation store and the
//! active template from the extraction configuration collaborator. Both
//! are injected as trait objects; in-memory implementations are provided
//! for tests and the CLI.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use recap_extraction::ExtractionTemplate;

/// Boxed error for collaborator implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Read access to stored conversation turns.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Get the text of a message, or `None` if the id is unknown.
    async fn message_text(&self, message_id: &str) -> Result<Option<String>, BoxError>;
}

/// Read access to the active extraction template.
#[async_trait]
pub trait TemplateProvider: Send + Sync {
    /// Get the active template, or `None` if none is configured.
    /// Absence is fatal for the current call, not for the engine.
    async fn active_template(&self) -> Result<Option<ExtractionTemplate>, BoxError>;
}

/// In-memory conversation store for tests and the CLI.
#[derive(Default)]
pub struct InMemoryConversations {
    messages: RwLock<HashMap<String, String>>,
}

impl InMemoryConversations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a message's text under its id.
    pub fn insert(&self, message_id: impl Into<String>, text: impl Into<String>) {
        self.messages
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(message_id.into(), text.into());
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversations {
    async fn message_text(&self, message_id: &str) -> Result<Option<String>, BoxError> {
        let messages = self
            .messages
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(messages.get(message_id).cloned())
    }
}

/// Template provider that always returns the same (optional) template.
pub struct StaticTemplates {
    template: Option<ExtractionTemplate>,
}

impl StaticTemplates {
    /// Always return the given template.
    pub fn new(template: ExtractionTemplate) -> Self {
        Self {
            template: Some(template),
        }
    }

    /// Never return a template; models the missing-configuration case.
    pub fn none() -> Self {
        Self { template: None }
    }
}

#[async_trait]
impl TemplateProvider for StaticTemplates {
    async fn active_template(&self) -> Result<Option<ExtractionTemplate>, BoxError> {
        Ok(self.template.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_conversations() {
        let conversations = InMemoryConversations::new();
        conversations.insert("m1", "hello");

        assert_eq!(
            conversations.message_text("m1").await.unwrap(),
            Some("hello".to_string())
        );
        assert_eq!(conversations.message_text("m2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_static_templates() {
        let provider = StaticTemplates::new(ExtractionTemplate::new("extract", "gpt-4o-mini"));
        assert!(provider.active_template().await.unwrap().is_some());

        let empty = StaticTemplates::none();
        assert!(empty.active_template().await.unwrap().is_none());
    }
}
