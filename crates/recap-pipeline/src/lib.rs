//! Pipeline orchestration for the recap engine.
//!
//! Coordinates one turn's processing: idempotency check, summary load,
//! extraction, merge, digest compilation, compare-and-set persistence,
//! and event logging. All failures are converted into result values at
//! this boundary; summarization never faults into the conversation flow
//! that triggered it.

pub mod contracts;
pub mod error;
pub mod pipeline;
pub mod worker;

pub use contracts::{ConversationStore, InMemoryConversations, StaticTemplates, TemplateProvider};
pub use error::PipelineError;
pub use pipeline::{Pipeline, ProcessOutcome, ProcessRequest};
pub use worker::TurnQueue;
