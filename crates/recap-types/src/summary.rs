//! Thread summary types.
//!
//! A `ThreadSummary` is the durable, versioned structured memory for one
//! conversation thread. It is owned exclusively by the summarization engine
//! and mutated only through the merge engine and the pipeline orchestrator.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A typed fact value.
///
/// Extraction output arrives as JSON, so the variants are tried in untagged
/// order: boolean, number, string, then object. Merge and digest logic
/// pattern-match on this instead of poking at dynamic values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactValue {
    /// Boolean flag
    Flag(bool),
    /// Numeric value
    Number(f64),
    /// Free text
    Text(String),
    /// Structured record
    Record(serde_json::Map<String, serde_json::Value>),
}

impl FactValue {
    /// Convenience constructor for text values.
    pub fn text(value: impl Into<String>) -> Self {
        FactValue::Text(value.into())
    }

    /// Convenience constructor for numeric values.
    pub fn number(value: f64) -> Self {
        FactValue::Number(value)
    }
}

impl fmt::Display for FactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactValue::Flag(b) => write!(f, "{}", b),
            FactValue::Number(n) => write!(f, "{}", n),
            FactValue::Text(s) => f.write_str(s),
            FactValue::Record(map) => {
                write!(f, "{}", serde_json::Value::Object(map.clone()))
            }
        }
    }
}

/// A recorded fact: its current value plus every message that touched it.
///
/// `source_message_ids` only grows; updating a fact's value appends the
/// updating message id rather than replacing the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// Current value for the subject
    pub value: FactValue,

    /// Message ids that introduced or updated this fact, in order
    pub source_message_ids: Vec<String>,
}

impl Fact {
    /// Create a fact first recorded by the given message.
    pub fn new(value: FactValue, message_id: impl Into<String>) -> Self {
        Self {
            value,
            source_message_ids: vec![message_id.into()],
        }
    }
}

/// A decision recorded from the conversation.
///
/// Decision text is unique case-insensitively within a summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Decision text
    pub text: String,

    /// Message the decision was extracted from
    pub source_message_id: String,

    /// When the decision was merged into the summary
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub recorded_at: DateTime<Utc>,
}

/// An open item recorded from the conversation.
///
/// Todo text is unique case-insensitively within a summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    /// Todo text
    pub text: String,

    /// Message the todo was extracted from
    pub source_message_id: String,
}

/// One entry in the bounded merge-history ring buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeDelta {
    /// What happened (e.g. "merge")
    pub action: String,

    /// Short human-readable description of what changed
    pub details: String,

    /// When the change was applied
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// The durable, versioned, merged structured memory for one thread.
///
/// Exactly one summary exists per `thread_id`, created lazily on the first
/// processing request. `version` advances by one on every successful save
/// and is the compare-and-set token for optimistic concurrency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadSummary {
    /// Stable identifier of the conversation thread (primary key)
    pub thread_id: String,

    /// Strictly increasing version. 0 means a draft that has never been
    /// persisted; the first successful save writes version 1.
    pub version: u64,

    /// Bounded rendering of the structured fields, regenerated on every
    /// update. Never hand-edited; carries no independent state.
    pub digest_text: Option<String>,

    /// Subject -> fact, keyed uniquely by subject
    #[serde(default)]
    pub facts: BTreeMap<String, Fact>,

    /// Decisions in merge order, text unique case-insensitively
    #[serde(default)]
    pub decisions: Vec<Decision>,

    /// Open items in merge order, text unique case-insensitively
    #[serde(default)]
    pub todos: Vec<Todo>,

    /// Goals, insertion-ordered, unique case-sensitively
    #[serde(default)]
    pub goals: Vec<String>,

    /// Constraints, insertion-ordered, unique case-sensitively
    #[serde(default)]
    pub constraints: Vec<String>,

    /// Term -> definition, last write wins per term
    #[serde(default)]
    pub glossary: BTreeMap<String, String>,

    /// Ring buffer of recent merge descriptions, oldest evicted first
    #[serde(default)]
    pub deltas: VecDeque<MergeDelta>,

    /// Assistant message id of the most recently processed turn; the
    /// idempotency key for duplicate-request detection
    pub last_processed_message_id: Option<String>,
}

impl ThreadSummary {
    /// Create an empty, never-persisted draft for a thread.
    pub fn draft(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            version: 0,
            digest_text: None,
            facts: BTreeMap::new(),
            decisions: Vec::new(),
            todos: Vec::new(),
            goals: Vec::new(),
            constraints: Vec::new(),
            glossary: BTreeMap::new(),
            deltas: VecDeque::new(),
            last_processed_message_id: None,
        }
    }

    /// True if this summary has never been persisted.
    pub fn is_draft(&self) -> bool {
        self.version == 0
    }

    /// Serialize to JSON bytes for storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
