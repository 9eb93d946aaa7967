//! Summary event type for the append-only audit log.
//!
//! One event is recorded per processing attempt that changes state or
//! fails: summary creation, summary update, processing error, and digest
//! reconciliation. Duplicate (idempotent no-op) requests log nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of summary event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryEventType {
    /// First successful save for a thread
    Created,
    /// Subsequent successful save
    Updated,
    /// Processing attempt failed after input validation
    Error,
    /// Digest recomputed and rewritten outside the normal turn flow
    Reconcile,
}

impl std::fmt::Display for SummaryEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SummaryEventType::Created => write!(f, "created"),
            SummaryEventType::Updated => write!(f, "updated"),
            SummaryEventType::Error => write!(f, "error"),
            SummaryEventType::Reconcile => write!(f, "reconcile"),
        }
    }
}

/// An append-only audit record of one processing attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryEvent {
    /// Thread the event belongs to
    pub thread_id: String,

    /// What happened
    pub event_type: SummaryEventType,

    /// Summary version before the attempt
    pub from_version: u64,

    /// Summary version after the attempt (equal to `from_version` on error)
    pub to_version: u64,

    /// Short description: changed sections on success, reason on error
    pub details: String,

    /// Message ids that produced this event
    pub message_ids: Vec<String>,

    /// When the event was recorded
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl SummaryEvent {
    /// Create an event stamped with the current time.
    pub fn new(
        thread_id: impl Into<String>,
        event_type: SummaryEventType,
        from_version: u64,
        to_version: u64,
        details: impl Into<String>,
        message_ids: Vec<String>,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            event_type,
            from_version,
            to_version,
            details: details.into(),
            message_ids,
            created_at: Utc::now(),
        }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_roundtrip() {
        let event = SummaryEvent::new(
            "thread-1",
            SummaryEventType::Updated,
            2,
            3,
            "facts: 1, goals: 1",
            vec!["msg-user".to_string(), "msg-assistant".to_string()],
        );

        let bytes = event.to_bytes().unwrap();
        let decoded = SummaryEvent::from_bytes(&bytes).unwrap();

        assert_eq!(decoded, event);
    }

    #[test]
    fn test_event_type_display() {
        assert_eq!(SummaryEventType::Created.to_string(), "created");
        assert_eq!(SummaryEventType::Error.to_string(), "error");
        assert_eq!(SummaryEventType::Reconcile.to_string(), "reconcile");
    }

    #[test]
    fn test_event_type_snake_case_json() {
        let json = serde_json::to_string(&SummaryEventType::Reconcile).unwrap();
        assert_eq!(json, "\"reconcile\"");
    }
}
