//! Key encoding and decoding for the storage layer.
//!
//! Summary keys: `sum:{thread_id}` — one row per thread.
//! Event log keys: `evt:{thread_id}:{timestamp_ms:013}:{sequence:020}` —
//! the zero-padded timestamp makes a thread's events scan in time order
//! under prefix iteration; the store-assigned sequence keeps events
//! written within the same millisecond in append order.

use crate::error::StoreError;

/// Key for a thread's summary row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryKey {
    /// Thread the summary belongs to
    pub thread_id: String,
}

impl SummaryKey {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
        }
    }

    /// Encode key to bytes for storage
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("sum:{}", self.thread_id).into_bytes()
    }
}

/// Key for one entry in the summary event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLogKey {
    /// Thread the event belongs to
    pub thread_id: String,
    /// Event creation time in milliseconds
    pub timestamp_ms: i64,
    /// Append-order tiebreaker within the same millisecond
    pub sequence: u64,
}

impl EventLogKey {
    pub fn new(thread_id: impl Into<String>, timestamp_ms: i64, sequence: u64) -> Self {
        Self {
            thread_id: thread_id.into(),
            timestamp_ms,
            sequence,
        }
    }

    /// Encode key to bytes for storage
    pub fn to_bytes(&self) -> Vec<u8> {
        format!(
            "evt:{}:{:013}:{:020}",
            self.thread_id, self.timestamp_ms, self.sequence
        )
        .into_bytes()
    }

    /// Decode key from bytes.
    ///
    /// The timestamp and sequence segments are fixed-width at the tail,
    /// so the thread id may itself contain `:`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|e| StoreError::Key(format!("Invalid UTF-8: {}", e)))?;

        let mut tail = s.rsplitn(3, ':');
        let seq_part = tail
            .next()
            .ok_or_else(|| StoreError::Key(format!("Invalid event key format: {}", s)))?;
        let ts_part = tail
            .next()
            .ok_or_else(|| StoreError::Key(format!("Invalid event key format: {}", s)))?;
        let head = tail
            .next()
            .ok_or_else(|| StoreError::Key(format!("Invalid event key format: {}", s)))?;

        let thread_id = head
            .strip_prefix("evt:")
            .ok_or_else(|| StoreError::Key(format!("Invalid event key format: {}", s)))?;

        let timestamp_ms: i64 = ts_part
            .parse()
            .map_err(|e| StoreError::Key(format!("Invalid timestamp: {}", e)))?;
        let sequence: u64 = seq_part
            .parse()
            .map_err(|e| StoreError::Key(format!("Invalid sequence: {}", e)))?;

        Ok(Self {
            thread_id: thread_id.to_string(),
            timestamp_ms,
            sequence,
        })
    }

    /// Generate the scan prefix for one thread's events.
    pub fn thread_prefix(thread_id: &str) -> Vec<u8> {
        format!("evt:{}:", thread_id).into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_key_encoding() {
        let key = SummaryKey::new("thread-42");
        assert_eq!(key.to_bytes(), b"sum:thread-42");
    }

    #[test]
    fn test_event_log_key_roundtrip() {
        let key = EventLogKey::new("thread-42", 1706540400000, 7);
        let bytes = key.to_bytes();
        let decoded = EventLogKey::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, key);
    }

    #[test]
    fn test_event_log_key_thread_with_colon() {
        let key = EventLogKey::new("tenant:42", 1706540400000, 0);
        let decoded = EventLogKey::from_bytes(&key.to_bytes()).unwrap();
        assert_eq!(decoded.thread_id, "tenant:42");
        assert_eq!(decoded.timestamp_ms, 1706540400000);
    }

    #[test]
    fn test_event_log_key_time_order() {
        let earlier = EventLogKey::new("thread-42", 1000, 5);
        let later = EventLogKey::new("thread-42", 2000, 0);
        assert!(earlier.to_bytes() < later.to_bytes());
    }

    #[test]
    fn test_event_log_key_sequence_breaks_same_millisecond_ties() {
        let first = EventLogKey::new("thread-42", 1000, 1);
        let second = EventLogKey::new("thread-42", 1000, 2);
        assert!(first.to_bytes() < second.to_bytes());
    }

    #[test]
    fn test_event_log_key_bad_format() {
        assert!(EventLogKey::from_bytes(b"sum:thread-42").is_err());
        assert!(EventLogKey::from_bytes(b"evt:t:notanumber:00000000000000000001").is_err());
    }
}
