//! RocksDB wrapper for the recap summary store.
//!
//! Provides:
//! - Database open with column family setup
//! - Versioned summary rows with compare-and-set saves
//! - Append-only summary event log with per-thread time-ordered scans
//! - Idempotency lookups against `last_processed_message_id`

use rocksdb::{Direction, IteratorMode, Options, DB};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::column_families::{build_cf_descriptors, ALL_CF_NAMES, CF_SUMMARIES, CF_SUMMARY_EVENTS};
use crate::error::StoreError;
use crate::keys::{EventLogKey, SummaryKey};
use recap_types::{SummaryEvent, ThreadSummary};

/// Durable store for thread summaries and their event log.
///
/// Safe to share behind an `Arc` across tasks. Writes to summary rows go
/// through [`SummaryStore::save`], which enforces optimistic concurrency:
/// at most one writer succeeds per version per thread.
pub struct SummaryStore {
    db: DB,
    /// Serializes the read-compare-write window in `save`. RocksDB has no
    /// native compare-and-set; the critical section is two point reads and
    /// one write, and is never held across an await point.
    write_lock: Mutex<()>,
    /// Keeps events appended within the same millisecond in append order.
    /// In-process only; across restarts the key's timestamp has advanced.
    event_sequence: AtomicU64,
}

impl SummaryStore {
    /// Open the store at the given path, creating it if necessary.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        info!("Opening summary store at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors = build_cf_descriptors();
        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
            event_sequence: AtomicU64::new(0),
        })
    }

    fn next_event_sequence(&self) -> u64 {
        self.event_sequence.fetch_add(1, Ordering::SeqCst)
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(name.to_string()))
    }

    /// Get the stored summary for a thread, if any.
    pub fn get(&self, thread_id: &str) -> Result<Option<ThreadSummary>, StoreError> {
        let cf = self.cf(CF_SUMMARIES)?;
        let key = SummaryKey::new(thread_id);

        match self.db.get_cf(cf, key.to_bytes())? {
            Some(bytes) => {
                let summary = ThreadSummary::from_bytes(&bytes)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(Some(summary))
            }
            None => Ok(None),
        }
    }

    /// Get the stored summary for a thread, or an empty draft if none
    /// exists yet.
    ///
    /// The draft (version 0) is not persisted here; the first successful
    /// [`SummaryStore::save`] writes version 1. Because creation happens
    /// through the same compare-and-set path as updates, two callers
    /// racing to create the same thread resolve cleanly: one wins, the
    /// other observes a [`StoreError::VersionConflict`] and reloads.
    pub fn get_or_create(&self, thread_id: &str) -> Result<ThreadSummary, StoreError> {
        match self.get(thread_id)? {
            Some(summary) => Ok(summary),
            None => {
                debug!(thread_id = %thread_id, "No summary yet, returning draft");
                Ok(ThreadSummary::draft(thread_id))
            }
        }
    }

    /// Persist a summary at `expected_version + 1`, conditioned on the
    /// stored version still equalling `expected_version` (0 for an absent
    /// row). On mismatch returns [`StoreError::VersionConflict`] and
    /// leaves the stored row untouched; callers reload and re-merge.
    pub fn save(
        &self,
        summary: &ThreadSummary,
        expected_version: u64,
    ) -> Result<ThreadSummary, StoreError> {
        let cf = self.cf(CF_SUMMARIES)?;
        let key = SummaryKey::new(&summary.thread_id);
        let key_bytes = key.to_bytes();

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let stored_version = match self.db.get_cf(cf, &key_bytes)? {
            Some(bytes) => {
                ThreadSummary::from_bytes(&bytes)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?
                    .version
            }
            None => 0,
        };

        if stored_version != expected_version {
            debug!(
                thread_id = %summary.thread_id,
                expected = expected_version,
                actual = stored_version,
                "Version conflict on save"
            );
            return Err(StoreError::VersionConflict {
                expected: expected_version,
                actual: stored_version,
            });
        }

        let mut persisted = summary.clone();
        persisted.version = expected_version + 1;

        let bytes = persisted
            .to_bytes()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.db.put_cf(cf, &key_bytes, &bytes)?;

        debug!(
            thread_id = %persisted.thread_id,
            version = persisted.version,
            "Saved summary"
        );

        Ok(persisted)
    }

    /// True iff the stored summary's last processed message id equals
    /// `message_id`. Used to detect duplicate processing requests.
    pub fn is_already_processed(
        &self,
        thread_id: &str,
        message_id: &str,
    ) -> Result<bool, StoreError> {
        match self.get(thread_id)? {
            Some(summary) => Ok(summary.last_processed_message_id.as_deref() == Some(message_id)),
            None => Ok(false),
        }
    }

    /// Append an event to the audit log.
    pub fn append_event(&self, event: &SummaryEvent) -> Result<(), StoreError> {
        let cf = self.cf(CF_SUMMARY_EVENTS)?;

        let key = EventLogKey::new(
            &event.thread_id,
            event.created_at.timestamp_millis(),
            self.next_event_sequence(),
        );
        let bytes = event
            .to_bytes()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        self.db.put_cf(cf, key.to_bytes(), &bytes)?;

        debug!(
            thread_id = %event.thread_id,
            event_type = %event.event_type,
            to_version = event.to_version,
            "Appended summary event"
        );
        Ok(())
    }

    /// Get all events for a thread in time order.
    pub fn events_for_thread(&self, thread_id: &str) -> Result<Vec<SummaryEvent>, StoreError> {
        let cf = self.cf(CF_SUMMARY_EVENTS)?;
        let prefix = EventLogKey::thread_prefix(thread_id);

        let mut events = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));

        for item in iter {
            let (key, value) = item?;
            // Stop once past this thread's prefix
            if !key.starts_with(&prefix) {
                break;
            }
            let event = SummaryEvent::from_bytes(&value)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            events.push(event);
        }

        Ok(events)
    }

    /// Flush all column families to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        for cf_name in ALL_CF_NAMES {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.flush_cf(&cf)?;
            }
        }
        Ok(())
    }

    /// Get store statistics.
    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let mut stats = StoreStats::default();

        if let Some(cf) = self.db.cf_handle(CF_SUMMARIES) {
            stats.summary_count = self.count_cf_entries(cf)?;
        }
        if let Some(cf) = self.db.cf_handle(CF_SUMMARY_EVENTS) {
            stats.event_count = self.count_cf_entries(cf)?;
        }
        stats.disk_usage_bytes = self.disk_usage()?;

        Ok(stats)
    }

    fn count_cf_entries(&self, cf: &rocksdb::ColumnFamily) -> Result<u64, StoreError> {
        let mut count = 0u64;
        let iter = self.db.iterator_cf(cf, IteratorMode::Start);
        for item in iter {
            item?;
            count += 1;
        }
        Ok(count)
    }

    fn disk_usage(&self) -> Result<u64, StoreError> {
        let path = self.db.path();
        let mut total_size = 0u64;

        if let Ok(entries) = std::fs::read_dir(path) {
            for entry in entries.flatten() {
                if let Ok(metadata) = entry.metadata() {
                    total_size += metadata.len();
                }
            }
        }

        Ok(total_size)
    }
}

/// Statistics about the store.
#[derive(Debug, Default)]
pub struct StoreStats {
    /// Number of summary rows
    pub summary_count: u64,
    /// Number of event log entries
    pub event_count: u64,
    /// Total disk usage in bytes
    pub disk_usage_bytes: u64,
}
