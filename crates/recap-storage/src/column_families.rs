//! Column family definitions for RocksDB.
//!
//! Two column families with different access patterns:
//! - summaries: one row per thread, read-modify-write (default compaction)
//! - summary_events: append-only audit log (Zstd compressed)

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family name for thread summaries
pub const CF_SUMMARIES: &str = "summaries";

/// Column family name for the append-only summary event log
pub const CF_SUMMARY_EVENTS: &str = "summary_events";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[CF_SUMMARIES, CF_SUMMARY_EVENTS];

/// Create column family options for the event log (append-only, compressed)
fn event_log_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_SUMMARIES, Options::default()),
        ColumnFamilyDescriptor::new(CF_SUMMARY_EVENTS, event_log_options()),
    ]
}
