//! Bounds and dedup behavior over many turns at the pipeline level.

use pretty_assertions::assert_eq;

use e2e_tests::TestHarness;
use recap_extraction::MockExtractor;
use recap_types::{Candidate, FactValue};

/// Case-variant restatements of decisions and todos never inflate the
/// lists, turn after turn.
#[tokio::test]
async fn test_case_variant_restatements_do_not_accumulate() {
    let harness = TestHarness::new();

    let extractor = MockExtractor::new()
        .enqueue(
            Candidate::default()
                .with_decision("Use RocksDB")
                .with_todo("Write Docs"),
        )
        .enqueue(
            Candidate::default()
                .with_decision("USE ROCKSDB")
                .with_todo("write docs"),
        )
        .enqueue(
            Candidate::default()
                .with_decision("use rocksdb")
                .with_todo("WRITE DOCS"),
        );
    let pipeline = harness.pipeline(extractor);

    for i in 0..3 {
        let request = harness.seed_turn("thread-1", "status?", &format!("restating, turn {}", i));
        pipeline.process_turn(&request).await.unwrap();
    }

    let summary = harness.store.get("thread-1").unwrap().unwrap();
    assert_eq!(summary.version, 3);
    assert_eq!(summary.decisions.len(), 1);
    assert_eq!(summary.todos.len(), 1);
    // The original casing wins
    assert_eq!(summary.decisions[0].text, "Use RocksDB");
}

/// After any number of merges the delta ring holds at most 20 entries,
/// and the digest stays under its character bound even as facts pile up.
#[tokio::test]
async fn test_delta_ring_and_digest_bounds_hold_over_many_turns() {
    let harness = TestHarness::new();

    let mut extractor = MockExtractor::new();
    for i in 0..30 {
        extractor = extractor.enqueue(
            Candidate::default()
                .with_fact(format!("subject-{:02}", i), FactValue::text("x".repeat(400)))
                .with_goal(format!("goal-{}", i)),
        );
    }
    let pipeline = harness.pipeline(extractor);

    for i in 0..30 {
        let request = harness.seed_turn("thread-1", "more?", &format!("answer {}", i));
        pipeline.process_turn(&request).await.unwrap();
    }

    let summary = harness.store.get("thread-1").unwrap().unwrap();
    assert_eq!(summary.version, 30);
    assert_eq!(summary.facts.len(), 30);

    // Ring bound: only the 20 most recent merges remain, in order
    assert_eq!(summary.deltas.len(), 20);
    let timestamps: Vec<i64> = summary
        .deltas
        .iter()
        .map(|d| d.timestamp.timestamp_millis())
        .collect();
    let mut sorted = timestamps.clone();
    sorted.sort_unstable();
    assert_eq!(timestamps, sorted);

    // Digest bound survives arbitrarily large structured state
    let digest = summary.digest_text.unwrap();
    assert!(digest.chars().count() <= 1500);
}
