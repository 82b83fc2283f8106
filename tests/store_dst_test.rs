//! Store Deterministic Simulation Tests
//!
//! VOPR-style tests for the queue store with multiple seeds, including
//! restarts with and without a clean close and clocks that step backwards.

use bucketq::{run_store_batch, summarize_store_batch, StoreDSTConfig, StoreDSTHarness};

// =============================================================================
// Standard Configuration Tests
// =============================================================================

#[test]
fn test_store_dst_50_seeds_standard() {
    let results = run_store_batch(0, 50, 400, StoreDSTConfig::new);
    let summary = summarize_store_batch(&results);
    println!("{}", summary);

    let passed = results.iter().filter(|r| r.is_success()).count();
    assert_eq!(passed, 50, "All 50 seeds should pass with standard config\n{}", summary);
}

#[test]
fn test_store_dst_50_seeds_restart_heavy() {
    // INVARIANT: every acknowledged commit survives a restart, and records
    // appended after a clock step-back still sort after older ones.
    let results = run_store_batch(1000, 50, 400, StoreDSTConfig::restart_heavy);
    let summary = summarize_store_batch(&results);
    println!("{}", summary);

    let passed = results.iter().filter(|r| r.is_success()).count();
    assert_eq!(passed, 50, "All 50 seeds should pass with restart heavy\n{}", summary);

    let abandons: u64 = results.iter().map(|r| r.abandons).sum();
    let rewinds: u64 = results.iter().map(|r| r.rewinds).sum();
    assert!(abandons > 0, "restart-heavy runs should drop stores without closing");
    assert!(rewinds > 0, "restart-heavy runs should rewind the clock");
}

#[test]
fn test_store_dst_50_seeds_bucket_churn() {
    let results = run_store_batch(2000, 50, 400, StoreDSTConfig::bucket_churn);
    let summary = summarize_store_batch(&results);
    println!("{}", summary);

    let passed = results.iter().filter(|r| r.is_success()).count();
    assert_eq!(passed, 50, "All 50 seeds should pass with bucket churn\n{}", summary);
}

#[test]
fn test_store_dst_10_seeds_durable() {
    let results = run_store_batch(3000, 10, 300, StoreDSTConfig::durable);
    let summary = summarize_store_batch(&results);
    println!("{}", summary);

    let passed = results.iter().filter(|r| r.is_success()).count();
    assert_eq!(passed, 10, "All 10 seeds should pass with fsync per commit\n{}", summary);
}

// =============================================================================
// Stress Tests
// =============================================================================

#[test]
fn test_store_dst_stress_3000_ops() {
    let mut harness = StoreDSTHarness::with_seed(42);
    harness.run(3000);
    let result = harness.result();
    println!("Stress 3000 ops: {}", result.summary());
    assert!(result.is_success(), "{:?}", result.invariant_violations);
}

#[test]
fn test_store_dst_same_seed_is_deterministic() {
    let run = |seed| {
        let mut harness = StoreDSTHarness::new(StoreDSTConfig::restart_heavy(seed));
        harness.run(500);
        assert!(harness.result().is_success(), "{:?}", harness.result().invariant_violations);
        (harness.result().summary(), harness.snapshot().unwrap())
    };

    let (summary_a, contents_a) = run(7);
    let (summary_b, contents_b) = run(7);
    assert_eq!(summary_a, summary_b);
    assert_eq!(contents_a, contents_b, "same seed must leave the same bucket contents");
}
