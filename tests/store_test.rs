//! Queue Store Integration Tests
//!
//! FIFO, pop, bulk dedup, bucket lifecycle and disposal behaviour through
//! the public API.

use bucketq::{BulkAppend, QueueError, Store, StoreConfig};

fn store() -> Store {
    Store::open(StoreConfig::test()).unwrap()
}

fn drained(store: &Store, bucket: &str) -> Vec<String> {
    store
        .drain_all(bucket)
        .unwrap()
        .into_iter()
        .map(|v| String::from_utf8(v).unwrap())
        .collect()
}

#[test]
fn test_append_count_and_fifo_drain() {
    let store = store();
    store.register("jobs").unwrap();

    let values: Vec<String> = (0..200).map(|i| format!("job-{}", i)).collect();
    for value in &values {
        store.append("jobs", value).unwrap();
    }

    assert_eq!(store.count("jobs").unwrap(), values.len());
    assert_eq!(drained(&store, "jobs"), values);
    // drain_all does not consume
    assert_eq!(store.count("jobs").unwrap(), values.len());
}

#[test]
fn test_pop_n_times_then_empty() {
    let store = store();
    store.register("jobs").unwrap();
    for i in 0..25 {
        store.append("jobs", format!("{}", i)).unwrap();
    }

    let popped: Vec<String> = (0..25)
        .map(|_| String::from_utf8(store.pop_once("jobs").unwrap().unwrap().value).unwrap())
        .collect();
    let expected: Vec<String> = (0..25).map(|i| i.to_string()).collect();

    assert_eq!(popped, expected);
    assert!(store.pop_once("jobs").unwrap().is_none());
    assert!(store.peek("jobs").unwrap().is_none());
    assert_eq!(store.count("jobs").unwrap(), 0);
}

#[test]
fn test_pop_returns_record_keys_in_order() {
    let store = store();
    store.register("jobs").unwrap();
    let first = store.append("jobs", "a").unwrap();
    let second = store.append("jobs", "b").unwrap();
    assert!(first < second);

    let record = store.pop_once("jobs").unwrap().unwrap();
    assert_eq!(record.key, first);
    assert_eq!(record.value, b"a");
}

#[test]
fn test_bulk_dedups_within_batch() {
    let store = store();
    store.register("jobs").unwrap();

    let result = store.append_bulk("jobs", &["a", "b", "a", "c"]).unwrap();
    assert_eq!(result, BulkAppend { stored: 3, skipped: 1 });
    assert_eq!(drained(&store, "jobs"), ["a", "b", "c"]);
}

#[test]
fn test_bulk_dedups_against_external_set() {
    let store = store();
    store.register("jobs").unwrap();

    let already_seen = vec![b"x".to_vec()];
    let result = store
        .append_bulk_dedup("jobs", &["x", "y"], &already_seen)
        .unwrap();
    assert_eq!(result, BulkAppend { stored: 1, skipped: 1 });
    assert_eq!(drained(&store, "jobs"), ["y"]);
}

#[test]
fn test_bulk_follows_existing_records() {
    let store = store();
    store.register("jobs").unwrap();
    store.append("jobs", "first").unwrap();
    store.append_bulk("jobs", &["second", "third"]).unwrap();
    store.append("jobs", "fourth").unwrap();

    assert_eq!(drained(&store, "jobs"), ["first", "second", "third", "fourth"]);
}

#[test]
fn test_delete_non_empty_bucket_is_refused() {
    let store = store();
    store.register("jobs").unwrap();
    store.append("jobs", "keep me").unwrap();

    match store.delete_bucket("jobs") {
        Err(QueueError::BucketNotEmpty { bucket, records }) => {
            assert_eq!(bucket, "jobs");
            assert_eq!(records, 1);
        }
        other => panic!("expected BucketNotEmpty, got {:?}", other),
    }
    assert!(store.is_registered("jobs"));
    assert_eq!(drained(&store, "jobs"), ["keep me"]);
}

#[test]
fn test_delete_empty_bucket_then_reuse_name() {
    let store = store();
    store.register("jobs").unwrap();
    store.append("jobs", "x").unwrap();
    store.pop_once("jobs").unwrap();

    store.delete_bucket("jobs").unwrap();
    assert!(matches!(store.count("jobs"), Err(QueueError::NotRegistered(_))));

    store.register("jobs").unwrap();
    assert_eq!(store.count("jobs").unwrap(), 0);
}

#[test]
fn test_dispose_twice_leaves_other_records() {
    let store = store();
    store.register("jobs").unwrap();
    for value in ["a", "b", "c"] {
        store.append("jobs", value).unwrap();
    }

    let handle = store.peek("jobs").unwrap().unwrap();
    assert_eq!(handle.value(), b"a");
    assert_eq!(handle.bucket(), "jobs");
    handle.dispose().unwrap();
    handle.dispose().unwrap();

    assert_eq!(drained(&store, "jobs"), ["b", "c"]);
}

#[test]
fn test_dispose_after_record_was_popped() {
    let store = store();
    store.register("jobs").unwrap();
    store.append("jobs", "a").unwrap();
    store.append("jobs", "b").unwrap();

    let handle = store.peek("jobs").unwrap().unwrap();
    let popped = store.pop_once("jobs").unwrap().unwrap();
    assert_eq!(popped.key, handle.key());

    handle.dispose().unwrap();
    assert_eq!(drained(&store, "jobs"), ["b"]);
}

#[test]
fn test_dispose_after_bucket_deleted() {
    let store = store();
    store.register("jobs").unwrap();
    store.append("jobs", "a").unwrap();
    let handle = store.peek("jobs").unwrap().unwrap();
    store.pop_once("jobs").unwrap();
    store.delete_bucket("jobs").unwrap();

    assert!(matches!(handle.dispose(), Err(QueueError::BucketNotFound(_))));
}

#[test]
fn test_register_is_idempotent_and_keeps_records() {
    let store = store();
    store.register("jobs").unwrap();
    store.append("jobs", "survivor").unwrap();
    store.register("jobs").unwrap();

    assert_eq!(store.buckets(), vec!["jobs".to_string()]);
    assert_eq!(drained(&store, "jobs"), ["survivor"]);
}

#[test]
fn test_buckets_are_independent() {
    let store = store();
    store.register("a").unwrap();
    store.register("b").unwrap();
    store.append("a", "1").unwrap();
    store.append("b", "2").unwrap();
    store.append("a", "3").unwrap();

    assert_eq!(drained(&store, "a"), ["1", "3"]);
    assert_eq!(drained(&store, "b"), ["2"]);
    assert_eq!(store.pop_once("b").unwrap().unwrap().value, b"2");
    assert_eq!(store.count("a").unwrap(), 2);
}

#[test]
fn test_binary_values_round_trip() {
    let store = store();
    store.register("bin").unwrap();
    let value: Vec<u8> = (0..=255u8).collect();
    store.append("bin", &value).unwrap();
    store.append("bin", b"").unwrap();

    assert_eq!(store.pop_once("bin").unwrap().unwrap().value, value);
    assert_eq!(store.pop_once("bin").unwrap().unwrap().value, Vec::<u8>::new());
}

#[test]
fn test_unregistered_bucket_is_reported() {
    let store = store();
    let err = store.append("nope", "x").unwrap_err();
    assert!(matches!(err, QueueError::NotRegistered(ref b) if b == "nope"));
    assert_eq!(err.to_string(), "bucket 'nope' is not registered");
}

#[test]
fn test_append_and_pop_cost_does_not_grow_with_bucket_size() {
    use std::time::{Duration, Instant};

    fn timed(ops: impl FnOnce()) -> Duration {
        let start = Instant::now();
        ops();
        start.elapsed()
    }

    let store = store();
    store.register("small").unwrap();
    store.register("large").unwrap();
    let value = vec![b'v'; 1024];
    let filler: Vec<String> = (0..20_000).map(|i| format!("{:0>1024}", i)).collect();
    store.append_bulk("large", &filler).unwrap();

    let small = timed(|| {
        for _ in 0..200 {
            store.append("small", &value).unwrap();
        }
        for _ in 0..200 {
            store.pop_once("small").unwrap().unwrap();
        }
    });
    let large = timed(|| {
        for _ in 0..200 {
            store.append("large", &value).unwrap();
        }
        for _ in 0..200 {
            store.pop_once("large").unwrap().unwrap();
        }
    });

    // Per-operation cost at 20k records stays within a small factor
    assert!(
        large < small * 20 + Duration::from_millis(200),
        "200 appends + pops: {:?} on an empty bucket, {:?} at 20k records",
        small,
        large
    );
    assert_eq!(store.count("large").unwrap(), 20_000);
}
