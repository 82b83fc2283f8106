//! Hot path benchmarks.
//!
//! Run with: `cargo bench --bench hot_paths`
//! Compare baselines: `cargo bench --bench hot_paths -- --baseline main`
//!
//! Scratch stores without fsync, so these measure fjall and the queue layer
//! rather than the disk: id generation, append, pop and bulk append.

use bucketq::{IdGenerator, Store, StoreConfig};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

fn store_with(bucket: &str, records: usize) -> Store {
    let store = Store::open(StoreConfig::test()).unwrap();
    store.register(bucket).unwrap();
    let values: Vec<String> = (0..records).map(|i| format!("value:{}", i)).collect();
    store.append_bulk(bucket, &values).unwrap();
    store
}

/// Benchmark IdGenerator::next_id
fn bench_next_id(c: &mut Criterion) {
    let mut group = c.benchmark_group("next_id");
    group.throughput(Throughput::Elements(1));

    let ids = IdGenerator::new();
    group.bench_function("system_clock", |b| b.iter(|| black_box(ids.next_id())));

    group.finish();
}

/// Benchmark Store::append with various value sizes
fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");
    group.throughput(Throughput::Elements(1));

    for value_len in [16, 256, 4096] {
        let value = vec![b'x'; value_len];
        group.bench_function(format!("value_len_{}", value_len), |b| {
            let store = store_with("bench", 0);
            b.iter(|| store.append("bench", black_box(&value)).unwrap())
        });
    }

    group.finish();
}

/// Benchmark Store::pop_once followed by a refill, at several bucket sizes
fn bench_pop_once(c: &mut Criterion) {
    let mut group = c.benchmark_group("pop_once");
    group.throughput(Throughput::Elements(1));

    for records in [1_000usize, 20_000] {
        group.bench_function(format!("bucket_{}", records), |b| {
            let store = store_with("bench", records);
            b.iter(|| {
                let record = store.pop_once("bench").unwrap().unwrap();
                store.append("bench", black_box(&record.value)).unwrap();
            })
        });
    }

    group.finish();
}

/// Benchmark Store::append_bulk_dedup with half the batch duplicated
fn bench_append_bulk(c: &mut Criterion) {
    let mut group = c.benchmark_group("append_bulk");

    for batch in [10usize, 100, 1000] {
        let values: Vec<String> = (0..batch).map(|i| format!("value:{}", i % (batch / 2))).collect();
        let against: Vec<String> = (0..batch / 10).map(|i| format!("value:{}", i)).collect();
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_function(format!("batch_{}", batch), |b| {
            let store = store_with("bench", 0);
            b.iter(|| {
                store
                    .append_bulk_dedup("bench", black_box(&values), black_box(&against))
                    .unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_next_id,
    bench_append,
    bench_pop_once,
    bench_append_bulk,
);

criterion_main!(benches);
