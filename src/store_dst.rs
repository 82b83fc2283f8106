//! Deterministic Simulation Testing for the Queue Store
//!
//! VOPR-style harness that drives a `Store` in a scratch directory with
//! seeded random operations and checks it against a `VecDeque` model after
//! every step:
//! - FIFO order and counts per bucket
//! - Registered bucket set
//! - Recovery across clean restarts, restarts without `close`, and restarts
//!   whose wall clock stepped backwards

use crate::error::QueueError;
use crate::id::{Clock, IdGenerator, ManualClock};
use crate::store::{Store, StoreConfig, SyncPolicy};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

/// Configuration for Store DST
#[derive(Debug, Clone)]
pub struct StoreDSTConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Size of the bucket name pool
    pub num_buckets: usize,
    /// Size of the value pool (small pools exercise dedup)
    pub num_values: usize,
    pub pop_prob: f64,
    pub peek_dispose_prob: f64,
    pub bulk_prob: f64,
    pub register_prob: f64,
    pub delete_bucket_prob: f64,
    /// Clean close and reopen of the same directory
    pub reopen_prob: f64,
    /// Drop the store without `close` and reopen
    pub abandon_prob: f64,
    /// Reopen with the clock set back by up to a minute
    pub clock_rewind_prob: f64,
    pub sync_policy: SyncPolicy,
}

impl Default for StoreDSTConfig {
    fn default() -> Self {
        StoreDSTConfig {
            seed: 0,
            num_buckets: 4,
            num_values: 20,
            pop_prob: 0.25,
            peek_dispose_prob: 0.1,
            bulk_prob: 0.1,
            register_prob: 0.05,
            delete_bucket_prob: 0.03,
            reopen_prob: 0.02,
            abandon_prob: 0.01,
            clock_rewind_prob: 0.01,
            sync_policy: SyncPolicy::OsBuffered,
        }
    }
}

impl StoreDSTConfig {
    pub fn new(seed: u64) -> Self {
        StoreDSTConfig {
            seed,
            ..Default::default()
        }
    }

    /// Frequent restarts of every kind
    pub fn restart_heavy(seed: u64) -> Self {
        StoreDSTConfig {
            seed,
            reopen_prob: 0.05,
            abandon_prob: 0.05,
            clock_rewind_prob: 0.05,
            ..Default::default()
        }
    }

    /// Buckets created and deleted constantly, heavy popping
    pub fn bucket_churn(seed: u64) -> Self {
        StoreDSTConfig {
            seed,
            num_buckets: 8,
            pop_prob: 0.35,
            register_prob: 0.15,
            delete_bucket_prob: 0.15,
            ..Default::default()
        }
    }

    /// fsync on every commit
    pub fn durable(seed: u64) -> Self {
        StoreDSTConfig {
            seed,
            sync_policy: SyncPolicy::Always,
            ..Default::default()
        }
    }
}

/// Operation type for logging
#[derive(Debug, Clone)]
pub enum StoreOp {
    Register { bucket: String },
    Append { bucket: String, value: String },
    AppendBulk { bucket: String, values: Vec<String>, against: Vec<String> },
    Pop { bucket: String },
    PeekDispose { bucket: String },
    DeleteBucket { bucket: String },
    Reopen,
    Abandon,
    RewindReopen { millis: u64 },
}

/// Result of a Store DST run
#[derive(Debug, Clone)]
pub struct StoreDSTResult {
    pub seed: u64,
    pub total_operations: u64,
    pub appends: u64,
    pub bulk_appends: u64,
    pub pops: u64,
    pub disposes: u64,
    pub bucket_deletes: u64,
    pub reopens: u64,
    pub abandons: u64,
    pub rewinds: u64,
    pub invariant_violations: Vec<String>,
    pub last_op: Option<StoreOp>,
}

impl StoreDSTResult {
    pub fn new(seed: u64) -> Self {
        StoreDSTResult {
            seed,
            total_operations: 0,
            appends: 0,
            bulk_appends: 0,
            pops: 0,
            disposes: 0,
            bucket_deletes: 0,
            reopens: 0,
            abandons: 0,
            rewinds: 0,
            invariant_violations: Vec::new(),
            last_op: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.invariant_violations.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Seed {}: {} ops (append:{}, bulk:{}, pop:{}, dispose:{}, delete:{}, reopen:{}, abandon:{}, rewind:{}), {} violations",
            self.seed,
            self.total_operations,
            self.appends,
            self.bulk_appends,
            self.pops,
            self.disposes,
            self.bucket_deletes,
            self.reopens,
            self.abandons,
            self.rewinds,
            self.invariant_violations.len()
        )
    }
}

/// DST harness for Store
pub struct StoreDSTHarness {
    config: StoreDSTConfig,
    rng: ChaCha8Rng,
    clock: ManualClock,
    store: Option<Store>,
    /// Expected contents of every registered bucket
    model: BTreeMap<String, VecDeque<Vec<u8>>>,
    generation: u64,
    result: StoreDSTResult,
    // Declared after `store` so the directory outlives it
    dir: Option<TempDir>,
}

impl StoreDSTHarness {
    pub fn new(config: StoreDSTConfig) -> Self {
        let dir = tempfile::Builder::new().prefix("bucketq-dst-").tempdir();
        let mut harness = StoreDSTHarness {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            clock: ManualClock::new(1_700_000_000_000),
            dir: None,
            store: None,
            model: BTreeMap::new(),
            generation: 0,
            result: StoreDSTResult::new(config.seed),
            config,
        };
        match dir {
            Ok(dir) => harness.dir = Some(dir),
            Err(e) => {
                harness
                    .result
                    .invariant_violations
                    .push(format!("scratch dir: {}", e));
                return harness;
            }
        }
        if let Err(e) = harness.open() {
            harness
                .result
                .invariant_violations
                .push(format!("initial open failed: {}", e));
        }
        harness
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(StoreDSTConfig::new(seed))
    }

    fn store_path(&self) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| dir.path().join("store.bq"))
    }

    /// (Re)open the store directory and re-register every bucket the model
    /// knows about.
    fn open(&mut self) -> Result<(), String> {
        self.store = None;
        self.generation += 1;
        self.clock.advance(Duration::from_millis(1));

        let path = self.store_path().ok_or("no scratch directory")?;
        let ids = IdGenerator::with_seed(self.clock.clone(), self.config.seed ^ self.generation);
        let config = StoreConfig::at_path(path).with_sync_policy(self.config.sync_policy);
        let store = Store::open(config)
            .map_err(|e| e.to_string())?
            .with_id_generator(ids);
        for bucket in self.model.keys() {
            store.register(bucket).map_err(|e| e.to_string())?;
        }
        self.store = Some(store);
        Ok(())
    }

    fn chance(&mut self, prob: f64) -> bool {
        self.rng.gen_bool(prob.clamp(0.0, 1.0))
    }

    fn random_bucket(&mut self) -> String {
        format!("bucket:{}", self.rng.gen_range(0..self.config.num_buckets))
    }

    fn random_value(&mut self) -> String {
        format!("value:{}", self.rng.gen_range(0..self.config.num_values))
    }

    fn random_values(&mut self, max: usize) -> Vec<String> {
        let n = self.rng.gen_range(0..=max);
        (0..n).map(|_| self.random_value()).collect()
    }

    fn store(&self) -> Result<&Store, String> {
        self.store.as_ref().ok_or_else(|| "store is not open".to_string())
    }

    fn choose_op(&mut self) -> StoreOp {
        let bucket = self.random_bucket();
        let c = self.config.clone();

        if self.chance(c.reopen_prob) {
            StoreOp::Reopen
        } else if self.chance(c.abandon_prob) {
            StoreOp::Abandon
        } else if self.chance(c.clock_rewind_prob) {
            let millis = self.rng.gen_range(1..=60_000);
            StoreOp::RewindReopen { millis }
        } else if self.chance(c.register_prob) {
            StoreOp::Register { bucket }
        } else if self.chance(c.delete_bucket_prob) {
            StoreOp::DeleteBucket { bucket }
        } else if self.chance(c.pop_prob) {
            StoreOp::Pop { bucket }
        } else if self.chance(c.peek_dispose_prob) {
            StoreOp::PeekDispose { bucket }
        } else if self.chance(c.bulk_prob) {
            let values = self.random_values(6);
            let against = self.random_values(2);
            StoreOp::AppendBulk {
                bucket,
                values,
                against,
            }
        } else {
            let value = self.random_value();
            StoreOp::Append { bucket, value }
        }
    }

    /// Buckets the model does not know must fail with `NotRegistered`.
    /// Returns true when the op hit such a bucket.
    fn unregistered<T: std::fmt::Debug>(
        &self,
        bucket: &str,
        outcome: &Result<T, QueueError>,
    ) -> Result<bool, String> {
        if self.model.contains_key(bucket) {
            return Ok(false);
        }
        match outcome {
            Err(QueueError::NotRegistered(_)) => Ok(true),
            other => Err(format!(
                "expected NotRegistered for '{}', got {:?}",
                bucket, other
            )),
        }
    }

    fn apply(&mut self, op: &StoreOp) -> Result<(), String> {
        match op {
            StoreOp::Register { bucket } => {
                self.store()?.register(bucket).map_err(|e| e.to_string())?;
                self.model.entry(bucket.clone()).or_default();
            }
            StoreOp::Append { bucket, value } => {
                let outcome = self.store()?.append(bucket, value).map(|_| ());
                if self.unregistered(bucket, &outcome)? {
                    return Ok(());
                }
                outcome.map_err(|e| e.to_string())?;
                if let Some(queue) = self.model.get_mut(bucket) {
                    queue.push_back(value.as_bytes().to_vec());
                }
                self.result.appends += 1;
            }
            StoreOp::AppendBulk {
                bucket,
                values,
                against,
            } => {
                let outcome = self.store()?.append_bulk_dedup(bucket, values, against);
                if self.unregistered(bucket, &outcome)? {
                    return Ok(());
                }
                let appended = outcome.map_err(|e| e.to_string())?;

                let mut seen: Vec<&String> = against.iter().collect();
                let mut expected = Vec::new();
                for value in values {
                    if !seen.contains(&value) {
                        seen.push(value);
                        expected.push(value.as_bytes().to_vec());
                    }
                }
                if appended.stored != expected.len()
                    || appended.skipped != values.len() - expected.len()
                {
                    return Err(format!(
                        "bulk result {:?}, expected {} stored",
                        appended,
                        expected.len()
                    ));
                }
                if let Some(queue) = self.model.get_mut(bucket) {
                    queue.extend(expected);
                }
                self.result.bulk_appends += 1;
            }
            StoreOp::Pop { bucket } => {
                let outcome = self.store()?.pop_once(bucket);
                if self.unregistered(bucket, &outcome)? {
                    return Ok(());
                }
                let popped = outcome.map_err(|e| e.to_string())?.map(|r| r.value);
                let expected = self.model.get_mut(bucket).and_then(|q| q.pop_front());
                if popped != expected {
                    return Err(format!("popped {:?}, expected {:?}", popped, expected));
                }
                self.result.pops += 1;
            }
            StoreOp::PeekDispose { bucket } => {
                let outcome = self.store()?.peek(bucket);
                if self.unregistered(bucket, &outcome)? {
                    return Ok(());
                }
                let handle = outcome.map_err(|e| e.to_string())?;
                let expected = self.model.get(bucket).and_then(|q| q.front()).cloned();
                let peeked = handle.as_ref().map(|h| h.value().to_vec());
                if peeked != expected {
                    return Err(format!("peeked {:?}, expected {:?}", peeked, expected));
                }
                if let Some(handle) = handle {
                    handle.dispose().map_err(|e| e.to_string())?;
                    handle.dispose().map_err(|e| format!("second dispose: {}", e))?;
                    if let Some(queue) = self.model.get_mut(bucket) {
                        queue.pop_front();
                    }
                    self.result.disposes += 1;
                }
            }
            StoreOp::DeleteBucket { bucket } => {
                let outcome = self.store()?.delete_bucket(bucket);
                if self.unregistered(bucket, &outcome)? {
                    return Ok(());
                }
                let held = self.model.get(bucket).map(|q| q.len()).unwrap_or(0);
                match outcome {
                    Ok(()) if held == 0 => {
                        self.model.remove(bucket);
                        self.result.bucket_deletes += 1;
                    }
                    Err(QueueError::BucketNotEmpty { records, .. }) if records == held && held > 0 => {}
                    other => {
                        return Err(format!(
                            "delete of bucket holding {} records returned {:?}",
                            held, other
                        ))
                    }
                }
            }
            StoreOp::Reopen => {
                if let Some(store) = self.store.take() {
                    store.close().map_err(|e| e.to_string())?;
                }
                self.open().map_err(|e| format!("reopen: {}", e))?;
                self.result.reopens += 1;
            }
            StoreOp::Abandon => {
                self.store = None;
                self.open().map_err(|e| format!("reopen after drop: {}", e))?;
                self.result.abandons += 1;
            }
            StoreOp::RewindReopen { millis } => {
                if let Some(store) = self.store.take() {
                    store.close().map_err(|e| e.to_string())?;
                }
                let now = self.clock.now_millis();
                self.clock.set(now.saturating_sub(*millis));
                self.open().map_err(|e| format!("reopen after rewind: {}", e))?;
                self.result.rewinds += 1;
            }
        }
        Ok(())
    }

    fn run_single_op(&mut self) {
        // Between 0 and 2 ms pass per step, so many ids share a millisecond
        let step = self.rng.gen_range(0..3);
        self.clock.advance(Duration::from_millis(step));

        let op = self.choose_op();
        self.result.last_op = Some(op.clone());
        self.result.total_operations += 1;

        let outcome = self.apply(&op).and_then(|_| self.check_invariants());
        if let Err(violation) = outcome {
            self.result.invariant_violations.push(format!(
                "Op #{}: {:?} - {}",
                self.result.total_operations, op, violation
            ));
        }
    }

    fn check_invariants(&self) -> Result<(), String> {
        let store = self.store()?;

        // Invariant 1: registered set matches the model
        let expected_buckets: Vec<String> = self.model.keys().cloned().collect();
        if store.buckets() != expected_buckets {
            return Err(format!(
                "bucket set mismatch: actual={:?}, expected={:?}",
                store.buckets(),
                expected_buckets
            ));
        }

        for (bucket, queue) in &self.model {
            // Invariant 2: count matches
            let count = store.count(bucket).map_err(|e| e.to_string())?;
            if count != queue.len() {
                return Err(format!(
                    "count mismatch in {}: actual={}, expected={}",
                    bucket,
                    count,
                    queue.len()
                ));
            }

            // Invariant 3: FIFO order matches
            let values = store.drain_all(bucket).map_err(|e| e.to_string())?;
            if !values.iter().eq(queue.iter()) {
                return Err(format!("order mismatch in {}", bucket));
            }
        }

        Ok(())
    }

    pub fn run(&mut self, operations: usize) {
        if !self.result.invariant_violations.is_empty() {
            return;
        }
        for _ in 0..operations {
            self.run_single_op();
            if !self.result.invariant_violations.is_empty() {
                break;
            }
        }
    }

    pub fn result(&self) -> &StoreDSTResult {
        &self.result
    }

    /// Contents of every bucket the model holds, read back from the store
    pub fn snapshot(&self) -> Result<BTreeMap<String, Vec<Vec<u8>>>, String> {
        let store = self.store()?;
        self.model
            .keys()
            .map(|bucket| {
                store
                    .drain_all(bucket)
                    .map(|values| (bucket.clone(), values))
                    .map_err(|e| e.to_string())
            })
            .collect()
    }
}

/// Run a batch of DST tests
pub fn run_store_batch(
    start_seed: u64,
    num_seeds: usize,
    ops_per_seed: usize,
    config_fn: fn(u64) -> StoreDSTConfig,
) -> Vec<StoreDSTResult> {
    (0..num_seeds)
        .map(|i| {
            let seed = start_seed + i as u64;
            let mut harness = StoreDSTHarness::new(config_fn(seed));
            harness.run(ops_per_seed);
            harness.result().clone()
        })
        .collect()
}

/// Summarize batch results
pub fn summarize_store_batch(results: &[StoreDSTResult]) -> String {
    let total = results.len();
    let passed = results.iter().filter(|r| r.is_success()).count();
    let failed = total - passed;
    let total_ops: u64 = results.iter().map(|r| r.total_operations).sum();

    let mut summary = format!(
        "Store DST Summary\n\
         =================\n\
         Seeds: {} total, {} passed, {} failed\n\
         Total operations: {}\n",
        total, passed, failed, total_ops
    );

    if failed > 0 {
        summary.push_str("\nFailed seeds:\n");
        for result in results.iter().filter(|r| !r.is_success()) {
            summary.push_str(&format!("  Seed {}: {}\n", result.seed, result.summary()));
            for violation in &result.invariant_violations {
                summary.push_str(&format!("    - {}\n", violation));
            }
        }
    }

    summary
}
