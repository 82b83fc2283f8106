//! Queue Store
//!
//! Named FIFO buckets over a fjall keyspace, one partition per bucket. Every
//! operation is a single read or a single committed batch scoped to one
//! bucket's partition:
//!
//! | Operation            | Access | Effect                               |
//! |----------------------|--------|--------------------------------------|
//! | `append`             | write  | put one fresh id                     |
//! | `append_bulk[_dedup]`| write  | put one fresh id per surviving value |
//! | `peek`               | read   | first record + `Disposable`          |
//! | `pop_once`           | write  | first record, deleted atomically     |
//! | `count`/`drain_all`  | read   | scan                                 |
//! | `delete_bucket`      | write  | emptiness check + drop partition     |
//!
//! Record ids are drawn while the writer lock is held, so key order equals
//! commit order even with many appending threads.

mod backend;
mod config;
mod dedup;
mod handle;

pub use backend::SyncPolicy;
pub use config::{BackingLocation, StoreConfig, DEFAULT_EXTENSION};
pub use dedup::BulkAppend;
pub use handle::{Disposable, Record};

use crate::error::{QueueError, StorageError};
use crate::id::{IdGenerator, RecordId};
use crate::namespace::BucketNamespace;
use backend::Backend;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// A persistent set of named FIFO buckets
pub struct Store {
    backend: Arc<Backend>,
    namespace: BucketNamespace,
    ids: IdGenerator,
}

impl Store {
    pub fn open(config: StoreConfig) -> Result<Self, QueueError> {
        let backend = match config.resolve_path()? {
            Some(path) => Backend::open(path, config.sync_policy),
            None => Backend::scratch(config.sync_policy),
        }
        .map_err(QueueError::storage("open"))?;

        info!(path = ?backend.path(), sync_policy = ?backend.sync_policy(), "store opened");
        Ok(Store {
            backend: Arc::new(backend),
            namespace: BucketNamespace::new(),
            ids: IdGenerator::new(),
        })
    }

    /// Store directory at `path`, created if missing
    pub fn open_path(path: impl Into<PathBuf>) -> Result<Self, QueueError> {
        Self::open(StoreConfig::at_path(path))
    }

    /// Store directory at `<temp-dir>/<name>.bq`
    pub fn open_ephemeral(name: impl Into<String>) -> Result<Self, QueueError> {
        Self::open(StoreConfig::ephemeral(name))
    }

    /// Store in a private temporary directory, removed when the store goes away
    pub fn in_memory() -> Result<Self, QueueError> {
        Self::open(StoreConfig::in_memory())
    }

    /// Replace the id generator (seeded generators for simulation). Call it
    /// before registering buckets; registration seeds the generator.
    pub fn with_id_generator(mut self, ids: IdGenerator) -> Self {
        self.ids = ids;
        self
    }

    /// Register a bucket, creating it if absent. Registering twice is a no-op.
    ///
    /// The id generator is moved past the newest key already in the bucket,
    /// so records from an earlier run stay ahead of new ones.
    pub fn register(&self, bucket: &str) -> Result<(), QueueError> {
        self.namespace.register_with(bucket, |collection| {
            let writer = self.backend.writer().map_err(QueueError::storage("register"))?;
            let (partition, created) = writer
                .create(&collection)
                .map_err(QueueError::storage("register"))?;
            if let Some(newest) = self
                .backend
                .newest(&partition)
                .map_err(QueueError::storage("register"))?
            {
                self.ids.advance_past(newest);
            }
            Ok(created)
        })?;
        Ok(())
    }

    pub fn is_registered(&self, bucket: &str) -> bool {
        self.namespace.is_registered(bucket)
    }

    /// Buckets registered with this store, sorted by name
    pub fn buckets(&self) -> Vec<String> {
        self.namespace.buckets()
    }

    /// Append one value at the tail of the bucket
    pub fn append(&self, bucket: &str, value: impl AsRef<[u8]>) -> Result<RecordId, QueueError> {
        let collection = self.namespace.resolve(bucket)?;
        let writer = self.backend.writer().map_err(QueueError::storage("append"))?;
        let partition = writer
            .partition(&collection)
            .ok_or_else(|| QueueError::BucketNotFound(bucket.to_string()))?;

        let key = self.ids.next_id();
        let mut batch = writer.batch();
        batch.insert(&partition, key.as_bytes().as_slice(), value.as_ref());
        writer.commit(batch).map_err(QueueError::storage("append"))?;

        debug!(bucket, %key, "appended");
        Ok(key)
    }

    /// Append many values in one batch, skipping in-batch duplicates
    pub fn append_bulk<V>(&self, bucket: &str, values: &[V]) -> Result<BulkAppend, QueueError>
    where
        V: AsRef<[u8]>,
    {
        self.append_bulk_dedup::<V, &[u8]>(bucket, values, &[])
    }

    /// Append many values in one batch. Values equal to an item of
    /// `against`, or to an earlier value in `values`, are skipped.
    ///
    /// All surviving values commit together or none do.
    pub fn append_bulk_dedup<V, A>(
        &self,
        bucket: &str,
        values: &[V],
        against: &[A],
    ) -> Result<BulkAppend, QueueError>
    where
        V: AsRef<[u8]>,
        A: AsRef<[u8]>,
    {
        let collection = self.namespace.resolve(bucket)?;
        let kept = dedup::dedup(values, against);
        let result = BulkAppend {
            stored: kept.len(),
            skipped: values.len() - kept.len(),
        };

        let writer = self
            .backend
            .writer()
            .map_err(QueueError::storage("append_bulk"))?;
        let partition = writer
            .partition(&collection)
            .ok_or_else(|| QueueError::BucketNotFound(bucket.to_string()))?;
        if kept.is_empty() {
            return Ok(result);
        }

        let mut batch = writer.batch();
        for value in kept {
            let key = self.ids.next_id();
            batch.insert(&partition, key.as_bytes().as_slice(), value);
        }
        writer
            .commit(batch)
            .map_err(QueueError::storage("append_bulk"))?;

        debug!(
            bucket,
            stored = result.stored,
            skipped = result.skipped,
            "bulk appended"
        );
        Ok(result)
    }

    /// Oldest record, left in place. `None` if the bucket is empty or its
    /// partition is gone.
    pub fn peek(&self, bucket: &str) -> Result<Option<Disposable>, QueueError> {
        let collection = self.namespace.resolve(bucket)?;
        let Some(partition) = self
            .backend
            .reader(&collection)
            .map_err(QueueError::storage("peek"))?
        else {
            return Ok(None);
        };

        let first = self
            .backend
            .first(&collection, &partition)
            .map_err(QueueError::storage("peek"))?;
        Ok(first.map(|record| {
            Disposable::new(Arc::clone(&self.backend), bucket, collection, record)
        }))
    }

    /// Remove and return the oldest record. A record returned here is never
    /// returned again by any peek or pop.
    pub fn pop_once(&self, bucket: &str) -> Result<Option<Record>, QueueError> {
        let collection = self.namespace.resolve(bucket)?;
        let writer = self
            .backend
            .writer()
            .map_err(QueueError::storage("pop_once"))?;
        let Some(partition) = writer.partition(&collection) else {
            return Ok(None);
        };
        let Some(record) = self
            .backend
            .first(&collection, &partition)
            .map_err(QueueError::storage("pop_once"))?
        else {
            return Ok(None);
        };

        let mut batch = writer.batch();
        batch.remove(&partition, record.key.as_bytes().as_slice());
        writer
            .commit(batch)
            .map_err(QueueError::storage("pop_once"))?;
        writer.popped(&collection, record.key);

        debug!(bucket, key = %record.key, "popped");
        Ok(Some(record))
    }

    /// Number of records in the bucket (0 if its partition is gone)
    pub fn count(&self, bucket: &str) -> Result<usize, QueueError> {
        let collection = self.namespace.resolve(bucket)?;
        match self
            .backend
            .reader(&collection)
            .map_err(QueueError::storage("count"))?
        {
            Some(partition) => self
                .backend
                .count(&collection, &partition)
                .map_err(QueueError::storage("count")),
            None => Ok(0),
        }
    }

    /// Every value in FIFO order, without removing any
    pub fn drain_all(&self, bucket: &str) -> Result<Vec<Vec<u8>>, QueueError> {
        let collection = self.namespace.resolve(bucket)?;
        match self
            .backend
            .reader(&collection)
            .map_err(QueueError::storage("drain_all"))?
        {
            Some(partition) => self
                .backend
                .values(&collection, &partition)
                .map_err(QueueError::storage("drain_all")),
            None => Ok(Vec::new()),
        }
    }

    /// Delete an empty bucket. The emptiness check and the drop both run
    /// under the writer lock, so a concurrent append either lands first (and
    /// the delete is refused) or fails with `NotRegistered`/`BucketNotFound`.
    pub fn delete_bucket(&self, bucket: &str) -> Result<(), QueueError> {
        self.namespace.remove_with(bucket, |collection| {
            let writer = self
                .backend
                .writer()
                .map_err(QueueError::storage("delete_bucket"))?;
            let partition = writer
                .partition(&collection)
                .ok_or_else(|| QueueError::BucketNotFound(bucket.to_string()))?;
            let records = self
                .backend
                .count(&collection, &partition)
                .map_err(QueueError::storage("delete_bucket"))?;
            if records > 0 {
                return Err(QueueError::BucketNotEmpty {
                    bucket: bucket.to_string(),
                    records,
                });
            }
            drop(partition);
            writer
                .drop_partition(&collection)
                .map_err(QueueError::storage("delete_bucket"))
        })?;

        info!(bucket, "bucket deleted");
        Ok(())
    }

    /// Store directory, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.backend.path()
    }

    /// Flush, fsync and release the store. Outstanding `Disposable`s fail
    /// from here on.
    pub fn close(self) -> Result<(), QueueError> {
        self.backend.close().map_err(QueueError::storage("close"))?;
        info!(path = ?self.backend.path(), "store closed");
        Ok(())
    }

    /// Close the store and delete its directory
    pub fn destroy(self) -> Result<(), QueueError> {
        let Store { backend, .. } = self;
        backend.close().map_err(QueueError::storage("destroy"))?;
        if backend.is_scratch() {
            return Ok(());
        }

        let dir = backend.dir().to_path_buf();
        drop(backend);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(QueueError::storage("destroy")(StorageError::Io(e))),
        }
        info!(path = %dir.display(), "store destroyed");
        Ok(())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("backend", &self.backend)
            .field("buckets", &self.namespace.buckets())
            .finish()
    }
}
