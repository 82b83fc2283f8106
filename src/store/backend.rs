//! fjall keyspace behind a store
//!
//! One partition per bucket, named by the hex collection id. Writers
//! serialize on a single mutex and commit through a keyspace batch; readers
//! go straight to the partition and see a point-in-time view.
//!
//! Pops leave tombstones at the front of a partition until fjall compacts
//! them away. The last key popped from each partition is kept as its head,
//! and reads start just past it.

use super::handle::Record;
use crate::error::StorageError;
use crate::id::RecordId;
use crate::namespace::CollectionId;
use fjall::{Batch, CompressionType, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// How far a commit is flushed before it is acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPolicy {
    /// fsync the journal on every commit
    #[default]
    Always,
    /// Flush to the OS page cache; a power loss may drop the latest commits
    OsBuffered,
}

impl SyncPolicy {
    fn persist_mode(self) -> PersistMode {
        match self {
            SyncPolicy::Always => PersistMode::SyncAll,
            SyncPolicy::OsBuffered => PersistMode::Buffer,
        }
    }
}

fn partition_options() -> PartitionCreateOptions {
    PartitionCreateOptions::default().compression(CompressionType::None)
}

type KeyRange = (Bound<Vec<u8>>, Bound<Vec<u8>>);

pub(crate) struct Backend {
    keyspace: Keyspace,
    partitions: RwLock<HashMap<CollectionId, PartitionHandle>>,
    heads: Mutex<HashMap<CollectionId, RecordId>>,
    writer: Mutex<()>,
    sync_policy: SyncPolicy,
    closed: AtomicBool,
    dir: PathBuf,
    // Dropped after the keyspace, which removes the directory
    scratch: Option<TempDir>,
}

impl Backend {
    /// Open (or create) the keyspace in `dir`
    pub(crate) fn open(dir: PathBuf, sync_policy: SyncPolicy) -> Result<Self, StorageError> {
        Self::open_in(dir, None, sync_policy)
    }

    /// Keyspace in a fresh temporary directory, removed on drop
    pub(crate) fn scratch(sync_policy: SyncPolicy) -> Result<Self, StorageError> {
        let scratch = tempfile::Builder::new().prefix("bucketq-").tempdir()?;
        Self::open_in(scratch.path().to_path_buf(), Some(scratch), sync_policy)
    }

    fn open_in(
        dir: PathBuf,
        scratch: Option<TempDir>,
        sync_policy: SyncPolicy,
    ) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&dir)?;
        let keyspace = fjall::Config::new(&dir).open()?;

        let mut partitions = HashMap::new();
        for name in keyspace.list_partitions() {
            let Some(id) = CollectionId::from_hex(&name) else {
                continue;
            };
            let handle = keyspace.open_partition(&name, partition_options())?;
            partitions.insert(id, handle);
        }
        debug!(dir = %dir.display(), collections = partitions.len(), "keyspace opened");

        Ok(Backend {
            keyspace,
            partitions: RwLock::new(partitions),
            heads: Mutex::new(HashMap::new()),
            writer: Mutex::new(()),
            sync_policy,
            closed: AtomicBool::new(false),
            dir,
            scratch,
        })
    }

    /// Take the single writer slot. Blocks while another writer holds it.
    pub(crate) fn writer(&self) -> Result<Writer<'_>, StorageError> {
        let guard = self.writer.lock();
        self.check_open()?;
        Ok(Writer {
            backend: self,
            _guard: guard,
        })
    }

    /// Partition of a collection for reading, `None` if it does not exist
    pub(crate) fn reader(&self, id: &CollectionId) -> Result<Option<PartitionHandle>, StorageError> {
        self.check_open()?;
        Ok(self.partitions.read().get(id).cloned())
    }

    /// Smallest live record
    pub(crate) fn first(
        &self,
        id: &CollectionId,
        partition: &PartitionHandle,
    ) -> Result<Option<Record>, StorageError> {
        let entry = partition.range(self.live_range(id)).next().transpose()?;
        entry
            .map(|(key, value)| Record::from_entry(&key, &value))
            .transpose()
    }

    /// Largest stored key
    pub(crate) fn newest(&self, partition: &PartitionHandle) -> Result<Option<RecordId>, StorageError> {
        match partition.last_key_value()? {
            Some((key, value)) => Ok(Some(Record::from_entry(&key, &value)?.key)),
            None => Ok(None),
        }
    }

    pub(crate) fn count(
        &self,
        id: &CollectionId,
        partition: &PartitionHandle,
    ) -> Result<usize, StorageError> {
        let mut records = 0;
        for entry in partition.range(self.live_range(id)) {
            entry?;
            records += 1;
        }
        Ok(records)
    }

    /// Every live value in key order
    pub(crate) fn values(
        &self,
        id: &CollectionId,
        partition: &PartitionHandle,
    ) -> Result<Vec<Vec<u8>>, StorageError> {
        partition
            .range(self.live_range(id))
            .map(|entry| entry.map(|(_, value)| value.to_vec()).map_err(StorageError::from))
            .collect()
    }

    fn live_range(&self, id: &CollectionId) -> KeyRange {
        match self.heads.lock().get(id) {
            Some(head) => (Bound::Excluded(head.as_bytes().to_vec()), Bound::Unbounded),
            None => (Bound::Unbounded, Bound::Unbounded),
        }
    }

    fn check_open(&self) -> Result<(), StorageError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }

    /// Flush and fsync everything, then refuse further operations
    pub(crate) fn close(&self) -> Result<(), StorageError> {
        let _guard = self.writer.lock();
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.keyspace.persist(PersistMode::SyncAll)?;
        info!(dir = %self.dir.display(), "keyspace closed");
        Ok(())
    }

    /// Store directory, `None` for scratch keyspaces
    pub(crate) fn path(&self) -> Option<&Path> {
        match self.scratch {
            Some(_) => None,
            None => Some(&self.dir),
        }
    }

    pub(crate) fn is_scratch(&self) -> bool {
        self.scratch.is_some()
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn sync_policy(&self) -> SyncPolicy {
        self.sync_policy
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::Acquire) {
            if let Err(e) = self.keyspace.persist(PersistMode::SyncAll) {
                warn!(error = %e, dir = %self.dir.display(), "persist on drop failed");
            }
        }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("dir", &self.dir)
            .field("scratch", &self.is_scratch())
            .field("sync_policy", &self.sync_policy)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

/// Exclusive write access to the keyspace
pub(crate) struct Writer<'a> {
    backend: &'a Backend,
    _guard: MutexGuard<'a, ()>,
}

impl Writer<'_> {
    pub(crate) fn partition(&self, id: &CollectionId) -> Option<PartitionHandle> {
        self.backend.partitions.read().get(id).cloned()
    }

    /// Partition of `id`, created if absent. The flag is true when created.
    pub(crate) fn create(&self, id: &CollectionId) -> Result<(PartitionHandle, bool), StorageError> {
        if let Some(handle) = self.partition(id) {
            return Ok((handle, false));
        }
        let handle = self
            .backend
            .keyspace
            .open_partition(&id.to_string(), partition_options())?;
        self.persist()?;
        self.backend.partitions.write().insert(*id, handle.clone());
        Ok((handle, true))
    }

    /// Delete the partition of `id` and everything in it
    pub(crate) fn drop_partition(&self, id: &CollectionId) -> Result<(), StorageError> {
        let Some(handle) = self.backend.partitions.write().remove(id) else {
            return Ok(());
        };
        if let Err(e) = self.backend.keyspace.delete_partition(handle.clone()) {
            self.backend.partitions.write().insert(*id, handle);
            return Err(e.into());
        }
        self.backend.heads.lock().remove(id);
        self.persist()
    }

    pub(crate) fn batch(&self) -> Batch {
        self.backend.keyspace.batch()
    }

    /// Apply a batch atomically and flush it per the sync policy
    pub(crate) fn commit(&self, batch: Batch) -> Result<(), StorageError> {
        batch.commit()?;
        self.persist()
    }

    /// Record that `key` was the smallest key of `id` and is now deleted
    pub(crate) fn popped(&self, id: &CollectionId, key: RecordId) {
        self.backend.heads.lock().insert(*id, key);
    }

    fn persist(&self) -> Result<(), StorageError> {
        self.backend
            .keyspace
            .persist(self.backend.sync_policy.persist_mode())?;
        Ok(())
    }
}
