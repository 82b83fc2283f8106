//! Records and disposable handles

use super::backend::Backend;
use crate::error::{QueueError, StorageError};
use crate::id::RecordId;
use crate::namespace::CollectionId;
use std::sync::Arc;
use tracing::debug;

/// One record read from a bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: RecordId,
    pub value: Vec<u8>,
}

impl Record {
    pub(crate) fn from_entry(key: &[u8], value: &[u8]) -> Result<Self, StorageError> {
        let key = RecordId::from_slice(key).ok_or_else(|| {
            StorageError::Corruption(format!("record key of {} bytes", key.len()))
        })?;
        Ok(Record {
            key,
            value: value.to_vec(),
        })
    }

    pub fn into_value(self) -> Vec<u8> {
        self.value
    }
}

/// A peeked record plus what it takes to delete exactly that record later.
///
/// Disposal is idempotent: deleting a record that a concurrent pop (or an
/// earlier dispose) already removed succeeds.
pub struct Disposable {
    backend: Arc<Backend>,
    bucket: String,
    collection: CollectionId,
    record: Record,
}

impl Disposable {
    pub(crate) fn new(
        backend: Arc<Backend>,
        bucket: &str,
        collection: CollectionId,
        record: Record,
    ) -> Self {
        Disposable {
            backend,
            bucket: bucket.to_string(),
            collection,
            record,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> RecordId {
        self.record.key
    }

    pub fn value(&self) -> &[u8] {
        &self.record.value
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn into_record(self) -> Record {
        self.record
    }

    /// Delete the record this handle was created from.
    pub fn dispose(&self) -> Result<(), QueueError> {
        let writer = self
            .backend
            .writer()
            .map_err(QueueError::storage("dispose"))?;
        let partition = writer
            .partition(&self.collection)
            .ok_or_else(|| QueueError::BucketNotFound(self.bucket.clone()))?;

        let mut batch = writer.batch();
        batch.remove(&partition, self.record.key.as_bytes().as_slice());
        writer.commit(batch).map_err(QueueError::storage("dispose"))?;

        debug!(bucket = %self.bucket, key = %self.record.key, "record disposed");
        Ok(())
    }
}

impl std::fmt::Debug for Disposable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposable")
            .field("bucket", &self.bucket)
            .field("record", &self.record)
            .finish()
    }
}
