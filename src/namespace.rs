//! Bucket Namespace
//!
//! Maps human-readable bucket names to fixed-width collection ids
//! (SHA-1 of the name). Creating or dropping the collection itself happens
//! inside `register_with` / `remove_with`, with the table write lock held,
//! so the table and the keyspace never disagree about a bucket.
//!
//! Lock order: namespace lock, then the keyspace writer lock. Nothing that
//! holds the writer lock ever waits on the namespace.

use crate::error::QueueError;
use parking_lot::RwLock;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

/// Collection id length in bytes
pub const COLLECTION_ID_LEN: usize = 20;

/// Collection (partition) name derived from a bucket name
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionId([u8; COLLECTION_ID_LEN]);

impl CollectionId {
    pub fn for_bucket(name: &str) -> Self {
        let digest = Sha1::digest(name.as_bytes());
        let mut id = [0u8; COLLECTION_ID_LEN];
        id.copy_from_slice(&digest);
        CollectionId(id)
    }

    /// Parse the lowercase hex form produced by `Display`
    pub fn from_hex(text: &str) -> Option<Self> {
        if text.len() != COLLECTION_ID_LEN * 2 {
            return None;
        }
        let mut id = [0u8; COLLECTION_ID_LEN];
        for (byte, pair) in id.iter_mut().zip(text.as_bytes().chunks(2)) {
            let pair = std::str::from_utf8(pair).ok()?;
            if pair.bytes().any(|b| b.is_ascii_uppercase()) {
                return None;
            }
            *byte = u8::from_str_radix(pair, 16).ok()?;
        }
        Some(CollectionId(id))
    }

    pub fn as_bytes(&self) -> &[u8; COLLECTION_ID_LEN] {
        &self.0
    }
}

impl AsRef<[u8]> for CollectionId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CollectionId({})", self)
    }
}

/// Registered buckets of one store
#[derive(Debug, Default)]
pub struct BucketNamespace {
    table: RwLock<HashMap<String, CollectionId>>,
}

impl BucketNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bucket. `create` makes sure its collection exists and
    /// reports whether it had to create it; the mapping is recorded only if
    /// it succeeds. Idempotent.
    pub(crate) fn register_with<F>(&self, name: &str, create: F) -> Result<CollectionId, QueueError>
    where
        F: FnOnce(CollectionId) -> Result<bool, QueueError>,
    {
        let id = CollectionId::for_bucket(name);
        let mut table = self.table.write();
        let created = create(id)?;

        table.insert(name.to_string(), id);
        if created {
            info!(bucket = name, collection = %id, "bucket created");
        } else {
            debug!(bucket = name, collection = %id, "bucket registered");
        }
        Ok(id)
    }

    /// In-memory lookup; never touches storage.
    pub fn resolve(&self, name: &str) -> Result<CollectionId, QueueError> {
        self.table
            .read()
            .get(name)
            .copied()
            .ok_or_else(|| QueueError::NotRegistered(name.to_string()))
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.table.read().contains_key(name)
    }

    /// Registered bucket names, sorted
    pub fn buckets(&self) -> Vec<String> {
        let mut names: Vec<String> = self.table.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Run `remove` with the namespace write lock held and drop the mapping
    /// if it succeeds.
    pub(crate) fn remove_with<F>(&self, name: &str, remove: F) -> Result<(), QueueError>
    where
        F: FnOnce(CollectionId) -> Result<(), QueueError>,
    {
        let mut table = self.table.write();
        let id = *table
            .get(name)
            .ok_or_else(|| QueueError::NotRegistered(name.to_string()))?;
        remove(id)?;
        table.remove(name);
        Ok(())
    }
}
