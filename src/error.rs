//! Queue-level error taxonomy

use std::path::PathBuf;

/// Failures from the fjall keyspace under a store
#[derive(Debug)]
pub enum StorageError {
    /// Keyspace, partition or journal error
    Fjall(fjall::Error),
    /// Filesystem error outside fjall (creating or removing the store directory)
    Io(std::io::Error),
    /// A stored key is not a record id
    Corruption(String),
    /// Store was closed
    Closed,
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Fjall(e) => write!(f, "fjall error: {}", e),
            StorageError::Io(e) => write!(f, "I/O error: {}", e),
            StorageError::Corruption(msg) => write!(f, "corrupt store: {}", msg),
            StorageError::Closed => write!(f, "store is closed"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Fjall(e) => Some(e),
            StorageError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<fjall::Error> for StorageError {
    fn from(e: fjall::Error) -> Self {
        StorageError::Fjall(e)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}

/// Errors raised while loading a `StoreConfig`
#[derive(Debug)]
pub enum ConfigError {
    /// Config file could not be read
    Io { path: PathBuf, source: std::io::Error },
    /// TOML did not match the config schema
    Parse(toml::de::Error),
    /// Values parsed but are not usable
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "cannot read config {}: {}", path.display(), source)
            }
            ConfigError::Parse(e) => write!(f, "invalid config: {}", e),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Error type for every `Store` operation
#[derive(Debug)]
pub enum QueueError {
    /// Bucket name was never registered with this store
    NotRegistered(String),
    /// Bucket is registered but its collection no longer exists
    BucketNotFound(String),
    /// Delete refused because the bucket still holds records
    BucketNotEmpty { bucket: String, records: usize },
    /// Storage failure, with the operation that hit it
    Storage { op: &'static str, source: StorageError },
    /// Store could not be configured
    Config(ConfigError),
}

impl QueueError {
    pub(crate) fn storage<E>(op: &'static str) -> impl FnOnce(E) -> QueueError
    where
        E: Into<StorageError>,
    {
        move |source| QueueError::Storage {
            op,
            source: source.into(),
        }
    }

    /// True if this is a storage failure caused by a closed store
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            QueueError::Storage {
                source: StorageError::Closed,
                ..
            }
        )
    }
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueError::NotRegistered(bucket) => write!(f, "bucket '{}' is not registered", bucket),
            QueueError::BucketNotFound(bucket) => write!(f, "bucket '{}' not found", bucket),
            QueueError::BucketNotEmpty { bucket, records } => write!(
                f,
                "bucket '{}' is not empty ({} records)",
                bucket, records
            ),
            QueueError::Storage { op, source } => write!(f, "{} failed: {}", op, source),
            QueueError::Config(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for QueueError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            QueueError::Storage { source, .. } => Some(source),
            QueueError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for QueueError {
    fn from(e: ConfigError) -> Self {
        QueueError::Config(e)
    }
}
