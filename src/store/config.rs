//! Store Configuration
//!
//! Where a store keeps its directory and how hard it flushes. Loadable from TOML
//! or from `BUCKETQ_*` environment variables.

use super::backend::SyncPolicy;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default extension for ephemeral store directories
pub const DEFAULT_EXTENSION: &str = "bq";

/// Backing location of a store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackingLocation {
    /// A directory at a caller-chosen path
    ExplicitPath { path: PathBuf },
    /// `<temp-dir>/<name>.<extension>`
    EphemeralNamed { name: String },
    /// Private temporary directory, removed when the store goes away
    InMemory,
}

/// Configuration for a `Store`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub location: BackingLocation,
    pub sync_policy: SyncPolicy,
    /// Extension used for ephemeral store directories
    pub extension: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            location: BackingLocation::InMemory,
            sync_policy: SyncPolicy::Always,
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }
}

impl StoreConfig {
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        StoreConfig {
            location: BackingLocation::ExplicitPath { path: path.into() },
            ..Default::default()
        }
    }

    pub fn ephemeral(name: impl Into<String>) -> Self {
        StoreConfig {
            location: BackingLocation::EphemeralNamed { name: name.into() },
            ..Default::default()
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Throwaway store without fsync, for tests
    pub fn test() -> Self {
        StoreConfig {
            sync_policy: SyncPolicy::OsBuffered,
            ..Default::default()
        }
    }

    pub fn with_sync_policy(mut self, sync_policy: SyncPolicy) -> Self {
        self.sync_policy = sync_policy;
        self
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: StoreConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Load from the process environment:
    ///
    /// - `BUCKETQ_PATH`: explicit store directory (wins over `BUCKETQ_NAME`)
    /// - `BUCKETQ_NAME`: ephemeral store name
    /// - `BUCKETQ_SYNC`: `always` (default) or `os`
    /// - `BUCKETQ_EXTENSION`: ephemeral directory extension (default `bq`)
    ///
    /// With neither path nor name set the store is in-memory.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let location = match (lookup("BUCKETQ_PATH"), lookup("BUCKETQ_NAME")) {
            (Some(path), _) => BackingLocation::ExplicitPath {
                path: PathBuf::from(path),
            },
            (None, Some(name)) => BackingLocation::EphemeralNamed { name },
            (None, None) => BackingLocation::InMemory,
        };

        let sync_policy = match lookup("BUCKETQ_SYNC").as_deref() {
            None | Some("always") => SyncPolicy::Always,
            Some("os") => SyncPolicy::OsBuffered,
            Some(other) => {
                return Err(ConfigError::Invalid(format!(
                    "BUCKETQ_SYNC must be 'always' or 'os', got '{}'",
                    other
                )))
            }
        };

        let config = StoreConfig {
            location,
            sync_policy,
            extension: lookup("BUCKETQ_EXTENSION").unwrap_or_else(|| DEFAULT_EXTENSION.to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.location {
            BackingLocation::ExplicitPath { path } if path.as_os_str().is_empty() => {
                Err(ConfigError::Invalid("store path is empty".to_string()))
            }
            BackingLocation::EphemeralNamed { name } if !is_plain_file_name(name) => Err(
                ConfigError::Invalid(format!("'{}' is not usable as a store name", name)),
            ),
            _ if self.extension.contains(['/', '\\']) => Err(ConfigError::Invalid(format!(
                "'{}' is not usable as a file extension",
                self.extension
            ))),
            _ => Ok(()),
        }
    }

    /// Absolute directory of the store, `None` when in-memory
    pub fn resolve_path(&self) -> Result<Option<PathBuf>, ConfigError> {
        self.validate()?;
        match &self.location {
            BackingLocation::ExplicitPath { path } if path.is_absolute() => Ok(Some(path.clone())),
            BackingLocation::ExplicitPath { path } => {
                let cwd = std::env::current_dir().map_err(|source| ConfigError::Io {
                    path: path.clone(),
                    source,
                })?;
                Ok(Some(cwd.join(path)))
            }
            BackingLocation::EphemeralNamed { name } => {
                let file = if self.extension.is_empty() {
                    name.clone()
                } else {
                    format!("{}.{}", name, self.extension)
                };
                Ok(Some(std::env::temp_dir().join(file)))
            }
            BackingLocation::InMemory => Ok(None),
        }
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}
