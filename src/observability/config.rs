//! Logging Configuration
//!
//! Loaded from environment variables:
//!
//! - `RUST_LOG`: standard `EnvFilter` directives (default: `BUCKETQ_LOG_LEVEL`)
//! - `BUCKETQ_LOG_LEVEL`: fallback filter when `RUST_LOG` is unset (default: warn)
//! - `BUCKETQ_LOG_JSON`: `true`/`1` for one JSON object per line

/// Logging configuration loaded from environment variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter used when `RUST_LOG` is not set
    pub default_filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            default_filter: "warn".to_string(),
            json: false,
        }
    }
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        LogConfig {
            default_filter: lookup("BUCKETQ_LOG_LEVEL").unwrap_or(defaults.default_filter),
            json: lookup("BUCKETQ_LOG_JSON")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.json),
        }
    }
}
