//! Database configuration with serde defaults and environment overrides.
//!
//! Every field has a compiled default, so `DatabaseConfig::new(path)` is
//! enough for production use and `{}` deserializes to a full config.
//! Environment variables (`BANTER_DB_*`) override file/compiled values,
//! highest priority, mirroring how the rest of the app loads settings.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use banter_core::RetryConfig;

/// Default maximum number of read-only pool connections.
pub const DEFAULT_MAX_READERS: usize = 10;
/// Default prepared-statement cache capacity (entries).
pub const DEFAULT_STATEMENT_CACHE_CAPACITY: usize = 64;
/// Default page size in bytes.
pub const DEFAULT_PAGE_SIZE: u32 = 4096;
/// Default page cache size in KiB (8 MiB).
pub const DEFAULT_CACHE_SIZE_KIB: i64 = 8192;
/// Default busy timeout in milliseconds.
pub const DEFAULT_BUSY_TIMEOUT_MS: u32 = 5000;
/// Default interval between passive WAL checkpoints, in seconds.
pub const DEFAULT_CHECKPOINT_INTERVAL_SECS: u64 = 60;
/// Default interval between vacuum checks, in seconds.
pub const DEFAULT_VACUUM_INTERVAL_SECS: u64 = 3600;
/// Default reclaimable-space threshold that triggers a vacuum (10 MiB).
pub const DEFAULT_VACUUM_THRESHOLD_BYTES: u64 = 10 * 1024 * 1024;

/// Configuration for the storage layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    /// Path to the database file. `:memory:` disables the read pool.
    pub path: PathBuf,
    /// Maximum live read-only connections (checked out + idle).
    #[serde(default = "default_max_readers")]
    pub max_readers: usize,
    /// Prepared-statement cache capacity on the write connection.
    #[serde(default = "default_statement_cache_capacity")]
    pub statement_cache_capacity: usize,
    /// Page size in bytes, applied once at open time.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Page cache size in KiB.
    #[serde(default = "default_cache_size_kib")]
    pub cache_size_kib: i64,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,
    /// Seconds between background passive checkpoints.
    #[serde(default = "default_checkpoint_interval_secs")]
    pub checkpoint_interval_secs: u64,
    /// Seconds between background vacuum checks.
    #[serde(default = "default_vacuum_interval_secs")]
    pub vacuum_interval_secs: u64,
    /// Reclaimable bytes above which a full vacuum runs.
    #[serde(default = "default_vacuum_threshold_bytes")]
    pub vacuum_threshold_bytes: u64,
    /// Retry policy for transient contention.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_max_readers() -> usize {
    DEFAULT_MAX_READERS
}
fn default_statement_cache_capacity() -> usize {
    DEFAULT_STATEMENT_CACHE_CAPACITY
}
fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}
fn default_cache_size_kib() -> i64 {
    DEFAULT_CACHE_SIZE_KIB
}
fn default_busy_timeout_ms() -> u32 {
    DEFAULT_BUSY_TIMEOUT_MS
}
fn default_checkpoint_interval_secs() -> u64 {
    DEFAULT_CHECKPOINT_INTERVAL_SECS
}
fn default_vacuum_interval_secs() -> u64 {
    DEFAULT_VACUUM_INTERVAL_SECS
}
fn default_vacuum_threshold_bytes() -> u64 {
    DEFAULT_VACUUM_THRESHOLD_BYTES
}

impl DatabaseConfig {
    /// Config for the given path with all defaults.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_readers: DEFAULT_MAX_READERS,
            statement_cache_capacity: DEFAULT_STATEMENT_CACHE_CAPACITY,
            page_size: DEFAULT_PAGE_SIZE,
            cache_size_kib: DEFAULT_CACHE_SIZE_KIB,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            checkpoint_interval_secs: DEFAULT_CHECKPOINT_INTERVAL_SECS,
            vacuum_interval_secs: DEFAULT_VACUUM_INTERVAL_SECS,
            vacuum_threshold_bytes: DEFAULT_VACUUM_THRESHOLD_BYTES,
            retry: RetryConfig::default(),
        }
    }

    /// Load config from a JSON file, falling back to defaults for the
    /// given path if the file does not exist, then applying environment
    /// overrides (highest priority).
    ///
    /// # Errors
    ///
    /// Returns [`banter_core::StorageError::Operation`] if the file exists
    /// but contains invalid JSON.
    pub fn load(config_path: &Path, db_path: impl Into<PathBuf>) -> banter_core::Result<Self> {
        let mut config = if config_path.exists() {
            debug!(path = %config_path.display(), "loading database config from file");
            let content = std::fs::read_to_string(config_path).map_err(|e| {
                banter_core::StorageError::operation(format!("read config: {e}"))
            })?;
            serde_json::from_str(&content).map_err(|e| {
                banter_core::StorageError::operation(format!("parse config: {e}"))
            })?
        } else {
            debug!(path = %config_path.display(), "config file not found, using defaults");
            Self::new(db_path)
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Whether the configured path is an in-memory database.
    ///
    /// In-memory databases get no read pool: separate `:memory:` handles
    /// would each see their own empty database, so all reads fall back to
    /// the write gateway.
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == ":memory:"
    }

    /// Apply `BANTER_DB_*` environment variable overrides in place.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse::<usize>("BANTER_DB_MAX_READERS") {
            self.max_readers = v;
        }
        if let Some(v) = env_parse::<usize>("BANTER_DB_STATEMENT_CACHE_CAPACITY") {
            self.statement_cache_capacity = v;
        }
        if let Some(v) = env_parse::<u32>("BANTER_DB_BUSY_TIMEOUT_MS") {
            self.busy_timeout_ms = v;
        }
        if let Some(v) = env_parse::<u64>("BANTER_DB_CHECKPOINT_INTERVAL_SECS") {
            self.checkpoint_interval_secs = v;
        }
        if let Some(v) = env_parse::<u64>("BANTER_DB_VACUUM_THRESHOLD_BYTES") {
            self.vacuum_threshold_bytes = v;
        }
        if let Some(v) = env_parse::<u32>("BANTER_DB_RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = v;
        }
        if let Some(v) = env_parse::<u64>("BANTER_DB_RETRY_BASE_DELAY_MS") {
            self.retry.base_delay_ms = v;
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
