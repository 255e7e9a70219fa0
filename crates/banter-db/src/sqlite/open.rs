//! Connection bootstrap.
//!
//! The write handle is opened once per process and configured with WAL
//! journaling, normal durability, foreign keys, a fixed page size, and a
//! bounded page cache. Read-only handles are opened by the pool with
//! query-only enforcement and their own independent cache configuration;
//! they share no compiled statements with the write handle or each other.

use rusqlite::{Connection, OpenFlags};
use tracing::info;

use banter_core::{Result, StorageError};

use crate::config::DatabaseConfig;

/// Open and configure the single read-write handle.
///
/// Pragmas are applied once here and never renegotiated. `page_size` must
/// precede the switch to WAL, so it comes first in the batch.
pub fn open_write(config: &DatabaseConfig) -> Result<Connection> {
    if let Some(parent) = config.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::connection(format!("create parent directory: {e}")))?;
        }
    }

    let conn = Connection::open(&config.path)
        .map_err(|e| StorageError::connection(format!("open write handle: {e}")))?;

    conn.execute_batch(&format!(
        "PRAGMA page_size = {};\
         PRAGMA journal_mode = WAL;\
         PRAGMA synchronous = NORMAL;\
         PRAGMA foreign_keys = ON;\
         PRAGMA busy_timeout = {};\
         PRAGMA cache_size = -{};",
        config.page_size, config.busy_timeout_ms, config.cache_size_kib,
    ))
    .map_err(|e| StorageError::connection(format!("apply write pragmas: {e}")))?;

    info!(path = %config.path.display(), "write handle opened");
    Ok(conn)
}

/// Open and configure one read-only pool handle.
///
/// The handle is opened with the read-only flag and additionally pinned
/// with `query_only`, so a stray write statement fails at execution rather
/// than silently mutating state.
pub fn open_read_only(config: &DatabaseConfig) -> Result<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;

    let conn = Connection::open_with_flags(&config.path, flags)
        .map_err(|e| StorageError::connection(format!("open read-only handle: {e}")))?;

    conn.execute_batch(&format!(
        "PRAGMA query_only = ON;\
         PRAGMA busy_timeout = {};\
         PRAGMA cache_size = -{};",
        config.busy_timeout_ms, config.cache_size_kib,
    ))
    .map_err(|e| StorageError::connection(format!("apply read pragmas: {e}")))?;

    Ok(conn)
}

/// Pragma state for verification.
#[derive(Debug)]
pub struct PragmaState {
    /// Journal mode (`wal` for file databases).
    pub journal_mode: String,
    /// Whether foreign keys are enabled.
    pub foreign_keys_enabled: bool,
    /// Configured page size in bytes.
    pub page_size: u32,
}

/// Read back the pragmas that matter, for tests and diagnostics.
pub fn verify_pragmas(conn: &Connection) -> Result<PragmaState> {
    let journal_mode: String = conn
        .query_row("PRAGMA journal_mode", [], |row| row.get(0))
        .map_err(|e| StorageError::connection(format!("read journal_mode: {e}")))?;
    let foreign_keys: i32 = conn
        .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
        .map_err(|e| StorageError::connection(format!("read foreign_keys: {e}")))?;
    let page_size: u32 = conn
        .query_row("PRAGMA page_size", [], |row| row.get(0))
        .map_err(|e| StorageError::connection(format!("read page_size: {e}")))?;
    Ok(PragmaState {
        journal_mode,
        foreign_keys_enabled: foreign_keys == 1,
        page_size,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
