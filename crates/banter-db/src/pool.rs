//! Bounded pool of read-only connections.
//!
//! Readers run concurrently with each other and with the writer thanks
//! to WAL. The pool opens handles lazily up to a fixed ceiling; when
//! every handle is checked out, [`ReadPool::acquire`] returns `Ok(None)`
//! and the caller falls back to the serial write gateway instead of
//! blocking. In-memory databases never get a pool, because a second
//! `:memory:` handle opens a different empty database.

use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params_from_iter, Connection, Row};
use tracing::{debug, warn};

use banter_core::{Result, SqlValue, StorageError};

use crate::config::DatabaseConfig;
use crate::sqlite::open;

struct PoolState {
    idle: Vec<Connection>,
    /// Connections in existence: idle + checked out.
    live: usize,
    closed: bool,
}

struct PoolInner {
    config: DatabaseConfig,
    state: Mutex<PoolState>,
}

/// Bounded lazy pool of read-only handles.
#[derive(Clone)]
pub struct ReadPool {
    inner: Arc<PoolInner>,
}

impl ReadPool {
    /// Create an empty pool for `config`. No connections are opened yet.
    #[must_use]
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                config,
                state: Mutex::new(PoolState {
                    idle: Vec::new(),
                    live: 0,
                    closed: false,
                }),
            }),
        }
    }

    /// Check out a reader, or `Ok(None)` when the pool cannot serve one.
    ///
    /// `None` means the caller should route the read through the write
    /// gateway: the pool is disabled (in-memory database, zero ceiling,
    /// closed) or every handle is already checked out. An `Err` only
    /// occurs when opening a fresh handle fails.
    pub fn acquire(&self) -> Result<Option<PooledReader>> {
        if self.inner.config.is_in_memory() || self.inner.config.max_readers == 0 {
            return Ok(None);
        }

        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Ok(None);
            }
            if let Some(conn) = state.idle.pop() {
                return Ok(Some(PooledReader {
                    conn: Some(conn),
                    pool: Arc::clone(&self.inner),
                }));
            }
            if state.live >= self.inner.config.max_readers {
                debug!(live = state.live, "read pool exhausted");
                return Ok(None);
            }
            state.live += 1;
        }

        // Open outside the lock; undo the reservation on failure.
        match open::open_read_only(&self.inner.config) {
            Ok(conn) => Ok(Some(PooledReader {
                conn: Some(conn),
                pool: Arc::clone(&self.inner),
            })),
            Err(e) => {
                self.inner.state.lock().live -= 1;
                warn!(error = %e, "failed to open read-only connection");
                Err(e)
            }
        }
    }

    /// Connections currently in existence (idle + checked out).
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.inner.state.lock().live
    }

    /// Connections currently idle in the pool.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    /// Close all idle handles and refuse further checkouts.
    ///
    /// Handles still checked out are closed when their readers drop.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        state.closed = true;
        let dropped = state.idle.len();
        state.live -= dropped;
        state.idle.clear();
        debug!(dropped, "read pool closed");
    }
}

/// A checked-out read-only connection. Returns to the pool on drop.
pub struct PooledReader {
    conn: Option<Connection>,
    pool: Arc<PoolInner>,
}

impl PooledReader {
    /// Run a read-only query and map every row.
    ///
    /// Statements are prepared fresh; only the write connection carries a
    /// statement cache.
    pub fn query<T>(
        &self,
        sql: &str,
        params: &[SqlValue],
        mut map_row: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let conn = self
            .conn
            .as_ref()
            .ok_or(StorageError::ConnectionUnavailable)?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| StorageError::from_sqlite_prepare(sql, &e))?;
        let mut rows = stmt
            .query(params_from_iter(params.iter()))
            .map_err(|e| StorageError::from_sqlite(sql, &e))?;

        let mut out = Vec::new();
        loop {
            match rows.next() {
                Ok(Some(row)) => out.push(map_row(row).map_err(|e| {
                    StorageError::operation(format!("row mapping failed: {e}"))
                })?),
                Ok(None) => break,
                Err(e) => return Err(StorageError::from_sqlite(sql, &e)),
            }
        }
        Ok(out)
    }
}

impl Drop for PooledReader {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let mut state = self.pool.state.lock();
            if state.closed {
                state.live -= 1;
                // Dropping the connection closes it.
            } else {
                state.idle.push(conn);
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
