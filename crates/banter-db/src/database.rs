//! Public storage facade.
//!
//! A [`Database`] starts uninitialized; [`Database::initialize`] opens the
//! write gateway, creates the read pool, and starts background
//! maintenance. Every operation before that fails fast with
//! [`StorageError::NotInitialized`]. If initialization itself fails, the
//! failure is logged and storage stays disabled for the session rather
//! than crashing the app.

use std::sync::Arc;

use parking_lot::RwLock;
use rusqlite::Row;
use tracing::{debug, error, info, warn};

use banter_core::{Result, SqlValue, StorageError};

use crate::bulk;
use crate::config::DatabaseConfig;
use crate::gateway::{WriteContext, WriteGateway};
use crate::maintenance::{self, CheckpointStats, MaintenanceScheduler};
use crate::pool::ReadPool;

struct DatabaseInner {
    gateway: Arc<WriteGateway>,
    pool: ReadPool,
    maintenance: MaintenanceScheduler,
}

/// Concurrency-safe access layer over one `SQLite` file.
pub struct Database {
    config: DatabaseConfig,
    inner: RwLock<Option<Arc<DatabaseInner>>>,
}

impl Database {
    /// Create an uninitialized database handle for `config`.
    #[must_use]
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(None),
        }
    }

    /// Open the write connection, read pool, and maintenance loops.
    ///
    /// Calling this twice is an error. If opening the write connection
    /// fails, the error is returned and the database stays unusable;
    /// callers may keep running without persistence.
    pub fn initialize(&self) -> Result<()> {
        let mut slot = self.inner.write();
        if slot.is_some() {
            return Err(StorageError::operation("database already initialized"));
        }

        let gateway = match WriteGateway::open(&self.config) {
            Ok(gateway) => Arc::new(gateway),
            Err(e) => {
                error!(error = %e, "initialization failed, storage disabled for this session");
                return Err(e);
            }
        };
        let pool = ReadPool::new(self.config.clone());
        let maintenance = MaintenanceScheduler::new();
        maintenance.start(Arc::clone(&gateway), &self.config);

        *slot = Some(Arc::new(DatabaseInner {
            gateway,
            pool,
            maintenance,
        }));
        info!(path = %self.config.path.display(), "database initialized");
        Ok(())
    }

    /// Whether [`initialize`](Self::initialize) has succeeded.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.inner.read().is_some()
    }

    /// The configuration this handle was created with.
    #[must_use]
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    fn inner(&self) -> Result<Arc<DatabaseInner>> {
        self.inner
            .read()
            .as_ref()
            .map(Arc::clone)
            .ok_or(StorageError::NotInitialized)
    }

    // ── write path ──────────────────────────────────────────────────────

    /// Run `op` with exclusive access to the write connection.
    pub async fn with_write_connection<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut WriteContext<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.inner()?.gateway.with_write(op).await
    }

    /// Queue a fire-and-forget write. Skipped with a warning when the
    /// database is not initialized.
    pub fn with_write_connection_detached<F>(&self, op: F)
    where
        F: FnOnce(&mut WriteContext<'_>) -> Result<()> + Send + 'static,
    {
        match self.inner() {
            Ok(inner) => inner.gateway.with_write_detached(op),
            Err(_) => warn!("detached write skipped: database not initialized"),
        }
    }

    /// Run `op` inside one immediate transaction on the writer.
    pub async fn run_in_transaction<T, F>(&self, op: F) -> Result<T>
    where
        F: for<'conn> FnOnce(&mut WriteContext<'conn>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.with_write_connection(move |ctx| ctx.run_in_transaction(op))
            .await
    }

    /// Run every operation in `ops` inside one transaction, in order,
    /// aborting and rolling back on the first failure.
    pub async fn run_batch_in_transaction<T, F>(&self, ops: Vec<F>) -> Result<Vec<T>>
    where
        F: for<'conn> FnOnce(&mut WriteContext<'conn>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.with_write_connection(move |ctx| ctx.run_batch_in_transaction(ops))
            .await
    }

    /// Run a transactional operation, retrying on transient contention.
    ///
    /// Only [`StorageError::Busy`] and [`StorageError::Locked`] are
    /// retried, with a linear backoff between attempts. After the
    /// configured number of attempts the last error is wrapped in
    /// [`StorageError::MaxRetriesExceeded`]. `op` must be cloneable so
    /// every attempt starts from the same closure.
    pub async fn execute_with_retry<T, F>(&self, op: F) -> Result<T>
    where
        F: for<'conn> FnOnce(&mut WriteContext<'conn>) -> Result<T> + Clone + Send + 'static,
        T: Send + 'static,
    {
        let retry = self.config.retry.clone();
        let max_attempts = retry.max_attempts.max(1);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self.run_in_transaction(op.clone()).await;
            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = retry.backoff_delay(attempt);
                    debug!(attempt, ?delay, error = %e, "transient contention, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_retryable() => {
                    return Err(StorageError::MaxRetriesExceeded {
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    // ── read path ───────────────────────────────────────────────────────

    /// Run a read-only query, preferring a pooled reader.
    ///
    /// When the pool has no connection to give (exhausted, in-memory
    /// database, zero ceiling), the query routes through the write
    /// gateway instead, so it still succeeds with the same results.
    pub async fn execute_read_query<T, F>(&self, sql: String, params: Vec<SqlValue>, map_row: F) -> Result<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = self.inner()?;
        match inner.pool.acquire()? {
            Some(reader) => {
                tokio::task::spawn_blocking(move || reader.query(&sql, &params, map_row))
                    .await
                    .map_err(|e| StorageError::operation(format!("read task failed: {e}")))?
            }
            None => {
                debug!("no pooled reader available, reading through write gateway");
                inner
                    .gateway
                    .with_write(move |ctx| ctx.query(&sql, &params, map_row))
                    .await
            }
        }
    }

    // ── bulk operations ─────────────────────────────────────────────────

    /// Insert rows as one JSON-parameterized statement in one transaction.
    ///
    /// Rows are positional arrays matching `columns`. Empty input is a
    /// no-op that never touches the writer.
    pub async fn bulk_insert(
        &self,
        table: &str,
        columns: &[&str],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let json = bulk::encode_rows(&rows, columns.len())?;
        let sql = bulk::insert_sql(table, columns);
        self.run_in_transaction(move |ctx| ctx.execute(&sql, &[SqlValue::Text(json)]))
            .await
    }

    /// Update rows by key as one JSON-parameterized statement.
    ///
    /// Each row is `[key, value1, value2, ...]` matching `columns`. Rows
    /// whose key matches nothing are skipped; the returned count covers
    /// only rows actually updated.
    pub async fn bulk_update(
        &self,
        table: &str,
        key_column: &str,
        columns: &[&str],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let json = bulk::encode_rows(&rows, columns.len() + 1)?;
        let sql = bulk::update_sql(table, key_column, columns);
        self.run_in_transaction(move |ctx| ctx.execute(&sql, &[SqlValue::Text(json)]))
            .await
    }

    /// Delete every row whose key appears in `keys`, in one statement.
    pub async fn bulk_delete(
        &self,
        table: &str,
        key_column: &str,
        keys: Vec<SqlValue>,
    ) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let json = bulk::encode_keys(&keys)?;
        let sql = bulk::delete_sql(table, key_column);
        self.run_in_transaction(move |ctx| ctx.execute(&sql, &[SqlValue::Text(json)]))
            .await
    }

    // ── maintenance ─────────────────────────────────────────────────────

    /// Run one passive WAL checkpoint now.
    pub async fn checkpoint(&self) -> Result<CheckpointStats> {
        self.with_write_connection(maintenance::run_checkpoint)
            .await
    }

    /// Vacuum now if reclaimable space exceeds the configured threshold.
    /// Returns whether a vacuum ran.
    pub async fn vacuum_if_needed(&self) -> Result<bool> {
        let threshold = self.config.vacuum_threshold_bytes;
        self.with_write_connection(move |ctx| {
            maintenance::run_vacuum_if_needed(ctx, threshold)
        })
        .await
    }

    /// Queue a checkpoint without waiting for it.
    pub fn schedule_checkpoint(&self) {
        match self.inner() {
            Ok(inner) => inner.gateway.with_write_detached(|ctx| {
                let _ = maintenance::run_checkpoint(ctx)?;
                Ok(())
            }),
            Err(_) => warn!("checkpoint skipped: database not initialized"),
        }
    }

    /// Queue a full maintenance pass (checkpoint, then vacuum check)
    /// without waiting for it.
    pub fn schedule_maintenance(&self) {
        let threshold = self.config.vacuum_threshold_bytes;
        match self.inner() {
            Ok(inner) => inner.gateway.with_write_detached(move |ctx| {
                let _ = maintenance::run_checkpoint(ctx)?;
                let _ = maintenance::run_vacuum_if_needed(ctx, threshold)?;
                Ok(())
            }),
            Err(_) => warn!("maintenance skipped: database not initialized"),
        }
    }

    // ── lifecycle ───────────────────────────────────────────────────────

    /// Stop maintenance, close the pool, and drain the writer.
    ///
    /// Pending writes already queued still run before the writer exits.
    /// The handle becomes uninitialized again afterwards.
    pub async fn shutdown(&self) {
        let inner = self.inner.write().take();
        if let Some(inner) = inner {
            inner.maintenance.stop();
            inner.pool.close();
            inner.gateway.shutdown().await;
            info!("database shut down");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
