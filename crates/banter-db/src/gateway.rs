//! Execution gateway: the serial write path.
//!
//! One dedicated writer thread owns the read-write connection and the
//! prepared-statement cache. Every write (and every pool-exhaustion read
//! fallback) is a job submitted over a channel; jobs run to completion in
//! submission order, so no two write-path operations ever execute
//! concurrently and neither the connection nor the cache needs a lock.
//!
//! Callers interact through [`WriteGateway::with_write`], which suspends
//! until the job's turn comes and its result is sent back, or
//! [`WriteGateway::with_write_detached`] for fire-and-forget writes.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread;

use parking_lot::Mutex;
use rusqlite::{params_from_iter, Connection, Row};
use tracing::{debug, error, warn};

use banter_core::{Result, SqlValue, StorageError};

use crate::config::DatabaseConfig;
use crate::sqlite::open;
use crate::sqlite::statement_cache::{CacheStats, StatementCache};

/// A job executed on the writer thread.
type WriteJob = Box<dyn for<'a, 'conn> FnOnce(&'a mut WriteContext<'conn>) + Send>;

enum Command {
    Job(WriteJob),
    Shutdown,
}

/// Execution context handed to write jobs.
///
/// Lives on the writer thread for the lifetime of the connection; jobs
/// borrow it for the duration of one turn.
pub struct WriteContext<'conn> {
    conn: &'conn Connection,
    cache: StatementCache<'conn>,
    pub(crate) in_transaction: bool,
}

impl<'conn> WriteContext<'conn> {
    /// The raw write connection, for operations the cached-statement
    /// helpers cannot express (pragmas, batches).
    #[must_use]
    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }

    /// Execute `sql` through the statement cache, returning affected rows.
    pub fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<usize> {
        let stmt = self.cache.get(self.conn, sql)?;
        stmt.execute(params_from_iter(params.iter()))
            .map_err(|e| StorageError::from_sqlite(sql, &e))
    }

    /// Run a query through the statement cache and map every row.
    ///
    /// Mapper failures surface as [`StorageError::Operation`]; the engine's
    /// own step failures are classified by [`StorageError::from_sqlite`].
    pub fn query<T>(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        mut map_row: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let stmt = self.cache.get(self.conn, sql)?;
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

    /// Statement cache counters.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Finalize every cached statement (required before `VACUUM`).
    pub fn clear_statement_cache(&mut self) {
        self.cache.clear();
    }

    /// Reset writer state after a panicking job.
    ///
    /// Any transaction the job left open is rolled back so the next job
    /// starts from autocommit.
    fn recover_from_panic(&mut self) {
        self.in_transaction = false;
        if !self.conn.is_autocommit() {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                error!(error = %e, "rollback after panicked write job failed");
            }
        }
    }
}

/// Handle to the serial write path.
pub struct WriteGateway {
    sender: mpsc::Sender<Command>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl WriteGateway {
    /// Open the write connection and spawn the writer thread.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let conn = open::open_write(config)?;
        let cache_capacity = config.statement_cache_capacity;
        let (sender, receiver) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("banter-db-writer".to_string())
            .spawn(move || writer_loop(&conn, &receiver, cache_capacity))
            .map_err(|e| StorageError::connection(format!("spawn writer thread: {e}")))?;

        Ok(Self {
            sender,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Run `op` with exclusive access to the write connection.
    ///
    /// The operation is queued behind every previously submitted write and
    /// runs to completion before the next one starts. Returns
    /// [`StorageError::ConnectionUnavailable`] if the writer is gone, and
    /// treats a panicking `op` as a failed operation.
    pub async fn with_write<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut WriteContext<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let job: WriteJob = Box::new(move |ctx| {
            let outcome = catch_unwind(AssertUnwindSafe(|| op(&mut *ctx)));
            let result = outcome.unwrap_or_else(|_| {
                error!("write operation panicked");
                ctx.recover_from_panic();
                Err(StorageError::operation("write operation panicked"))
            });
            let _ = tx.send(result);
        });

        self.sender
            .send(Command::Job(job))
            .map_err(|_| StorageError::ConnectionUnavailable)?;
        rx.await.map_err(|_| StorageError::ConnectionUnavailable)?
    }

    /// Submit a fire-and-forget write.
    ///
    /// Failures are logged and dropped; a gateway that is already shut
    /// down skips the job with a warning instead of erroring.
    pub fn with_write_detached<F>(&self, op: F)
    where
        F: FnOnce(&mut WriteContext<'_>) -> Result<()> + Send + 'static,
    {
        let job: WriteJob = Box::new(move |ctx| {
            let outcome = catch_unwind(AssertUnwindSafe(|| op(&mut *ctx)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "detached write failed"),
                Err(_) => {
                    error!("detached write panicked");
                    ctx.recover_from_panic();
                }
            }
        });

        if self.sender.send(Command::Job(job)).is_err() {
            warn!("detached write skipped: writer is gone");
        }
    }

    /// Drain pending jobs and stop the writer thread.
    ///
    /// Jobs already queued still run; the statement cache is finalized
    /// before the connection closes.
    pub async fn shutdown(&self) {
        let _ = self.sender.send(Command::Shutdown);
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let joined = tokio::task::spawn_blocking(move || handle.join()).await;
            match joined {
                Ok(Ok(())) => debug!("writer thread stopped"),
                _ => error!("writer thread did not stop cleanly"),
            }
        }
    }
}

/// The writer thread body. Owns the connection; the statement cache
/// borrows it and is dropped (finalizing all statements) before the
/// connection closes.
fn writer_loop(conn: &Connection, receiver: &mpsc::Receiver<Command>, cache_capacity: usize) {
    let mut ctx = WriteContext {
        conn,
        cache: StatementCache::new(cache_capacity),
        in_transaction: false,
    };

    while let Ok(command) = receiver.recv() {
        match command {
            Command::Job(job) => job(&mut ctx),
            Command::Shutdown => break,
        }
    }
    debug!("writer loop exiting");
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
