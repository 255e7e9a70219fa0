//! Background maintenance: WAL checkpoints and threshold-gated vacuums.
//!
//! Both tasks are best-effort loops on the runtime. A passive checkpoint
//! folds WAL pages back into the main file without blocking readers or
//! the writer; a vacuum only runs when the freelist holds more
//! reclaimable space than the configured threshold, since `VACUUM`
//! rewrites the whole file.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use banter_core::{Result, StorageError};

use crate::config::DatabaseConfig;
use crate::gateway::{WriteContext, WriteGateway};

/// Outcome of one passive checkpoint.
#[derive(Clone, Copy, Debug)]
pub struct CheckpointStats {
    /// Whether the checkpoint was blocked by a concurrent reader/writer.
    pub busy: bool,
    /// WAL frames at checkpoint time.
    pub log_frames: i64,
    /// Frames successfully moved into the main database file.
    pub checkpointed_frames: i64,
}

/// Run `PRAGMA wal_checkpoint(PASSIVE)` on the write connection.
pub fn run_checkpoint(ctx: &mut WriteContext<'_>) -> Result<CheckpointStats> {
    let (busy, log_frames, checkpointed_frames): (i64, i64, i64) = ctx
        .connection()
        .query_row("PRAGMA wal_checkpoint(PASSIVE)", [], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })
        .map_err(|e| StorageError::from_sqlite("wal_checkpoint", &e))?;

    let stats = CheckpointStats {
        busy: busy != 0,
        log_frames,
        checkpointed_frames,
    };
    debug!(
        busy = stats.busy,
        log_frames,
        checkpointed_frames,
        "passive checkpoint complete"
    );
    Ok(stats)
}

/// Vacuum if the freelist exceeds `threshold_bytes` of reclaimable space.
///
/// Returns whether a vacuum actually ran. Cached statements are finalized
/// first, since `VACUUM` refuses to run with open statements, and the WAL
/// is truncated afterwards so the reclaimed space reaches the filesystem.
pub fn run_vacuum_if_needed(
    ctx: &mut WriteContext<'_>,
    threshold_bytes: u64,
) -> Result<bool> {
    let freelist: i64 = ctx
        .connection()
        .query_row("PRAGMA freelist_count", [], |row| row.get(0))
        .map_err(|e| StorageError::from_sqlite("freelist_count", &e))?;
    let page_size: i64 = ctx
        .connection()
        .query_row("PRAGMA page_size", [], |row| row.get(0))
        .map_err(|e| StorageError::from_sqlite("page_size", &e))?;

    let reclaimable = u64::try_from(freelist.saturating_mul(page_size)).unwrap_or(0);
    if reclaimable <= threshold_bytes {
        debug!(reclaimable, threshold_bytes, "vacuum skipped");
        return Ok(false);
    }

    info!(reclaimable, "reclaimable space over threshold, vacuuming");
    ctx.clear_statement_cache();
    ctx.connection()
        .execute_batch("VACUUM")
        .map_err(|e| StorageError::from_sqlite("VACUUM", &e))?;
    let _ = ctx
        .connection()
        .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |row| {
            row.get::<_, i64>(0)
        })
        .map_err(|e| StorageError::from_sqlite("wal_checkpoint", &e))?;
    info!("vacuum complete");
    Ok(true)
}

/// Periodic checkpoint and vacuum tasks.
pub struct MaintenanceScheduler {
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for MaintenanceScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl MaintenanceScheduler {
    /// Scheduler with no running tasks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the periodic loops. Each tick submits one gateway job and
    /// logs failures without stopping the loop.
    ///
    /// Without a running tokio runtime there is nothing to spawn onto;
    /// the loops are skipped with a warning and the database works
    /// normally, just without background maintenance.
    pub fn start(&self, gateway: std::sync::Arc<WriteGateway>, config: &DatabaseConfig) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no tokio runtime, background maintenance disabled");
            return;
        };
        let mut tasks = self.tasks.lock();

        let checkpoint_gateway = std::sync::Arc::clone(&gateway);
        let checkpoint_interval = Duration::from_secs(config.checkpoint_interval_secs);
        tasks.push(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(checkpoint_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it.
            let _ = ticker.tick().await;
            loop {
                let _ = ticker.tick().await;
                match checkpoint_gateway.with_write(run_checkpoint).await {
                    Ok(stats) if stats.busy => {
                        debug!("checkpoint contended, will retry next interval");
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "periodic checkpoint failed"),
                }
            }
        }));

        let vacuum_interval = Duration::from_secs(config.vacuum_interval_secs);
        let threshold = config.vacuum_threshold_bytes;
        tasks.push(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(vacuum_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let _ = ticker.tick().await;
            loop {
                let _ = ticker.tick().await;
                let result = gateway
                    .with_write(move |ctx| run_vacuum_if_needed(ctx, threshold))
                    .await;
                if let Err(e) = result {
                    warn!(error = %e, "periodic vacuum check failed");
                }
            }
        }));
    }

    /// Abort all running loops.
    pub fn stop(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
