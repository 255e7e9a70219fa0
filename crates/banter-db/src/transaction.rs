//! Transaction management on the writer thread.
//!
//! Transactions open with `BEGIN IMMEDIATE`, taking the write lock up
//! front so contention surfaces at the start rather than mid-transaction.
//! The whole transaction runs as a single gateway job, so nothing else
//! can interleave between its statements. Nesting is rejected rather
//! than silently flattened.

use rusqlite::{Transaction, TransactionBehavior};
use tracing::{debug, error};

use banter_core::{Result, StorageError};

use crate::gateway::WriteContext;

impl<'conn> WriteContext<'conn> {
    /// Run `op` inside an immediate transaction.
    ///
    /// Commits when `op` returns `Ok`; rolls back on `Err` and passes the
    /// operation's error through unchanged, so a retryable `Busy` stays
    /// retryable. Calling this while a transaction is already open fails
    /// with [`StorageError::Transaction`].
    pub fn run_in_transaction<T>(
        &mut self,
        op: impl FnOnce(&mut WriteContext<'conn>) -> Result<T>,
    ) -> Result<T> {
        if self.in_transaction {
            return Err(StorageError::transaction(
                "nested transactions are not supported",
            ));
        }

        let tx = Transaction::new_unchecked(self.connection(), TransactionBehavior::Immediate)
            .map_err(|e| classify_tx_error("BEGIN IMMEDIATE", &e))?;
        self.in_transaction = true;

        let outcome = op(self);
        self.in_transaction = false;

        match outcome {
            Ok(value) => {
                tx.commit().map_err(|e| {
                    // A failed commit can leave the transaction open.
                    self.rollback_best_effort();
                    classify_tx_error("COMMIT", &e)
                })?;
                Ok(value)
            }
            Err(e) => {
                // Dropping the guard rolls back.
                drop(tx);
                debug!(error = %e, "transaction rolled back");
                Err(e)
            }
        }
    }

    /// Run every operation in `ops`, in order, inside one transaction.
    ///
    /// The first failure aborts the batch and rolls back everything
    /// already applied.
    pub fn run_batch_in_transaction<T, F>(&mut self, ops: Vec<F>) -> Result<Vec<T>>
    where
        F: FnOnce(&mut WriteContext<'conn>) -> Result<T>,
    {
        self.run_in_transaction(|ctx| {
            let mut results = Vec::with_capacity(ops.len());
            for op in ops {
                results.push(op(ctx)?);
            }
            Ok(results)
        })
    }

    fn rollback_best_effort(&mut self) {
        if !self.connection().is_autocommit() {
            if let Err(e) = self.connection().execute_batch("ROLLBACK") {
                error!(error = %e, "rollback after failed commit also failed");
            }
        }
    }
}

/// Classify begin/commit failures as transaction errors, preserving the
/// contention variants the retry loop looks for.
fn classify_tx_error(stage: &str, err: &rusqlite::Error) -> StorageError {
    match StorageError::from_sqlite(stage, err) {
        e @ (StorageError::Busy { .. } | StorageError::Locked { .. }) => e,
        other => StorageError::transaction(format!("{stage} failed: {other}")),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
