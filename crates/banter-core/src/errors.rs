//! Error taxonomy for the storage layer.
//!
//! [`StorageError`] is the single error type returned by every storage
//! operation. Variants map one-to-one onto failure modes callers can act
//! on, with `Busy` and `Locked` singled out as the only retryable ones.
//!
//! Classification of raw `rusqlite` errors happens in
//! [`StorageError::from_sqlite`], which inspects the underlying engine
//! error code. Corruption is recognized and logged but never repaired.

use rusqlite::ffi::ErrorCode;
use thiserror::Error;
use tracing::{error, warn};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Cannot open or use a database handle.
    #[error("connection error: {message}")]
    Connection {
        /// What went wrong, including the engine error text.
        message: String,
    },

    /// The write handle is not open (gateway shut down or writer gone).
    #[error("write connection unavailable")]
    ConnectionUnavailable,

    /// An operation was called before `initialize()` completed.
    #[error("database not initialized: call initialize() first")]
    NotInitialized,

    /// BEGIN, COMMIT, or ROLLBACK failed, or a transaction was misused.
    #[error("transaction error: {message}")]
    Transaction {
        /// What went wrong.
        message: String,
    },

    /// Statement compilation or parameter binding failed.
    #[error("statement error in `{sql}`: {message}")]
    Statement {
        /// The SQL text that failed to compile or bind.
        sql: String,
        /// The engine error text.
        message: String,
    },

    /// Stepping a compiled statement failed.
    #[error("execution error: {message}")]
    Execution {
        /// The engine error text.
        message: String,
    },

    /// A caller-supplied unit of work failed, or input encoding failed.
    #[error("operation error: {message}")]
    Operation {
        /// What went wrong.
        message: String,
    },

    /// `SQLITE_BUSY`: another connection holds a conflicting lock.
    /// Transient; retryable.
    #[error("database busy: {message}")]
    Busy {
        /// The engine error text.
        message: String,
    },

    /// `SQLITE_LOCKED`: a table-level lock conflict. Transient; retryable.
    #[error("database locked: {message}")]
    Locked {
        /// The engine error text.
        message: String,
    },

    /// The retry ceiling was reached without a successful attempt.
    #[error("max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded {
        /// Total attempts made.
        attempts: u32,
        /// The final error that exhausted the budget.
        last_error: String,
    },
}

/// Convenience type alias for storage results.
pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    /// Create a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a transaction error.
    #[must_use]
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Create an execution error.
    #[must_use]
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    /// Create an operation error (caller-supplied work or encoding failed).
    #[must_use]
    pub fn operation(message: impl Into<String>) -> Self {
        Self::Operation {
            message: message.into(),
        }
    }

    /// Whether this error represents transient contention worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy { .. } | Self::Locked { .. })
    }

    /// Classify a `rusqlite` error raised while executing a statement.
    ///
    /// Logs the operation name and engine error text, then maps the engine
    /// error code:
    ///
    /// - `SQLITE_BUSY` → [`StorageError::Busy`]
    /// - `SQLITE_LOCKED` → [`StorageError::Locked`]
    /// - `SQLITE_CORRUPT` → [`StorageError::Connection`] (logged at `error`;
    ///   corruption is never auto-repaired)
    /// - anything else → [`StorageError::Execution`]
    #[must_use]
    pub fn from_sqlite(operation: &str, err: &rusqlite::Error) -> Self {
        match engine_code(err) {
            Some(ErrorCode::DatabaseBusy) => {
                warn!(operation, error = %err, "database busy");
                Self::Busy {
                    message: err.to_string(),
                }
            }
            Some(ErrorCode::DatabaseLocked) => {
                warn!(operation, error = %err, "database locked");
                Self::Locked {
                    message: err.to_string(),
                }
            }
            Some(ErrorCode::DatabaseCorrupt) => {
                error!(operation, error = %err, "database corruption detected");
                Self::Connection {
                    message: format!("corruption detected: {err}"),
                }
            }
            _ => {
                warn!(operation, error = %err, "statement execution failed");
                Self::Execution {
                    message: err.to_string(),
                }
            }
        }
    }

    /// Classify a `rusqlite` error raised while compiling a statement.
    ///
    /// Like [`StorageError::from_sqlite`] but the non-transient default is
    /// [`StorageError::Statement`] carrying the offending SQL text.
    #[must_use]
    pub fn from_sqlite_prepare(sql: &str, err: &rusqlite::Error) -> Self {
        match engine_code(err) {
            Some(ErrorCode::DatabaseBusy) => {
                warn!(sql, error = %err, "database busy while preparing");
                Self::Busy {
                    message: err.to_string(),
                }
            }
            Some(ErrorCode::DatabaseLocked) => {
                warn!(sql, error = %err, "database locked while preparing");
                Self::Locked {
                    message: err.to_string(),
                }
            }
            Some(ErrorCode::DatabaseCorrupt) => {
                error!(sql, error = %err, "database corruption detected");
                Self::Connection {
                    message: format!("corruption detected: {err}"),
                }
            }
            _ => {
                warn!(sql, error = %err, "statement compilation failed");
                Self::Statement {
                    sql: sql.to_string(),
                    message: err.to_string(),
                }
            }
        }
    }
}

/// Extract the primary engine error code, if the error carries one.
fn engine_code(err: &rusqlite::Error) -> Option<ErrorCode> {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => Some(e.code),
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
