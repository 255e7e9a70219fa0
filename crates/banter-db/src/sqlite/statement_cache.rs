//! Bounded LRU cache of compiled statements.
//!
//! Keyed by exact SQL text. The cache lives on the writer thread and
//! borrows the write connection, so no locking is needed: the serial
//! execution context guarantees a statement is never shared across two
//! concurrent executions. Evicting an entry drops the [`Statement`],
//! which finalizes it.

use std::collections::HashMap;

use rusqlite::{Connection, Statement};
use tracing::debug;

use banter_core::{Result, StorageError};

/// Cache counters, exposed for diagnostics and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Current number of cached statements.
    pub len: usize,
    /// Configured maximum number of entries.
    pub capacity: usize,
    /// Lookups that found a compiled statement.
    pub hits: u64,
    /// Lookups that compiled a new statement.
    pub misses: u64,
    /// Entries finalized to make room.
    pub evictions: u64,
}

struct CacheEntry<'conn> {
    stmt: Statement<'conn>,
    last_used: u64,
}

/// LRU cache of prepared statements bound to the write connection.
pub struct StatementCache<'conn> {
    entries: HashMap<String, CacheEntry<'conn>>,
    capacity: usize,
    clock: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<'conn> StatementCache<'conn> {
    /// Create a cache holding at most `capacity` statements (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            clock: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Return a compiled, binding-cleared statement for `sql`.
    ///
    /// On a miss the statement is compiled and inserted, evicting the
    /// least-recently-used entry first if the cache is full. Compilation
    /// failure is classified by [`StorageError::from_sqlite_prepare`].
    pub fn get(
        &mut self,
        conn: &'conn Connection,
        sql: &str,
    ) -> Result<&mut Statement<'conn>> {
        self.clock += 1;
        let clock = self.clock;

        if self.entries.contains_key(sql) {
            self.hits += 1;
        } else {
            self.misses += 1;
            if self.entries.len() >= self.capacity {
                self.evict_lru();
            }
            let stmt = conn
                .prepare(sql)
                .map_err(|e| StorageError::from_sqlite_prepare(sql, &e))?;
            let _ = self.entries.insert(
                sql.to_string(),
                CacheEntry {
                    stmt,
                    last_used: clock,
                },
            );
        }

        let entry = self
            .entries
            .get_mut(sql)
            .ok_or_else(|| StorageError::operation("statement cache entry vanished"))?;
        entry.last_used = clock;
        entry.stmt.clear_bindings();
        Ok(&mut entry.stmt)
    }

    /// Whether a statement for `sql` is currently cached.
    #[must_use]
    pub fn contains(&self, sql: &str) -> bool {
        self.entries.contains_key(sql)
    }

    /// Finalize and drop every cached statement.
    ///
    /// Used before `VACUUM`, which refuses to run with outstanding
    /// prepared statements.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            len: self.entries.len(),
            capacity: self.capacity,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(sql, _)| sql.clone());
        if let Some(sql) = oldest {
            // Removing the entry drops the Statement, finalizing it.
            let _ = self.entries.remove(&sql);
            self.evictions += 1;
            debug!(sql, "evicted least-recently-used statement");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
