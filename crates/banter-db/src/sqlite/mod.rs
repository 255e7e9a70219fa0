//! Low-level `SQLite` plumbing.
//!
//! - **[`open`]**: Connection bootstrap — the one read-write handle and the
//!   read-only pool handles, with pragmas applied once at open time.
//! - **[`statement_cache`]**: Bounded LRU of compiled statements, owned by
//!   the writer thread.

pub mod open;
pub mod statement_cache;

pub use open::{open_read_only, open_write, verify_pragmas, PragmaState};
pub use statement_cache::{CacheStats, StatementCache};
