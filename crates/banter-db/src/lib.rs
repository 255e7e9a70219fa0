//! # banter-db
//!
//! Concurrency-safe access layer in front of the Banter app's single-file
//! `SQLite` database. Per-entity repositories (chat, message, profile,
//! notification, game) build plain CRUD on top of this crate; everything
//! with real coordination lives here:
//!
//! - **Write gateway**: One dedicated writer thread owns the read-write
//!   handle and the prepared-statement cache; every write runs to
//!   completion in submission order
//! - **Read pool**: Bounded, lazily-grown pool of read-only handles;
//!   exhaustion falls back to the serialized write handle
//! - **Statement cache**: LRU keyed by exact SQL text, bounded, evicted
//!   statements finalized
//! - **Transactions**: `BEGIN IMMEDIATE` units with all-paths rollback and
//!   retry-on-contention
//! - **Bulk operations**: JSON-array-to-rows insert/update/delete in one
//!   statement execution
//! - **Maintenance**: Background WAL checkpoints and threshold-gated vacuum
//!
//! The entry point is [`Database`].

#![deny(unsafe_code)]

pub mod bulk;
pub mod config;
pub mod database;
pub mod gateway;
pub mod maintenance;
pub mod pool;
pub mod sqlite;
pub mod transaction;

pub use banter_core::{Result, RetryConfig, SqlValue, StorageError};
pub use config::DatabaseConfig;
pub use database::Database;
pub use gateway::{WriteContext, WriteGateway};
pub use maintenance::{CheckpointStats, MaintenanceScheduler};
pub use pool::{PooledReader, ReadPool};
pub use sqlite::CacheStats;
