//! # banter-core
//!
//! Shared database primitives for the Banter storage layer:
//!
//! - [`errors`]: The `StorageError` taxonomy with `SQLite` error-code
//!   classification (busy / locked / corrupt recognition)
//! - [`params`]: Closed tagged-variant parameter type for exhaustive,
//!   compile-time-checked binding
//! - [`retry`]: Retry configuration and backoff math for transient
//!   contention
//!
//! Per-entity repositories (chat, message, profile, notification, game)
//! depend on this crate alone; the machinery lives in `banter-db`.

#![deny(unsafe_code)]

pub mod errors;
pub mod params;
pub mod retry;

pub use errors::{Result, StorageError};
pub use params::SqlValue;
pub use retry::RetryConfig;
