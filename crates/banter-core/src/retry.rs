//! Retry configuration and backoff calculation.
//!
//! Sync-only building blocks; the async retry loop lives in `banter-db`
//! (which has access to tokio):
//!
//! - [`RetryConfig`]: Retry parameters (max attempts, base delay)
//! - [`RetryConfig::backoff_delay`]: Linear backoff per attempt
//!
//! The defaults (3 attempts, 10 ms base) were tuned for short write
//! transactions contending on a WAL-mode database. They are configurable,
//! not hard requirements.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default maximum attempts per logical operation.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 10;

/// Configuration for retrying transient contention errors.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay between attempts in ms (default: 10).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
        }
    }
}

impl RetryConfig {
    /// Delay to sleep after a failed attempt.
    ///
    /// Linear backoff: `base_delay × attempt`, where `attempt` is the
    /// 1-based number of the attempt that just failed. So after the first
    /// failure the caller waits one base delay, after the second two, and
    /// so on.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(u64::from(attempt)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
