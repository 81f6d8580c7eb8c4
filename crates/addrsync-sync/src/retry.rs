//! Retry with exponential backoff for store contention
//!
//! Only busy/locked database errors are retried: every store write is a
//! single transaction, so repeating it after contention is safe. Any other
//! error is returned on the first failure.

use std::future::Future;
use std::time::Duration;

use addrsync_core::config::RetryConfig;
use tracing::{info, warn};

/// Attempt bound and backoff base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay after the first failure; doubles after each further failure
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay after the failure of attempt `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Messages SQLite and the store use for lock contention
const BUSY_MARKERS: &[&str] = &[
    "database is locked",
    "database table is locked",
    "sqlite_busy",
    "sqlite_locked",
];

/// Returns true for transient SQLite lock contention anywhere in the chain
pub fn is_busy_error(err: &anyhow::Error) -> bool {
    let err_str = format!("{err:#}").to_lowercase();
    BUSY_MARKERS.iter().any(|marker| err_str.contains(marker))
}

/// Executes a store operation, retrying busy errors with exponential backoff
///
/// With the default policy a permanently busy operation runs 5 times, with
/// delays of 100, 200, 400, 800 and 1600 ms after the failures, and then
/// returns the last error.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, operation: &str, mut f: F) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match f().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(operation, attempt, "Store operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if is_busy_error(&err) => {
                let delay = policy.delay_for(attempt);
                attempt += 1;
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Store busy, backing off"
                );
                tokio::time::sleep(delay).await;
                if attempt >= policy.max_attempts {
                    return Err(err.context(format!(
                        "{operation} still busy after {attempt} attempts"
                    )));
                }
            }
            Err(err) => return Err(err),
        }
    }
}
