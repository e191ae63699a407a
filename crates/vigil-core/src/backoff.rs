//! Backoff policy: wraps remote calls with bounded exponential retries.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::domain::Retryable;

/// Retry policy for remote calls.
///
/// Delay before retry `n` (0-based) is `min(base_delay * 2^n, max_delay)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after failed attempt `retry` (0-based).
    ///
    /// Example with base_delay=1s, max_delay=30s:
    /// 1s, 2s, 4s, 8s, 16s, 30s, 30s, ...
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
            .min(self.max_delay)
    }

    /// Run `op`, retrying errors that are `Retryable`.
    pub async fn run<T, E, F, Fut>(&self, label: &str, op: F) -> Result<T, E>
    where
        E: Retryable + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_with(label, op, |err: &E| err.is_retryable()).await
    }

    /// Run `op`, retrying errors for which `retryable` holds.
    ///
    /// Non-retryable errors propagate immediately; after `max_attempts` the
    /// last error is returned.
    pub async fn run_with<T, E, F, Fut, P>(&self, label: &str, mut op: F, retryable: P) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if !retryable(&err) {
                        debug!(label, error = %err, "not retryable");
                        return Err(err);
                    }
                    if attempt >= max_attempts {
                        warn!(label, attempts = attempt, error = %err, "giving up");
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt - 1);
                    debug!(label, attempt, ?delay, error = %err, "retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
