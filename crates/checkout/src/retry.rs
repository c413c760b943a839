//! Bounded retries for units of work that lose a race.

use std::future::Future;
use std::time::Duration;

use crate::error::{Result, ServiceError};

/// Exponential backoff for transient store failures.
///
/// Only errors the store classifies as transient (version conflicts,
/// serialization failures, deadlocks, lock timeouts) are retried. Business-rule
/// failures return immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first (at least 1).
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure.
    pub base_delay: Duration,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..Default::default()
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Delay after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Runs `operation` until it succeeds, fails for a non-transient reason,
    /// or the attempts run out.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match f().await {
                Err(ServiceError::Store(err)) if err.is_transient() => {
                    if attempt >= max_attempts {
                        tracing::warn!(operation, attempts = attempt, error = %err, "retries exhausted");
                        return Err(ServiceError::RetriesExhausted {
                            attempts: attempt,
                            source: err,
                        });
                    }
                    let delay = self.delay_for(attempt);
                    metrics::counter!("checkout_retries_total", "operation" => operation)
                        .increment(1);
                    tracing::debug!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
