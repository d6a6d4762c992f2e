//! Bounded retry with exponential backoff for external collaborator calls.
//!
//! Only errors that report [`ReadLevelError::is_transient`] are retried;
//! validation and conflict errors surface on the first attempt.

use crate::error::{ReadLevelError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry schedule: `max_attempts` calls total, sleeping
/// `initial_backoff * multiplier^(n-1)` before retry `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    multiplier: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, multiplier: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            multiplier: multiplier.max(1),
        }
    }

    /// A single attempt with no backoff.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, 1)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor)
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Exhausted retries are reported as [`ReadLevelError::ExternalService`].
    pub async fn run<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = operation_name, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt >= self.max_attempts => {
                    warn!(
                        operation = operation_name,
                        attempt,
                        "Giving up after {} attempts: {}",
                        attempt,
                        e
                    );
                    return Err(ReadLevelError::ExternalService(format!(
                        "{} failed after {} attempts: {}",
                        operation_name, attempt, e
                    )));
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation = operation_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Transient failure, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200), 3)
    }
}
