//! Exponential backoff for transient storage failures.

use std::time::{Duration, Instant};

use crate::scoring::config::BatchConfig;
use crate::scoring::ScoringError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_batch(config: &BatchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_ms),
            max_delay: Duration::from_millis(config.retry_max_ms),
        }
    }

    /// Delay before attempt `attempt + 1`, doubling from the base up to the cap.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Run `operation` until it succeeds, fails with a non-transient error, or
/// `max_attempts` is used up.
pub async fn retry_transient<F, Fut, T>(
    operation_name: &str,
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, ScoringError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ScoringError>>,
{
    let start = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(error) if error.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => {
                if error.is_transient() {
                    tracing::error!(
                        operation = operation_name,
                        attempts = attempt,
                        error = %error,
                        "Retries exhausted"
                    );
                }
                return Err(error);
            }
        }
    }
}
