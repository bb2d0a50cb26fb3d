//! Retry policy for revision number allocation.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use revstore_core::config::RevisionConfig;
use revstore_core::error::AppError;
use revstore_core::result::AppResult;

/// Retries retryable failures (allocation conflicts) with exponential
/// backoff and jitter, up to a bounded number of attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RevisionConfig,
}

impl RetryPolicy {
    /// Creates a policy from the revision configuration.
    pub fn new(config: RevisionConfig) -> Self {
        Self { config }
    }

    /// Total attempts, first try included.
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Delay before retrying after `attempt` failed: the configured backoff
    /// plus up to half of it again as jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.config.backoff(attempt);
        let half = (base.as_millis() / 2) as u64;
        let jitter = rand::thread_rng().gen_range(0..=half);
        base + Duration::from_millis(jitter)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts are used up.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 1;

        loop {
            match op().await {
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after conflict"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_retryable() => {
                    warn!(operation, attempts = attempt, "Giving up after repeated conflicts");
                    return Err(AppError::conflict(format!(
                        "{operation} failed after {attempt} attempts: {}",
                        e.message
                    )));
                }
                result => return result,
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RevisionConfig::default())
    }
}
