// src/services/retry.rs

use std::future::Future;
use std::time::Duration;

use crate::log_warn;
use crate::utils::{SyncError, SyncResult};

/// Uniform retry/backoff policy for remote operations. An operation is run
/// up to `max_retries` times; before the k-th retry the policy sleeps
/// `base_delay * 2^(k-1)`. Only errors classified retryable are retried;
/// anything else propagates immediately.
///
/// `max_retries` is the total attempt budget, not a retry count: the first
/// attempt always runs, so 0 and 1 both mean a single attempt with no
/// retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 1000)
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(base_delay_ms),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay slept before the `retry`-th retry (1-based): base * 2^(retry-1).
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.base_delay * 2u32.pow(exponent)
    }

    /// Runs `op`, retrying transient failures with exponential backoff.
    /// After exhausting retries the last error is re-raised tagged with the
    /// attempt count.
    pub async fn execute<T, F, Fut>(&self, mut op: F) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        let mut attempt: u32 = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let delay = self.delay_before_retry(attempt);
                    log_warn!(
                        "Transient failure, retrying",
                        serde_json::json!({
                            "attempt": attempt,
                            "max_retries": self.max_retries,
                            "delay_ms": delay.as_millis() as u64,
                            "error": err.to_string(),
                        })
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err.with_attempts(attempt)),
            }
        }
    }
}
