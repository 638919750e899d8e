//! Exponential backoff retry for model calls.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::ModelResult;
use crate::types::ResilienceConfig;

/// Retries retryable model errors with exponentially growing, jittered
/// delays. Non-retryable errors and exhausted attempts surface the last
/// error unchanged.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_delay: Duration,
    backoff_multiplier: f64,
    max_delay: Duration,
    jitter_factor: f64,
}

impl RetryPolicy {
    pub fn new(config: &ResilienceConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_retry_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
            max_delay: Duration::from_millis(config.max_retry_delay_ms),
            jitter_factor: config.jitter_factor,
        }
    }

    /// Run `operation`, retrying while it fails retryably and attempts
    /// remain.
    pub async fn run<F, Fut, T>(&self, mut operation: F) -> ModelResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ModelResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    debug!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying model call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Backoff delay before retry number `attempt` (zero-based).
    fn delay_for(&self, attempt: u32) -> Duration {
        let base =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);
        let jittered = capped * (1.0 + self.jitter_factor * (2.0 * jitter_unit() - 1.0));
        Duration::from_millis(jittered.max(0.0) as u64)
    }
}

/// Jitter in `[0, 1)` derived from the clock; not cryptographic.
fn jitter_unit() -> f64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::from(d.subsec_nanos()))
        .unwrap_or(0);
    let mut x = nanos | 1;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    (x.wrapping_mul(0x2545F4914F6CDD1D) >> 11) as f64 / (1u64 << 53) as f64
}
