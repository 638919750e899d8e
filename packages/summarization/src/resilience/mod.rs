//! Layered protection for model calls.
//!
//! A call waits its turn at the pacer, passes the circuit breaker gate,
//! then runs under the retry policy with a per-attempt timeout. The
//! breaker sees one outcome per retry-wrapped sequence, not one per
//! attempt, so a burst of retries against a dead endpoint counts as a
//! single failure.

pub mod breaker;
pub mod pacer;
pub mod retry;

pub use breaker::{CircuitBreaker, CircuitState};
pub use pacer::RequestPacer;
pub use retry::RetryPolicy;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ModelError, ModelResult, ValidationError};
use crate::types::ResilienceConfig;

/// The full stack: pacer, breaker, retry, per-attempt timeout.
///
/// Cloning is cheap and clones share the breaker and pacer, so every
/// caller holding a clone is throttled and protected together.
#[derive(Clone)]
pub struct Resilience {
    retry: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
    pacer: Arc<RequestPacer>,
    request_timeout: Duration,
}

impl Resilience {
    /// Build from settings, rejecting configurations the layers cannot
    /// honor.
    pub fn new(config: &ResilienceConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self::from_config(config))
    }

    fn from_config(config: &ResilienceConfig) -> Self {
        Self {
            retry: RetryPolicy::new(config),
            breaker: Arc::new(CircuitBreaker::new(config)),
            pacer: Arc::new(RequestPacer::new(config.requests_per_minute)),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn pacer(&self) -> &RequestPacer {
        &self.pacer
    }

    /// Run `operation` under the full stack. The closure is invoked once
    /// per attempt and must produce a fresh future each time.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> ModelResult<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = ModelResult<T>> + Send,
        T: Send,
    {
        self.pacer.acquire().await;
        let request_timeout = self.request_timeout;
        self.breaker
            .execute(|| {
                self.retry.run(move || {
                    let attempt = operation();
                    async move {
                        match tokio::time::timeout(request_timeout, attempt).await {
                            Ok(result) => result,
                            Err(_) => Err(ModelError::Timeout {
                                elapsed_ms: request_timeout.as_millis() as u64,
                            }),
                        }
                    }
                })
            })
            .await
    }
}

impl Default for Resilience {
    /// Stack built from `ResilienceConfig` defaults.
    fn default() -> Self {
        Self::from_config(&ResilienceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant_config() -> ResilienceConfig {
        ResilienceConfig::new()
            .with_requests_per_minute(600_000)
            .with_initial_retry_delay_ms(1)
            .with_jitter_factor(0.0)
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempts_time_out() {
        let config = instant_config()
            .with_max_retries(0)
            .with_request_timeout_ms(50);
        let resilience = Resilience::new(&config).unwrap();

        let result: ModelResult<()> = resilience
            .execute(|| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            })
            .await;
        assert!(matches!(
            result,
            Err(ModelError::Timeout { elapsed_ms: 50 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_sees_one_outcome_per_sequence() {
        let config = instant_config()
            .with_max_retries(3)
            .with_failure_threshold(2);
        let resilience = Resilience::new(&config).unwrap();

        let attempts = AtomicU32::new(0);
        let failing = || async {
            Err::<(), _>(ModelError::Transport("down".into()))
        };

        // Four attempts inside, one failure recorded: still closed.
        let _ = resilience.execute(failing).await;
        assert_eq!(resilience.breaker().state(), CircuitState::Closed);

        let _ = resilience.execute(failing).await;
        assert_eq!(resilience.breaker().state(), CircuitState::Open);

        // Rejected before the operation runs.
        let result = resilience
            .execute(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;
        assert!(matches!(result, Err(ModelError::CircuitOpen { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_count_against_breaker() {
        let config = instant_config()
            .with_max_retries(0)
            .with_failure_threshold(1)
            .with_request_timeout_ms(10);
        let resilience = Resilience::new(&config).unwrap();

        let _: ModelResult<()> = resilience
            .execute(|| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(())
            })
            .await;
        assert_eq!(resilience.breaker().state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clones_share_the_breaker() {
        let config = instant_config()
            .with_max_retries(0)
            .with_failure_threshold(1);
        let resilience = Resilience::new(&config).unwrap();
        let clone = resilience.clone();

        let _: ModelResult<()> = resilience
            .execute(|| async { Err(ModelError::Transport("down".into())) })
            .await;
        assert_eq!(clone.breaker().state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        assert!(Resilience::new(&ResilienceConfig::new().with_requests_per_minute(0)).is_err());
    }
}
