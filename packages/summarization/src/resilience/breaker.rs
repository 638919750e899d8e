//! Circuit breaker guarding the model endpoint.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::{ModelError, ModelResult};
use crate::types::ResilienceConfig;

/// Where the breaker currently stands, for observability and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
enum Inner {
    Closed {
        consecutive_failures: u32,
    },
    Open {
        since: Instant,
    },
    HalfOpen {
        admitted: u32,
        successes: u32,
        failures: u32,
    },
}

/// Trips open after a run of consecutive endpoint failures, rejects
/// calls while open, then admits a limited number of probes before
/// deciding whether to close again.
///
/// Only transport errors and timeouts count against the breaker. A
/// `NonReducing` or `UnrecognizedResponse` outcome means the endpoint
/// answered, so it neither trips the breaker nor resets the failure
/// streak; while half-open it counts as a successful probe.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<Inner>,
    failure_threshold: u32,
    reset_timeout: Duration,
    half_open_requests: u32,
}

impl CircuitBreaker {
    pub fn new(config: &ResilienceConfig) -> Self {
        Self {
            state: Mutex::new(Inner::Closed {
                consecutive_failures: 0,
            }),
            failure_threshold: config.failure_threshold,
            reset_timeout: Duration::from_millis(config.reset_timeout_ms),
            half_open_requests: config.half_open_requests,
        }
    }

    pub fn state(&self) -> CircuitState {
        match &*self.state.lock().unwrap() {
            Inner::Closed { .. } => CircuitState::Closed,
            Inner::Open { .. } => CircuitState::Open,
            Inner::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    /// Gate one call. While open, rejects with `CircuitOpen` carrying
    /// the time until the next probe; once the reset timeout has passed,
    /// moves to half-open and admits up to the configured probe count.
    pub fn admit(&self) -> Result<(), ModelError> {
        let mut state = self.state.lock().unwrap();
        match &mut *state {
            Inner::Closed { .. } => Ok(()),
            Inner::Open { since } => {
                let elapsed = since.elapsed();
                if elapsed >= self.reset_timeout {
                    info!("circuit breaker half-open, probing endpoint");
                    *state = Inner::HalfOpen {
                        admitted: 1,
                        successes: 0,
                        failures: 0,
                    };
                    Ok(())
                } else {
                    let retry_after = self.reset_timeout - elapsed;
                    Err(ModelError::CircuitOpen {
                        retry_after_ms: retry_after.as_millis() as u64,
                    })
                }
            }
            Inner::HalfOpen { admitted, .. } => {
                if *admitted < self.half_open_requests {
                    *admitted += 1;
                    Ok(())
                } else {
                    Err(ModelError::CircuitOpen { retry_after_ms: 0 })
                }
            }
        }
    }

    /// Record the outcome of an admitted call. One retry-wrapped call
    /// sequence reports exactly one outcome here.
    pub fn record<T>(&self, result: &ModelResult<T>) {
        let mut guard = self.state.lock().unwrap();
        let current = std::mem::replace(
            &mut *guard,
            Inner::Closed {
                consecutive_failures: 0,
            },
        );
        *guard = self.next_state(current, result);
    }

    /// Admit, run, record.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> ModelResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ModelResult<T>>,
    {
        self.admit()?;
        let result = operation().await;
        self.record(&result);
        result
    }

    fn next_state<T>(&self, current: Inner, result: &ModelResult<T>) -> Inner {
        let failure = matches!(result, Err(e) if e.counts_against_breaker());
        match current {
            Inner::Closed {
                consecutive_failures,
            } => {
                if result.is_ok() {
                    Inner::Closed {
                        consecutive_failures: 0,
                    }
                } else if failure {
                    let streak = consecutive_failures + 1;
                    if streak >= self.failure_threshold {
                        warn!(failures = streak, "circuit breaker opened");
                        Inner::Open {
                            since: Instant::now(),
                        }
                    } else {
                        Inner::Closed {
                            consecutive_failures: streak,
                        }
                    }
                } else {
                    Inner::Closed {
                        consecutive_failures,
                    }
                }
            }
            // A failure landing while already open pushes the probe
            // window out.
            Inner::Open { .. } if failure => Inner::Open {
                since: Instant::now(),
            },
            open @ Inner::Open { .. } => open,
            Inner::HalfOpen {
                admitted,
                mut successes,
                mut failures,
            } => {
                if failure {
                    failures += 1;
                } else {
                    successes += 1;
                }
                if successes + failures >= self.half_open_requests {
                    if successes * 2 >= self.half_open_requests {
                        info!(successes, failures, "circuit breaker closed");
                        Inner::Closed {
                            consecutive_failures: 0,
                        }
                    } else {
                        warn!(successes, failures, "circuit breaker reopened");
                        Inner::Open {
                            since: Instant::now(),
                        }
                    }
                } else {
                    Inner::HalfOpen {
                        admitted,
                        successes,
                        failures,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn breaker(threshold: u32, reset_ms: u64, probes: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            &ResilienceConfig::new()
                .with_failure_threshold(threshold)
                .with_reset_timeout_ms(reset_ms)
                .with_half_open_requests(probes),
        )
    }

    fn transport_err<T>() -> ModelResult<T> {
        Err(ModelError::Transport("connection refused".into()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_consecutive_failures() {
        let breaker = breaker(3, 60_000, 3);
        for _ in 0..2 {
            breaker.record(&transport_err::<()>());
            assert_eq!(breaker.state(), CircuitState::Closed);
        }
        breaker.record(&transport_err::<()>());
        assert_eq!(breaker.state(), CircuitState::Open);

        match breaker.admit() {
            Err(ModelError::CircuitOpen { retry_after_ms }) => assert!(retry_after_ms > 0),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_streak() {
        let breaker = breaker(3, 60_000, 3);
        breaker.record(&transport_err::<()>());
        breaker.record(&transport_err::<()>());
        breaker.record(&Ok(()));
        breaker.record(&transport_err::<()>());
        breaker.record(&transport_err::<()>());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_neutral_outcomes_leave_streak_alone() {
        let breaker = breaker(3, 60_000, 3);
        breaker.record(&transport_err::<()>());
        breaker.record(&transport_err::<()>());
        // The endpoint answered, just unhelpfully; the streak holds at 2.
        breaker.record::<()>(&Err(ModelError::NonReducing {
            input_chars: 10,
            output_chars: 10,
        }));
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record(&transport_err::<()>());
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_after_reset_timeout() {
        let breaker = breaker(1, 100, 2);
        breaker.record(&transport_err::<()>());
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(breaker.admit().is_ok());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_closes_on_good_probes() {
        let breaker = breaker(1, 100, 2);
        breaker.record(&transport_err::<()>());
        tokio::time::sleep(Duration::from_millis(150)).await;

        for _ in 0..2 {
            let result = breaker.execute(|| async { Ok(()) }).await;
            assert!(result.is_ok());
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_reopens_on_bad_probes() {
        let breaker = breaker(1, 100, 2);
        breaker.record(&transport_err::<()>());
        tokio::time::sleep(Duration::from_millis(150)).await;

        for _ in 0..2 {
            let _: ModelResult<()> = breaker.execute(|| async { transport_err() }).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.admit().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_limits_outstanding_probes() {
        let breaker = breaker(1, 100, 1);
        breaker.record(&transport_err::<()>());
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(breaker.admit().is_ok());
        // The single probe slot is taken and unresolved.
        assert!(breaker.admit().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_failure_extends_open_window() {
        let breaker = breaker(1, 100, 1);
        breaker.record(&transport_err::<()>());

        tokio::time::sleep(Duration::from_millis(60)).await;
        breaker.record(&transport_err::<()>());

        // 120ms after the first failure but only 60ms after the refresh.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(breaker.admit().is_err());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(breaker.admit().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_skips_operation_while_open() {
        let breaker = breaker(1, 60_000, 1);
        breaker.record(&transport_err::<()>());

        let calls = AtomicU32::new(0);
        let result = breaker
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;
        assert!(matches!(result, Err(ModelError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
