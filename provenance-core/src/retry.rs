//! Bounded retry with exponential backoff and jitter.
//!
//! A [`BackoffPolicy`] is a plain value shared by the upload orchestrator,
//! the manifest resolver, the proof source and the registry client. The
//! delay schedule comes from `backoff::ExponentialBackoff`; the attempt loop
//! itself is explicit so attempts can be counted and cancellation observed
//! between them.

use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::CancelError;

/// Default number of attempts per operation.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry.
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(200);

/// Default ceiling for a single retry delay.
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

/// Default jitter factor (± fraction of each delay).
const DEFAULT_JITTER: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Total attempts including the first one. Always at least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Randomization factor in `[0, 1]` applied to every delay.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter: DEFAULT_JITTER,
        }
    }
}

impl BackoffPolicy {
    /// Policy without delays, for tests and local collaborators.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: 0.0,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay schedule for one retried operation.
    fn schedule(&self) -> ExponentialBackoff {
        let mut schedule = ExponentialBackoff {
            current_interval: self.base_delay,
            initial_interval: self.base_delay,
            randomization_factor: self.jitter.clamp(0.0, 1.0),
            multiplier: 2.0,
            max_interval: self.max_delay,
            max_elapsed_time: None,
            ..Default::default()
        };
        schedule.reset();
        schedule
    }
}

/// Classification of a failed attempt.
#[derive(Debug)]
pub enum Attempt<E> {
    Transient(E),
    Permanent(E),
}

/// Why a retried operation gave up.
#[derive(Debug)]
pub enum RetryFailure<E> {
    /// A permanent error ended the loop early.
    Permanent { error: E, attempts: u32 },
    /// Every attempt failed transiently.
    Exhausted { error: E, attempts: u32 },
    /// The token fired between attempts.
    Cancelled {
        reason: CancelError,
        attempts: u32,
        last_error: Option<E>,
    },
}

impl<E> RetryFailure<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Permanent { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::Cancelled { attempts, .. } => *attempts,
        }
    }
}

/// Run `op` until it succeeds, fails permanently, runs out of attempts, or
/// the token fires. Returns the value and the number of attempts used.
pub async fn retry<T, E, F, Fut>(
    policy: &BackoffPolicy,
    cancel: &CancelToken,
    operation: &str,
    mut op: F,
) -> Result<(T, u32), RetryFailure<E>>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, Attempt<E>>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut schedule = policy.schedule();
    let mut last_error = None;
    let start = Instant::now();

    for attempt in 1..=max_attempts {
        if let Err(reason) = cancel.check() {
            return Err(RetryFailure::Cancelled {
                reason,
                attempts: attempt - 1,
                last_error,
            });
        }

        match op(attempt).await {
            Ok(value) => {
                debug!(
                    operation,
                    attempt,
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Operation succeeded"
                );
                return Ok((value, attempt));
            }
            Err(Attempt::Permanent(error)) => {
                warn!(operation, attempt, error = %error, "Permanent error, not retrying");
                return Err(RetryFailure::Permanent {
                    error,
                    attempts: attempt,
                });
            }
            Err(Attempt::Transient(error)) if attempt == max_attempts => {
                warn!(operation, attempt, error = %error, "Transient error, attempts exhausted");
                return Err(RetryFailure::Exhausted {
                    error,
                    attempts: attempt,
                });
            }
            Err(Attempt::Transient(error)) => {
                let delay = schedule.next_backoff().unwrap_or(policy.max_delay);
                warn!(
                    operation,
                    attempt,
                    error = %error,
                    retry_after_ms = delay.as_millis() as u64,
                    "Retry scheduled"
                );
                last_error = Some(error);
                if let Err(reason) = cancel.sleep(delay).await {
                    return Err(RetryFailure::Cancelled {
                        reason,
                        attempts: attempt,
                        last_error,
                    });
                }
            }
        }
    }

    unreachable!("retry loop always returns within max_attempts iterations")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry(&BackoffPolicy::immediate(5), &CancelToken::new(), "test", |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Attempt::Transient("busy"))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        let (value, attempts) = result.unwrap();
        assert_eq!(value, "done");
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_permanent_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<((), u32), _> =
            retry(&BackoffPolicy::immediate(5), &CancelToken::new(), "test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Attempt::Permanent("bad request")) }
            })
            .await;

        assert!(matches!(result, Err(RetryFailure::Permanent { attempts: 1, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let calls = AtomicU32::new(0);
        let result: Result<((), u32), _> =
            retry(&BackoffPolicy::immediate(4), &CancelToken::new(), "test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Attempt::Transient("503")) }
            })
            .await;

        assert!(matches!(result, Err(RetryFailure::Exhausted { attempts: 4, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let token = CancelToken::new();
        token.cancel();
        let result: Result<((), u32), RetryFailure<&str>> =
            retry(&BackoffPolicy::immediate(3), &token, "test", |_| async {
                Ok(())
            })
            .await;

        assert!(matches!(
            result,
            Err(RetryFailure::Cancelled { attempts: 0, reason: CancelError::Cancelled, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_grow() {
        let policy = BackoffPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            jitter: 0.0,
        };
        let started = tokio::time::Instant::now();
        let result: Result<((), u32), _> =
            retry(&policy, &CancelToken::new(), "test", |_| async {
                Err(Attempt::Transient("busy"))
            })
            .await;

        assert!(result.is_err());
        // 100ms + 200ms of backoff between three attempts.
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[test]
    fn test_zero_attempts_treated_as_one() {
        let policy = BackoffPolicy::immediate(0);
        assert_eq!(policy.max_attempts.max(1), 1);
    }
}
