//! Bounded retry around a single model call.
//!
//! Every external call in a turn (each participant's bid and the one
//! arbitration call) goes through [`RetryPolicy::run`]. Failures are
//! logged and retried after a fixed delay; once attempts run out the
//! caller's safe default is returned. Nothing is ever propagated.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::CallError;

/// Default number of attempts per call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default pause between attempts.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);

/// Attempt bound, fixed inter-attempt delay and optional per-call deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    call_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_DELAY)
    }
}

/// The value produced by [`RetryPolicy::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T> {
    /// The call's result, or the safe default.
    pub value: T,
    /// Attempts made (at least one).
    pub attempts: u32,
    /// Every attempt failed and `value` is the default.
    pub degraded: bool,
}

impl RetryPolicy {
    /// A policy with the given attempt bound and delay. A bound of zero is
    /// raised to one.
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
            delay,
            call_timeout: None,
        }
    }

    /// Bound each attempt by `timeout`. An attempt that overruns counts
    /// as failed.
    #[must_use]
    pub const fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Attempt bound.
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Per-attempt deadline, if any.
    pub const fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout
    }

    /// Run `attempt` until it succeeds or the bound is reached.
    ///
    /// `attempt` receives the 1-based attempt number. `label` names the
    /// call in log output. After the last failure `fallback` supplies the
    /// returned value.
    pub async fn run<T, F, Fut, D>(&self, label: &str, mut attempt: F, fallback: D) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
        D: FnOnce() -> T,
    {
        let mut n: u32 = 1;
        loop {
            let result = match self.call_timeout {
                Some(limit) => tokio::time::timeout(limit, attempt(n))
                    .await
                    .unwrap_or_else(|_elapsed| {
                        Err(CallError::Timeout {
                            timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                        })
                    }),
                None => attempt(n).await,
            };

            match result {
                Ok(value) => {
                    if n > 1 {
                        debug!(call = label, attempt = n, "model call recovered after retry");
                    }
                    return RetryOutcome {
                        value,
                        attempts: n,
                        degraded: false,
                    };
                }
                Err(e) => {
                    warn!(
                        call = label,
                        attempt = n,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "model call attempt failed"
                    );
                }
            }

            if n >= self.max_attempts {
                break;
            }
            tokio::time::sleep(self.delay).await;
            n = n.saturating_add(1);
        }

        warn!(
            call = label,
            attempts = self.max_attempts,
            "model call retries exhausted, using safe default"
        );
        RetryOutcome {
            value: fallback(),
            attempts: self.max_attempts,
            degraded: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let policy = RetryPolicy::default();
        let started = Instant::now();

        let outcome = policy
            .run(
                "bid",
                |n| async move {
                    if n < 3 {
                        Err(CallError::Backend(format!("attempt {n} refused")))
                    } else {
                        Ok(n)
                    }
                },
                || 0,
            )
            .await;

        assert_eq!(outcome.value, 3);
        assert_eq!(outcome.attempts, 3);
        assert!(!outcome.degraded);
        // Two pauses of the default delay separate three attempts.
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_returns_fallback() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100));
        let started = Instant::now();

        let outcome: RetryOutcome<&str> = policy
            .run("arbitration", |_| async { Err(CallError::Malformed) }, || "default")
            .await;

        assert_eq!(outcome.value, "default");
        assert_eq!(outcome.attempts, 4);
        assert!(outcome.degraded);
        // No pause after the final attempt.
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_makes_one_call_without_delay() {
        let policy = RetryPolicy::default();
        let started = Instant::now();
        let outcome = policy.run("bid", |n| async move { Ok(n) }, || 0).await;
        assert_eq!(outcome.attempts, 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn overrunning_attempts_time_out() {
        let policy =
            RetryPolicy::new(2, Duration::from_millis(50)).with_call_timeout(Duration::from_secs(1));

        let outcome = policy
            .run(
                "bid",
                |n| async move {
                    if n == 1 {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                    }
                    Ok(n)
                },
                || 0,
            )
            .await;

        assert_eq!(outcome.value, 2);
        assert!(!outcome.degraded);
    }

    #[test]
    fn zero_attempts_is_raised_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }
}
