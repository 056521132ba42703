//! Bounded retry with exponential backoff for transient network failures.
//!
//! Callers classify each failure as [`Failure::Transient`] (connect errors,
//! timeouts, 5xx/429) or [`Failure::Permanent`] (4xx, missing object,
//! malformed payload). Only transient failures are retried.

use std::future::Future;
use std::time::Duration;

// ---

const MAX_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    // ---
    /// Total attempts including the first one; always at least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

/// Classified outcome of a single failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    Transient(String),
    Permanent(String),
}

/// Final error after the policy gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exhausted {
    pub attempts: u32,
    pub last_error: String,
}

impl RetryPolicy {
    // ---
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay before retry number `attempt` (1-based): base, 2×base, 4×base …
    pub fn backoff(&self, attempt: u32) -> Duration {
        // ---
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }

    /// Run `operation` until it succeeds, fails permanently, or the attempt
    /// budget is spent.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, Exhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Failure>>,
    {
        // ---
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(Failure::Permanent(message)) => {
                    tracing::debug!("{} failed permanently: {}", label, message);
                    return Err(Exhausted {
                        attempts: attempt,
                        last_error: message,
                    });
                }
                Err(Failure::Transient(message)) => {
                    if attempt >= self.max_attempts {
                        tracing::warn!(
                            "{} failed after {} attempts: {}",
                            label,
                            attempt,
                            message
                        );
                        return Err(Exhausted {
                            attempts: attempt,
                            last_error: message,
                        });
                    }
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        "{} attempt {}/{} failed: {} (retrying in {:?})",
                        label,
                        attempt,
                        self.max_attempts,
                        message,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(3, Duration::from_millis(200))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::cell::Cell;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        // ---
        let policy = RetryPolicy::new(10, Duration::from_millis(200));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
        assert_eq!(policy.backoff(10), MAX_BACKOFF);
        assert_eq!(policy.backoff(64), MAX_BACKOFF);
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_transient_failures_retried_until_success() {
        // ---
        let calls = Cell::new(0);
        let result = fast_policy(3)
            .run("fetch", || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 {
                        Err(Failure::Transient("connection reset".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_budget_exhausted() {
        // ---
        let calls = Cell::new(0);
        let result: Result<(), _> = fast_policy(4)
            .run("fetch", || {
                calls.set(calls.get() + 1);
                async { Err(Failure::Transient("connection refused".into())) }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 4);
        assert_eq!(err.last_error, "connection refused");
        assert_eq!(calls.get(), 4);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        // ---
        let calls = Cell::new(0);
        let result: Result<(), _> = fast_policy(5)
            .run("fetch", || {
                calls.set(calls.get() + 1);
                async { Err(Failure::Permanent("404 Not Found".into())) }
            })
            .await;

        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls.get(), 1);
    }
}
