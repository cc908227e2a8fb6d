//! Bounded retry with a pluggable backoff.
//!
//! The policy calls the operation until it succeeds or the attempt budget is
//! spent, sleeping between attempts only. Sleeps are not interrupted by
//! shutdown; a caller that needs that must race the whole call itself.

use std::future::Future;
use std::time::Duration;

/// Delay before the next attempt. `attempt` is the 1-based number of the
/// attempt that just failed.
pub trait Backoff: Send + Sync {
    fn delay(&self, attempt: u32) -> Duration;
}

/// The same delay after every failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantBackoff(pub Duration);

impl Backoff for ConstantBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        self.0
    }
}

/// Doubling delay capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// Successful result plus the number of attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}

/// Every attempt failed; `last_error` is from the final one.
#[derive(Debug)]
pub struct RetryError<E> {
    pub last_error: E,
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy<B = ConstantBackoff> {
    max_attempts: u32,
    backoff: B,
}

impl RetryPolicy<ConstantBackoff> {
    pub fn constant(max_attempts: u32, delay: Duration) -> Self {
        Self::new(max_attempts, ConstantBackoff(delay))
    }
}

impl<B: Backoff> RetryPolicy<B> {
    /// A budget of 0 is treated as 1: the operation always runs at least once.
    pub fn new(max_attempts: u32, backoff: B) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn run<F, Fut, T, E>(&self, mut op: F) -> Result<Retried<T>, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(Retried { value, attempts: attempt }),
                Err(e) if attempt >= self.max_attempts => {
                    return Err(RetryError {
                        last_error: e,
                        attempts: attempt,
                    })
                }
                Err(_) => {
                    tokio::time::sleep(self.backoff.delay(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_first_try_without_sleeping() {
        let policy = RetryPolicy::constant(3, Duration::from_secs(2));
        let start = Instant::now();
        let result = policy.run(|| async { Ok::<_, &str>(7) }).await.unwrap();
        assert_eq!(result, Retried { value: 7, attempts: 1 });
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_budget_and_returns_last_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::constant(3, Duration::from_secs(2));
        let start = Instant::now();

        let err = policy
            .run(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Err::<(), _>(format!("failure {n}")) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.attempts, 3);
        assert_eq!(err.last_error, "failure 3");
        // Two sleeps between three attempts, none after the last.
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_on_later_attempt() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::constant(5, Duration::from_millis(100));
        let result = policy
            .run(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { if n < 3 { Err("not yet") } else { Ok(n) } }
            })
            .await
            .unwrap();
        assert_eq!(result.value, 3);
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_budget_still_runs_once() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::constant(0, Duration::from_secs(1));
        let err = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("boom") }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.attempts, 1);
    }

    #[test]
    fn test_exponential_backoff_caps() {
        let backoff = ExponentialBackoff {
            base: Duration::from_millis(100),
            max: Duration::from_secs(1),
        };
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(4), Duration::from_millis(800));
        assert_eq!(backoff.delay(5), Duration::from_secs(1));
        assert_eq!(backoff.delay(40), Duration::from_secs(1));
    }
}
