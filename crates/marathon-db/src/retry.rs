//! Retry wrapper for storage operations.
//!
//! Every attempt re-runs the whole transaction body. Only
//! [`LedgerError::Transient`] is retried; not-found, conflict, validation
//! and fatal errors are returned on the first occurrence.

use std::future::Future;
use std::time::{Duration, Instant};

use backon::{BackoffBuilder, ExponentialBuilder};
use marathon_types::{LedgerError, LedgerResult};
use tracing::{debug, error, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one. At least 1.
    pub max_attempts: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Budget for one operation across all attempts. A transaction still
    /// running when it expires is rolled back instead of committed.
    pub timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            min_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            timeout: Some(Duration::from_secs(10)),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn backoff(&self) -> impl Iterator<Item = Duration> {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_attempts.saturating_sub(1))
            .with_jitter()
            .build()
    }
}

/// Run `attempt` until it succeeds, fails permanently, runs out of attempts
/// or passes the policy deadline. `attempt` receives the deadline so the
/// transaction can refuse to commit late.
pub async fn run<T, F, Fut>(policy: &RetryPolicy, op: &'static str, mut attempt: F) -> LedgerResult<T>
where
    F: FnMut(Option<Instant>) -> Fut,
    Fut: Future<Output = LedgerResult<T>>,
{
    let deadline = policy.timeout.map(|t| Instant::now() + t);
    let mut last_error = None;

    for (n, delay) in std::iter::once(Duration::ZERO)
        .chain(policy.backoff())
        .enumerate()
    {
        if n > 0 {
            if deadline.is_some_and(|d| Instant::now() + delay >= d) {
                warn!(op, attempts = n, "deadline reached while retrying");
                return Err(LedgerError::DeadlineExceeded(op));
            }
            tokio::time::sleep(delay).await;
        }

        match attempt(deadline).await {
            Ok(value) => {
                if n > 0 {
                    debug!(op, attempt = n + 1, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_transient() => {
                warn!(
                    op,
                    attempt = n + 1,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "transient storage failure, retrying"
                );
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    let err = last_error.unwrap_or(LedgerError::DeadlineExceeded(op));
    error!(op, attempts = policy.max_attempts, error = %err, "retries exhausted");
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use marathon_types::UserId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast(attempts: usize) -> RetryPolicy {
        RetryPolicy {
            max_attempts: attempts,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            timeout: Some(Duration::from_secs(5)),
        }
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = AtomicUsize::new(0);
        let res = run(&fast(5), "test", |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(LedgerError::Transient("database is locked".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(res.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn application_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let res: LedgerResult<()> = run(&fast(5), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LedgerError::user_not_found(UserId(1))) }
        })
        .await;

        assert!(res.unwrap_err().is_not_found());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_the_transient_error() {
        let calls = AtomicUsize::new(0);
        let res: LedgerResult<()> = run(&fast(3), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LedgerError::Transient("busy".into())) }
        })
        .await;

        assert!(res.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn single_attempt_policy_never_retries() {
        let calls = AtomicUsize::new(0);
        let res: LedgerResult<()> = run(&fast(1), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LedgerError::Transient("busy".into())) }
        })
        .await;

        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn deadline_stops_retrying() {
        let policy = RetryPolicy {
            max_attempts: 10,
            min_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(50),
            timeout: Some(Duration::from_millis(20)),
        };
        let res: LedgerResult<()> = run(&policy, "slow", |deadline| {
            assert!(deadline.is_some());
            async { Err(LedgerError::Transient("busy".into())) }
        })
        .await;

        assert_eq!(res.unwrap_err(), LedgerError::DeadlineExceeded("slow"));
    }
}
