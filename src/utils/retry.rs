//! Bounded retries with exponential backoff for backend calls.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Classifies failures that are worth another attempt.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// How many times to try an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never less than 1.
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Wait before attempt `attempt + 1`, doubling from `base_delay`, capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Longest time [`retry`] can take when each attempt is capped at `per_attempt`.
    pub fn worst_case(&self, per_attempt: Duration) -> Duration {
        let waits: Duration = (1..self.attempts)
            .map(|attempt| self.backoff(attempt) + self.max_jitter())
            .sum();
        per_attempt.saturating_mul(self.attempts) + waits
    }

    fn max_jitter(&self) -> Duration {
        self.base_delay / 4
    }
}

/// Run `operation` until it succeeds, fails permanently, or runs out of attempts.
///
/// The last error is returned unchanged.
pub async fn retry<T, E, F, Fut>(
    label: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if !error.is_retryable() {
            debug!(operation = label, attempt, "permanent failure: {error}");
            return Err(error);
        }
        if attempt >= policy.attempts {
            warn!(operation = label, attempts = attempt, "giving up: {error}");
            return Err(error);
        }

        let delay = policy.backoff(attempt) + jitter(policy.max_jitter());
        warn!(
            operation = label,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "transient failure, retrying: {error}"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::from(d.subsec_nanos()))
        .unwrap_or(0);
    Duration::from_millis(nanos % max_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError {
        transient: bool,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "transient={}", self.transient)
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            self.transient
        }
    }

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts).with_base_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry("test", &fast(3), || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(TestError { transient: true })
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry("test", &fast(5), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TestError { transient: false })
        })
        .await;

        assert!(!result.unwrap_err().transient);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stops_after_last_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry("test", &fast(3), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TestError { transient: true })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(10)
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(350));
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
        assert_eq!(RetryPolicy::new(0).attempts, 1);
    }

    #[test]
    fn test_worst_case_covers_attempts_and_waits() {
        let policy = RetryPolicy::new(3)
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(1));
        // 3 x 1s attempts, waits of 100ms and 200ms, each plus up to 25ms jitter
        assert_eq!(
            policy.worst_case(Duration::from_secs(1)),
            Duration::from_millis(3_350)
        );
        assert_eq!(
            RetryPolicy::new(1).worst_case(Duration::from_secs(2)),
            Duration::from_secs(2)
        );
    }
}
