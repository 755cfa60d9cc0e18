//! Bounded retry with backoff for provider operations

use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::core::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay between every attempt.
    Fixed,
    /// Delay doubles after each failed attempt.
    Exponential,
}

/// Re-invokes an operation on transient failure, up to a fixed attempt
/// ceiling. Terminal errors (validation, capability gaps, definite upstream
/// rejections, contract violations) propagate on the first attempt, and the
/// last error always surfaces unchanged.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    delay: Duration,
    backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(500),
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, delay: Duration, backoff: Backoff) -> Self {
        Self {
            // A zero ceiling would never run the operation.
            max_attempts: max_attempts.max(1),
            delay,
            backoff,
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Runs `operation` until it succeeds, fails terminally, or the attempt
    /// ceiling is reached.
    pub async fn run<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    debug!(
                        "Attempt {}/{} failed: {}. Retrying in {:?}...",
                        attempt, self.max_attempts, err, delay
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn delay_for(&self, attempt: usize) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => self.delay * 2u32.saturating_pow(attempt as u32 - 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ProviderError;
    use crate::core::model::ProviderKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy(max_attempts: usize) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), Backoff::Fixed)
    }

    #[tokio::test]
    async fn test_success_needs_one_attempt() {
        let calls = AtomicUsize::new(0);
        let result = fast_policy(3)
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, ProviderError>(7) }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_exhausts_ceiling() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = fast_policy(3)
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::Transient("timed out".into())) }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // The final error must surface unchanged, not wrapped.
        assert_eq!(err.to_string(), "transient upstream failure: timed out");
    }

    #[tokio::test]
    async fn test_recovery_after_transient_failures() {
        let calls = AtomicUsize::new(0);
        let result = fast_policy(3)
            .run(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ProviderError::Transient("flaky".into()))
                    } else {
                        Ok("recovered")
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_validation_error_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = fast_policy(3)
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::Validation("account_id is required".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsupported_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = fast_policy(5)
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(ProviderError::Unsupported {
                        provider: ProviderKind::Stripe,
                        operation: "get_institutions",
                    })
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_exponential_backoff_doubles() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100), Backoff::Exponential);
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn test_zero_attempts_clamps_to_one() {
        assert_eq!(fast_policy(0).max_attempts(), 1);
    }
}
