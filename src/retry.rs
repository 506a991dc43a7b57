//! Fixed-count, fixed-delay retry used by the voice and image adapters

use std::future::Future;
use std::time::Duration;

/// How many times to try and how long to wait between tries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    /// 3 attempts, 2 seconds apart
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

/// Outcome of a retried operation that never succeeded
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

/// Run `operation` until it succeeds or the attempt budget is spent.
/// Returns the first success, or the last error together with the number of attempts made.
pub async fn with_retry<T, E, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        log::debug!("{}: attempt {}/{}", label, attempt, max_attempts);

        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt >= max_attempts {
                    log::warn!(
                        "{}: giving up after {} attempts: {}",
                        label,
                        max_attempts,
                        e
                    );
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last_error: e,
                    });
                }

                log::warn!(
                    "{}: attempt {}/{} failed, retrying in {:?}: {}",
                    label,
                    attempt,
                    max_attempts,
                    policy.delay,
                    e
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, RetryExhausted<String>> =
            with_retry(fast_policy(), "test", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(attempt) }
            })
            .await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_success_after_failures() {
        let result: Result<&str, RetryExhausted<String>> =
            with_retry(fast_policy(), "test", |attempt| async move {
                if attempt < 3 {
                    Err(format!("failure {}", attempt))
                } else {
                    Ok("done")
                }
            })
            .await;
        assert_eq!(result.unwrap(), "done");
    }

    #[tokio::test]
    async fn test_exhaustion_keeps_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), RetryExhausted<String>> =
            with_retry(fast_policy(), "test", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(format!("failure {}", attempt)) }
            })
            .await;
        let err = result.unwrap_err();
        assert_eq!(err.attempts, 3);
        assert_eq!(err.last_error, "failure 3");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay, Duration::from_secs(2));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}
