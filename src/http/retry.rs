//! Retry policy for outbound requests.
//!
//! Only transient failures (5xx responses and transport errors) are retried.
//! Client errors (4xx) are returned on the first attempt.

use log::{debug, warn};
use std::future::Future;
use std::time::Duration;

use super::error::RequestError;

/// Default number of attempts for a single request, including the first one.
pub const MAX_ATTEMPTS: usize = 3;

/// Delay before the first retry in milliseconds.
pub const BASE_DELAY_MS: u64 = 500;

/// Upper bound for the delay between two attempts in milliseconds.
pub const MAX_DELAY_MS: u64 = 5000;

/// How many times a request is attempted and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay: Duration::from_millis(BASE_DELAY_MS),
            max_delay: Duration::from_millis(MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// A policy that attempts the request exactly once.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set the number of attempts. Zero is treated as one.
    pub fn attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the delay before the first retry.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Delay to wait after the given failed attempt (1-based).
    /// Doubles with every attempt and never exceeds `max_delay`.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as u32;
        self.base_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay)
    }

    /// Runs `operation` until it succeeds, fails with a non-transient error,
    /// or the attempts are used up. The last error is returned.
    pub async fn run<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T, RequestError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, RequestError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if !e.is_transient() => {
                    debug!("{}: non-retryable error: {}", operation_name, e);
                    return Err(e);
                }
                Err(e) if attempt >= max_attempts => {
                    debug!(
                        "{}: giving up after {} attempt(s): {}",
                        operation_name, attempt, e
                    );
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{}: attempt {}/{} failed ({}), retrying in {}ms...",
                        operation_name,
                        attempt,
                        max_attempts,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy(attempts: usize) -> RetryPolicy {
        RetryPolicy::default()
            .attempts(attempts)
            .base_delay(Duration::ZERO)
    }

    fn server_error() -> RequestError {
        RequestError::UpstreamServer {
            status: StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, MAX_ATTEMPTS);
        assert_eq!(policy.base_delay, Duration::from_millis(BASE_DELAY_MS));
    }

    #[test]
    fn test_none_policy_has_single_attempt() {
        assert_eq!(RetryPolicy::none().max_attempts, 1);
        assert_eq!(RetryPolicy::default().attempts(0).max_attempts, 1);
    }

    #[test]
    fn test_delay_doubles_and_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(5), Duration::from_millis(MAX_DELAY_MS));
        assert_eq!(policy.delay_for(100), Duration::from_millis(MAX_DELAY_MS));
    }

    #[tokio::test]
    async fn test_run_success() {
        let result = fast_policy(3)
            .run("test", || async { Ok::<_, RequestError>(42) })
            .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_run_client_error_is_not_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = Arc::clone(&attempts);

        let result = fast_policy(3)
            .run("test", || {
                let attempts = Arc::clone(&attempts_clone);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(RequestError::ClientRequest {
                        status: StatusCode::NOT_FOUND,
                        detail: None,
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(RequestError::ClientRequest { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_retries_server_errors() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = Arc::clone(&attempts);

        let result = fast_policy(3)
            .run("test", || {
                let attempts = Arc::clone(&attempts_clone);
                async move {
                    let count = attempts.fetch_add(1, Ordering::SeqCst);
                    if count < 2 { Err(server_error()) } else { Ok("recovered") }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_exhausts_attempts() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = Arc::clone(&attempts);

        let result = fast_policy(4)
            .run("test", || {
                let attempts = Arc::clone(&attempts_clone);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(server_error())
                }
            })
            .await;

        assert!(matches!(result, Err(RequestError::UpstreamServer { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }
}
