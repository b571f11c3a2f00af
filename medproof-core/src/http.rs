//! Retry, backoff and transient-error classification shared by the content
//! store and ledger clients.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backoff::{future::retry_notify, ExponentialBackoff};
use reqwest::StatusCode;
use tracing::warn;

use crate::error::MedproofError;

/// Bounded exponential backoff for one remote service.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts allowed for transient failures (first try included).
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Policy that never waits; used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(1),
        }
    }

    fn build_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            // Attempts are bounded by count below, not by wall-clock time.
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or exhausts the policy.
///
/// `op` classifies its own failures: transient ones are retried, permanent
/// ones are returned immediately. Once `max_attempts` is reached the last
/// transient error is returned as-is.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, service: &str, op: F) -> Result<T, MedproofError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, MedproofError>>,
{
    let attempts = AtomicU32::new(0);
    let max_attempts = policy.max_attempts.max(1);

    retry_notify(
        policy.build_backoff(),
        || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let fut = op();
            async move {
                match fut.await {
                    Ok(value) => Ok(value),
                    Err(e) if e.is_transient() && attempt < max_attempts => {
                        Err(backoff::Error::transient(e))
                    }
                    Err(e) => Err(backoff::Error::permanent(e)),
                }
            }
        },
        |err: MedproofError, duration: Duration| {
            warn!(
                service = service,
                error = %err,
                attempt = attempts.load(Ordering::SeqCst),
                retry_after_ms = duration.as_millis() as u64,
                "Retry scheduled"
            );
        },
    )
    .await
}

/// Check if a reqwest error is transient and should be retried.
pub fn is_transient_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

/// Check if an HTTP status code indicates a transient error.
pub fn is_transient_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
            | StatusCode::BAD_GATEWAY
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_transient_status_codes() {
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient_status(StatusCode::GATEWAY_TIMEOUT));
        assert!(is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
        assert!(!is_transient_status(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[tokio::test]
    async fn test_retry_stops_after_max_attempts() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = retry(&RetryPolicy::immediate(4), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(MedproofError::LedgerUnavailable("connection refused".into())) }
        })
        .await;

        assert!(matches!(result, Err(MedproofError::LedgerUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_retry_does_not_repeat_permanent_errors() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = retry(&RetryPolicy::immediate(5), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(MedproofError::SigningFailure("no key".into())) }
        })
        .await;

        assert!(matches!(result, Err(MedproofError::SigningFailure(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let calls = AtomicUsize::new(0);
        let result = retry(&RetryPolicy::immediate(3), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(MedproofError::StoreUnavailable("timeout".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 1);
    }
}
