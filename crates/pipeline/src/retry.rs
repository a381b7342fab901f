//! Per-call timeout and bounded retry for external backends.

use crate::cancel::CancellationToken;
use frag_core::{AppError, AppResult, BackendError};
use std::future::Future;
use std::time::Duration;

/// Limits applied to every call against one kind of backend.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retries: u32,
    pub timeout: Duration,
    /// Delay before the first retry; doubles on each further retry
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, timeout: Duration, backoff_base: Duration) -> Self {
        Self {
            retries,
            timeout,
            backoff_base,
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
    }
}

/// Run `operation` under the policy's timeout, retrying transient failures.
///
/// No attempt is started once `cancel` is raised, and a pending backoff is
/// cut short by it. Non-backend errors are reported as `Unavailable`.
pub async fn call_with_retry<T, F, Fut>(
    backend: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(BackendError::cancelled(backend));
        }

        let error = match tokio::time::timeout(policy.timeout, operation()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(AppError::Backend(e))) => e,
            Ok(Err(other)) => BackendError::unavailable(backend, other.to_string()),
            Err(_) => BackendError::timeout(backend, policy.timeout.as_millis() as u64),
        };

        if !error.is_retryable() || attempt >= policy.retries {
            return Err(error);
        }

        let delay = policy.backoff(attempt);
        attempt += 1;

        tracing::warn!(
            backend = backend,
            attempt = attempt,
            max_retries = policy.retries,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Backend call failed, retrying"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => return Err(BackendError::cancelled(backend)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy(retries: u32) -> RetryPolicy {
        RetryPolicy::new(retries, Duration::from_millis(50), Duration::from_millis(1))
    }

    #[test]
    fn test_backoff_doubles() {
        let p = RetryPolicy::new(3, Duration::from_secs(1), Duration::from_millis(100));
        assert_eq!(p.backoff(0), Duration::from_millis(100));
        assert_eq!(p.backoff(2), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let result = call_with_retry("test", &policy(2), &cancel, || {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(BackendError::rate_limited("test").into())
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let result: Result<(), _> = call_with_retry("test", &policy(2), &cancel, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(BackendError::malformed("test", "junk").into())
            }
        })
        .await;

        assert_eq!(result.unwrap_err().kind(), "malformed");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let cancel = CancellationToken::new();
        let result: Result<(), _> = call_with_retry("slow", &policy(0), &cancel, || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert_eq!(
            result.unwrap_err(),
            BackendError::Timeout {
                backend: "slow".to_string(),
                timeout_ms: 50
            }
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start_makes_no_call() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<(), _> = call_with_retry("test", &policy(2), &cancel, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        assert_eq!(result.unwrap_err().kind(), "cancelled");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_other_errors_become_unavailable() {
        let cancel = CancellationToken::new();
        let result: Result<(), _> = call_with_retry("test", &policy(0), &cancel, || async {
            Err(AppError::Other("boom".to_string()))
        })
        .await;

        assert_eq!(result.unwrap_err().kind(), "unavailable");
    }
}
