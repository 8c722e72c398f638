//! Retry policy for setup-time operations.
//
// Only used where a failure would otherwise be fatal, such as opening the
// motor link at startup. Per-cycle failures are never retried here: the
// orchestrator degrades them to a zero count and moves on.

use crate::error::{AppResult, RigError};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Defines a policy for retrying an operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// The maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// The delay between attempts.
    pub backoff_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_delay: Duration::from_secs(2),
        }
    }
}

/// Runs `operation` until it succeeds or the policy is exhausted.
///
/// Every failed attempt is logged. The error from the final attempt is
/// returned when no attempt succeeds.
pub async fn retry_with_policy<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                warn!(label, attempt, max_attempts = attempts, error = %err, "attempt failed");
                last_error = Some(err);
            }
        }
        if attempt < attempts {
            sleep(policy.backoff_delay).await;
        }
    }

    Err(last_error.unwrap_or_else(|| {
        RigError::Configuration(format!("{label}: retry policy allowed no attempts"))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_retry_logic_succeeds() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_delay: Duration::from_millis(10),
        };
        let result = retry_with_policy(&policy, "open", move || async move {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= 2 {
                Ok(n)
            } else {
                Err(RigError::LinkNotOpen)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_logic_fails() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_delay: Duration::from_millis(10),
        };
        let result: AppResult<()> = retry_with_policy(&policy, "open", move || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(RigError::SerialOpen {
                port: "/dev/ttyACM0".into(),
                reason: "busy".into(),
            })
        })
        .await;
        assert!(matches!(result, Err(RigError::SerialOpen { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_still_tries_once() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let policy = RetryPolicy {
            max_attempts: 0,
            backoff_delay: Duration::from_millis(10),
        };
        let result = retry_with_policy(&policy, "open", move || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
