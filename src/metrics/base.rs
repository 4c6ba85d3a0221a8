use std::future::Future;
use std::time::Duration;

use tracing::{debug, error};

use crate::errors::{CheckOutcome, HealthCheckError};
use crate::types::{CheckName, CheckResult, Config};

/// Bounds one runtime call; running past `limit` counts as a failed call.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> CheckOutcome<T>
where
    F: Future<Output = CheckOutcome<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(outcome) => outcome,
        Err(_) => Err(HealthCheckError::Timeout(limit)),
    }
}

/// Timeout and retry settings applied to every runtime call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuntimeCallPolicy {
    pub timeout: Duration,
    pub attempts: u32,
    pub delay: Duration,
}

impl RuntimeCallPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            timeout: cfg.runtime_timeout,
            attempts: cfg.runtime_retry_attempts.max(1),
            delay: cfg.runtime_retry_delay,
        }
    }
}

/// Runs `call` under the policy's timeout, retrying transient failures.
///
/// Non-retryable errors such as a missing container are returned at once.
pub async fn with_retry<T, F, Fut>(policy: RuntimeCallPolicy, mut call: F) -> CheckOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CheckOutcome<T>>,
{
    let mut attempt = 1;
    loop {
        match with_timeout(policy.timeout, call()).await {
            Err(e) if e.is_retryable() && attempt < policy.attempts => {
                debug!(attempt, attempts = policy.attempts, "runtime call failed, retrying: {}", e);
                if !policy.delay.is_zero() {
                    tokio::time::sleep(policy.delay).await;
                }
                attempt += 1;
            }
            outcome => return outcome,
        }
    }
}

/// Turns a failed sample into an ERROR result for `check`, logging why.
pub fn error_result(container: &str, check: CheckName, err: &HealthCheckError) -> CheckResult {
    error!(container, check = %check, "check could not be determined: {}", err);
    CheckResult::error(check, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HealthStatus;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_with_timeout_passes_through() {
        let out = with_timeout(Duration::from_secs(1), async { Ok::<_, HealthCheckError>(7) }).await;
        assert_eq!(out.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let out: CheckOutcome<()> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(out, Err(HealthCheckError::Timeout(_))));
    }

    fn policy(attempts: u32) -> RuntimeCallPolicy {
        RuntimeCallPolicy {
            timeout: Duration::from_millis(200),
            attempts,
            delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_with_retry_recovers_from_transient_failure() {
        let calls = AtomicU32::new(0);
        let out = with_retry(policy(3), || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(HealthCheckError::Network("connection refused".into()))
            } else {
                Ok("running")
            }
        })
        .await;
        assert_eq!(out.unwrap(), "running");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_with_retry_gives_up_after_attempts() {
        let calls = AtomicU32::new(0);
        let out: CheckOutcome<()> = with_retry(policy(3), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(HealthCheckError::RuntimeUnreachable("socket".into()))
        })
        .await;
        assert!(matches!(out, Err(HealthCheckError::RuntimeUnreachable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_retries_timeouts() {
        let calls = AtomicU32::new(0);
        let out = with_retry(policy(2), || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok(1)
        })
        .await;
        assert_eq!(out.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_with_retry_does_not_retry_missing_container() {
        let calls = AtomicU32::new(0);
        let out: CheckOutcome<()> = with_retry(policy(3), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(HealthCheckError::ContainerNotFound("web".into()))
        })
        .await;
        assert!(matches!(out, Err(HealthCheckError::ContainerNotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_error_result_carries_message() {
        let err = HealthCheckError::ContainerNotFound("web".into());
        let result = error_result("web", CheckName::Logs, &err);
        assert_eq!(result.status, HealthStatus::Error);
        assert_eq!(result.details["message"], "container not found: web");
    }
}
