//! Classified retry with linear backoff for completion calls.

use crate::error::{classify, ErrorCategory};
use crate::llm::{duration_secs, LlmError};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Default number of attempts per call
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay; the n-th retry waits `n × base_delay`
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay unit for the linear backoff
    #[serde(with = "duration_secs")]
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryConfig {
    /// Delay to wait after `attempt` (1-based) failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Record of one try of a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationAttempt {
    /// 1-based attempt number
    pub attempt: u32,
    /// Backoff slept before this attempt, in milliseconds
    pub backoff_ms: u64,
    /// Failure message, `None` when the attempt succeeded
    pub failure: Option<String>,
    pub category: Option<ErrorCategory>,
}

/// Successful call plus the attempts it took.
#[derive(Debug)]
pub struct Invocation<T> {
    pub value: T,
    pub attempts: Vec<InvocationAttempt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Not retryable; propagated on first sight
    Fatal,
    /// Retryable, but every attempt failed
    Exhausted,
}

/// A call that did not succeed, with its last failure.
#[derive(Debug, thiserror::Error)]
#[error("{category} after {} attempt(s): {error}", .attempts.len())]
pub struct InvocationFailure {
    pub category: ErrorCategory,
    pub kind: FailureKind,
    #[source]
    pub error: LlmError,
    pub attempts: Vec<InvocationAttempt>,
}

/// Check if an error is worth retrying
pub fn is_retryable_error(error: &LlmError) -> bool {
    classify(error).is_retryable()
}

/// Run `op` until it succeeds, fails fatally, or `max_attempts` is reached.
///
/// Retryable failures sleep `base_delay × attempt` before the next attempt.
/// There is no sleep after the final attempt.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    mut op: F,
) -> Result<Invocation<T>, InvocationFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempts = Vec::new();
    let mut backoff = Duration::ZERO;
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => {
                attempts.push(InvocationAttempt {
                    attempt,
                    backoff_ms: backoff.as_millis() as u64,
                    failure: None,
                    category: None,
                });
                return Ok(Invocation { value, attempts });
            }
            Err(error) => {
                let category = classify(&error);
                attempts.push(InvocationAttempt {
                    attempt,
                    backoff_ms: backoff.as_millis() as u64,
                    failure: Some(error.to_string()),
                    category: Some(category),
                });

                if !category.is_retryable() {
                    log::debug!("Retry: attempt {} failed with {}, not retrying", attempt, category);
                    return Err(InvocationFailure {
                        category,
                        kind: FailureKind::Fatal,
                        error,
                        attempts,
                    });
                }

                if attempt >= max_attempts {
                    log::warn!(
                        "Retry: giving up after {} attempts, last failure {}: {}",
                        attempt,
                        category,
                        error
                    );
                    return Err(InvocationFailure {
                        category,
                        kind: FailureKind::Exhausted,
                        error,
                        attempts,
                    });
                }

                backoff = config.delay_for(attempt);
                log::warn!(
                    "Retry: attempt {}/{} failed with {} ({}), retrying in {:?}",
                    attempt,
                    max_attempts,
                    category,
                    error,
                    backoff
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn api(status: u16) -> LlmError {
        LlmError::Api {
            provider: "anthropic",
            status,
            error_type: None,
            message: format!("status {}", status),
        }
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_delay_grows_linearly() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for(1), Duration::from_secs(2));
        assert_eq!(config.delay_for(2), Duration::from_secs(4));
        assert_eq!(config.delay_for(3), Duration::from_secs(6));
    }

    #[test]
    fn test_is_retryable_error() {
        assert!(is_retryable_error(&api(429)));
        assert!(is_retryable_error(&api(503)));
        assert!(!is_retryable_error(&api(400)));
        assert!(!is_retryable_error(&LlmError::NoApiKey("x".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&RetryConfig::default(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, LlmError>("done")
        })
        .await
        .unwrap();

        assert_eq!(result.value, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.attempts.len(), 1);
        assert_eq!(result.attempts[0].backoff_ms, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds_with_linear_backoff() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();
        let result = with_retry(&RetryConfig::default(), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(api(429))
            } else {
                Ok("ok")
            }
        })
        .await
        .unwrap();

        assert_eq!(result.value, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let backoffs: Vec<u64> = result.attempts.iter().map(|a| a.backoff_ms).collect();
        assert_eq!(backoffs, vec![0, 2000, 4000]);
        assert_eq!(result.attempts[0].category, Some(ErrorCategory::RateLimited));
        assert!(started.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_request_is_never_retried() {
        let calls = AtomicU32::new(0);
        let failure = with_retry(&RetryConfig::default(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(api(400))
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(failure.category, ErrorCategory::InvalidRequest);
        assert_eq!(failure.kind, FailureKind::Fatal);
        assert_eq!(failure.attempts.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_respects_max_attempts_without_trailing_sleep() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();
        let failure = with_retry(&RetryConfig::default(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(api(500))
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(failure.kind, FailureKind::Exhausted);
        assert_eq!(failure.category, ErrorCategory::UpstreamFault);
        assert_eq!(failure.attempts.len(), 3);
        // 2s + 4s between attempts, nothing after the last one
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(6) && elapsed < Duration::from_secs(7));
        assert!(failure.to_string().starts_with("upstream-fault after 3 attempt(s)"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_max_attempts_still_tries_once() {
        let config = RetryConfig {
            max_attempts: 0,
            base_delay: Duration::from_millis(10),
        };
        let calls = AtomicU32::new(0);
        let _ = with_retry(&config, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(api(503))
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
