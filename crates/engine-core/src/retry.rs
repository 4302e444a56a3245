use crate::error::PipelineError;
use model::task::RetryPolicy as TaskRetryPolicy;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// What a failed attempt means for the retry loop: either the error is
/// worth burning another attempt on, or it should propagate immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retry,
    Stop,
}

/// Table-pipeline-level retry, distinct from `connectors::backoff`'s
/// connection-level backoff: this one wraps a whole table pipeline
/// restart, not a single connect call, and waits the task's configured
/// flat `retry_delay_seconds` between attempts rather than growing the
/// delay — exponential/jittered backoff stays exclusive to
/// `connectors::backoff::ConnectBackoff`, which is about not hammering a
/// server that just refused a connection, not about a table-level retry
/// budget a user configured directly.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Builds a `RetryPolicy` from a task's configured policy. A disabled
    /// policy collapses to a single attempt with no delay.
    pub fn from_task_policy(policy: &TaskRetryPolicy) -> Self {
        if !policy.retry_enabled {
            return RetryPolicy {
                max_attempts: 1,
                delay: Duration::ZERO,
            };
        }
        RetryPolicy {
            max_attempts: policy.max_retries + 1,
            delay: Duration::from_secs(policy.retry_delay_seconds),
        }
    }

    /// Runs `attempt_fn` up to `max_attempts` times. `classify` decides,
    /// from the error returned, whether to retry or stop; a `Stop`
    /// verdict propagates the error without consuming remaining attempts.
    pub async fn run<F, Fut, T, Classifier>(
        &self,
        mut attempt_fn: F,
        classify: Classifier,
    ) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
        Classifier: Fn(&PipelineError) -> RetryDisposition,
    {
        let mut attempt = 0;
        loop {
            match attempt_fn().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    let disposition = classify(&err);
                    if disposition == RetryDisposition::Stop || attempt >= self.max_attempts {
                        if attempt >= self.max_attempts && disposition == RetryDisposition::Retry {
                            return Err(PipelineError::RetriesExhausted {
                                attempts: attempt,
                                source: Box::new(err),
                            });
                        }
                        return Err(err);
                    }
                    warn!(attempt, delay = ?self.delay, error = %err, "table operation failed, retrying");
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}

/// Default classifier: adapter errors use their own `is_retryable`,
/// everything else stops immediately.
pub fn classify_adapter_errors(err: &PipelineError) -> RetryDisposition {
    match err {
        PipelineError::Adapter(inner) if inner.is_retryable() => RetryDisposition::Retry,
        _ => RetryDisposition::Stop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connectors::AdapterError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn from_task_policy_keeps_delay_flat() {
        let task_policy = TaskRetryPolicy {
            retry_enabled: true,
            max_retries: 3,
            retry_delay_seconds: 5,
            cleanup_on_retry: false,
        };
        let policy = RetryPolicy::from_task_policy(&task_policy);
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.delay, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn retries_until_success() {
        let attempts = AtomicU32::new(0);
        let result = policy(5)
            .run(
                || async {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(PipelineError::Adapter(AdapterError::Transient("busy".into())))
                    } else {
                        Ok(())
                    }
                },
                classify_adapter_errors,
            )
            .await;
        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausting_attempts_reports_retries_exhausted() {
        let result: Result<(), _> = policy(2)
            .run(
                || async { Err(PipelineError::Adapter(AdapterError::Transient("busy".into()))) },
                classify_adapter_errors,
            )
            .await;
        assert!(matches!(result, Err(PipelineError::RetriesExhausted { attempts: 2, .. })));
    }

    #[tokio::test]
    async fn non_retryable_error_stops_without_consuming_budget() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = policy(5)
            .run(
                || async {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(PipelineError::Adapter(AdapterError::AuthFailed("no".into())))
                },
                classify_adapter_errors,
            )
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
