use crate::error::AdapterError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Jittered exponential backoff for `connect()`: initial 1s, factor 2,
/// cap 5 attempts, ±0-50% jitter.
#[derive(Debug, Clone, Copy)]
pub struct ConnectBackoff {
    pub initial: Duration,
    pub factor: u32,
    pub max_attempts: u32,
}

impl Default for ConnectBackoff {
    fn default() -> Self {
        ConnectBackoff {
            initial: Duration::from_secs(1),
            factor: 2,
            max_attempts: 5,
        }
    }
}

impl ConnectBackoff {
    pub async fn run<F, Fut, T>(&self, mut attempt_fn: F) -> Result<T, AdapterError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AdapterError>>,
    {
        let mut last_err = None;
        for attempt in 0..self.max_attempts {
            match attempt_fn().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt + 1 < self.max_attempts => {
                    let delay = self.jittered_delay(attempt);
                    warn!(attempt, ?delay, error = %err, "connect attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            AdapterError::ConnectionFailed("exhausted connect attempts".to_string())
        }))
    }

    fn jittered_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.initial.as_millis() as u64 * u64::from(self.factor).pow(attempt);
        let jitter_frac = rand::thread_rng().gen_range(0.0..0.5);
        let jittered_ms = base_ms + (base_ms as f64 * jitter_frac) as u64;
        Duration::from_millis(jittered_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let backoff = ConnectBackoff {
            initial: Duration::from_millis(1),
            factor: 2,
            max_attempts: 5,
        };
        let attempts = AtomicU32::new(0);
        let result = backoff
            .run(|| async {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(AdapterError::Transient("timeout".into()))
                } else {
                    Ok(42)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_stops_immediately() {
        let backoff = ConnectBackoff::default();
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = backoff
            .run(|| async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(AdapterError::AuthFailed("bad password".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
