//! Bounded retry for idempotent store reads.
//!
//! Conditional writes are never routed through here: a write whose
//! precondition was evaluated against a stale trip must be re-planned from a
//! fresh read, not replayed.

use std::future::Future;
use std::time::Duration;

use carpool_core::StoreError;
use tokio::time::sleep;
use tracing::warn;

/// Exponential backoff: `initial_delay * multiplier^attempt`, capped at `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let delay = Duration::from_millis(delay_ms.min(u64::MAX as f64) as u64);
        delay.min(self.max_delay)
    }
}

/// Runs `op`, retrying only on [`StoreError::Unavailable`].
pub async fn retry_reads<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_retries => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(attempt = attempt + 1, ?delay, error = %err, "Transient store failure on read, retrying");
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_recovers_from_transient_failure() {
        let calls = AtomicUsize::new(0);
        let result = retry_reads(&fast(), || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(StoreError::Unavailable("connection reset".to_string()))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = retry_reads(&fast(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable("down".to_string()))
        })
        .await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let id = Uuid::new_v4();
        let result: Result<(), _> = retry_reads(&fast(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::NotFound(id))
        })
        .await;

        assert_eq!(result, Err(StoreError::NotFound(id)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
