//! Retry with exponential backoff and jitter
//!
//! Only non-streaming collaborator calls are retried. Streamed generations
//! are never retried mid-flight.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::RagError;

/// Whether a failed call is worth retrying
fn is_transient(err: &RagError) -> bool {
    matches!(
        err,
        RagError::RateLimited(_) | RagError::Timeout(_) | RagError::Connection(_)
    )
}

/// Backoff for the given attempt: `initial * 2^attempt` plus up to 50% jitter
pub fn backoff_delay(initial: Duration, attempt: u32) -> Duration {
    let base = initial.saturating_mul(1u32 << attempt.min(8));
    let jitter_ms = rand::thread_rng().gen_range(0..=base.as_millis().max(1) as u64 / 2);
    base + Duration::from_millis(jitter_ms)
}

/// Run `op` up to `1 + max_retries` times, backing off between attempts.
///
/// Non-transient errors return immediately.
pub async fn retry<T, F, Fut>(
    max_retries: u32,
    initial_backoff: Duration,
    mut op: F,
) -> Result<T, RagError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RagError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_retries && is_transient(&err) => {
                let delay = backoff_delay(initial_backoff, attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient upstream failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry(3, Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(RagError::Timeout("slow".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry(3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RagError::Search("bad query".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry(2, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RagError::RateLimited("429".into())) }
        })
        .await;

        assert!(matches!(result, Err(RagError::RateLimited(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_backoff_grows() {
        let initial = Duration::from_millis(100);
        let first = backoff_delay(initial, 0);
        let third = backoff_delay(initial, 2);
        assert!(first >= Duration::from_millis(100));
        assert!(third >= Duration::from_millis(400));
    }
}
