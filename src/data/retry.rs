use super::{DataError, DataResult};
use std::time::Duration;
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};

/// Retry a fallible async operation with jittered exponential backoff.
///
/// Only errors for which [`DataError::is_retryable`] holds are retried.
pub async fn retry_with_backoff<F, Fut, T>(operation: F, max_attempts: usize) -> DataResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = DataResult<T>>,
{
    let retry_strategy = ExponentialBackoff::from_millis(100)
        .max_delay(Duration::from_secs(10))
        .map(jitter)
        .take(max_attempts);

    let operation = &operation;
    RetryIf::spawn(
        retry_strategy,
        move || async move {
            match operation().await {
                Ok(result) => Ok(result),
                Err(e) => {
                    match &e {
                        DataError::RateLimit { retry_after } => {
                            tracing::warn!("Rate limited, retry after {} seconds", retry_after);
                            tokio::time::sleep(Duration::from_secs(*retry_after)).await;
                        }
                        e if e.is_retryable() => {
                            tracing::warn!("Retryable error: {}", e);
                        }
                        _ => {
                            tracing::error!("Non-retryable error: {}", e);
                        }
                    }
                    Err(e)
                }
            }
        },
        |e: &DataError| e.is_retryable(),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result = retry_with_backoff(
            move || async move {
                let calls = counter;
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(DataError::Timeout { timeout_seconds: 1 })
                } else {
                    Ok(n)
                }
            },
            3,
        )
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_fast() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result: DataResult<()> = retry_with_backoff(
            move || async move {
                let calls = counter;
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DataError::parse_error("garbage"))
            },
            3,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
