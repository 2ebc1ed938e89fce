use std::future::Future;
use std::time::Duration;

use domain::RepositoryError;
use tokio::time::sleep;

#[derive(Clone, Debug)]
pub enum Backoff {
    Exponential { base: Duration },
}

impl Backoff {
    pub fn exponential(base: Duration) -> Self {
        Backoff::Exponential { base }
    }

    fn delay_at(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Exponential { base } => {
                let exp = std::cmp::min(attempt.saturating_sub(1), 20);
                let factor = 1u32 << exp;
                base.saturating_mul(factor)
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::exponential(Duration::from_millis(50)),
        }
    }
}

/// 只重试瞬时类存储错误；校验/未找到一类错误立即上抛
pub async fn retry_async<F, Fut, T>(config: &RetryConfig, mut op: F) -> Result<T, RepositoryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RepositoryError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if attempt >= config.max_attempts || !e.is_transient() {
                    return Err(e);
                }
                let delay = config.backoff.delay_at(attempt);
                tracing::debug!(attempt, ?delay, error = %e, "retrying transient storage error");
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig {
            max_attempts: 3,
            backoff: Backoff::exponential(Duration::from_millis(1)),
        };

        let result = retry_async(&config, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(RepositoryError::Timeout)
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_errors() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::default();

        let result: Result<(), _> = retry_async(&config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RepositoryError::storage("unique violation")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig {
            max_attempts: 3,
            backoff: Backoff::exponential(Duration::from_millis(1)),
        };

        let result: Result<(), _> = retry_async(&config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RepositoryError::Timeout) }
        })
        .await;

        assert_eq!(result.unwrap_err(), RepositoryError::Timeout);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
