//! 재시도 유틸리티.
//!
//! 일시적 장애로 분류된 에러에 한해 고정 대기 시간으로 재시도합니다.
//! `max_attempts`는 첫 시도를 포함한 총 시도 횟수입니다.

use std::future::Future;
use std::time::Duration;

use quantgate_core::config::NetworkConfig;
use tracing::warn;

use crate::error::{ExchangeError, ExchangeResult};

/// 재시도 동작 설정.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 총 시도 횟수 (첫 시도 포함, 최소 1)
    pub max_attempts: u32,
    /// 재시도 간 대기 시간
    pub retry_delay: Duration,
}

impl RetryConfig {
    /// 새 재시도 설정을 생성합니다.
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }
}

impl From<&NetworkConfig> for RetryConfig {
    fn from(network: &NetworkConfig) -> Self {
        Self::new(
            network.max_attempts,
            Duration::from_millis(network.retry_delay_ms),
        )
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}

/// 일시적 에러에 한해 연산을 재시도합니다.
///
/// 치명적 에러는 즉시 반환됩니다. 모든 시도가 일시적 에러로 소진되면
/// 마지막 원인을 담은 `ExchangeError::Network`를 반환합니다.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, mut op: F) -> ExchangeResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ExchangeResult<T>>,
{
    let mut last_error = None;

    for attempt in 1..=config.max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                warn!(
                    attempt,
                    max_attempts = config.max_attempts,
                    error = %err,
                    "Transient failure, will retry"
                );
                last_error = Some(err);

                if attempt < config.max_attempts {
                    tokio::time::sleep(config.retry_delay).await;
                }
            }
            Err(err) => return Err(err),
        }
    }

    let cause = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    Err(ExchangeError::Network(format!(
        "All {} attempts failed, last error: {}",
        config.max_attempts, cause
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_first_attempt() {
        let config = RetryConfig::new(3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result = with_retry(&config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, ExchangeError>(42) }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let config = RetryConfig::new(3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result = with_retry(&config, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ExchangeError::Network("reset".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_stops_immediately() {
        let config = RetryConfig::new(5, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: ExchangeResult<i32> = with_retry(&config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ExchangeError::Unauthorized("bad key".into())) }
        })
        .await;

        assert!(matches!(result, Err(ExchangeError::Unauthorized(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_carries_last_cause() {
        let config = RetryConfig::new(2, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: ExchangeResult<i32> = with_retry(&config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ExchangeError::Timeout("30s elapsed".into())) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        match result {
            Err(ExchangeError::Network(msg)) => {
                assert!(msg.contains("All 2 attempts failed"));
                assert!(msg.contains("30s elapsed"));
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}
