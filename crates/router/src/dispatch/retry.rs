//! 지수 백오프 재시도

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use logroute_core::metrics as m;
use logroute_core::record::Record;

use super::DynSink;
use crate::error::RouterError;
use crate::policy::{self, Recovery, Stage};

/// 전송 재시도 정책
///
/// `n`번째 재시도 전 지연은 `base_delay × backoff_factor^n`이며 `max_delay`로 제한됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// 최대 시도 횟수 (첫 시도 포함)
    pub max_attempts: u32,
    /// 지수 백오프 계수
    pub backoff_factor: f64,
    /// 기본 지연
    pub base_delay: Duration,
    /// 지연 상한
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_factor: 1.5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// 재시도 없이 한 번만 시도하는 정책
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// 유효 시도 횟수. 0으로 설정되어도 최소 한 번은 시도합니다.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// `retry`번째 재시도(1부터 시작) 전에 기다릴 시간
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }
}

/// 재시도 루프 결과
#[derive(Debug)]
pub struct RetryOutcome {
    /// 실제 시도 횟수
    pub attempts: u32,
    /// 마지막 시도의 결과
    pub result: Result<(), RouterError>,
}

impl RetryOutcome {
    /// 첫 시도를 제외한 재시도 횟수
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// 싱크 호출을 정책에 따라 재시도합니다.
///
/// 시도는 순차적으로 일어나며 백오프 동안 이 목적지의 태스크만 대기합니다.
/// [`policy::recover`]가 `GiveUp`을 반환하면 남은 시도 없이 중단합니다.
pub async fn send_with_retry(
    sink: &dyn DynSink,
    destination: &str,
    records: &[Record],
    policy: &RetryPolicy,
) -> RetryOutcome {
    let max_attempts = policy.attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let err = match sink.send(records).await {
            Ok(()) => {
                debug!(destination, attempt, records = records.len(), "delivery succeeded");
                return RetryOutcome {
                    attempts: attempt,
                    result: Ok(()),
                };
            }
            Err(e) => e,
        };

        let recovery = policy::recover(Stage::Delivery, &err);
        if recovery != Recovery::Retry || attempt >= max_attempts {
            return RetryOutcome {
                attempts: attempt,
                result: Err(err),
            };
        }

        let delay = policy.delay_for(attempt);
        warn!(
            destination,
            attempt,
            max_attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "delivery attempt failed, retrying"
        );
        metrics::counter!(
            m::ROUTER_DELIVERY_RETRIES_TOTAL,
            m::LABEL_DESTINATION => destination.to_owned()
        )
        .increment(1);
        tokio::time::sleep(delay).await;
    }
}
