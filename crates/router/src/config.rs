//! 라우터 설정
//!
//! [`RouterConfig`]는 core의 [`LogRouteConfig`](logroute_core::config::LogRouteConfig)를
//! 기반으로 라우팅 엔진 전용 설정을 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use logroute_core::config::LogRouteConfig;
//! use logroute_router::config::RouterConfig;
//!
//! let core_config = LogRouteConfig::default();
//! let config = RouterConfig::from_core(&core_config);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use logroute_core::config::LogRouteConfig;

use crate::dispatch::RetryPolicy;
use crate::error::RouterError;

/// 라우팅 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// 동시에 처리되는 레코드 태스크 최대 수
    pub max_in_flight: usize,
    /// 배치 조인 타임아웃 (밀리초, 0이면 무제한)
    pub batch_timeout_ms: u64,
    /// 목적지별 최대 전송 시도 횟수
    pub max_retries: u32,
    /// 지수 백오프 계수
    pub backoff_factor: f64,
    /// 백오프 기본 지연 (밀리초)
    pub base_delay_ms: u64,
    /// 백오프 지연 상한 (밀리초)
    pub max_backoff_ms: u64,
    /// 메트릭 리포트 기본 윈도우 (초)
    pub metrics_window_secs: u64,
    /// 메트릭 수집기가 보관할 최대 이벤트 수
    pub metrics_max_events: usize,
    /// 처리 시간 이상치 표준편차 배수
    pub anomaly_stddev: f64,
    /// 규칙별 최소 성공률 (%)
    pub min_success_rate: f64,
    /// GeoIP 캐시 최대 항목 수
    pub geoip_cache_capacity: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 256,
            batch_timeout_ms: 0,
            max_retries: 3,
            backoff_factor: 1.5,
            base_delay_ms: 1_000,
            max_backoff_ms: 30_000,
            metrics_window_secs: 3_600,
            metrics_max_events: 100_000,
            anomaly_stddev: 3.0,
            min_success_rate: 95.0,
            geoip_cache_capacity: 10_000,
        }
    }
}

impl RouterConfig {
    /// core 설정에서 라우터 설정을 생성합니다.
    pub fn from_core(core: &LogRouteConfig) -> Self {
        Self {
            max_in_flight: core.router.max_in_flight,
            batch_timeout_ms: core.router.batch_timeout_ms,
            max_retries: core.dispatch.max_retries,
            backoff_factor: core.dispatch.backoff_factor,
            base_delay_ms: core.dispatch.base_delay_ms,
            max_backoff_ms: core.dispatch.max_backoff_ms,
            metrics_window_secs: core.metrics.window_secs,
            metrics_max_events: core.metrics.max_events,
            anomaly_stddev: core.metrics.anomaly_stddev,
            min_success_rate: core.metrics.min_success_rate,
            geoip_cache_capacity: core.enrichment.geoip_cache_capacity,
        }
    }

    /// 배치 타임아웃. 0이면 `None`입니다.
    pub fn batch_timeout(&self) -> Option<Duration> {
        (self.batch_timeout_ms > 0).then(|| Duration::from_millis(self.batch_timeout_ms))
    }

    /// 메트릭 리포트 기본 윈도우
    pub fn metrics_window(&self) -> Duration {
        Duration::from_secs(self.metrics_window_secs)
    }

    /// 전송 재시도 정책
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            backoff_factor: self.backoff_factor,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_backoff_ms),
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), RouterError> {
        const MAX_IN_FLIGHT: usize = 65_536;

        if self.max_in_flight == 0 || self.max_in_flight > MAX_IN_FLIGHT {
            return Err(config_err(
                "max_in_flight",
                format!("must be 1-{MAX_IN_FLIGHT}"),
            ));
        }

        if self.max_retries == 0 {
            return Err(config_err("max_retries", "must be greater than 0"));
        }

        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(config_err("backoff_factor", "must be a finite number >= 1.0"));
        }

        if self.max_backoff_ms < self.base_delay_ms {
            return Err(config_err(
                "max_backoff_ms",
                "must not be smaller than base_delay_ms",
            ));
        }

        if self.metrics_window_secs == 0 {
            return Err(config_err("metrics_window_secs", "must be greater than 0"));
        }

        if self.metrics_max_events == 0 {
            return Err(config_err("metrics_max_events", "must be greater than 0"));
        }

        if !self.anomaly_stddev.is_finite() || self.anomaly_stddev <= 0.0 {
            return Err(config_err("anomaly_stddev", "must be a positive number"));
        }

        if !(0.0..=100.0).contains(&self.min_success_rate) {
            return Err(config_err("min_success_rate", "must be within 0-100"));
        }

        if self.geoip_cache_capacity == 0 {
            return Err(config_err("geoip_cache_capacity", "must be greater than 0"));
        }

        Ok(())
    }
}

fn config_err(field: &str, reason: impl Into<String>) -> RouterError {
    RouterError::Config {
        field: field.to_owned(),
        reason: reason.into(),
    }
}

/// 라우터 설정 빌더
#[derive(Default)]
pub struct RouterConfigBuilder {
    config: RouterConfig,
}

impl RouterConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 동시 레코드 태스크 수를 설정합니다.
    pub fn max_in_flight(mut self, max: usize) -> Self {
        self.config.max_in_flight = max;
        self
    }

    /// 배치 타임아웃을 설정합니다.
    pub fn batch_timeout(mut self, timeout: Duration) -> Self {
        self.config.batch_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// 최대 전송 시도 횟수를 설정합니다.
    pub fn max_retries(mut self, attempts: u32) -> Self {
        self.config.max_retries = attempts;
        self
    }

    /// 백오프 계수를 설정합니다.
    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.config.backoff_factor = factor;
        self
    }

    /// 백오프 기본 지연을 설정합니다.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.base_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// 백오프 지연 상한을 설정합니다.
    pub fn max_backoff(mut self, delay: Duration) -> Self {
        self.config.max_backoff_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// 메트릭 보관 이벤트 수를 설정합니다.
    pub fn metrics_max_events(mut self, max: usize) -> Self {
        self.config.metrics_max_events = max;
        self
    }

    /// GeoIP 캐시 용량을 설정합니다.
    pub fn geoip_cache_capacity(mut self, capacity: u64) -> Self {
        self.config.geoip_cache_capacity = capacity;
        self
    }

    /// 설정을 검증하고 `RouterConfig`를 생성합니다.
    pub fn build(self) -> Result<RouterConfig, RouterError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
