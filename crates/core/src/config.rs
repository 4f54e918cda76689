//! 설정 관리 -- logroute.toml 파싱 및 런타임 설정
//!
//! [`LogRouteConfig`]는 라우팅 엔진과 CLI가 공유하는 최상위 설정 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`LOGROUTE_DISPATCH_MAX_RETRIES=5` 형식)
//! 3. 설정 파일 (`logroute.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), logroute_core::error::LogRouteError> {
//! use logroute_core::config::LogRouteConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = LogRouteConfig::load("logroute.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = LogRouteConfig::parse("[dispatch]\nmax_retries = 5")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, LogRouteError};

/// logroute 통합 설정
///
/// `logroute.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogRouteConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 라우팅 엔진 설정
    #[serde(default)]
    pub router: RouterSection,
    /// 목적지 전송 설정
    #[serde(default)]
    pub dispatch: DispatchSection,
    /// 메트릭 수집 설정
    #[serde(default)]
    pub metrics: MetricsSection,
    /// 보강(enrichment) 변환 설정
    #[serde(default)]
    pub enrichment: EnrichmentSection,
}

impl LogRouteConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LogRouteError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, LogRouteError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LogRouteError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                LogRouteError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, LogRouteError> {
        toml::from_str(toml_str).map_err(|e| {
            LogRouteError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `LOGROUTE_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LOGROUTE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LOGROUTE_GENERAL_LOG_FORMAT");

        // Router
        override_string(&mut self.router.rules_path, "LOGROUTE_ROUTER_RULES_PATH");
        override_usize(
            &mut self.router.max_in_flight,
            "LOGROUTE_ROUTER_MAX_IN_FLIGHT",
        );
        override_u64(
            &mut self.router.batch_timeout_ms,
            "LOGROUTE_ROUTER_BATCH_TIMEOUT_MS",
        );

        // Dispatch
        override_u32(
            &mut self.dispatch.max_retries,
            "LOGROUTE_DISPATCH_MAX_RETRIES",
        );
        override_f64(
            &mut self.dispatch.backoff_factor,
            "LOGROUTE_DISPATCH_BACKOFF_FACTOR",
        );
        override_u64(
            &mut self.dispatch.base_delay_ms,
            "LOGROUTE_DISPATCH_BASE_DELAY_MS",
        );
        override_u64(
            &mut self.dispatch.max_backoff_ms,
            "LOGROUTE_DISPATCH_MAX_BACKOFF_MS",
        );

        // Metrics
        override_u64(&mut self.metrics.window_secs, "LOGROUTE_METRICS_WINDOW_SECS");
        override_usize(&mut self.metrics.max_events, "LOGROUTE_METRICS_MAX_EVENTS");
        override_f64(
            &mut self.metrics.anomaly_stddev,
            "LOGROUTE_METRICS_ANOMALY_STDDEV",
        );
        override_f64(
            &mut self.metrics.min_success_rate,
            "LOGROUTE_METRICS_MIN_SUCCESS_RATE",
        );

        // Enrichment
        override_u64(
            &mut self.enrichment.geoip_cache_capacity,
            "LOGROUTE_ENRICHMENT_GEOIP_CACHE_CAPACITY",
        );
        override_string(
            &mut self.enrichment.encryption_key_env,
            "LOGROUTE_ENRICHMENT_ENCRYPTION_KEY_ENV",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogRouteError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.router.max_in_flight == 0 {
            return Err(invalid("router.max_in_flight", "must be greater than 0"));
        }

        if self.dispatch.max_retries == 0 {
            return Err(invalid("dispatch.max_retries", "must be greater than 0"));
        }

        if !self.dispatch.backoff_factor.is_finite() || self.dispatch.backoff_factor < 1.0 {
            return Err(invalid(
                "dispatch.backoff_factor",
                "must be a finite number >= 1.0",
            ));
        }

        if self.dispatch.max_backoff_ms < self.dispatch.base_delay_ms {
            return Err(invalid(
                "dispatch.max_backoff_ms",
                "must not be smaller than dispatch.base_delay_ms",
            ));
        }

        if self.metrics.window_secs == 0 {
            return Err(invalid("metrics.window_secs", "must be greater than 0"));
        }

        if self.metrics.max_events == 0 {
            return Err(invalid("metrics.max_events", "must be greater than 0"));
        }

        if !self.metrics.anomaly_stddev.is_finite() || self.metrics.anomaly_stddev <= 0.0 {
            return Err(invalid(
                "metrics.anomaly_stddev",
                "must be a positive number",
            ));
        }

        if !(0.0..=100.0).contains(&self.metrics.min_success_rate) {
            return Err(invalid("metrics.min_success_rate", "must be within 0-100"));
        }

        if self.enrichment.geoip_cache_capacity == 0 {
            return Err(invalid(
                "enrichment.geoip_cache_capacity",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> LogRouteError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 라우팅 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSection {
    /// 규칙 파일 또는 디렉토리 경로
    pub rules_path: String,
    /// 동시에 처리되는 레코드 태스크 최대 수
    pub max_in_flight: usize,
    /// 배치 조인 타임아웃 (밀리초, 0이면 무제한)
    pub batch_timeout_ms: u64,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            rules_path: "/etc/logroute/rules".to_owned(),
            max_in_flight: 256,
            batch_timeout_ms: 0,
        }
    }
}

/// 목적지 전송 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSection {
    /// 목적지별 최대 전송 시도 횟수
    pub max_retries: u32,
    /// 지수 백오프 계수
    pub backoff_factor: f64,
    /// 백오프 기본 지연 (밀리초)
    pub base_delay_ms: u64,
    /// 백오프 지연 상한 (밀리초)
    pub max_backoff_ms: u64,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_factor: 1.5,
            base_delay_ms: 1_000,
            max_backoff_ms: 30_000,
        }
    }
}

/// 메트릭 수집 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSection {
    /// 리포트 기본 윈도우 (초)
    pub window_secs: u64,
    /// 보관할 최대 이벤트 수
    pub max_events: usize,
    /// 처리 시간 이상치 판정 표준편차 배수
    pub anomaly_stddev: f64,
    /// 규칙별 최소 성공률 (%)
    pub min_success_rate: f64,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            window_secs: 3_600,
            max_events: 100_000,
            anomaly_stddev: 3.0,
            min_success_rate: 95.0,
        }
    }
}

/// 보강 변환 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentSection {
    /// GeoIP 조회 캐시 최대 항목 수
    pub geoip_cache_capacity: u64,
    /// 암호화 키(base64, 32바이트)를 담은 환경변수 이름
    pub encryption_key_env: String,
}

impl Default for EnrichmentSection {
    fn default() -> Self {
        Self {
            geoip_cache_capacity: 10_000,
            encryption_key_env: "LOGROUTE_ENCRYPTION_KEY".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_f64(target: &mut f64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<f64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse f64 from env var, ignoring"
            ),
        }
    }
}
