//! 라우터 에러 타입
//!
//! [`RouterError`]는 라우팅 엔진 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<RouterError> for LogRouteError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.
//!
//! 대부분의 에러는 엔진 밖으로 나가지 않고 [`policy::recover`](crate::policy::recover)가
//! 가장 가까운 루프에서 처리 방식을 결정합니다.

use logroute_core::error::{ConfigError, LogRouteError, PipelineError};

/// 라우터 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// 규칙 유효성 검증 실패
    #[error("rule validation error: rule '{rule}': {reason}")]
    RuleValidation {
        /// 문제가 된 규칙 이름
        rule: String,
        /// 검증 실패 사유
        reason: String,
    },

    /// 규칙 파일 로딩 실패
    #[error("rule load error: {path}: {reason}")]
    RuleLoad {
        /// 규칙 파일 경로
        path: String,
        /// 로딩 실패 사유
        reason: String,
    },

    /// 조건 평가 실패 (숫자 변환 불가 등)
    #[error("condition error on field '{field}': {reason}")]
    Condition {
        /// 대상 필드 경로
        field: String,
        /// 실패 사유
        reason: String,
    },

    /// 변환 단계 실패
    #[error("transform '{transform}' failed: {reason}")]
    Transform {
        /// 변환 타입 이름
        transform: String,
        /// 실패 사유
        reason: String,
    },

    /// 외부 조회 실패 (GeoIP 등)
    #[error("lookup failed: {0}")]
    Lookup(String),

    /// 암호화 실패
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// 싱크 전송 실패
    #[error("sink '{destination}' failed: {reason}")]
    Sink {
        /// 목적지 식별자
        destination: String,
        /// 실패 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl RouterError {
    /// 변환 에러를 생성합니다.
    pub fn transform(transform: &str, reason: impl Into<String>) -> Self {
        Self::Transform {
            transform: transform.to_owned(),
            reason: reason.into(),
        }
    }

    /// 싱크 에러를 생성합니다.
    pub fn sink(destination: &str, reason: impl Into<String>) -> Self {
        Self::Sink {
            destination: destination.to_owned(),
            reason: reason.into(),
        }
    }
}

impl From<RouterError> for LogRouteError {
    fn from(err: RouterError) -> Self {
        match err {
            RouterError::Config { field, reason } => {
                LogRouteError::Config(ConfigError::InvalidValue { field, reason })
            }
            RouterError::Io(e) => LogRouteError::Io(e),
            err @ (RouterError::RuleLoad { .. } | RouterError::RuleValidation { .. }) => {
                LogRouteError::Pipeline(PipelineError::RuleLoad(err.to_string()))
            }
            err @ RouterError::Sink { .. } => {
                LogRouteError::Pipeline(PipelineError::Delivery(err.to_string()))
            }
            other => LogRouteError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_validation_error_display() {
        let err = RouterError::RuleValidation {
            rule: "auth_failures".to_owned(),
            reason: "destination type must not be empty".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("auth_failures"));
        assert!(msg.contains("destination type"));
    }

    #[test]
    fn sink_error_converts_to_delivery() {
        let err: LogRouteError = RouterError::sink("archive", "connection refused").into();
        assert!(matches!(
            err,
            LogRouteError::Pipeline(PipelineError::Delivery(_))
        ));
        assert!(err.to_string().contains("archive"));
    }

    #[test]
    fn config_error_converts_to_invalid_value() {
        let err: LogRouteError = RouterError::Config {
            field: "max_in_flight".to_owned(),
            reason: "must be greater than 0".to_owned(),
        }
        .into();
        assert!(matches!(
            err,
            LogRouteError::Config(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn rule_load_converts_to_pipeline_rule_load() {
        let err: LogRouteError = RouterError::RuleLoad {
            path: "/etc/logroute/rules/a.yaml".to_owned(),
            reason: "YAML parse error".to_owned(),
        }
        .into();
        assert!(matches!(
            err,
            LogRouteError::Pipeline(PipelineError::RuleLoad(_))
        ));
    }

    #[test]
    fn regex_error_from_conversion() {
        let regex_err = regex::Regex::new("[unclosed").unwrap_err();
        let err = RouterError::from(regex_err);
        assert!(matches!(err, RouterError::Regex(_)));
    }
}
