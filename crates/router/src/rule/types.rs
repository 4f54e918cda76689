//! 라우팅 규칙 데이터 타입
//!
//! 규칙 파일(YAML/JSON)에서 역직렬화되는 구조체들과
//! 규칙별 처리 카운터를 정의합니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::condition::{CompiledCondition, Condition};
use crate::error::RouterError;

/// 규칙 이름 최대 길이
const MAX_RULE_NAME_LEN: usize = 256;

/// 라우팅 규칙
///
/// # YAML 스키마
/// ```yaml
/// name: payment_errors
/// priority: 10
/// enabled: true
/// conditions:
///   - field: service
///     operator: equals
///     value: payments
/// transformations:
///   - type: mask
///     field: card.number
///     pattern: '\d{12}'
/// destination:
///   type: pci_archive
///   bucket: payments-logs
/// metadata:
///   compliance: pci-dss
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRule {
    /// 규칙 고유 이름
    pub name: String,
    /// 조건 목록 (AND 결합)
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// 변환 단계 목록 (선언 순서대로 적용)
    #[serde(default)]
    pub transformations: Vec<TransformStep>,
    /// 목적지
    pub destination: Destination,
    /// 우선순위 (낮을수록 먼저 평가)
    #[serde(default)]
    pub priority: i64,
    /// 활성화 여부
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 부가 메타데이터 (compliance, classification 등)
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

fn default_enabled() -> bool {
    true
}

impl RoutingRule {
    /// 규칙의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), RouterError> {
        if self.name.is_empty() {
            return Err(RouterError::RuleValidation {
                rule: "(empty)".to_owned(),
                reason: "rule name must not be empty".to_owned(),
            });
        }

        if self.name.len() > MAX_RULE_NAME_LEN {
            return Err(RouterError::RuleValidation {
                rule: self.name.clone(),
                reason: format!("rule name must not exceed {MAX_RULE_NAME_LEN} characters"),
            });
        }

        if self.destination.kind.is_empty() {
            return Err(RouterError::RuleValidation {
                rule: self.name.clone(),
                reason: "destination type must not be empty".to_owned(),
            });
        }

        if let Some(idx) = self.transformations.iter().position(|t| t.kind.is_empty()) {
            return Err(RouterError::RuleValidation {
                rule: self.name.clone(),
                reason: format!("transformations[{idx}] has an empty type"),
            });
        }

        Ok(())
    }

    /// 목적지 식별자
    pub fn destination_id(&self) -> &str {
        &self.destination.kind
    }
}

/// 변환 단계 -- `type` 키와 타입별 파라미터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformStep {
    /// 레지스트리 키
    #[serde(rename = "type")]
    pub kind: String,
    /// 타입별 파라미터
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl TransformStep {
    /// 파라미터 없이 단계를 생성합니다.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: Map::new(),
        }
    }

    /// 파라미터를 추가합니다.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_owned(), value.into());
        self
    }

    /// 파라미터를 타입이 있는 구조체로 역직렬화합니다.
    pub fn params<T: DeserializeOwned>(&self) -> Result<T, RouterError> {
        serde_json::from_value(Value::Object(self.params.clone()))
            .map_err(|e| RouterError::transform(&self.kind, format!("invalid parameters: {e}")))
    }
}

/// 목적지 -- `type` 키가 식별자이며 나머지는 싱크 전용 파라미터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    /// 목적지 식별자
    #[serde(rename = "type")]
    pub kind: String,
    /// 싱크 전용 파라미터
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl Destination {
    /// 파라미터 없는 목적지를 생성합니다.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: Map::new(),
        }
    }
}

/// 규칙별 처리 카운터
///
/// 동시에 실행되는 레코드 태스크들이 원자적으로 갱신합니다.
#[derive(Debug, Default)]
pub struct RulePerformance {
    processed: AtomicU64,
    errors: AtomicU64,
    /// 마지막 처리 시각 (유닉스 밀리초, 0이면 없음)
    last_processed_ms: AtomicI64,
}

impl RulePerformance {
    /// 처리 1건을 기록합니다.
    pub fn record_processed(&self, at: DateTime<Utc>) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.last_processed_ms
            .fetch_max(at.timestamp_millis(), Ordering::Relaxed);
    }

    /// 에러 1건을 기록합니다.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// 현재 값을 복사합니다.
    pub fn snapshot(&self) -> RulePerformanceSnapshot {
        let last = self.last_processed_ms.load(Ordering::Relaxed);
        RulePerformanceSnapshot {
            processed_logs: self.processed.load(Ordering::Relaxed),
            error_count: self.errors.load(Ordering::Relaxed),
            last_processed: (last > 0)
                .then(|| DateTime::from_timestamp_millis(last))
                .flatten(),
        }
    }
}

/// 규칙별 처리 카운터 스냅샷
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RulePerformanceSnapshot {
    /// 처리한 레코드 수
    pub processed_logs: u64,
    /// 처리 중 에러 수
    pub error_count: u64,
    /// 마지막 처리 시각
    pub last_processed: Option<DateTime<Utc>>,
}

/// 조건이 컴파일된 규칙
///
/// 규칙 본문은 변환 컨텍스트와 공유되므로 `Arc`로 보관합니다.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    rule: Arc<RoutingRule>,
    conditions: Vec<CompiledCondition>,
    performance: Arc<RulePerformance>,
}

impl CompiledRule {
    /// 규칙을 검증하고 조건을 컴파일합니다.
    pub fn compile(rule: RoutingRule) -> Result<Self, RouterError> {
        rule.validate()?;

        let conditions = rule
            .conditions
            .iter()
            .enumerate()
            .map(|(idx, c)| {
                CompiledCondition::compile(c.clone()).map_err(|e| RouterError::RuleValidation {
                    rule: rule.name.clone(),
                    reason: format!("invalid condition[{idx}]: {e}"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            rule: Arc::new(rule),
            conditions,
            performance: Arc::new(RulePerformance::default()),
        })
    }

    /// 규칙 본문
    pub fn rule(&self) -> &Arc<RoutingRule> {
        &self.rule
    }

    /// 규칙 이름
    pub fn name(&self) -> &str {
        &self.rule.name
    }

    /// 컴파일된 조건 목록
    pub fn conditions(&self) -> &[CompiledCondition] {
        &self.conditions
    }

    /// 처리 카운터
    pub fn performance(&self) -> &Arc<RulePerformance> {
        &self.performance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule_json() -> Value {
        json!({
            "name": "auth",
            "conditions": [{"field": "event", "operator": "equals", "value": "login"}],
            "transformations": [{"type": "mask", "field": "password", "mask_char": "#"}],
            "destination": {"type": "security", "index": "auth-logs"},
            "priority": 5,
            "metadata": {"classification": "confidential"}
        })
    }

    #[test]
    fn deserialize_full_rule() {
        let rule: RoutingRule = serde_json::from_value(rule_json()).unwrap();
        assert_eq!(rule.name, "auth");
        assert!(rule.enabled);
        assert_eq!(rule.priority, 5);
        assert_eq!(rule.destination_id(), "security");
        assert_eq!(rule.destination.params["index"], json!("auth-logs"));
        assert_eq!(rule.transformations[0].kind, "mask");
        assert_eq!(rule.transformations[0].params["mask_char"], json!("#"));
    }

    #[test]
    fn defaults_apply_for_optional_fields() {
        let rule: RoutingRule =
            serde_json::from_value(json!({"name": "x", "destination": {"type": "d"}})).unwrap();
        assert!(rule.enabled);
        assert_eq!(rule.priority, 0);
        assert!(rule.conditions.is_empty());
        assert!(rule.metadata.is_empty());
    }

    #[test]
    fn validate_rejects_empty_name_and_destination() {
        let mut rule: RoutingRule = serde_json::from_value(rule_json()).unwrap();
        rule.name.clear();
        assert!(rule.validate().is_err());

        let mut rule: RoutingRule = serde_json::from_value(rule_json()).unwrap();
        rule.destination.kind.clear();
        assert!(rule.validate().is_err());
    }

    #[test]
    fn validate_rejects_long_name() {
        let mut rule: RoutingRule = serde_json::from_value(rule_json()).unwrap();
        rule.name = "r".repeat(MAX_RULE_NAME_LEN + 1);
        assert!(rule.validate().is_err());
    }

    #[test]
    fn compile_rejects_bad_condition() {
        let mut rule: RoutingRule = serde_json::from_value(rule_json()).unwrap();
        rule.conditions[0].value = None;
        let err = CompiledRule::compile(rule).unwrap_err();
        assert!(err.to_string().contains("condition[0]"));
    }

    #[test]
    fn step_params_deserialize_into_struct() {
        #[derive(Deserialize)]
        struct P {
            field: String,
        }
        let step = TransformStep::new("mask").with("field", "a.b");
        let p: P = step.params().unwrap();
        assert_eq!(p.field, "a.b");

        let bad = TransformStep::new("mask");
        assert!(bad.params::<P>().is_err());
    }

    #[test]
    fn performance_counters() {
        let perf = RulePerformance::default();
        assert_eq!(perf.snapshot().last_processed, None);
        let now = Utc::now();
        perf.record_processed(now);
        perf.record_processed(now);
        perf.record_error();
        let snap = perf.snapshot();
        assert_eq!(snap.processed_logs, 2);
        assert_eq!(snap.error_count, 1);
        assert_eq!(
            snap.last_processed.map(|t| t.timestamp_millis()),
            Some(now.timestamp_millis())
        );
    }
}
