//! 조건 평가기 -- 레코드 필드에 대한 단일 조건 평가
//!
//! [`Condition`]은 규칙 파일에서 역직렬화되는 원본 조건이고,
//! [`CompiledCondition`]은 정규식을 미리 컴파일한 평가용 형태입니다.
//!
//! 필드가 없으면 `not_exists`만 참이 될 수 있고 나머지 연산자는 거짓입니다.
//! 알 수 없는 연산자는 로딩 시 경고를 남기고 평가 시 항상 거짓입니다.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use logroute_core::record::{self, Record};

use crate::error::RouterError;
use crate::policy::{self, Stage};

/// 조건 연산자
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operator {
    /// 필드 존재
    Exists,
    /// 필드 부재
    NotExists,
    /// 값 일치
    Equals,
    /// 값 불일치 (필드는 존재해야 함)
    NotEquals,
    /// 부분 문자열 또는 배열 원소 포함
    Contains,
    /// 접두사 일치
    StartsWith,
    /// 접미사 일치
    EndsWith,
    /// 정규식 매칭
    MatchesRegex,
    /// 숫자 초과
    GreaterThan,
    /// 숫자 미만
    LessThan,
    /// 값 목록 중 하나와 일치
    In,
    /// 알 수 없는 연산자 (평가 시 항상 거짓)
    Unknown(String),
}

impl From<String> for Operator {
    fn from(s: String) -> Self {
        match s.as_str() {
            "exists" => Self::Exists,
            "not_exists" => Self::NotExists,
            "equals" | "eq" => Self::Equals,
            "not_equals" | "ne" => Self::NotEquals,
            "contains" => Self::Contains,
            "starts_with" => Self::StartsWith,
            "ends_with" => Self::EndsWith,
            "matches_regex" | "regex" => Self::MatchesRegex,
            "greater_than" | "gt" => Self::GreaterThan,
            "less_than" | "lt" => Self::LessThan,
            "in" => Self::In,
            _ => Self::Unknown(s),
        }
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        op.to_string()
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Exists => "exists",
            Self::NotExists => "not_exists",
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::MatchesRegex => "matches_regex",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
            Self::In => "in",
            Self::Unknown(name) => name.as_str(),
        };
        f.write_str(s)
    }
}

impl Operator {
    /// 비교 값이 필요한 연산자인지 여부
    fn needs_value(&self) -> bool {
        !matches!(self, Self::Exists | Self::NotExists | Self::Unknown(_))
    }
}

/// 필드 조건
///
/// ```yaml
/// field: user.role
/// operator: in
/// value: [admin, root]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// 점(`.`) 구분 필드 경로
    pub field: String,
    /// 연산자
    pub operator: Operator,
    /// 비교 값
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// 평가 준비가 끝난 조건
#[derive(Debug, Clone)]
pub struct CompiledCondition {
    condition: Condition,
    regex: Option<Regex>,
}

impl CompiledCondition {
    /// 조건을 검증하고 정규식을 컴파일합니다.
    ///
    /// 비교 값 누락, 잘못된 정규식, 배열이 아닌 `in` 값은 에러입니다.
    /// 알 수 없는 연산자는 경고만 남기고 통과합니다.
    pub fn compile(condition: Condition) -> Result<Self, RouterError> {
        if condition.field.is_empty() {
            return Err(RouterError::Condition {
                field: "(empty)".to_owned(),
                reason: "condition field must not be empty".to_owned(),
            });
        }

        if let Operator::Unknown(name) = &condition.operator {
            warn!(
                field = %condition.field,
                operator = %name,
                "unknown condition operator, condition will never match"
            );
        }

        if condition.operator.needs_value() && condition.value.is_none() {
            return Err(RouterError::Condition {
                field: condition.field.clone(),
                reason: format!("operator '{}' requires a value", condition.operator),
            });
        }

        let regex = match (&condition.operator, &condition.value) {
            (Operator::MatchesRegex, Some(pattern)) => {
                let pattern = pattern.as_str().ok_or_else(|| RouterError::Condition {
                    field: condition.field.clone(),
                    reason: "regex pattern must be a string".to_owned(),
                })?;
                Some(Regex::new(pattern)?)
            }
            (Operator::In, Some(list)) if !list.is_array() => {
                return Err(RouterError::Condition {
                    field: condition.field.clone(),
                    reason: "operator 'in' requires a list value".to_owned(),
                });
            }
            _ => None,
        };

        Ok(Self { condition, regex })
    }

    /// 원본 조건
    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    /// 레코드에 대해 조건을 평가합니다.
    ///
    /// 숫자 비교에서 값을 숫자로 바꿀 수 없으면 에러를 반환합니다.
    pub fn try_evaluate(&self, record: &Record) -> Result<bool, RouterError> {
        let actual = record::get_path(record, &self.condition.field);
        let expected = self.condition.value.as_ref();

        let Some(actual) = actual else {
            return Ok(self.condition.operator == Operator::NotExists);
        };

        match &self.condition.operator {
            Operator::Exists => Ok(true),
            Operator::NotExists => Ok(false),
            Operator::Equals => Ok(expected.is_some_and(|e| values_equal(actual, e))),
            Operator::NotEquals => Ok(expected.is_some_and(|e| !values_equal(actual, e))),
            Operator::Contains => Ok(expected.is_some_and(|e| contains(actual, e))),
            Operator::StartsWith => Ok(expected.is_some_and(|e| {
                record::value_to_string(actual).starts_with(&record::value_to_string(e))
            })),
            Operator::EndsWith => Ok(expected.is_some_and(|e| {
                record::value_to_string(actual).ends_with(&record::value_to_string(e))
            })),
            Operator::MatchesRegex => Ok(self
                .regex
                .as_ref()
                .is_some_and(|re| re.is_match(&record::value_to_string(actual)))),
            Operator::GreaterThan => {
                let (a, e) = self.numeric_pair(actual, expected)?;
                Ok(a > e)
            }
            Operator::LessThan => {
                let (a, e) = self.numeric_pair(actual, expected)?;
                Ok(a < e)
            }
            Operator::In => Ok(expected
                .and_then(Value::as_array)
                .is_some_and(|list| list.iter().any(|e| values_equal(actual, e)))),
            Operator::Unknown(name) => {
                debug!(operator = %name, "unknown operator evaluated as false");
                Ok(false)
            }
        }
    }

    fn numeric_pair(&self, actual: &Value, expected: Option<&Value>) -> Result<(f64, f64), RouterError> {
        let err = |what: &str| RouterError::Condition {
            field: self.condition.field.clone(),
            reason: format!("{what} is not numeric for operator '{}'", self.condition.operator),
        };
        let a = as_number(actual).ok_or_else(|| err("field value"))?;
        let e = expected.and_then(as_number).ok_or_else(|| err("condition value"))?;
        Ok((a, e))
    }
}

/// 단일 조건을 평가합니다.
///
/// 평가 에러는 복구 정책에 따라 거짓으로 처리되며 호출자에게 전파되지 않습니다.
pub fn evaluate(record: &Record, condition: &CompiledCondition) -> bool {
    match condition.try_evaluate(record) {
        Ok(matched) => matched,
        Err(e) => {
            let recovery = policy::recover(Stage::Condition, &e);
            debug!(
                field = %condition.condition.field,
                error = %e,
                ?recovery,
                "condition evaluation failed, treating as false"
            );
            false
        }
    }
}

/// 조건 목록을 AND로 결합해 평가합니다. 첫 거짓에서 멈춥니다.
pub fn evaluate_all(record: &Record, conditions: &[CompiledCondition]) -> Result<bool, RouterError> {
    for condition in conditions {
        if !condition.try_evaluate(record)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// 숫자는 값으로, 그 외는 JSON 동등성으로 비교합니다.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn contains(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::Array(items) => items.iter().any(|item| values_equal(item, expected)),
        other => record::value_to_string(other).contains(&record::value_to_string(expected)),
    }
}

/// 숫자 또는 숫자 문자열을 f64로 변환합니다.
pub(crate) fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> Record {
        json!({
            "level": "error",
            "latency_ms": 250,
            "status": "503",
            "message": "upstream timeout after 30s",
            "tags": ["edge", "prod"],
            "user": { "role": "admin", "ssn": "123-45-6789" }
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    fn cond(field: &str, op: &str, value: Option<Value>) -> CompiledCondition {
        CompiledCondition::compile(Condition {
            field: field.to_owned(),
            operator: Operator::from(op.to_owned()),
            value,
        })
        .unwrap()
    }

    #[test]
    fn exists_and_not_exists() {
        let r = record();
        assert!(evaluate(&r, &cond("user.ssn", "exists", None)));
        assert!(!evaluate(&r, &cond("user.email", "exists", None)));
        assert!(evaluate(&r, &cond("user.email", "not_exists", None)));
        assert!(!evaluate(&r, &cond("level", "not_exists", None)));
    }

    #[test]
    fn absent_field_only_matches_not_exists() {
        let r = record();
        for op in ["equals", "not_equals", "contains", "starts_with", "in"] {
            let value = if op == "in" { json!(["x"]) } else { json!("x") };
            assert!(!evaluate(&r, &cond("missing.path", op, Some(value))), "{op}");
        }
    }

    #[test]
    fn equals_compares_numbers_by_value() {
        let r = record();
        assert!(evaluate(&r, &cond("latency_ms", "equals", Some(json!(250.0)))));
        assert!(evaluate(&r, &cond("level", "equals", Some(json!("error")))));
        assert!(!evaluate(&r, &cond("level", "equals", Some(json!("warn")))));
        assert!(evaluate(&r, &cond("level", "not_equals", Some(json!("warn")))));
    }

    #[test]
    fn contains_on_strings_and_arrays() {
        let r = record();
        assert!(evaluate(&r, &cond("message", "contains", Some(json!("timeout")))));
        assert!(evaluate(&r, &cond("tags", "contains", Some(json!("prod")))));
        assert!(!evaluate(&r, &cond("tags", "contains", Some(json!("dev")))));
    }

    #[test]
    fn prefix_and_suffix() {
        let r = record();
        assert!(evaluate(&r, &cond("message", "starts_with", Some(json!("upstream")))));
        assert!(evaluate(&r, &cond("message", "ends_with", Some(json!("30s")))));
    }

    #[test]
    fn regex_match() {
        let r = record();
        assert!(evaluate(&r, &cond("user.ssn", "matches_regex", Some(json!(r"^\d{3}-\d{2}-\d{4}$")))));
        assert!(!evaluate(&r, &cond("level", "regex", Some(json!("^warn")))));
    }

    #[test]
    fn numeric_comparisons_coerce_numeric_strings() {
        let r = record();
        assert!(evaluate(&r, &cond("latency_ms", "greater_than", Some(json!(100)))));
        assert!(evaluate(&r, &cond("status", "greater_than", Some(json!(499)))));
        assert!(evaluate(&r, &cond("latency_ms", "less_than", Some(json!("300")))));
    }

    #[test]
    fn non_numeric_comparison_is_an_error_but_evaluates_false() {
        let r = record();
        let c = cond("level", "greater_than", Some(json!(1)));
        assert!(c.try_evaluate(&r).is_err());
        assert!(!evaluate(&r, &c));
    }

    #[test]
    fn in_operator() {
        let r = record();
        assert!(evaluate(&r, &cond("user.role", "in", Some(json!(["admin", "root"])))));
        assert!(!evaluate(&r, &cond("user.role", "in", Some(json!(["guest"])))));
    }

    #[test]
    fn unknown_operator_fails_closed() {
        let r = record();
        let c = cond("level", "fuzzy_match", Some(json!("err")));
        assert!(matches!(c.condition().operator, Operator::Unknown(_)));
        assert!(!evaluate(&r, &c));
    }

    #[test]
    fn compile_rejects_invalid_definitions() {
        let missing_value = Condition {
            field: "level".to_owned(),
            operator: Operator::Equals,
            value: None,
        };
        assert!(CompiledCondition::compile(missing_value).is_err());

        let bad_regex = Condition {
            field: "level".to_owned(),
            operator: Operator::MatchesRegex,
            value: Some(json!("[unclosed")),
        };
        assert!(matches!(
            CompiledCondition::compile(bad_regex),
            Err(RouterError::Regex(_))
        ));

        let in_scalar = Condition {
            field: "level".to_owned(),
            operator: Operator::In,
            value: Some(json!("error")),
        };
        assert!(CompiledCondition::compile(in_scalar).is_err());
    }

    #[test]
    fn evaluate_all_short_circuits() {
        let r = record();
        let conditions = vec![
            cond("level", "equals", Some(json!("warn"))),
            // 평가되면 에러가 나는 조건
            cond("level", "greater_than", Some(json!(1))),
        ];
        assert!(!evaluate_all(&r, &conditions).unwrap());
    }

    #[test]
    fn empty_condition_list_matches_everything() {
        assert!(evaluate_all(&record(), &[]).unwrap());
    }

    #[test]
    fn operator_deserializes_from_string() {
        let c: Condition =
            serde_json::from_value(json!({"field": "a", "operator": "exists"})).unwrap();
        assert_eq!(c.operator, Operator::Exists);
        let c: Condition =
            serde_json::from_value(json!({"field": "a", "operator": "sounds_like", "value": 1}))
                .unwrap();
        assert_eq!(c.operator, Operator::Unknown("sounds_like".to_owned()));
    }
}
