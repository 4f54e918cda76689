//! `value_map` -- 조회 테이블로 필드 값을 치환합니다.

use std::future::Future;

use serde::Deserialize;
use serde_json::{Map, Value};

use logroute_core::record::{self, Record};

use super::{TransformContext, Transformer};
use crate::error::RouterError;
use crate::rule::TransformStep;

#[derive(Deserialize)]
struct Params {
    field: String,
    mapping: Map<String, Value>,
    #[serde(default)]
    default: Option<Value>,
}

/// 값 치환
///
/// 현재 값의 문자열 표현을 키로 `mapping`을 조회합니다. 없으면 `default`를 쓰고,
/// `default`도 없으면 값을 그대로 둡니다.
pub struct ValueMap;

impl ValueMap {
    fn map_value(mut record: Record, step: &TransformStep) -> Result<Record, RouterError> {
        let params: Params = step.params()?;
        let Some(current) = record::get_path(&record, &params.field) else {
            return Ok(record);
        };

        let key = record::value_to_string(current);
        let replacement = params.mapping.get(&key).cloned().or(params.default);
        if let Some(replacement) = replacement {
            record::set_path(&mut record, &params.field, replacement);
        }
        Ok(record)
    }
}

impl Transformer for ValueMap {
    fn name(&self) -> &str {
        "value_map"
    }

    fn apply(
        &self,
        record: Record,
        step: &TransformStep,
        _ctx: &mut TransformContext,
    ) -> impl Future<Output = Result<Record, RouterError>> + Send {
        std::future::ready(Self::map_value(record, step))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step() -> TransformStep {
        TransformStep::new("value_map")
            .with("field", "level")
            .with("mapping", json!({"3": "error", "4": "warning", "E": "error"}))
    }

    fn run(record: Value, step: &TransformStep) -> Record {
        ValueMap::map_value(record.as_object().cloned().unwrap(), step).unwrap()
    }

    #[test]
    fn maps_numeric_and_string_keys() {
        assert_eq!(run(json!({"level": 3}), &step())["level"], json!("error"));
        assert_eq!(run(json!({"level": "E"}), &step())["level"], json!("error"));
    }

    #[test]
    fn unmapped_value_is_kept_without_default() {
        assert_eq!(run(json!({"level": 7}), &step())["level"], json!(7));
    }

    #[test]
    fn unmapped_value_uses_default() {
        let s = step().with("default", "unknown");
        assert_eq!(run(json!({"level": 7}), &s)["level"], json!("unknown"));
    }

    #[test]
    fn absent_field_is_noop() {
        let s = step().with("default", "unknown");
        assert!(run(json!({}), &s).get("level").is_none());
    }
}
