//! `extract` -- 정규식으로 원본 필드에서 값을 뽑아 대상 필드에 기록합니다.

use std::future::Future;

use regex::{Captures, Regex};
use serde::Deserialize;
use serde_json::Value;

use logroute_core::record::{self, Record};

use super::{RegexCache, TransformContext, Transformer};
use crate::error::RouterError;
use crate::rule::TransformStep;

#[derive(Deserialize)]
struct Params {
    #[serde(alias = "field", alias = "source")]
    source_field: String,
    pattern: String,
    #[serde(alias = "target")]
    target_field: String,
    #[serde(default)]
    all: bool,
}

/// 정규식 추출
///
/// 캡처 그룹이 있으면 첫 번째 그룹을, 없으면 매칭 전체를 사용합니다.
/// 단일 모드는 첫 매칭 하나를 문자열로, `all` 모드는 모든 매칭을 목록으로 기록합니다.
/// 매칭이 없으면 대상 필드를 건드리지 않습니다.
pub struct Extract {
    regexes: RegexCache,
    force_all: bool,
}

impl Extract {
    /// 단계의 `all` 플래그를 따르는 추출기를 생성합니다.
    pub fn new(regexes: RegexCache) -> Self {
        Self {
            regexes,
            force_all: false,
        }
    }

    /// 항상 모든 매칭을 추출하는 추출기를 생성합니다.
    pub fn all(regexes: RegexCache) -> Self {
        Self {
            regexes,
            force_all: true,
        }
    }

    fn extract(&self, mut record: Record, step: &TransformStep) -> Result<Record, RouterError> {
        let params: Params = step.params()?;
        let Some(value) = record::get_path(&record, &params.source_field) else {
            return Ok(record);
        };
        let text = record::value_to_string(value);
        let regex = self.regexes.get(&params.pattern)?;

        let extracted = if self.force_all || params.all {
            let matches: Vec<Value> = regex
                .captures_iter(&text)
                .map(|caps| Value::String(pick(&regex, &caps)))
                .collect();
            (!matches.is_empty()).then_some(Value::Array(matches))
        } else {
            regex
                .captures(&text)
                .map(|caps| Value::String(pick(&regex, &caps)))
        };

        if let Some(extracted) = extracted {
            record::set_path(&mut record, &params.target_field, extracted);
        }
        Ok(record)
    }
}

fn pick(regex: &Regex, caps: &Captures<'_>) -> String {
    let group = if regex.captures_len() > 1 { caps.get(1) } else { None };
    group
        .or_else(|| caps.get(0))
        .map(|m| m.as_str().to_owned())
        .unwrap_or_default()
}

impl Transformer for Extract {
    fn name(&self) -> &str {
        "extract"
    }

    fn apply(
        &self,
        record: Record,
        step: &TransformStep,
        _ctx: &mut TransformContext,
    ) -> impl Future<Output = Result<Record, RouterError>> + Send {
        std::future::ready(self.extract(record, step))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(pattern: &str) -> TransformStep {
        TransformStep::new("extract")
            .with("source_field", "msg")
            .with("pattern", pattern)
            .with("target_field", "out")
    }

    fn record() -> Record {
        json!({"msg": "user=alice id=42 user=bob"})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn first_capture_group() {
        let out = Extract::new(RegexCache::new(4))
            .extract(record(), &step(r"user=(\w+)"))
            .unwrap();
        assert_eq!(out["out"], json!("alice"));
    }

    #[test]
    fn whole_match_without_groups() {
        let out = Extract::new(RegexCache::new(4))
            .extract(record(), &step(r"\d+"))
            .unwrap();
        assert_eq!(out["out"], json!("42"));
    }

    #[test]
    fn all_flag_collects_every_match() {
        let out = Extract::new(RegexCache::new(4))
            .extract(record(), &step(r"user=(\w+)").with("all", true))
            .unwrap();
        assert_eq!(out["out"], json!(["alice", "bob"]));
    }

    #[test]
    fn all_mode_extractor_ignores_flag() {
        let out = Extract::all(RegexCache::new(4))
            .extract(record(), &step(r"user=(\w+)"))
            .unwrap();
        assert_eq!(out["out"], json!(["alice", "bob"]));
    }

    #[test]
    fn no_match_leaves_target_unset() {
        let out = Extract::new(RegexCache::new(4))
            .extract(record(), &step(r"host=(\w+)"))
            .unwrap();
        assert!(out.get("out").is_none());
        let out = Extract::all(RegexCache::new(4))
            .extract(record(), &step(r"host=(\w+)"))
            .unwrap();
        assert!(out.get("out").is_none());
    }

    #[test]
    fn invalid_pattern_is_error() {
        assert!(
            Extract::new(RegexCache::new(4))
                .extract(record(), &step("("))
                .is_err()
        );
    }
}
