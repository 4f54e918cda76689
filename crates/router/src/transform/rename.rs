//! `rename` -- 값을 한 경로에서 다른 경로로 옮깁니다.

use std::future::Future;

use serde::Deserialize;

use logroute_core::record::{self, Record};

use super::{TransformContext, Transformer};
use crate::error::RouterError;
use crate::rule::TransformStep;

#[derive(Deserialize)]
struct Params {
    #[serde(alias = "old_field", alias = "source")]
    from: String,
    #[serde(alias = "new_field", alias = "target")]
    to: String,
}

/// 필드 이름 변경
///
/// 원본 경로가 없으면 아무것도 하지 않으므로 같은 단계를 두 번 적용해도 결과가 같습니다.
pub struct Rename;

impl Rename {
    fn rename(record: &mut Record, params: &Params) {
        if params.from == params.to {
            return;
        }
        if let Some(value) = record::remove_path(record, &params.from) {
            record::set_path(record, &params.to, value);
        }
    }
}

impl Transformer for Rename {
    fn name(&self) -> &str {
        "rename"
    }

    fn apply(
        &self,
        mut record: Record,
        step: &TransformStep,
        _ctx: &mut TransformContext,
    ) -> impl Future<Output = Result<Record, RouterError>> + Send {
        let result = step.params::<Params>().map(|params| {
            Self::rename(&mut record, &params);
            record
        });
        std::future::ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(record: serde_json::Value, from: &str, to: &str) -> Record {
        let mut record = record.as_object().cloned().unwrap();
        let params = Params {
            from: from.to_owned(),
            to: to.to_owned(),
        };
        Rename::rename(&mut record, &params);
        record
    }

    #[test]
    fn moves_nested_value_to_top_level() {
        let out = run(json!({"a": {"b": 7, "keep": 1}}), "a.b", "c");
        assert_eq!(out["c"], json!(7));
        assert!(record::get_path(&out, "a.b").is_none());
        assert_eq!(record::get_path(&out, "a.keep"), Some(&json!(1)));
    }

    #[test]
    fn rename_is_idempotent() {
        let once = run(json!({"a": {"b": "x"}}), "a.b", "c");
        let twice = {
            let mut r = once.clone();
            Rename::rename(
                &mut r,
                &Params {
                    from: "a.b".to_owned(),
                    to: "c".to_owned(),
                },
            );
            r
        };
        assert_eq!(once, twice);
    }

    #[test]
    fn absent_source_is_noop() {
        let out = run(json!({"x": 1}), "missing", "y");
        assert_eq!(out, json!({"x": 1}).as_object().cloned().unwrap());
    }

    #[test]
    fn accepts_original_parameter_names() {
        let step = TransformStep::new("field_rename")
            .with("old_field", "a")
            .with("new_field", "b");
        let params: Params = step.params().unwrap();
        assert_eq!(params.from, "a");
        assert_eq!(params.to, "b");
    }
}
