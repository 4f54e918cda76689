//! `mask` -- 필드 값을 마스크 문자로 가립니다.

use std::future::Future;

use serde::Deserialize;
use serde_json::Value;

use logroute_core::record::{self, Record};

use super::{RegexCache, TransformContext, Transformer};
use crate::error::RouterError;
use crate::rule::TransformStep;

#[derive(Deserialize)]
struct Params {
    field: String,
    #[serde(default = "default_mask_char")]
    mask_char: String,
    #[serde(default)]
    pattern: Option<String>,
}

fn default_mask_char() -> String {
    "*".to_owned()
}

/// 필드 마스킹
///
/// `pattern`이 없으면 값 전체를 같은 길이의 마스크 문자열로 바꿉니다.
/// `pattern`이 있으면 매칭된 부분만 같은 길이로 가립니다.
pub struct Mask {
    regexes: RegexCache,
}

impl Mask {
    /// 정규식 캐시를 공유하는 마스크 변환기를 생성합니다.
    pub fn new(regexes: RegexCache) -> Self {
        Self { regexes }
    }

    fn mask(&self, mut record: Record, step: &TransformStep) -> Result<Record, RouterError> {
        let params: Params = step.params()?;
        let mask_char = params
            .mask_char
            .chars()
            .next()
            .ok_or_else(|| RouterError::transform(&step.kind, "mask_char must not be empty"))?;

        let Some(value) = record::get_path(&record, &params.field) else {
            return Ok(record);
        };
        let original = record::value_to_string(value);

        let masked = match &params.pattern {
            None => mask_run(mask_char, original.chars().count()),
            Some(pattern) => {
                let regex = self.regexes.get(pattern)?;
                regex
                    .replace_all(&original, |caps: &regex::Captures<'_>| {
                        mask_run(mask_char, caps[0].chars().count())
                    })
                    .into_owned()
            }
        };

        record::set_path(&mut record, &params.field, Value::String(masked));
        Ok(record)
    }
}

fn mask_run(mask_char: char, len: usize) -> String {
    std::iter::repeat_n(mask_char, len).collect()
}

impl Transformer for Mask {
    fn name(&self) -> &str {
        "mask"
    }

    fn apply(
        &self,
        record: Record,
        step: &TransformStep,
        _ctx: &mut TransformContext,
    ) -> impl Future<Output = Result<Record, RouterError>> + Send {
        std::future::ready(self.mask(record, step))
    }
}
