//! `timestamp_normalize` -- 여러 입력 형식의 시각을 하나의 출력 형식으로 맞춥니다.

use std::fmt::Write as _;
use std::future::Future;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use logroute_core::record::{self, Record};

use super::{TransformContext, Transformer};
use crate::error::RouterError;
use crate::rule::TransformStep;

/// 기본 입력 형식 (앞에서부터 시도)
pub const DEFAULT_INPUT_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%d/%b/%Y:%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%dT%H:%M:%SZ",
];

/// 기본 출력 형식
pub const DEFAULT_OUTPUT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

#[derive(Deserialize)]
struct Params {
    #[serde(default)]
    fields: Vec<String>,
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    input_formats: Option<Vec<String>>,
    #[serde(default)]
    output_format: Option<String>,
}

/// 시각 정규화
///
/// 입력 형식 목록을 순서대로 시도해 처음 성공한 형식으로 해석합니다.
/// 오프셋이 없는 형식은 UTC로 간주합니다. 어느 형식으로도 해석되지 않으면
/// 값을 그대로 둡니다. 출력 형식 `rfc3339`는 RFC 3339 문자열을 뜻합니다.
pub struct TimestampNormalize;

impl TimestampNormalize {
    fn normalize(mut record: Record, step: &TransformStep) -> Result<Record, RouterError> {
        let params: Params = step.params()?;
        let fields: Vec<&str> = params
            .fields
            .iter()
            .map(String::as_str)
            .chain(params.field.as_deref())
            .collect();
        if fields.is_empty() {
            return Err(RouterError::transform(&step.kind, "no fields given"));
        }

        let input_formats: Vec<&str> = match &params.input_formats {
            Some(formats) => formats.iter().map(String::as_str).collect(),
            None => DEFAULT_INPUT_FORMATS.to_vec(),
        };
        let output_format = params.output_format.as_deref().unwrap_or(DEFAULT_OUTPUT_FORMAT);

        for field in fields {
            let Some(Value::String(raw)) = record::get_path(&record, field) else {
                continue;
            };
            match parse(raw, &input_formats) {
                Some(parsed) => {
                    let formatted = format(parsed, output_format).ok_or_else(|| {
                        RouterError::transform(
                            &step.kind,
                            format!("invalid output_format: {output_format}"),
                        )
                    })?;
                    record::set_path(&mut record, field, Value::String(formatted));
                }
                None => debug!(field, value = %raw, "unparseable timestamp left unchanged"),
            }
        }
        Ok(record)
    }
}

fn parse(raw: &str, formats: &[&str]) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    for fmt in formats {
        if *fmt == "rfc3339" {
            if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
                return Some(dt.with_timezone(&Utc));
            }
            continue;
        }
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    None
}

/// 형식 문자열이 잘못되면 `None`
fn format(dt: DateTime<Utc>, output_format: &str) -> Option<String> {
    match output_format {
        "rfc3339" | "iso" => Some(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        fmt => {
            let mut out = String::new();
            write!(out, "{}", dt.format(fmt)).ok()?;
            Some(out)
        }
    }
}

impl Transformer for TimestampNormalize {
    fn name(&self) -> &str {
        "timestamp_normalize"
    }

    fn apply(
        &self,
        record: Record,
        step: &TransformStep,
        _ctx: &mut TransformContext,
    ) -> impl Future<Output = Result<Record, RouterError>> + Send {
        std::future::ready(Self::normalize(record, step))
    }
}
