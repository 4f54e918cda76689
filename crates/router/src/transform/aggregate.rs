//! `aggregate` -- 여러 필드를 하나의 값으로 합칩니다.

use std::future::Future;

use serde::Deserialize;
use serde_json::{Number, Value};

use logroute_core::record::{self, Record};

use super::{TransformContext, Transformer};
use crate::condition::as_number;
use crate::error::RouterError;
use crate::rule::TransformStep;

#[derive(Deserialize)]
struct Params {
    fields: Vec<String>,
    #[serde(alias = "target")]
    target_field: String,
    #[serde(default)]
    operation: Operation,
    #[serde(default)]
    separator: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Operation {
    #[default]
    Concat,
    Sum,
    Avg,
}

/// 필드 결합
///
/// - `concat`: 존재하는 값을 `separator`로 이어 붙임
/// - `sum` / `avg`: 숫자로 변환 가능한 값만 사용
///
/// 사용할 수 있는 값이 하나도 없으면 대상 필드를 설정하지 않습니다.
pub struct Aggregate;

impl Aggregate {
    fn aggregate(mut record: Record, step: &TransformStep) -> Result<Record, RouterError> {
        let params: Params = step.params()?;
        let values: Vec<&Value> = params
            .fields
            .iter()
            .filter_map(|f| record::get_path(&record, f))
            .filter(|v| !v.is_null())
            .collect();

        let result = match params.operation {
            Operation::Concat => (!values.is_empty()).then(|| {
                let parts: Vec<String> = values.iter().map(|v| record::value_to_string(v)).collect();
                Value::String(parts.join(&params.separator))
            }),
            Operation::Sum | Operation::Avg => {
                let numbers: Vec<f64> = values.iter().filter_map(|v| as_number(v)).collect();
                if numbers.is_empty() {
                    None
                } else {
                    let sum: f64 = numbers.iter().sum();
                    let result = if params.operation == Operation::Avg {
                        sum / numbers.len() as f64
                    } else {
                        sum
                    };
                    Number::from_f64(result).map(Value::Number)
                }
            }
        };

        if let Some(result) = result {
            record::set_path(&mut record, &params.target_field, result);
        }
        Ok(record)
    }
}

impl Transformer for Aggregate {
    fn name(&self) -> &str {
        "aggregate"
    }

    fn apply(
        &self,
        record: Record,
        step: &TransformStep,
        _ctx: &mut TransformContext,
    ) -> impl Future<Output = Result<Record, RouterError>> + Send {
        std::future::ready(Self::aggregate(record, step))
    }
}
