//! 구조 변환 -- 필드 추가/삭제, 평탄화, 템플릿 재구성

use std::future::Future;

use serde::Deserialize;
use serde_json::{Map, Value};

use logroute_core::record::{self, Record};

use super::{TransformContext, Transformer};
use crate::error::RouterError;
use crate::rule::TransformStep;

fn ready(
    result: Result<Record, RouterError>,
) -> impl Future<Output = Result<Record, RouterError>> + Send {
    std::future::ready(result)
}

// ─── add_field ──────────────────────────────────────────────────────

#[derive(Deserialize)]
struct AddFieldParams {
    field: String,
    value: Value,
    #[serde(default = "default_true")]
    overwrite: bool,
}

fn default_true() -> bool {
    true
}

/// `add_field` -- 경로에 고정 값을 기록합니다.
///
/// `overwrite: false`이면 이미 값이 있을 때 건드리지 않습니다.
pub struct AddField;

impl AddField {
    fn add(mut record: Record, step: &TransformStep) -> Result<Record, RouterError> {
        let params: AddFieldParams = step.params()?;
        if params.overwrite || record::get_path(&record, &params.field).is_none() {
            record::set_path(&mut record, &params.field, params.value);
        }
        Ok(record)
    }
}

impl Transformer for AddField {
    fn name(&self) -> &str {
        "add_field"
    }

    fn apply(
        &self,
        record: Record,
        step: &TransformStep,
        _ctx: &mut TransformContext,
    ) -> impl Future<Output = Result<Record, RouterError>> + Send {
        ready(Self::add(record, step))
    }
}

// ─── remove_field ───────────────────────────────────────────────────

#[derive(Deserialize)]
struct RemoveFieldParams {
    #[serde(default)]
    fields: Vec<String>,
    #[serde(default)]
    field: Option<String>,
}

/// `remove_field` -- 하나 이상의 경로를 삭제합니다.
pub struct RemoveField;

impl RemoveField {
    fn remove(mut record: Record, step: &TransformStep) -> Result<Record, RouterError> {
        let params: RemoveFieldParams = step.params()?;
        for field in params.fields.iter().map(String::as_str).chain(params.field.as_deref()) {
            record::remove_path(&mut record, field);
        }
        Ok(record)
    }
}

impl Transformer for RemoveField {
    fn name(&self) -> &str {
        "remove_field"
    }

    fn apply(
        &self,
        record: Record,
        step: &TransformStep,
        _ctx: &mut TransformContext,
    ) -> impl Future<Output = Result<Record, RouterError>> + Send {
        ready(Self::remove(record, step))
    }
}

// ─── json_flatten ───────────────────────────────────────────────────

#[derive(Deserialize)]
struct FlattenParams {
    #[serde(default = "default_separator")]
    separator: String,
}

fn default_separator() -> String {
    ".".to_owned()
}

/// `json_flatten` -- 중첩 매핑을 구분자로 이은 키의 평평한 레코드로 바꿉니다.
///
/// 목록 원소는 `key[i]` 형식의 키가 됩니다. 빈 매핑과 빈 목록은 사라집니다.
pub struct JsonFlatten;

impl JsonFlatten {
    fn flatten_record(record: Record, step: &TransformStep) -> Result<Record, RouterError> {
        let params: FlattenParams = step.params()?;
        let mut out = Map::new();
        for (key, value) in record {
            flatten_into(&mut out, key, value, &params.separator);
        }
        Ok(out)
    }
}

fn flatten_into(out: &mut Map<String, Value>, prefix: String, value: Value, separator: &str) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                flatten_into(out, format!("{prefix}{separator}{key}"), nested, separator);
            }
        }
        Value::Array(items) => {
            for (idx, item) in items.into_iter().enumerate() {
                flatten_into(out, format!("{prefix}[{idx}]"), item, separator);
            }
        }
        leaf => {
            out.insert(prefix, leaf);
        }
    }
}

impl Transformer for JsonFlatten {
    fn name(&self) -> &str {
        "json_flatten"
    }

    fn apply(
        &self,
        record: Record,
        step: &TransformStep,
        _ctx: &mut TransformContext,
    ) -> impl Future<Output = Result<Record, RouterError>> + Send {
        ready(Self::flatten_record(record, step))
    }
}

// ─── json_structure ─────────────────────────────────────────────────

#[derive(Deserialize)]
struct StructureParams {
    template: Map<String, Value>,
}

/// `json_structure` -- 템플릿으로 레코드를 다시 만듭니다.
///
/// `"$경로"` 문자열은 레코드의 해당 값(없으면 null)으로 바뀌고,
/// 그 외 값은 그대로 복사됩니다.
pub struct JsonStructure;

impl JsonStructure {
    fn restructure(record: Record, step: &TransformStep) -> Result<Record, RouterError> {
        let params: StructureParams = step.params()?;
        Ok(params
            .template
            .into_iter()
            .map(|(key, value)| (key, render(value, &record)))
            .collect())
    }
}

fn render(template: Value, record: &Record) -> Value {
    match template {
        Value::String(s) => match s.strip_prefix('$') {
            Some(path) if !path.is_empty() => {
                record::get_path(record, path).cloned().unwrap_or(Value::Null)
            }
            _ => Value::String(s),
        },
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, render(value, record)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(|v| render(v, record)).collect()),
        other => other,
    }
}

impl Transformer for JsonStructure {
    fn name(&self) -> &str {
        "json_structure"
    }

    fn apply(
        &self,
        record: Record,
        step: &TransformStep,
        _ctx: &mut TransformContext,
    ) -> impl Future<Output = Result<Record, RouterError>> + Send {
        ready(Self::restructure(record, step))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn add_field_respects_overwrite_flag() {
        let step = TransformStep::new("add_field").with("field", "env.name").with("value", "prod");
        let out = AddField::add(rec(json!({})), &step).unwrap();
        assert_eq!(out["env"]["name"], json!("prod"));

        let step = step.with("overwrite", false);
        let out = AddField::add(rec(json!({"env": {"name": "dev"}})), &step).unwrap();
        assert_eq!(out["env"]["name"], json!("dev"));
    }

    #[test]
    fn remove_field_deletes_paths() {
        let step = TransformStep::new("remove_field")
            .with("fields", json!(["a.b", "c"]))
            .with("field", "missing");
        let out = RemoveField::remove(rec(json!({"a": {"b": 1, "x": 2}, "c": 3, "d": 4})), &step).unwrap();
        assert_eq!(out, rec(json!({"a": {"x": 2}, "d": 4})));
    }

    #[test]
    fn flatten_nested_maps_and_lists() {
        let record = rec(json!({
            "user": {"name": "ada", "roles": ["admin", "dev"]},
            "empty": {},
            "n": 1
        }));
        let out = JsonFlatten::flatten_record(record, &TransformStep::new("json_flatten")).unwrap();
        assert_eq!(
            out,
            rec(json!({
                "user.name": "ada",
                "user.roles[0]": "admin",
                "user.roles[1]": "dev",
                "n": 1
            }))
        );
    }

    #[test]
    fn structure_from_template() {
        let record = rec(json!({"user": {"id": 7, "name": "ada"}, "msg": "hi"}));
        let step = TransformStep::new("json_structure").with(
            "template",
            json!({
                "who": {"id": "$user.id", "label": "$user.name"},
                "text": "$msg",
                "missing": "$nope",
                "source": "static",
                "list": ["$msg", 1],
                "dollar": "$"
            }),
        );
        let out = JsonStructure::restructure(record, &step).unwrap();
        assert_eq!(
            out,
            rec(json!({
                "who": {"id": 7, "label": "ada"},
                "text": "hi",
                "missing": null,
                "source": "static",
                "list": ["hi", 1],
                "dollar": "$"
            }))
        );
    }

    #[test]
    fn structure_requires_template() {
        assert!(JsonStructure::restructure(Record::new(), &TransformStep::new("json_structure")).is_err());
    }
}
