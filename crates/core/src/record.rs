//! 레코드 타입 -- 라우팅되는 구조화 로그 한 건
//!
//! 레코드는 문자열 키를 가진 JSON 객체입니다. 필드 경로는 `.`으로 구분하며
//! (`user.address.city`) 중첩 객체를 따라 내려갑니다.

use serde_json::{Map, Value};

/// 구조화 로그 레코드
pub type Record = Map<String, Value>;

/// 점(`.`) 경로로 필드 값을 조회합니다.
///
/// 경로 중간에 객체가 아닌 값이 있으면 `None`을 반환합니다.
pub fn get_path<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = record.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// 점(`.`) 경로로 필드의 가변 참조를 얻습니다.
pub fn get_path_mut<'a>(record: &'a mut Record, path: &str) -> Option<&'a mut Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = record.get_mut(first)?;
    for segment in segments {
        current = current.as_object_mut()?.get_mut(segment)?;
    }
    Some(current)
}

/// 점(`.`) 경로에 값을 기록합니다.
///
/// 중간 객체가 없으면 생성하고, 중간 값이 객체가 아니면 객체로 덮어씁니다.
pub fn set_path(record: &mut Record, path: &str, value: Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(last) = segments.pop() else {
        return;
    };

    let mut current = record;
    for segment in segments {
        let entry = current
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        current = next;
    }
    current.insert(last.to_owned(), value);
}

/// 점(`.`) 경로의 필드를 제거하고 이전 값을 반환합니다.
pub fn remove_path(record: &mut Record, path: &str) -> Option<Value> {
    match path.rsplit_once('.') {
        None => record.remove(path),
        Some((parent, leaf)) => get_path_mut(record, parent)?
            .as_object_mut()?
            .remove(leaf),
    }
}

/// 값을 비교/패턴 매칭용 문자열로 변환합니다.
///
/// 문자열은 따옴표 없이, 그 외 값은 JSON 표기로 변환합니다.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Record {
        json!({
            "level": "error",
            "user": { "id": 42, "address": { "city": "Seoul" } },
            "tags": ["a", "b"]
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn get_path_top_level_and_nested() {
        let record = sample();
        assert_eq!(get_path(&record, "level"), Some(&json!("error")));
        assert_eq!(get_path(&record, "user.address.city"), Some(&json!("Seoul")));
        assert_eq!(get_path(&record, "user.missing"), None);
        // 배열은 경로로 내려가지 않음
        assert_eq!(get_path(&record, "tags.0"), None);
    }

    #[test]
    fn set_path_creates_intermediate_objects() {
        let mut record = Record::new();
        set_path(&mut record, "a.b.c", json!(1));
        assert_eq!(get_path(&record, "a.b.c"), Some(&json!(1)));
    }

    #[test]
    fn set_path_overwrites_non_object_intermediate() {
        let mut record = sample();
        set_path(&mut record, "level.code", json!(500));
        assert_eq!(get_path(&record, "level.code"), Some(&json!(500)));
    }

    #[test]
    fn remove_path_nested() {
        let mut record = sample();
        assert_eq!(remove_path(&mut record, "user.id"), Some(json!(42)));
        assert_eq!(get_path(&record, "user.id"), None);
        assert_eq!(remove_path(&mut record, "nope.x"), None);
    }

    #[test]
    fn value_to_string_variants() {
        assert_eq!(value_to_string(&json!("x")), "x");
        assert_eq!(value_to_string(&json!(12)), "12");
        assert_eq!(value_to_string(&json!(true)), "true");
        assert_eq!(value_to_string(&Value::Null), "");
    }
}
