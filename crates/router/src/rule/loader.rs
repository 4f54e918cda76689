//! 규칙 로더 -- 규칙 정의 목록을 검증된 규칙 집합으로 변환합니다.
//!
//! 잘못된 규칙 하나는 경고 로그와 함께 제외되며 나머지 규칙의 로딩을 막지 않습니다.
//! 파일은 YAML(`.yml`/`.yaml`) 또는 JSON(`.json`)이며, 규칙 목록 자체이거나
//! `rules` 키를 가진 매핑일 수 있습니다.

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use super::matcher::RuleSet;
use super::types::{CompiledRule, RoutingRule};
use crate::error::RouterError;

/// 규칙 파일 최대 크기
const MAX_RULE_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB
/// 규칙 집합 최대 규칙 수
const MAX_RULES_COUNT: usize = 10_000;

/// 로딩에서 제외된 규칙
#[derive(Debug, Clone, Serialize)]
pub struct RejectedRule {
    /// 입력 목록 내 위치
    pub index: usize,
    /// 규칙 이름 (파싱 가능했던 경우)
    pub name: Option<String>,
    /// 제외 사유
    pub reason: String,
}

/// 로딩 결과
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// 검증된 규칙 집합
    pub rule_set: RuleSet,
    /// 제외된 규칙 목록
    pub rejected: Vec<RejectedRule>,
}

/// 규칙 로더
pub struct RuleLoader;

impl RuleLoader {
    /// 규칙 정의 목록을 검증해 규칙 집합을 만듭니다.
    ///
    /// 역직렬화/검증/조건 컴파일에 실패한 규칙과 이름이 중복된 규칙은
    /// 제외되고 `rejected`에 기록됩니다. 이 함수는 실패하지 않습니다.
    pub fn load(definitions: Vec<Value>) -> LoadReport {
        let mut compiled = Vec::with_capacity(definitions.len());
        let mut rejected = Vec::new();
        let mut seen_names = HashSet::new();

        for (index, definition) in definitions.into_iter().enumerate() {
            if compiled.len() >= MAX_RULES_COUNT {
                warn!(index, max = MAX_RULES_COUNT, "rule count limit reached, skipping");
                rejected.push(RejectedRule {
                    index,
                    name: rule_name(&definition),
                    reason: format!("too many rules: max {MAX_RULES_COUNT}"),
                });
                continue;
            }

            let name = rule_name(&definition);
            match Self::compile_one(definition) {
                Ok(rule) => {
                    if !seen_names.insert(rule.name().to_owned()) {
                        warn!(rule = %rule.name(), index, "duplicate rule name, skipping");
                        rejected.push(RejectedRule {
                            index,
                            name,
                            reason: "duplicate rule name".to_owned(),
                        });
                        continue;
                    }
                    compiled.push(rule);
                }
                Err(e) => {
                    warn!(
                        rule = name.as_deref().unwrap_or("(unnamed)"),
                        index,
                        error = %e,
                        "invalid routing rule, skipping"
                    );
                    rejected.push(RejectedRule {
                        index,
                        name,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            loaded = compiled.len(),
            rejected = rejected.len(),
            "loaded routing rules"
        );

        LoadReport {
            rule_set: RuleSet::new(compiled),
            rejected,
        }
    }

    /// 이미 타입이 있는 규칙 목록을 검증해 규칙 집합을 만듭니다.
    pub fn load_rules(rules: Vec<RoutingRule>) -> LoadReport {
        let definitions = rules
            .into_iter()
            .filter_map(|r| match serde_json::to_value(&r) {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(rule = %r.name, error = %e, "failed to serialize rule, skipping");
                    None
                }
            })
            .collect();
        Self::load(definitions)
    }

    fn compile_one(definition: Value) -> Result<CompiledRule, RouterError> {
        let rule: RoutingRule =
            serde_json::from_value(definition).map_err(|e| RouterError::RuleValidation {
                rule: "(unparsed)".to_owned(),
                reason: e.to_string(),
            })?;
        CompiledRule::compile(rule)
    }

    /// 파일 또는 디렉토리에서 규칙을 로드합니다.
    pub async fn load_path(path: impl AsRef<Path>) -> Result<LoadReport, RouterError> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| RouterError::RuleLoad {
                path: path.display().to_string(),
                reason: format!("failed to read metadata: {e}"),
            })?;

        if metadata.is_dir() {
            Self::load_directory(path).await
        } else {
            Self::load_file(path).await
        }
    }

    /// 단일 규칙 파일을 로드합니다.
    pub async fn load_file(path: impl AsRef<Path>) -> Result<LoadReport, RouterError> {
        let definitions = Self::read_definitions(path.as_ref()).await?;
        Ok(Self::load(definitions))
    }

    /// 디렉토리 내 모든 규칙 파일을 로드합니다.
    ///
    /// 파일 이름 순으로 읽어 규칙 순서를 결정적으로 만듭니다.
    /// 개별 파일 로딩 실패는 경고 로그를 남기고 건너뜁니다.
    pub async fn load_directory(dir: impl AsRef<Path>) -> Result<LoadReport, RouterError> {
        let dir = dir.as_ref();

        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| RouterError::RuleLoad {
                path: dir.display().to_string(),
                reason: format!("failed to read directory: {e}"),
            })?;

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RouterError::RuleLoad {
                path: dir.display().to_string(),
                reason: format!("failed to read directory entry: {e}"),
            })?
        {
            let path = entry.path();
            if RuleFormat::from_path(&path).is_some() {
                paths.push(path);
            }
        }
        paths.sort();

        let mut definitions = Vec::new();
        for path in &paths {
            match Self::read_definitions(path).await {
                Ok(mut defs) => definitions.append(&mut defs),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to load rule file, skipping"
                    );
                }
            }

            if definitions.len() > MAX_RULES_COUNT {
                return Err(RouterError::RuleLoad {
                    path: dir.display().to_string(),
                    reason: format!("too many rules: max {MAX_RULES_COUNT}"),
                });
            }
        }

        info!(dir = %dir.display(), files = paths.len(), "read rule directory");
        Ok(Self::load(definitions))
    }

    async fn read_definitions(path: &Path) -> Result<Vec<Value>, RouterError> {
        let format = RuleFormat::from_path(path).ok_or_else(|| RouterError::RuleLoad {
            path: path.display().to_string(),
            reason: "unsupported rule file extension (expected .yml, .yaml or .json)".to_owned(),
        })?;

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| RouterError::RuleLoad {
                path: path.display().to_string(),
                reason: format!("failed to read file metadata: {e}"),
            })?;

        if metadata.len() > MAX_RULE_FILE_SIZE {
            return Err(RouterError::RuleLoad {
                path: path.display().to_string(),
                reason: format!(
                    "file too large: {} bytes (max: {MAX_RULE_FILE_SIZE})",
                    metadata.len()
                ),
            });
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RouterError::RuleLoad {
                path: path.display().to_string(),
                reason: format!("failed to read file: {e}"),
            })?;

        Self::parse_document(&content, format, &path.display().to_string())
    }

    /// 규칙 문서를 파싱해 규칙 정의 목록을 꺼냅니다.
    ///
    /// 문서는 규칙 목록이거나 `rules` 키를 가진 매핑이어야 합니다.
    pub fn parse_document(
        content: &str,
        format: RuleFormat,
        source: &str,
    ) -> Result<Vec<Value>, RouterError> {
        let document: Value = match format {
            RuleFormat::Yaml => serde_yaml::from_str(content).map_err(|e| RouterError::RuleLoad {
                path: source.to_owned(),
                reason: format!("YAML parse error: {e}"),
            })?,
            RuleFormat::Json => serde_json::from_str(content).map_err(|e| RouterError::RuleLoad {
                path: source.to_owned(),
                reason: format!("JSON parse error: {e}"),
            })?,
        };

        match document {
            Value::Array(rules) => Ok(rules),
            Value::Object(mut map) => match map.remove("rules") {
                Some(Value::Array(rules)) => Ok(rules),
                _ => Err(RouterError::RuleLoad {
                    path: source.to_owned(),
                    reason: "expected a 'rules' list".to_owned(),
                }),
            },
            Value::Null => Ok(Vec::new()),
            _ => Err(RouterError::RuleLoad {
                path: source.to_owned(),
                reason: "expected a list of rules".to_owned(),
            }),
        }
    }
}

/// 규칙 파일 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleFormat {
    /// YAML
    Yaml,
    /// JSON
    Json,
}

impl RuleFormat {
    /// 확장자로 형식을 판별합니다.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "yml" | "yaml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

fn rule_name(definition: &Value) -> Option<String> {
    definition
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const YAML_RULES: &str = r#"
rules:
  - name: errors
    priority: 1
    conditions:
      - field: level
        operator: equals
        value: error
    destination:
      type: alerts
  - name: everything
    priority: 100
    destination:
      type: archive
"#;

    #[test]
    fn invalid_rule_is_excluded_not_fatal() {
        let report = RuleLoader::load(vec![
            json!({"name": "ok", "destination": {"type": "a"}}),
            json!({"name": "no_destination"}),
            json!({"name": "bad_regex", "destination": {"type": "a"},
                   "conditions": [{"field": "x", "operator": "matches_regex", "value": "("}]}),
            json!({"name": "ok2", "destination": {"type": "b"}}),
        ]);
        assert_eq!(report.rule_set.len(), 2);
        assert_eq!(report.rejected.len(), 2);
        assert_eq!(report.rejected[0].index, 1);
        assert_eq!(report.rejected[0].name.as_deref(), Some("no_destination"));
        assert_eq!(report.rejected[1].name.as_deref(), Some("bad_regex"));
    }

    #[test]
    fn duplicate_names_keep_first() {
        let report = RuleLoader::load(vec![
            json!({"name": "dup", "priority": 1, "destination": {"type": "first"}}),
            json!({"name": "dup", "priority": 0, "destination": {"type": "second"}}),
        ]);
        assert_eq!(report.rule_set.len(), 1);
        assert_eq!(
            report.rule_set.get("dup").unwrap().rule().destination_id(),
            "first"
        );
        assert_eq!(report.rejected[0].reason, "duplicate rule name");
    }

    #[test]
    fn empty_definitions_give_empty_rule_set() {
        let report = RuleLoader::load(Vec::new());
        assert!(report.rule_set.is_empty());
        assert!(report.rejected.is_empty());
    }

    #[test]
    fn parse_yaml_document_with_rules_key() {
        let defs = RuleLoader::parse_document(YAML_RULES, RuleFormat::Yaml, "rules.yaml").unwrap();
        assert_eq!(defs.len(), 2);
        let report = RuleLoader::load(defs);
        assert_eq!(report.rule_set.rules()[0].name(), "errors");
    }

    #[test]
    fn parse_json_list_document() {
        let json = r#"[{"name": "a", "destination": {"type": "x"}}]"#;
        let defs = RuleLoader::parse_document(json, RuleFormat::Json, "rules.json").unwrap();
        assert_eq!(defs.len(), 1);
    }

    #[test]
    fn parse_invalid_document_returns_error() {
        assert!(RuleLoader::parse_document("not: [valid: {{{", RuleFormat::Yaml, "bad.yml").is_err());
        assert!(RuleLoader::parse_document("42", RuleFormat::Json, "n.json").is_err());
        assert!(RuleLoader::parse_document("{\"rules\": 1}", RuleFormat::Json, "r.json").is_err());
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(RuleFormat::from_path(Path::new("a.yml")), Some(RuleFormat::Yaml));
        assert_eq!(RuleFormat::from_path(Path::new("a.json")), Some(RuleFormat::Json));
        assert_eq!(RuleFormat::from_path(Path::new("a.toml")), None);
    }

    #[tokio::test]
    async fn load_directory_reads_files_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(
            dir.path().join("20-second.json"),
            r#"[{"name": "second", "destination": {"type": "b"}}]"#,
        )
        .await
        .unwrap();
        tokio::fs::write(dir.path().join("10-first.yaml"), YAML_RULES)
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("broken.yml"), "rules: [[[")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), "ignored")
            .await
            .unwrap();

        let report = RuleLoader::load_path(dir.path()).await.unwrap();
        assert_eq!(report.rule_set.len(), 3);
        // 우선순위 0인 second가 가장 먼저 평가됨
        let names: Vec<&str> = report.rule_set.rules().iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["second", "errors", "everything"]);
    }

    #[tokio::test]
    async fn load_nonexistent_path_returns_error() {
        let result = RuleLoader::load_path("/nonexistent/logroute/rules").await;
        assert!(matches!(result, Err(RouterError::RuleLoad { .. })));
    }
}
