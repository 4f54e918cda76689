//! 규칙 매칭 -- 우선순위 순서로 첫 번째 매칭 규칙을 찾습니다.
//!
//! [`RuleSet`]은 로딩 후 불변이며, 여러 레코드 태스크가 잠금 없이 공유합니다.
//! 규칙 교체는 엔진이 새 `RuleSet`을 만들어 통째로 바꾸는 방식으로만 일어납니다.

use tracing::warn;

use logroute_core::record::Record;

use super::types::CompiledRule;
use crate::condition;
use crate::error::RouterError;
use crate::policy::{self, Recovery, Stage};

/// 우선순위 정렬된 규칙 집합
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// 규칙 집합을 생성합니다.
    ///
    /// 우선순위 오름차순으로 정렬하며, 같은 우선순위는 입력 순서를 유지합니다.
    pub fn new(mut rules: Vec<CompiledRule>) -> Self {
        // sort_by_key는 안정 정렬
        rules.sort_by_key(|r| r.rule().priority);
        Self { rules }
    }

    /// 빈 규칙 집합. 모든 레코드가 unmatched가 됩니다.
    pub fn empty() -> Self {
        Self::default()
    }

    /// 평가 순서대로 정렬된 규칙 목록
    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// 규칙 수
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// 규칙이 없는지 여부
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 이름으로 규칙을 찾습니다.
    pub fn get(&self, name: &str) -> Option<&CompiledRule> {
        self.rules.iter().find(|r| r.name() == name)
    }

    /// 활성 규칙들이 사용하는 목적지 식별자 (중복 제거, 평가 순서)
    pub fn destinations(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for rule in self.rules.iter().filter(|r| r.rule().enabled) {
            let dest = rule.rule().destination_id();
            if !seen.iter().any(|d: &String| d == dest) {
                seen.push(dest.to_owned());
            }
        }
        seen
    }

    /// 레코드에 매칭되는 첫 번째 활성 규칙을 찾습니다.
    ///
    /// 비활성 규칙은 건너뜁니다. 조건 평가 중 에러가 난 규칙은
    /// 매칭 실패로 간주하고 다음 규칙을 계속 평가합니다.
    pub fn find_match(&self, record: &Record) -> Option<&CompiledRule> {
        for rule in &self.rules {
            if !rule.rule().enabled {
                continue;
            }

            match Self::matches(rule, record) {
                Ok(true) => return Some(rule),
                Ok(false) => {}
                Err(e) => {
                    let recovery = policy::recover(Stage::Rule, &e);
                    warn!(
                        rule = %rule.name(),
                        error = %e,
                        ?recovery,
                        "rule evaluation failed"
                    );
                    rule.performance().record_error();
                    if recovery != Recovery::SkipRule {
                        return None;
                    }
                }
            }
        }
        None
    }

    /// 규칙의 모든 조건이 레코드에 매칭되는지 평가합니다.
    ///
    /// 조건이 비어있으면 모든 레코드에 매칭됩니다.
    pub fn matches(rule: &CompiledRule, record: &Record) -> Result<bool, RouterError> {
        condition::evaluate_all(record, rule.conditions())
    }
}
