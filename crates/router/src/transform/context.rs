//! 변환 컨텍스트 -- 레코드 하나의 변환 동안만 존재하는 상태

use std::sync::Arc;

use serde_json::{Map, Value};

use logroute_core::record::Record;

use crate::rule::RoutingRule;

/// 레코드 하나에 대한 변환 컨텍스트
///
/// 규칙 매칭 직후 레코드마다 새로 만들고, 파이프라인이 끝나면 버립니다.
/// 동시에 실행되는 레코드 태스크 사이에서 공유하지 않습니다.
#[derive(Debug)]
pub struct TransformContext {
    /// 변환 전 원본 (불변)
    pub original: Arc<Record>,
    /// 단계마다 교체되는 작업 레코드
    pub working: Record,
    /// 매칭된 규칙
    pub rule: Arc<RoutingRule>,
    /// 단계 간 공유 메모
    pub scratch: Map<String, Value>,
    /// 성공한 단계의 타입 키
    pub applied: Vec<String>,
    /// 실패해 건너뛴 단계의 타입 키
    pub failed: Vec<String>,
}

impl TransformContext {
    /// 원본 레코드와 매칭 규칙으로 컨텍스트를 생성합니다.
    pub fn new(record: Record, rule: Arc<RoutingRule>) -> Self {
        Self {
            original: Arc::new(record.clone()),
            working: record,
            rule,
            scratch: Map::new(),
            applied: Vec::new(),
            failed: Vec::new(),
        }
    }
}
