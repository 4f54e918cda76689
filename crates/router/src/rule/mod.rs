//! 라우팅 규칙 -- 규칙 정의, 로딩, 우선순위 매칭
//!
//! # 아키텍처
//! - [`types`]: 규칙 데이터 구조와 규칙별 처리 카운터
//! - [`loader`]: 규칙 정의 검증, YAML/JSON 파일 및 디렉토리 로딩
//! - [`matcher`]: 우선순위 정렬된 [`RuleSet`]과 첫 매칭 규칙 탐색

pub mod loader;
pub mod matcher;
pub mod types;

pub use loader::{LoadReport, RejectedRule, RuleFormat, RuleLoader};
pub use matcher::RuleSet;
pub use types::{
    CompiledRule, Destination, RoutingRule, RulePerformance, RulePerformanceSnapshot,
    TransformStep,
};
