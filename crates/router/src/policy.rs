//! 단계별 에러 복구 정책
//!
//! 조건, 규칙, 변환 단계, 레코드, 전송 단위에서 발생한 에러를 어떻게
//! 처리할지 한 곳에서 결정합니다. 호출 측은 에러를 [`recover`]에 넘기고
//! 돌려받은 [`Recovery`]에 따라 루프를 계속하거나 단위를 중단합니다.

use serde::Serialize;

use crate::error::RouterError;

/// 에러가 발생한 처리 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// 단일 조건 평가
    Condition,
    /// 규칙 하나의 조건 목록 평가
    Rule,
    /// 변환 단계 하나
    Step,
    /// 레코드 하나의 전체 처리 (매칭 → 변환 → 보강)
    Record,
    /// 목적지 전송 시도 하나
    Delivery,
}

/// 복구 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recovery {
    /// 조건을 거짓으로 간주
    NoMatch,
    /// 규칙을 매칭 실패로 간주하고 다음 규칙으로 진행
    SkipRule,
    /// 단계를 건너뛰고 입력을 그대로 다음 단계로 전달
    Identity,
    /// 레코드를 배치 결과에서 제외
    DropRecord,
    /// 백오프 후 재시도
    Retry,
    /// 재시도 없이 영구 실패로 기록
    GiveUp,
}

/// 단계와 에러 종류로 복구 방식을 결정합니다.
///
/// 어떤 경우에도 에러를 배치 경계 밖으로 전파하지 않습니다.
pub fn recover(stage: Stage, err: &RouterError) -> Recovery {
    match stage {
        Stage::Condition => Recovery::NoMatch,
        Stage::Rule => Recovery::SkipRule,
        Stage::Step => Recovery::Identity,
        Stage::Record => Recovery::DropRecord,
        Stage::Delivery => match err {
            // 싱크가 등록되지 않았거나 설정이 잘못된 경우는 재시도해도 바뀌지 않음
            RouterError::Config { .. } => Recovery::GiveUp,
            _ => Recovery::Retry,
        },
    }
}
