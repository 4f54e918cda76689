//! 파이프라인 공통 정의 -- 확장 포인트에서 사용하는 future 타입과 레코드 상태

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

/// trait 객체에서 반환하는 boxed future
///
/// `impl Future`를 반환하는 trait을 `dyn` 호환으로 감쌀 때 사용합니다.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 엔진 안에서 레코드 하나가 거치는 처리 상태
///
/// ```text
/// Received → Matched → Transformed → Enriched → Grouped → Delivered | DeliveryFailed
///          ↘ Unmatched
/// (어느 단계에서든) → Dropped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    /// 배치로 수신됨
    Received,
    /// 규칙에 매칭됨
    Matched,
    /// 어떤 규칙에도 매칭되지 않음 (종료 상태)
    Unmatched,
    /// 변환 파이프라인 적용 완료
    Transformed,
    /// 라우팅 메타데이터 부착 완료
    Enriched,
    /// 목적지별 그룹에 포함됨
    Grouped,
    /// 목적지 전송 성공 (종료 상태)
    Delivered,
    /// 모든 재시도 후 전송 실패 (종료 상태)
    DeliveryFailed,
    /// 태스크 실패 또는 타임아웃으로 폐기됨 (종료 상태)
    Dropped,
}

impl RecordState {
    /// 더 이상 전이가 없는 상태인지 여부
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Unmatched | Self::Delivered | Self::DeliveryFailed | Self::Dropped
        )
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Received => "received",
            Self::Matched => "matched",
            Self::Unmatched => "unmatched",
            Self::Transformed => "transformed",
            Self::Enriched => "enriched",
            Self::Grouped => "grouped",
            Self::Delivered => "delivered",
            Self::DeliveryFailed => "delivery_failed",
            Self::Dropped => "dropped",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(RecordState::Unmatched.is_terminal());
        assert!(RecordState::Delivered.is_terminal());
        assert!(RecordState::DeliveryFailed.is_terminal());
        assert!(RecordState::Dropped.is_terminal());
        assert!(!RecordState::Matched.is_terminal());
        assert!(!RecordState::Grouped.is_terminal());
    }

    #[test]
    fn display_matches_serde_name() {
        let json = serde_json::to_string(&RecordState::DeliveryFailed).unwrap();
        assert_eq!(json, format!("\"{}\"", RecordState::DeliveryFailed));
    }

    #[tokio::test]
    async fn box_future_is_awaitable() {
        let fut: BoxFuture<'_, u32> = Box::pin(async { 7 });
        assert_eq!(fut.await, 7);
    }
}
