//! 메트릭 상수 및 설명 등록
//!
//! 라우팅 엔진이 내보내는 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::histogram!()`
//! 매크로를 호출합니다. 레코더가 설치되지 않았다면 모든 호출은 no-op입니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `logroute_router_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(logroute_core::metrics::ROUTER_RECORDS_RECEIVED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 규칙 이름 레이블 키
pub const LABEL_RULE: &str = "rule";

/// 목적지 레이블 키
pub const LABEL_DESTINATION: &str = "destination";

/// 변환 이름 레이블 키
pub const LABEL_TRANSFORM: &str = "transform";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

// ─── Router 메트릭 ────────────────────────────────────────────────

/// 수신된 레코드 수 (counter)
pub const ROUTER_RECORDS_RECEIVED_TOTAL: &str = "logroute_router_records_received_total";

/// 규칙에 매칭되어 라우팅된 레코드 수 (counter, label: rule)
pub const ROUTER_RECORDS_ROUTED_TOTAL: &str = "logroute_router_records_routed_total";

/// 어떤 규칙에도 매칭되지 않은 레코드 수 (counter)
pub const ROUTER_RECORDS_UNMATCHED_TOTAL: &str = "logroute_router_records_unmatched_total";

/// 처리 중 폐기된 레코드 수 (counter)
pub const ROUTER_RECORDS_DROPPED_TOTAL: &str = "logroute_router_records_dropped_total";

/// 실패한 변환 단계 수 (counter, label: transform)
pub const ROUTER_TRANSFORM_FAILURES_TOTAL: &str = "logroute_router_transform_failures_total";

/// 목적지 전송 결과 수 (counter, labels: destination, result)
pub const ROUTER_DELIVERIES_TOTAL: &str = "logroute_router_deliveries_total";

/// 목적지 전송 재시도 수 (counter, label: destination)
pub const ROUTER_DELIVERY_RETRIES_TOTAL: &str = "logroute_router_delivery_retries_total";

/// 레코드 처리 지연 시간 (histogram, 초)
pub const ROUTER_PROCESSING_DURATION_SECONDS: &str =
    "logroute_router_processing_duration_seconds";

/// 목적지 전송 지연 시간 (histogram, 초, label: destination)
pub const ROUTER_DELIVERY_DURATION_SECONDS: &str = "logroute_router_delivery_duration_seconds";

/// 처리 지연 히스토그램 버킷 (초)
pub const PROCESSING_DURATION_BUCKETS: &[f64] = &[
    0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0,
];

/// 전송 지연 히스토그램 버킷 (초). 재시도 백오프를 포함하므로 범위가 넓습니다.
pub const DELIVERY_DURATION_BUCKETS: &[f64] = &[0.001, 0.01, 0.1, 0.5, 1.0, 2.5, 5.0, 15.0, 30.0, 60.0];

/// 정의된 모든 메트릭 이름
pub const ALL_METRIC_NAMES: &[&str] = &[
    ROUTER_RECORDS_RECEIVED_TOTAL,
    ROUTER_RECORDS_ROUTED_TOTAL,
    ROUTER_RECORDS_UNMATCHED_TOTAL,
    ROUTER_RECORDS_DROPPED_TOTAL,
    ROUTER_TRANSFORM_FAILURES_TOTAL,
    ROUTER_DELIVERIES_TOTAL,
    ROUTER_DELIVERY_RETRIES_TOTAL,
    ROUTER_PROCESSING_DURATION_SECONDS,
    ROUTER_DELIVERY_DURATION_SECONDS,
];

/// 모든 메트릭의 설명을 등록합니다.
///
/// 레코더 설치 직후 한 번 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_histogram};

    describe_counter!(
        ROUTER_RECORDS_RECEIVED_TOTAL,
        "Total number of records submitted to the routing engine"
    );
    describe_counter!(
        ROUTER_RECORDS_ROUTED_TOTAL,
        "Records that matched a routing rule, per rule"
    );
    describe_counter!(
        ROUTER_RECORDS_UNMATCHED_TOTAL,
        "Records that matched no routing rule"
    );
    describe_counter!(
        ROUTER_RECORDS_DROPPED_TOTAL,
        "Records dropped due to task failure or batch timeout"
    );
    describe_counter!(
        ROUTER_TRANSFORM_FAILURES_TOTAL,
        "Transformation steps that failed and were skipped"
    );
    describe_counter!(
        ROUTER_DELIVERIES_TOTAL,
        "Destination delivery outcomes, per destination and result"
    );
    describe_counter!(
        ROUTER_DELIVERY_RETRIES_TOTAL,
        "Delivery retries performed, per destination"
    );
    describe_histogram!(
        ROUTER_PROCESSING_DURATION_SECONDS,
        "Per-record matching and transformation latency in seconds"
    );
    describe_histogram!(
        ROUTER_DELIVERY_DURATION_SECONDS,
        "Per-destination delivery latency including retries in seconds"
    );
}
