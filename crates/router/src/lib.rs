#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`condition`]: 조건 연산자와 평가기
//! - [`rule`]: 규칙 타입, YAML/JSON 로더, 우선순위 매처
//! - [`transform`]: 변환기 레지스트리, 내장 변환, 변환 파이프라인
//! - [`dispatch`]: 싱크 trait, 목적지 디스패처, 지수 백오프 재시도
//! - [`metrics`]: 윈도우 리포트와 이상치 탐지
//! - [`engine`]: 배치 단위 오케스트레이터
//! - [`policy`]: 단계별 에러 복구 정책
//! - [`config`]: 라우터 설정 (core 설정 확장)
//! - [`error`]: 도메인 에러 타입

pub mod condition;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod policy;
pub mod rule;
pub mod transform;

// --- 주요 타입 re-export ---

// 엔진
pub use engine::{BatchOutcome, RoutingEngine, RoutingEngineBuilder};

// 설정
pub use config::{RouterConfig, RouterConfigBuilder};

// 에러
pub use error::RouterError;

// 규칙
pub use rule::{LoadReport, RoutingRule, RuleLoader, RuleSet, TransformStep};

// 변환
pub use transform::{
    BuiltinOptions, GeoIpTable, StaticKey, TransformPipeline, Transformer, TransformerRegistry,
};

// 전송
pub use dispatch::{
    DeliveryOutcome, DeliveryStatus, DispatchReport, Dispatcher, FnSink, MemorySink, RetryPolicy,
    Sink,
};

// 메트릭
pub use crate::metrics::{Anomaly, MetricsCollector, MetricsReport};
