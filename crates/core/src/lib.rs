#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod record;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, LogRouteError, PipelineError};

// 설정
pub use config::LogRouteConfig;

// 파이프라인 공통 타입
pub use pipeline::{BoxFuture, RecordState};

// 레코드
pub use record::Record;
