//! 변환 파이프라인 -- 규칙의 변환 단계를 순서대로 적용하고 라우팅 메타데이터를 붙입니다.
//!
//! 단계 하나의 실패는 로그를 남기고 건너뜁니다(identity). 원본으로 되돌리지 않으므로
//! 일부 단계만 적용된 레코드가 결과가 될 수 있습니다.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use logroute_core::metrics as m;
use logroute_core::record::Record;

use super::{Handler, TransformContext, TransformerRegistry};
use crate::error::RouterError;
use crate::policy::{self, Recovery, Stage};

/// 라우팅 메타데이터가 기록되는 키
pub const METADATA_KEY: &str = "_metadata";

/// 규칙 메타데이터에서 라우팅 메타데이터로 복사되는 키
const PROPAGATED_METADATA: &[&str] = &["compliance", "classification"];

/// 변환 파이프라인
#[derive(Clone)]
pub struct TransformPipeline {
    registry: Arc<TransformerRegistry>,
}

impl TransformPipeline {
    /// 레지스트리로 파이프라인을 생성합니다.
    pub fn new(registry: Arc<TransformerRegistry>) -> Self {
        Self { registry }
    }

    /// 레지스트리
    pub fn registry(&self) -> &Arc<TransformerRegistry> {
        &self.registry
    }

    /// 변환 단계를 모두 적용한 뒤 라우팅 메타데이터를 붙여 반환합니다.
    pub async fn apply(&self, ctx: TransformContext) -> Result<Record, RouterError> {
        self.apply_at(ctx, Utc::now()).await
    }

    /// 처리 시각을 지정해 [`apply`](Self::apply)를 수행합니다.
    pub async fn apply_at(
        &self,
        mut ctx: TransformContext,
        now: DateTime<Utc>,
    ) -> Result<Record, RouterError> {
        let rule = Arc::clone(&ctx.rule);

        for step in &rule.transformations {
            let handler = match self.registry.lookup(&step.kind) {
                Handler::Registered(handler) => handler,
                Handler::NoOp => {
                    warn!(
                        rule = %rule.name,
                        transform = %step.kind,
                        "unknown transform type, passing record through"
                    );
                    continue;
                }
            };

            // 실패 시 직전 레코드를 유지하기 위해 복사본을 넘김
            let input = ctx.working.clone();
            match handler.apply(input, step, &mut ctx).await {
                Ok(output) => {
                    ctx.working = output;
                    ctx.applied.push(step.kind.clone());
                }
                Err(e) => match policy::recover(Stage::Step, &e) {
                    Recovery::Identity => {
                        warn!(
                            rule = %rule.name,
                            transform = %step.kind,
                            error = %e,
                            "transform step failed, skipping"
                        );
                        metrics::counter!(
                            m::ROUTER_TRANSFORM_FAILURES_TOTAL,
                            m::LABEL_TRANSFORM => step.kind.clone()
                        )
                        .increment(1);
                        ctx.failed.push(step.kind.clone());
                    }
                    _ => return Err(e),
                },
            }
        }

        debug!(
            rule = %rule.name,
            applied = ctx.applied.len(),
            failed = ctx.failed.len(),
            "transformations complete"
        );

        Ok(enrich(ctx, now))
    }
}

/// 라우팅 메타데이터를 `_metadata` 키에 기록합니다.
///
/// 변환 단계와 무관하게 항상 실행됩니다.
fn enrich(ctx: TransformContext, now: DateTime<Utc>) -> Record {
    let TransformContext {
        mut working,
        rule,
        applied,
        failed,
        ..
    } = ctx;

    let mut meta = Map::new();
    meta.insert("route_name".to_owned(), Value::String(rule.name.clone()));
    meta.insert(
        "routing_time".to_owned(),
        Value::String(now.to_rfc3339_opts(SecondsFormat::Micros, true)),
    );
    meta.insert(
        "transformations_applied".to_owned(),
        Value::Array(applied.into_iter().map(Value::String).collect()),
    );
    if !failed.is_empty() {
        meta.insert(
            "transformations_failed".to_owned(),
            Value::Array(failed.into_iter().map(Value::String).collect()),
        );
    }
    for key in PROPAGATED_METADATA {
        if let Some(value) = rule.metadata.get(*key) {
            meta.insert((*key).to_owned(), value.clone());
        }
    }

    working.insert(METADATA_KEY.to_owned(), Value::Object(meta));
    working
}
