//! 라우팅 엔진 -- 매칭, 변환, 그룹핑, 전송, 메트릭을 묶는 오케스트레이터
//!
//! # 배치 처리 흐름
//! ```text
//! records ─┬─ RecordTask (match → transform → enrich) ─┐
//!          ├─ RecordTask ...                           ├─ join barrier ─ group by destination ─ Dispatcher ─ metrics
//!          └─ RecordTask ...                           ┘
//! ```
//!
//! 레코드 태스크는 [`JoinSet`]에서 동시에 실행되며 동시 실행 수는 세마포어로 제한됩니다.
//! 한 레코드의 실패는 그 레코드만 폐기하고 형제 태스크를 취소하지 않습니다.
//! 배치 타임아웃이 설정되면 기한 안에 끝나지 않은 태스크는 중단되고 폐기로 집계됩니다.
//!
//! 목적지별 레코드 순서는 태스크 완료 순서이며 입력 순서를 보장하지 않습니다.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use logroute_core::metrics as m;
use logroute_core::pipeline::RecordState;
use logroute_core::record::Record;

use crate::config::RouterConfig;
use crate::dispatch::{DispatchReport, Dispatcher, DynSink, Sink};
use crate::error::RouterError;
use crate::metrics::{MetricsCollector, MetricsReport};
use crate::policy::{self, Stage};
use crate::rule::RuleSet;
use crate::transform::{
    BuiltinOptions, DynGeoIpLookup, KeyProvider, TransformContext, TransformPipeline,
    TransformerRegistry,
};

/// 배치 하나의 처리 결과
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// 배치 식별자 (로그 span과 동일)
    pub batch_id: Uuid,
    /// 입력 레코드 수
    pub received: usize,
    /// 규칙에 매칭되지 않은 레코드 수
    pub unmatched: usize,
    /// 처리 실패, 태스크 패닉, 타임아웃으로 폐기된 레코드 수
    pub dropped: usize,
    /// 배치 타임아웃 발생 여부
    pub timed_out: bool,
    /// 목적지별 전송 결과
    pub dispatch: DispatchReport,
}

impl BatchOutcome {
    /// 목적지별로 전송에 성공한 레코드
    pub fn delivered(&self) -> HashMap<&str, &[Record]> {
        self.dispatch
            .outcomes
            .iter()
            .filter(|o| o.is_delivered())
            .map(|o| (o.destination.as_str(), o.records.as_slice()))
            .collect()
    }

    /// 목적지별로 전송에 성공한 레코드 (소유권 이전)
    pub fn into_delivered(self) -> HashMap<String, Vec<Record>> {
        self.dispatch
            .outcomes
            .into_iter()
            .filter(|o| o.is_delivered())
            .map(|o| (o.destination, o.records))
            .collect()
    }

    /// 전송에 성공한 레코드 수
    pub fn delivered_count(&self) -> usize {
        self.dispatch.delivered_count()
    }

    /// 전송에 실패했거나 싱크가 없어 폐기된 레코드 수
    pub fn failed_count(&self) -> usize {
        self.dispatch.failed_count()
    }
}

/// 레코드 태스크 결과
enum RecordResult {
    Routed {
        rule: String,
        destination: String,
        record: Record,
        elapsed: Duration,
    },
    Unmatched,
    Dropped,
}

/// 레코드 하나를 처리하는 태스크
struct RecordTask {
    record: Record,
    rules: Arc<RuleSet>,
    pipeline: TransformPipeline,
    metrics: Arc<MetricsCollector>,
}

impl RecordTask {
    async fn run(self, _permit: OwnedSemaphorePermit) -> RecordResult {
        let start = tokio::time::Instant::now();
        let now = Utc::now();
        let bytes = serde_json::to_vec(&self.record).map_or(0, |b| b.len());

        let Some(rule) = self.rules.find_match(&self.record) else {
            debug!(state = %RecordState::Unmatched, "record matched no rule");
            self.metrics.record_log(None, bytes, now);
            self.metrics.record_unmatched();
            return RecordResult::Unmatched;
        };

        let rule_name = rule.name().to_owned();
        let destination = rule.rule().destination_id().to_owned();
        let performance = Arc::clone(rule.performance());
        debug!(rule = %rule_name, state = %RecordState::Matched, "record matched");

        let ctx = TransformContext::new(self.record, Arc::clone(rule.rule()));
        match self.pipeline.apply_at(ctx, now).await {
            Ok(record) => {
                performance.record_processed(now);
                self.metrics.record_log(Some(&rule_name), bytes, now);
                metrics::counter!(
                    m::ROUTER_RECORDS_ROUTED_TOTAL,
                    m::LABEL_RULE => rule_name.clone()
                )
                .increment(1);
                debug!(
                    rule = %rule_name,
                    destination = %destination,
                    state = %RecordState::Enriched,
                    "record ready for dispatch"
                );
                RecordResult::Routed {
                    rule: rule_name,
                    destination,
                    record,
                    elapsed: start.elapsed(),
                }
            }
            Err(e) => {
                let recovery = policy::recover(Stage::Record, &e);
                warn!(
                    rule = %rule_name,
                    error = %e,
                    ?recovery,
                    state = %RecordState::Dropped,
                    "record processing failed"
                );
                performance.record_error();
                RecordResult::Dropped
            }
        }
    }
}

/// 라우팅 엔진
///
/// 규칙 집합은 배치 시작 시점의 스냅샷이 사용되며, [`reload_rules`](Self::reload_rules)는
/// 진행 중인 배치에 영향을 주지 않습니다.
pub struct RoutingEngine {
    config: RouterConfig,
    rules: RwLock<Arc<RuleSet>>,
    pipeline: TransformPipeline,
    dispatcher: Dispatcher,
    metrics: Arc<MetricsCollector>,
}

impl RoutingEngine {
    /// 빌더를 생성합니다.
    pub fn builder() -> RoutingEngineBuilder {
        RoutingEngineBuilder::new()
    }

    /// 현재 규칙 집합 스냅샷
    pub fn rules(&self) -> Arc<RuleSet> {
        Arc::clone(&self.rules.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// 규칙 집합을 원자적으로 교체합니다.
    pub fn reload_rules(&self, rules: RuleSet) {
        let count = rules.len();
        *self.rules.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(rules);
        info!(rules = count, "rule set reloaded");
    }

    /// 라우터 설정
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// 메트릭 수집기
    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// 디스패처
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// 설정된 기본 윈도우로 메트릭 리포트를 생성합니다.
    pub fn report(&self) -> MetricsReport {
        self.report_window(self.config.metrics_window())
    }

    /// 지정한 윈도우로 메트릭 리포트를 생성하고 규칙별 처리 카운터를 붙입니다.
    pub fn report_window(&self, window: Duration) -> MetricsReport {
        let mut report = self.metrics.report(window);
        report.rule_performance = self
            .rules()
            .rules()
            .iter()
            .map(|r| (r.name().to_owned(), r.performance().snapshot()))
            .collect();
        report
    }

    /// 레코드 하나를 라우팅합니다.
    pub async fn route(&self, record: Record) -> BatchOutcome {
        self.route_batch(vec![record]).await
    }

    /// 레코드 배치를 라우팅합니다.
    ///
    /// 이 호출은 실패하지 않습니다. 레코드 단위 실패는 로그와 결과 카운트로만 드러납니다.
    pub async fn route_batch(&self, records: Vec<Record>) -> BatchOutcome {
        let batch_id = Uuid::new_v4();
        let span = info_span!("route_batch", %batch_id, records = records.len());
        self.process_batch(batch_id, records).instrument(span).await
    }

    async fn process_batch(&self, batch_id: Uuid, records: Vec<Record>) -> BatchOutcome {
        let received = records.len();
        metrics::counter!(m::ROUTER_RECORDS_RECEIVED_TOTAL).increment(received as u64);

        let rules = self.rules();
        let semaphore = Arc::new(Semaphore::new(self.config.max_in_flight));
        let mut tasks = JoinSet::new();
        let mut results = Vec::with_capacity(received);

        let fan_out = async {
            for record in records {
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };
                let task = RecordTask {
                    record,
                    rules: Arc::clone(&rules),
                    pipeline: self.pipeline.clone(),
                    metrics: Arc::clone(&self.metrics),
                };
                tasks.spawn(task.run(permit));

                while let Some(joined) = tasks.try_join_next() {
                    results.push(joined);
                }
            }
            while let Some(joined) = tasks.join_next().await {
                results.push(joined);
            }
        };

        let timed_out = match self.config.batch_timeout() {
            Some(limit) => tokio::time::timeout(limit, fan_out).await.is_err(),
            None => {
                fan_out.await;
                false
            }
        };
        if timed_out {
            warn!(
                pending = tasks.len(),
                completed = results.len(),
                "batch timeout reached, aborting remaining record tasks"
            );
            tasks.abort_all();
        }
        drop(tasks);

        let mut unmatched = 0;
        let mut batches: HashMap<String, Vec<Record>> = HashMap::new();
        let mut samples: HashMap<String, Vec<(String, Duration)>> = HashMap::new();
        for joined in results {
            match joined {
                Ok(RecordResult::Routed {
                    rule,
                    destination,
                    record,
                    elapsed,
                }) => {
                    batches.entry(destination.clone()).or_default().push(record);
                    samples.entry(destination).or_default().push((rule, elapsed));
                }
                Ok(RecordResult::Unmatched) => unmatched += 1,
                Ok(RecordResult::Dropped) => {}
                Err(e) => warn!(error = %e, state = %RecordState::Dropped, "record task failed"),
            }
        }

        let routed: usize = batches.values().map(Vec::len).sum();
        let dropped = received - routed - unmatched;
        self.metrics.record_dropped(dropped as u64);
        debug!(
            routed,
            destinations = batches.len(),
            state = %RecordState::Grouped,
            "records grouped by destination"
        );

        let dispatch = self.dispatcher.dispatch(batches).await;

        for outcome in &dispatch.outcomes {
            if outcome.attempts > 0 {
                self.metrics
                    .record_delivery_latency(&outcome.destination, outcome.latency);
            }
            let delivered = outcome.is_delivered();
            for (rule, elapsed) in samples.remove(&outcome.destination).unwrap_or_default() {
                self.metrics
                    .record(&rule, &outcome.destination, elapsed, delivered);
            }
        }

        let outcome = BatchOutcome {
            batch_id,
            received,
            unmatched,
            dropped,
            timed_out,
            dispatch,
        };
        info!(
            received,
            delivered = outcome.delivered_count(),
            failed = outcome.failed_count(),
            unmatched,
            dropped,
            "batch routed"
        );
        outcome
    }
}

impl std::fmt::Debug for RoutingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingEngine")
            .field("config", &self.config)
            .field("rules", &self.rules().len())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

/// 라우팅 엔진 빌더
pub struct RoutingEngineBuilder {
    config: RouterConfig,
    rules: RuleSet,
    registry: Option<TransformerRegistry>,
    geoip: Option<Arc<dyn DynGeoIpLookup>>,
    key_provider: Option<Arc<dyn KeyProvider>>,
    sinks: Vec<(String, Arc<dyn DynSink>)>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl RoutingEngineBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: RouterConfig::default(),
            rules: RuleSet::empty(),
            registry: None,
            geoip: None,
            key_provider: None,
            sinks: Vec::new(),
            metrics: None,
        }
    }

    /// 라우터 설정을 지정합니다.
    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// 초기 규칙 집합을 지정합니다.
    pub fn rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    /// 변환기 레지스트리를 직접 지정합니다. 지정하면 GeoIP/키 제공자 설정은 무시됩니다.
    pub fn registry(mut self, registry: TransformerRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// `geoip_enrich`가 사용할 조회기를 지정합니다.
    pub fn geoip(mut self, lookup: Arc<dyn DynGeoIpLookup>) -> Self {
        self.geoip = Some(lookup);
        self
    }

    /// `encrypt`가 사용할 키 제공자를 지정합니다.
    pub fn key_provider(mut self, provider: Arc<dyn KeyProvider>) -> Self {
        self.key_provider = Some(provider);
        self
    }

    /// 목적지 싱크를 등록합니다.
    pub fn sink<S: Sink + 'static>(self, destination: &str, sink: S) -> Self {
        self.sink_dyn(destination, Arc::new(sink))
    }

    /// 공유 중인 목적지 싱크를 등록합니다.
    pub fn sink_dyn(mut self, destination: &str, sink: Arc<dyn DynSink>) -> Self {
        self.sinks.push((destination.to_owned(), sink));
        self
    }

    /// 외부에서 만든 메트릭 수집기를 사용합니다.
    pub fn metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// 엔진을 빌드합니다.
    ///
    /// 규칙이 참조하는 목적지에 싱크가 없으면 경고만 남깁니다.
    /// 해당 레코드는 전송 시점에 폐기됩니다.
    pub fn build(self) -> Result<RoutingEngine, RouterError> {
        self.config.validate()?;

        let registry = self.registry.unwrap_or_else(|| {
            TransformerRegistry::with_builtins(BuiltinOptions {
                geoip: self.geoip,
                geoip_cache_capacity: self.config.geoip_cache_capacity,
                key_provider: self.key_provider,
                ..BuiltinOptions::default()
            })
        });

        let mut dispatcher = Dispatcher::new(self.config.retry_policy());
        for (destination, sink) in self.sinks {
            dispatcher.register_dyn(&destination, sink);
        }
        for destination in self.rules.destinations() {
            if !dispatcher.contains(&destination) {
                warn!(destination = %destination, "no sink registered for rule destination");
            }
        }

        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(MetricsCollector::new(&self.config)));

        info!(
            rules = self.rules.len(),
            transforms = registry.kinds().len(),
            sinks = dispatcher.destinations().len(),
            max_in_flight = self.config.max_in_flight,
            "routing engine built"
        );

        Ok(RoutingEngine {
            pipeline: TransformPipeline::new(Arc::new(registry)),
            rules: RwLock::new(Arc::new(self.rules)),
            dispatcher,
            metrics,
            config: self.config,
        })
    }
}

impl Default for RoutingEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{FnSink, MemorySink};
    use crate::rule::RuleLoader;
    use serde_json::{Value, json};

    fn record(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    fn rules(defs: Value) -> RuleSet {
        let report = RuleLoader::load(defs.as_array().cloned().unwrap());
        assert!(report.rejected.is_empty(), "{:?}", report.rejected);
        report.rule_set
    }

    #[tokio::test]
    async fn routes_matched_and_counts_unmatched() {
        let sink = MemorySink::new();
        let engine = RoutingEngine::builder()
            .rules(rules(json!([{
                "name": "errors",
                "conditions": [{"field": "level", "operator": "equals", "value": "error"}],
                "destination": {"type": "errors"}
            }])))
            .sink("errors", sink.clone())
            .build()
            .unwrap();

        let outcome = engine
            .route_batch(vec![
                record(json!({"level": "error", "msg": "a"})),
                record(json!({"level": "info", "msg": "b"})),
            ])
            .await;

        assert_eq!(outcome.received, 2);
        assert_eq!(outcome.unmatched, 1);
        assert_eq!(outcome.dropped, 0);
        assert_eq!(outcome.delivered_count(), 1);
        assert_eq!(sink.records()[0]["msg"], json!("a"));
        assert_eq!(engine.metrics().unmatched(), 1);
    }

    #[tokio::test]
    async fn empty_rule_set_routes_nothing() {
        let engine = RoutingEngine::builder().build().unwrap();
        let outcome = engine.route(record(json!({"a": 1}))).await;
        assert_eq!(outcome.unmatched, 1);
        assert!(outcome.dispatch.outcomes.is_empty());
    }

    #[tokio::test]
    async fn reload_swaps_rule_set() {
        let sink = MemorySink::new();
        let engine = RoutingEngine::builder()
            .sink("all", sink.clone())
            .build()
            .unwrap();
        assert!(engine.rules().is_empty());

        engine.reload_rules(rules(json!([{"name": "all", "destination": {"type": "all"}}])));
        let outcome = engine.route(record(json!({"a": 1}))).await;

        assert_eq!(outcome.delivered_count(), 1);
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_delivery_is_reported_per_record() {
        let config = crate::config::RouterConfigBuilder::new()
            .max_retries(2)
            .base_delay(Duration::from_millis(10))
            .build()
            .unwrap();
        let engine = RoutingEngine::builder()
            .config(config)
            .rules(rules(json!([{"name": "r", "destination": {"type": "down"}}])))
            .sink(
                "down",
                FnSink::new(|_records: &[Record]| Err(RouterError::sink("down", "timeout"))),
            )
            .build()
            .unwrap();

        let outcome = engine.route(record(json!({"a": 1}))).await;
        assert_eq!(outcome.failed_count(), 1);
        assert_eq!(outcome.dispatch.get("down").unwrap().attempts, 2);

        let report = engine.report();
        assert_eq!(report.rules["r"].success_rate, 0.0);
        assert_eq!(report.rule_performance["r"].processed_logs, 1);
    }

    #[test]
    fn build_rejects_invalid_config() {
        let config = RouterConfig {
            max_in_flight: 0,
            ..RouterConfig::default()
        };
        assert!(RoutingEngine::builder().config(config).build().is_err());
    }
}
