//! 목적지 디스패처 -- 목적지별 배치를 등록된 싱크로 동시에 전송합니다.
//!
//! 목적지 하나의 전송은 [`send_with_retry`]로 감싸져 순차적으로 재시도되고,
//! 서로 다른 목적지의 전송은 [`JoinSet`]에서 동시에 실행됩니다.
//! 한 목적지의 영구 실패는 다른 목적지의 전송에 영향을 주지 않습니다.

pub mod retry;

pub use retry::{RetryOutcome, RetryPolicy, send_with_retry};

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::task::{Id, JoinSet};
use tracing::{error, info, warn};

use logroute_core::metrics as m;
use logroute_core::pipeline::BoxFuture;
use logroute_core::record::Record;

use crate::error::RouterError;

/// 목적지 싱크 trait
///
/// 레코드 배치 하나를 전달합니다. 에러를 반환하면 디스패처가 재시도합니다.
/// 프로토콜 세부사항은 모두 구현체 안에 둡니다.
pub trait Sink: Send + Sync {
    /// 배치를 전송합니다.
    fn send(&self, records: &[Record]) -> impl Future<Output = Result<(), RouterError>> + Send;
}

/// dyn-compatible 싱크 trait
///
/// [`Sink`]를 구현하면 blanket impl로 자동 구현됩니다.
pub trait DynSink: Send + Sync {
    /// 배치를 전송합니다.
    fn send<'a>(&'a self, records: &'a [Record]) -> BoxFuture<'a, Result<(), RouterError>>;
}

impl<T: Sink> DynSink for T {
    fn send<'a>(&'a self, records: &'a [Record]) -> BoxFuture<'a, Result<(), RouterError>> {
        Box::pin(Sink::send(self, records))
    }
}

/// 동기 클로저 싱크
pub struct FnSink<F>(F);

impl<F> FnSink<F>
where
    F: Fn(&[Record]) -> Result<(), RouterError> + Send + Sync,
{
    /// 클로저로 싱크를 생성합니다.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Sink for FnSink<F>
where
    F: Fn(&[Record]) -> Result<(), RouterError> + Send + Sync,
{
    fn send(&self, records: &[Record]) -> impl Future<Output = Result<(), RouterError>> + Send {
        std::future::ready((self.0)(records))
    }
}

/// 받은 레코드를 메모리에 쌓는 싱크
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<Record>>>,
}

impl MemorySink {
    /// 빈 싱크를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 지금까지 받은 레코드 복사본
    pub fn records(&self) -> Vec<Record> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 지금까지 받은 레코드 수
    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// 받은 레코드가 없는지 여부
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Sink for MemorySink {
    fn send(&self, records: &[Record]) -> impl Future<Output = Result<(), RouterError>> + Send {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(records);
        std::future::ready(Ok(()))
    }
}

/// 목적지 전송 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// 전송 성공
    Delivered,
    /// 재시도 소진 또는 포기
    Failed,
    /// 등록된 싱크 없음 (배치 폐기)
    NoSink,
}

impl DeliveryStatus {
    /// 메트릭 `result` 레이블 값
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Delivered => "success",
            Self::Failed => "failure",
            Self::NoSink => "no_sink",
        }
    }
}

/// 목적지 하나의 전송 결과
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    /// 목적지 식별자
    pub destination: String,
    /// 전송 상태
    pub status: DeliveryStatus,
    /// 이 목적지로 보내려던 레코드
    pub records: Vec<Record>,
    /// 싱크 호출 횟수
    pub attempts: u32,
    /// 마지막 에러 메시지
    pub last_error: Option<String>,
    /// 재시도 대기를 포함한 전송 소요 시간
    pub latency: Duration,
}

impl DeliveryOutcome {
    /// 첫 시도를 제외한 재시도 횟수
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }

    /// 전송 성공 여부
    pub fn is_delivered(&self) -> bool {
        self.status == DeliveryStatus::Delivered
    }
}

/// 디스패치 호출 하나의 결과 (목적지 이름 순)
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// 목적지별 결과
    pub outcomes: Vec<DeliveryOutcome>,
}

impl DispatchReport {
    /// 목적지 이름으로 결과를 찾습니다.
    pub fn get(&self, destination: &str) -> Option<&DeliveryOutcome> {
        self.outcomes.iter().find(|o| o.destination == destination)
    }

    /// 전송에 성공한 레코드 수
    pub fn delivered_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.is_delivered())
            .map(|o| o.records.len())
            .sum()
    }

    /// 전송에 실패했거나 싱크가 없어 폐기된 레코드 수
    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| !o.is_delivered())
            .map(|o| o.records.len())
            .sum()
    }
}

/// 목적지 디스패처
#[derive(Clone)]
pub struct Dispatcher {
    sinks: HashMap<String, Arc<dyn DynSink>>,
    policy: RetryPolicy,
}

impl Dispatcher {
    /// 재시도 정책으로 빈 디스패처를 생성합니다.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            sinks: HashMap::new(),
            policy,
        }
    }

    /// 싱크를 목적지 타입 키로 등록합니다. 같은 키는 교체됩니다.
    pub fn register<S: Sink + 'static>(&mut self, destination: &str, sink: S) {
        self.register_dyn(destination, Arc::new(sink));
    }

    /// 이미 공유 중인 싱크를 등록합니다.
    pub fn register_dyn(&mut self, destination: &str, sink: Arc<dyn DynSink>) {
        if self.sinks.insert(destination.to_owned(), sink).is_some() {
            warn!(destination, "sink replaced");
        }
    }

    /// 싱크 등록 여부
    pub fn contains(&self, destination: &str) -> bool {
        self.sinks.contains_key(destination)
    }

    /// 등록된 목적지 (정렬됨)
    pub fn destinations(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.sinks.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// 재시도 정책
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 목적지별 배치를 동시에 전송합니다.
    ///
    /// 이 호출은 실패하지 않습니다. 모든 결과는 [`DispatchReport`]에 담깁니다.
    pub async fn dispatch(&self, batches: HashMap<String, Vec<Record>>) -> DispatchReport {
        let mut outcomes = Vec::with_capacity(batches.len());
        let mut tasks = JoinSet::new();
        let mut pending: HashMap<Id, (String, Arc<Vec<Record>>)> = HashMap::new();

        for (destination, records) in batches {
            if records.is_empty() {
                continue;
            }

            let Some(sink) = self.sinks.get(&destination).cloned() else {
                error!(
                    destination = %destination,
                    records = records.len(),
                    "no sink registered for destination, dropping batch"
                );
                outcomes.push(DeliveryOutcome {
                    destination,
                    status: DeliveryStatus::NoSink,
                    records,
                    attempts: 0,
                    last_error: Some("no sink registered".to_owned()),
                    latency: Duration::ZERO,
                });
                continue;
            };

            let records = Arc::new(records);
            let task_records = Arc::clone(&records);
            let task_destination = destination.clone();
            let policy = self.policy.clone();
            let handle = tasks.spawn(async move {
                let start = tokio::time::Instant::now();
                let outcome =
                    send_with_retry(sink.as_ref(), &task_destination, &task_records, &policy)
                        .await;
                (outcome, start.elapsed())
            });
            pending.insert(handle.id(), (destination, records));
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, attempts, result, latency) = match joined {
                Ok((id, (outcome, latency))) => {
                    (id, outcome.attempts, outcome.result.map_err(|e| e.to_string()), latency)
                }
                Err(e) => (e.id(), 0, Err(format!("sink task failed: {e}")), Duration::ZERO),
            };
            let Some((destination, records)) = pending.remove(&id) else {
                continue;
            };
            let records = Arc::unwrap_or_clone(records);

            let outcome = match result {
                Ok(()) => {
                    info!(
                        destination = %destination,
                        records = records.len(),
                        attempts,
                        "batch delivered"
                    );
                    DeliveryOutcome {
                        destination,
                        status: DeliveryStatus::Delivered,
                        records,
                        attempts,
                        last_error: None,
                        latency,
                    }
                }
                Err(reason) => {
                    error!(
                        destination = %destination,
                        records = records.len(),
                        attempts,
                        error = %reason,
                        "batch delivery failed permanently"
                    );
                    DeliveryOutcome {
                        destination,
                        status: DeliveryStatus::Failed,
                        records,
                        attempts,
                        last_error: Some(reason),
                        latency,
                    }
                }
            };
            outcomes.push(outcome);
        }

        for outcome in &outcomes {
            metrics::counter!(
                m::ROUTER_DELIVERIES_TOTAL,
                m::LABEL_DESTINATION => outcome.destination.clone(),
                m::LABEL_RESULT => outcome.status.as_label()
            )
            .increment(1);
            metrics::histogram!(
                m::ROUTER_DELIVERY_DURATION_SECONDS,
                m::LABEL_DESTINATION => outcome.destination.clone()
            )
            .record(outcome.latency.as_secs_f64());
        }

        outcomes.sort_by(|a, b| a.destination.cmp(&b.destination));
        DispatchReport { outcomes }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("destinations", &self.destinations())
            .field("policy", &self.policy)
            .finish()
    }
}
