//! 메트릭 수집기 -- 규칙/목적지별 처리 이벤트와 이상치 리포트
//!
//! [`MetricsCollector`]는 처리 이벤트를 상한 있는 큐에 쌓고(가득 차면 가장 오래된
//! 이벤트를 버림), 시간 단위 버킷 카운터와 목적지별 전송 지연 샘플을 유지합니다.
//! 버킷은 메트릭 윈도우(최소 24시간)보다 오래되면 기록 시점에 지워집니다.
//! 리포트는 잠금 안에서 윈도우에 속한 이벤트만 복사한 뒤 잠금 밖에서 계산하므로
//! 기록 측은 복사 시간 동안만 대기합니다.
//!
//! 모든 기록은 `metrics` 파사드에도 함께 반영됩니다.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use logroute_core::metrics as m;

use crate::config::RouterConfig;
use crate::rule::RulePerformanceSnapshot;

/// 시간 버킷 키 형식
const BUCKET_FORMAT: &str = "%Y-%m-%d-%H";
/// 시간 버킷 최소 보관 시간
const MIN_BUCKET_RETENTION_HOURS: u64 = 24;
/// 목적지별 전송 지연 샘플 보관 수
const MAX_LATENCY_SAMPLES: usize = 1_000;

/// 처리 이벤트 하나
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricEvent {
    /// 기록 시각
    pub timestamp: DateTime<Utc>,
    /// 매칭 규칙 이름
    pub rule_name: String,
    /// 목적지 식별자
    pub destination: String,
    /// 처리 시간 (초)
    pub processing_time: f64,
    /// 성공 여부
    pub success: bool,
}

/// 시간 단위 카운터
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HourlyBucket {
    /// 처리한 레코드 수
    pub total_logs: u64,
    /// 처리한 레코드의 직렬화 크기 합
    pub total_bytes: u64,
    /// 규칙별 매칭 수
    pub rule_matches: BTreeMap<String, u64>,
}

/// 처리 시간/성공률 요약
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    /// 이벤트 수
    pub total: usize,
    /// 성공 이벤트 수
    pub successes: usize,
    /// 성공률 (%)
    pub success_rate: f64,
    /// 평균 처리 시간 (초)
    pub avg_processing_time: f64,
    /// 95 백분위 처리 시간 (초)
    pub p95_processing_time: f64,
}

impl Summary {
    fn from_events<'a>(events: impl IntoIterator<Item = &'a MetricEvent>) -> Self {
        let mut times = Vec::new();
        let mut successes = 0;
        for event in events {
            times.push(event.processing_time);
            if event.success {
                successes += 1;
            }
        }
        if times.is_empty() {
            return Self::default();
        }

        let total = times.len();
        Self {
            total,
            successes,
            success_rate: successes as f64 * 100.0 / total as f64,
            avg_processing_time: mean(&times),
            p95_processing_time: percentile(&mut times, 95.0),
        }
    }
}

/// 목적지 전송 지연 요약
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    /// 샘플 수
    pub samples: usize,
    /// 평균 (초)
    pub avg: f64,
    /// 95 백분위 (초)
    pub p95: f64,
}

/// 이상치
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Anomaly {
    /// 처리 시간이 평균 + k·표준편차를 넘은 이벤트
    HighProcessingTime {
        /// 이벤트 시각
        timestamp: DateTime<Utc>,
        /// 규칙 이름
        rule_name: String,
        /// 처리 시간 (초)
        value: f64,
        /// 기준값 (초)
        threshold: f64,
    },
    /// 성공률이 기준 미만인 규칙
    LowSuccessRate {
        /// 규칙 이름
        rule_name: String,
        /// 성공률 (%)
        value: f64,
        /// 기준값 (%)
        threshold: f64,
    },
}

/// 윈도우 리포트
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsReport {
    /// 리포트 생성 시각
    pub generated_at: DateTime<Utc>,
    /// 윈도우 길이 (초)
    pub window_secs: u64,
    /// 전체 요약
    pub summary: Summary,
    /// 규칙별 요약
    pub rules: BTreeMap<String, Summary>,
    /// 목적지별 요약
    pub destinations: BTreeMap<String, Summary>,
    /// 목적지별 전송 지연
    pub delivery_latency: BTreeMap<String, LatencySummary>,
    /// 이상치 목록
    pub anomalies: Vec<Anomaly>,
    /// 누적 unmatched 레코드 수
    pub unmatched: u64,
    /// 누적 폐기 레코드 수
    pub dropped: u64,
    /// 규칙별 처리 카운터 (엔진이 채움)
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub rule_performance: BTreeMap<String, RulePerformanceSnapshot>,
}

#[derive(Debug, Default)]
struct Store {
    events: VecDeque<MetricEvent>,
    buckets: BTreeMap<String, HourlyBucket>,
    latency: HashMap<String, VecDeque<f64>>,
}

/// 메트릭 수집기
#[derive(Debug)]
pub struct MetricsCollector {
    store: Mutex<Store>,
    unmatched: AtomicU64,
    dropped: AtomicU64,
    max_events: usize,
    bucket_retention_hours: u64,
    anomaly_stddev: f64,
    min_success_rate: f64,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(&RouterConfig::default())
    }
}

impl MetricsCollector {
    /// 라우터 설정으로 수집기를 생성합니다.
    pub fn new(config: &RouterConfig) -> Self {
        Self {
            store: Mutex::new(Store::default()),
            unmatched: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            max_events: config.metrics_max_events.max(1),
            bucket_retention_hours: config
                .metrics_window_secs
                .div_ceil(3_600)
                .max(MIN_BUCKET_RETENTION_HOURS),
            anomaly_stddev: config.anomaly_stddev,
            min_success_rate: config.min_success_rate,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 처리 이벤트 하나를 기록합니다.
    pub fn record(&self, rule: &str, destination: &str, processing_time: Duration, success: bool) {
        self.record_at(rule, destination, processing_time, success, Utc::now());
    }

    /// 시각을 지정해 처리 이벤트를 기록합니다.
    pub fn record_at(
        &self,
        rule: &str,
        destination: &str,
        processing_time: Duration,
        success: bool,
        at: DateTime<Utc>,
    ) {
        metrics::histogram!(
            m::ROUTER_PROCESSING_DURATION_SECONDS,
            m::LABEL_RULE => rule.to_owned()
        )
        .record(processing_time.as_secs_f64());

        let event = MetricEvent {
            timestamp: at,
            rule_name: rule.to_owned(),
            destination: destination.to_owned(),
            processing_time: processing_time.as_secs_f64(),
            success,
        };

        let mut store = self.lock();
        if store.events.len() >= self.max_events {
            store.events.pop_front();
        }
        store.events.push_back(event);
    }

    /// 시간 버킷에 레코드 하나를 더합니다. `rule`이 없으면 매칭 수는 늘지 않습니다.
    pub fn record_log(&self, rule: Option<&str>, bytes: usize, at: DateTime<Utc>) {
        let key = at.format(BUCKET_FORMAT).to_string();
        let cutoff = i64::try_from(self.bucket_retention_hours)
            .ok()
            .and_then(TimeDelta::try_hours)
            .and_then(|retention| at.checked_sub_signed(retention))
            .map(|oldest| oldest.format(BUCKET_FORMAT).to_string());

        let mut store = self.lock();
        if let Some(cutoff) = cutoff {
            // 키 문자열 순서가 시간 순서와 같음
            if store.buckets.first_key_value().is_some_and(|(k, _)| *k < cutoff) {
                store.buckets = store.buckets.split_off(&cutoff);
            }
        }
        let bucket = store.buckets.entry(key).or_default();
        bucket.total_logs += 1;
        bucket.total_bytes += bytes as u64;
        if let Some(rule) = rule {
            *bucket.rule_matches.entry(rule.to_owned()).or_default() += 1;
        }
    }

    /// 목적지 전송 지연 샘플을 기록합니다.
    pub fn record_delivery_latency(&self, destination: &str, latency: Duration) {
        let mut store = self.lock();
        let samples = store.latency.entry(destination.to_owned()).or_default();
        if samples.len() >= MAX_LATENCY_SAMPLES {
            samples.pop_front();
        }
        samples.push_back(latency.as_secs_f64());
    }

    /// 매칭되지 않은 레코드 하나를 기록합니다.
    pub fn record_unmatched(&self) {
        self.unmatched.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::ROUTER_RECORDS_UNMATCHED_TOTAL).increment(1);
    }

    /// 폐기된 레코드 수를 기록합니다.
    pub fn record_dropped(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.dropped.fetch_add(count, Ordering::Relaxed);
        metrics::counter!(m::ROUTER_RECORDS_DROPPED_TOTAL).increment(count);
    }

    /// 누적 unmatched 수
    pub fn unmatched(&self) -> u64 {
        self.unmatched.load(Ordering::Relaxed)
    }

    /// 누적 폐기 수
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// 보관 중인 이벤트 수
    pub fn event_count(&self) -> usize {
        self.lock().events.len()
    }

    /// 시간 버킷 스냅샷
    pub fn buckets(&self) -> BTreeMap<String, HourlyBucket> {
        self.lock().buckets.clone()
    }

    /// 최근 `window` 동안의 리포트를 생성합니다.
    pub fn report(&self, window: Duration) -> MetricsReport {
        self.report_at(window, Utc::now())
    }

    /// 기준 시각을 지정해 리포트를 생성합니다. 저장된 이벤트는 바뀌지 않습니다.
    pub fn report_at(&self, window: Duration, now: DateTime<Utc>) -> MetricsReport {
        let cutoff = TimeDelta::from_std(window)
            .ok()
            .and_then(|w| now.checked_sub_signed(w));

        let (events, latency) = {
            let store = self.lock();
            let events: Vec<MetricEvent> = store
                .events
                .iter()
                .filter(|e| cutoff.is_none_or(|c| e.timestamp >= c))
                .cloned()
                .collect();
            let latency: Vec<(String, Vec<f64>)> = store
                .latency
                .iter()
                .map(|(dest, samples)| (dest.clone(), samples.iter().copied().collect()))
                .collect();
            (events, latency)
        };

        let mut by_rule: BTreeMap<&str, Vec<&MetricEvent>> = BTreeMap::new();
        let mut by_destination: BTreeMap<&str, Vec<&MetricEvent>> = BTreeMap::new();
        for event in &events {
            by_rule.entry(event.rule_name.as_str()).or_default().push(event);
            by_destination.entry(event.destination.as_str()).or_default().push(event);
        }

        let rules: BTreeMap<String, Summary> = by_rule
            .iter()
            .map(|(rule, evs)| ((*rule).to_owned(), Summary::from_events(evs.iter().copied())))
            .collect();
        let destinations = by_destination
            .iter()
            .map(|(dest, evs)| ((*dest).to_owned(), Summary::from_events(evs.iter().copied())))
            .collect();

        let delivery_latency = latency
            .into_iter()
            .filter(|(_, samples)| !samples.is_empty())
            .map(|(dest, mut samples)| {
                let summary = LatencySummary {
                    samples: samples.len(),
                    avg: mean(&samples),
                    p95: percentile(&mut samples, 95.0),
                };
                (dest, summary)
            })
            .collect();

        let mut anomalies = self.processing_time_anomalies(&events);
        anomalies.extend(rules.iter().filter_map(|(rule, summary)| {
            (summary.total > 0 && summary.success_rate < self.min_success_rate).then(|| {
                Anomaly::LowSuccessRate {
                    rule_name: rule.clone(),
                    value: summary.success_rate,
                    threshold: self.min_success_rate,
                }
            })
        }));

        MetricsReport {
            generated_at: now,
            window_secs: window.as_secs(),
            summary: Summary::from_events(&events),
            rules,
            destinations,
            delivery_latency,
            anomalies,
            unmatched: self.unmatched(),
            dropped: self.dropped(),
            rule_performance: BTreeMap::new(),
        }
    }

    fn processing_time_anomalies(&self, events: &[MetricEvent]) -> Vec<Anomaly> {
        if events.len() < 2 {
            return Vec::new();
        }
        let times: Vec<f64> = events.iter().map(|e| e.processing_time).collect();
        let avg = mean(&times);
        let threshold = avg + self.anomaly_stddev * sample_stddev(&times, avg);

        events
            .iter()
            .filter(|e| e.processing_time > threshold)
            .map(|e| Anomaly::HighProcessingTime {
                timestamp: e.timestamp,
                rule_name: e.rule_name.clone(),
                value: e.processing_time,
                threshold,
            })
            .collect()
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn sample_stddev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

/// 선형 보간 백분위. `values`를 정렬합니다.
fn percentile(values: &mut [f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    let rank = pct / 100.0 * (values.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    values[lo] + (values[hi] - values[lo]) * (rank - lo as f64)
}
