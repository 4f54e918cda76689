//! `geoip_enrich` -- IP 필드를 조회해 위치 정보를 붙입니다.
//!
//! 조회 결과는 엔진 인스턴스가 소유하는 상한 있는 캐시([`moka::future::Cache`])에
//! IP 주소를 키로 저장됩니다. 성공한 조회만 캐시합니다.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use logroute_core::pipeline::BoxFuture;
use logroute_core::record::{self, Record};

use super::{TransformContext, Transformer};
use crate::error::RouterError;
use crate::rule::TransformStep;

/// 기본 기록 키
pub const DEFAULT_GEO_KEY: &str = "_geo";

/// 위치 정보
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoRecord {
    /// 국가 이름
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// ISO 국가 코드
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    /// 도시
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// 위도
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    /// 경도
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

/// GeoIP 조회 trait
pub trait GeoIpLookup: Send + Sync {
    /// IP 주소 하나를 조회합니다.
    fn lookup(&self, ip: &str) -> impl Future<Output = Result<GeoRecord, RouterError>> + Send;
}

/// dyn-compatible GeoIP 조회 trait
pub trait DynGeoIpLookup: Send + Sync {
    /// IP 주소 하나를 조회합니다.
    fn lookup<'a>(&'a self, ip: &'a str) -> BoxFuture<'a, Result<GeoRecord, RouterError>>;
}

impl<T: GeoIpLookup> DynGeoIpLookup for T {
    fn lookup<'a>(&'a self, ip: &'a str) -> BoxFuture<'a, Result<GeoRecord, RouterError>> {
        Box::pin(GeoIpLookup::lookup(self, ip))
    }
}

/// 메모리 내 고정 테이블 조회기
#[derive(Debug, Clone, Default)]
pub struct GeoIpTable {
    entries: HashMap<String, GeoRecord>,
}

impl GeoIpTable {
    /// 테이블을 생성합니다.
    pub fn new(entries: HashMap<String, GeoRecord>) -> Self {
        Self { entries }
    }

    /// `{"1.2.3.4": {"country": "..."}, ...}` 형식의 JSON에서 테이블을 만듭니다.
    pub fn from_json(content: &str) -> Result<Self, RouterError> {
        let entries = serde_json::from_str(content).map_err(|e| RouterError::Config {
            field: "geoip".to_owned(),
            reason: format!("invalid GeoIP table: {e}"),
        })?;
        Ok(Self { entries })
    }

    /// 항목 수
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 비어있는지 여부
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl GeoIpLookup for GeoIpTable {
    fn lookup(&self, ip: &str) -> impl Future<Output = Result<GeoRecord, RouterError>> + Send {
        let result = self
            .entries
            .get(ip)
            .cloned()
            .ok_or_else(|| RouterError::Lookup(format!("no GeoIP entry for {ip}")));
        std::future::ready(result)
    }
}

#[derive(Deserialize)]
struct Params {
    #[serde(alias = "field")]
    ip_field: String,
    #[serde(default = "default_target")]
    target_field: String,
}

fn default_target() -> String {
    DEFAULT_GEO_KEY.to_owned()
}

/// GeoIP 보강
///
/// 조회기가 없거나 필드가 비어있으면 레코드를 그대로 반환합니다.
/// 조회 실패는 에러로 반환되어 파이프라인이 단계를 건너뜁니다.
pub struct GeoIpEnrich {
    lookup: Option<Arc<dyn DynGeoIpLookup>>,
    cache: moka::future::Cache<String, GeoRecord>,
}

impl GeoIpEnrich {
    /// 조회기와 캐시 용량으로 변환기를 생성합니다.
    pub fn new(lookup: Option<Arc<dyn DynGeoIpLookup>>, cache_capacity: u64) -> Self {
        Self {
            lookup,
            cache: moka::future::Cache::builder()
                .max_capacity(cache_capacity)
                .build(),
        }
    }

    async fn enrich(
        &self,
        mut record: Record,
        step: &TransformStep,
        ctx: &mut TransformContext,
    ) -> Result<Record, RouterError> {
        let params: Params = step.params()?;
        let Some(lookup) = &self.lookup else {
            debug!("no GeoIP lookup configured, skipping enrichment");
            return Ok(record);
        };

        let ip = match record::get_path(&record, &params.ip_field) {
            Some(Value::String(ip)) if !ip.is_empty() => ip.clone(),
            _ => return Ok(record),
        };

        let geo = match self.cache.get(&ip).await {
            Some(hit) => {
                ctx.scratch
                    .insert("geoip_cache_hit".to_owned(), Value::Bool(true));
                hit
            }
            // 같은 IP의 동시 조회는 하나로 합쳐지고 실패는 캐시되지 않음
            None => self
                .cache
                .try_get_with(ip.clone(), async { lookup.lookup(&ip).await })
                .await
                .map_err(|e: Arc<RouterError>| RouterError::Lookup(e.to_string()))?,
        };

        let value = serde_json::to_value(geo)
            .map_err(|e| RouterError::transform(&step.kind, e.to_string()))?;
        record::set_path(&mut record, &params.target_field, value);
        Ok(record)
    }
}

impl Transformer for GeoIpEnrich {
    fn name(&self) -> &str {
        "geoip_enrich"
    }

    fn apply(
        &self,
        record: Record,
        step: &TransformStep,
        ctx: &mut TransformContext,
    ) -> impl Future<Output = Result<Record, RouterError>> + Send {
        self.enrich(record, step, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{Destination, RoutingRule};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingLookup {
        calls: AtomicU32,
    }

    impl GeoIpLookup for CountingLookup {
        fn lookup(&self, ip: &str) -> impl Future<Output = Result<GeoRecord, RouterError>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = if ip.starts_with("10.") {
                Err(RouterError::Lookup("private address".to_owned()))
            } else {
                Ok(GeoRecord {
                    country: Some("Korea".to_owned()),
                    country_code: Some("KR".to_owned()),
                    city: Some("Seoul".to_owned()),
                    ..Default::default()
                })
            };
            std::future::ready(result)
        }
    }

    fn ctx() -> TransformContext {
        let rule = RoutingRule {
            name: "geo".to_owned(),
            conditions: vec![],
            transformations: vec![],
            destination: Destination::new("d"),
            priority: 0,
            enabled: true,
            metadata: Default::default(),
        };
        TransformContext::new(Record::new(), Arc::new(rule))
    }

    fn record(ip: &str) -> Record {
        json!({"src": ip}).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn lookup_writes_geo_key_and_caches() {
        let lookup = Arc::new(CountingLookup {
            calls: AtomicU32::new(0),
        });
        let enricher = GeoIpEnrich::new(Some(lookup.clone()), 100);
        let step = TransformStep::new("geoip_enrich").with("ip_field", "src");

        let mut c = ctx();
        let out = enricher.enrich(record("1.1.1.1"), &step, &mut c).await.unwrap();
        assert_eq!(out["_geo"]["country_code"], json!("KR"));
        assert!(out["_geo"].get("latitude").is_none());

        let mut c = ctx();
        enricher.enrich(record("1.1.1.1"), &step, &mut c).await.unwrap();
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
        assert_eq!(c.scratch.get("geoip_cache_hit"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn failed_lookup_is_error_and_not_cached() {
        let lookup = Arc::new(CountingLookup {
            calls: AtomicU32::new(0),
        });
        let enricher = GeoIpEnrich::new(Some(lookup.clone()), 100);
        let step = TransformStep::new("geoip_enrich").with("ip_field", "src");

        for _ in 0..2 {
            let mut c = ctx();
            assert!(enricher.enrich(record("10.0.0.1"), &step, &mut c).await.is_err());
        }
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 2);
    }

    struct SlowLookup {
        calls: AtomicU32,
    }

    impl GeoIpLookup for SlowLookup {
        fn lookup(&self, _ip: &str) -> impl Future<Output = Result<GeoRecord, RouterError>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                Ok(GeoRecord {
                    country_code: Some("KR".to_owned()),
                    ..Default::default()
                })
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_share_one_lookup() {
        let lookup = Arc::new(SlowLookup {
            calls: AtomicU32::new(0),
        });
        let enricher = Arc::new(GeoIpEnrich::new(Some(lookup.clone()), 100));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let enricher = Arc::clone(&enricher);
            handles.push(tokio::spawn(async move {
                let step = TransformStep::new("geoip_enrich").with("ip_field", "src");
                let mut c = ctx();
                enricher.enrich(record("1.2.3.4"), &step, &mut c).await
            }));
        }
        for handle in handles {
            let out = handle.await.unwrap().unwrap();
            assert_eq!(out["_geo"]["country_code"], json!("KR"));
        }
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn without_lookup_record_is_unchanged() {
        let enricher = GeoIpEnrich::new(None, 10);
        let step = TransformStep::new("geoip_enrich").with("ip_field", "src");
        let mut c = ctx();
        let out = enricher.enrich(record("1.1.1.1"), &step, &mut c).await.unwrap();
        assert_eq!(out, record("1.1.1.1"));
    }

    #[tokio::test]
    async fn table_lookup() {
        let table = GeoIpTable::from_json(r#"{"8.8.8.8": {"country": "US", "city": "Mountain View"}}"#)
            .unwrap();
        assert_eq!(table.len(), 1);
        let geo = GeoIpLookup::lookup(&table, "8.8.8.8").await.unwrap();
        assert_eq!(geo.city.as_deref(), Some("Mountain View"));
        assert!(GeoIpLookup::lookup(&table, "9.9.9.9").await.is_err());
    }
}
