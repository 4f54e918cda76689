//! 변환기 레지스트리 -- 이름으로 찾는 변환 핸들러 집합
//!
//! 각 변환은 [`Transformer`]를 구현하고 타입 키로 [`TransformerRegistry`]에 등록됩니다.
//! 규칙의 변환 단계는 `type` 키로 핸들러를 찾으며, 등록되지 않은 키는
//! [`Handler::NoOp`]으로 해석되어 레코드를 그대로 통과시킵니다.
//!
//! # 내장 변환
//! | 키 | 별칭 |
//! |---|---|
//! | `rename` | `field_rename` |
//! | `mask` | `field_mask` |
//! | `extract` | `field_extract`, `regex_extract`, `regex_extract_all` (all 모드) |
//! | `aggregate` | `combine`, `field_combine`, `field_aggregate` |
//! | `value_map` | |
//! | `timestamp_normalize` | `timestamp_convert` |
//! | `geoip_enrich` | |
//! | `encrypt` | `field_encrypt` |
//! | `ip_anonymize` | |
//! | `add_field`, `remove_field`, `json_flatten`, `json_structure` | |

pub mod aggregate;
pub mod anonymize;
pub mod context;
pub mod encrypt;
pub mod extract;
pub mod geoip;
pub mod mask;
pub mod pipeline;
pub mod rename;
pub mod structure;
pub mod timestamp;
pub mod value_map;

pub use context::TransformContext;
pub use encrypt::{FieldCipher, KeyProvider, StaticKey};
pub use geoip::{DynGeoIpLookup, GeoIpLookup, GeoIpTable, GeoRecord};
pub use pipeline::TransformPipeline;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use regex::Regex;

use logroute_core::pipeline::BoxFuture;
use logroute_core::record::Record;

use crate::error::RouterError;
use crate::rule::TransformStep;

/// 변환기 trait
///
/// 작업 레코드를 소유권으로 받아 새 레코드를 반환합니다. 실패하면 파이프라인이
/// 해당 단계를 건너뛰고 직전 레코드를 다음 단계로 넘깁니다.
pub trait Transformer: Send + Sync {
    /// 레지스트리 키
    fn name(&self) -> &str;

    /// 단계를 적용합니다.
    fn apply(
        &self,
        record: Record,
        step: &TransformStep,
        ctx: &mut TransformContext,
    ) -> impl Future<Output = Result<Record, RouterError>> + Send;
}

/// dyn-compatible 변환기 trait
///
/// `Transformer`는 RPITIT를 사용하므로 `dyn Transformer`가 불가능합니다.
/// 레지스트리는 `Arc<dyn DynTransformer>`로 핸들러를 보관합니다.
pub trait DynTransformer: Send + Sync {
    /// 레지스트리 키
    fn name(&self) -> &str;

    /// 단계를 적용합니다.
    fn apply<'a>(
        &'a self,
        record: Record,
        step: &'a TransformStep,
        ctx: &'a mut TransformContext,
    ) -> BoxFuture<'a, Result<Record, RouterError>>;
}

impl<T: Transformer> DynTransformer for T {
    fn name(&self) -> &str {
        Transformer::name(self)
    }

    fn apply<'a>(
        &'a self,
        record: Record,
        step: &'a TransformStep,
        ctx: &'a mut TransformContext,
    ) -> BoxFuture<'a, Result<Record, RouterError>> {
        Box::pin(Transformer::apply(self, record, step, ctx))
    }
}

/// 레지스트리 조회 결과
pub enum Handler<'a> {
    /// 등록된 핸들러
    Registered(&'a dyn DynTransformer),
    /// 등록되지 않은 키. 레코드를 그대로 통과시킵니다.
    NoOp,
}

/// 변환기 레지스트리
///
/// 시작 시 채워지고 이후 읽기 전용으로 여러 레코드 태스크가 공유합니다.
#[derive(Default)]
pub struct TransformerRegistry {
    handlers: HashMap<String, Arc<dyn DynTransformer>>,
}

impl TransformerRegistry {
    /// 빈 레지스트리를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 내장 변환과 별칭을 모두 등록한 레지스트리를 생성합니다.
    pub fn with_builtins(options: BuiltinOptions) -> Self {
        let regexes = RegexCache::new(options.regex_cache_capacity);
        let mut registry = Self::new();

        registry.register(rename::Rename);
        registry.register(mask::Mask::new(regexes.clone()));
        registry.register(extract::Extract::new(regexes.clone()));
        registry.register_as("regex_extract_all", extract::Extract::all(regexes));
        registry.register(aggregate::Aggregate);
        registry.register(value_map::ValueMap);
        registry.register(timestamp::TimestampNormalize);
        registry.register(geoip::GeoIpEnrich::new(
            options.geoip,
            options.geoip_cache_capacity,
        ));
        registry.register(encrypt::Encrypt::new(options.key_provider));
        registry.register(anonymize::IpAnonymize);
        registry.register(structure::AddField);
        registry.register(structure::RemoveField);
        registry.register(structure::JsonFlatten);
        registry.register(structure::JsonStructure);

        for (alias, target) in BUILTIN_ALIASES {
            registry.alias(alias, target);
        }

        registry
    }

    /// 변환기를 자신의 이름으로 등록합니다. 같은 이름은 덮어씁니다.
    pub fn register<T: Transformer + 'static>(&mut self, transformer: T) {
        let name = Transformer::name(&transformer).to_owned();
        self.handlers.insert(name, Arc::new(transformer));
    }

    /// 변환기를 지정한 키로 등록합니다.
    pub fn register_as<T: Transformer + 'static>(&mut self, key: &str, transformer: T) {
        self.handlers.insert(key.to_owned(), Arc::new(transformer));
    }

    /// 기존 키의 핸들러를 다른 키로도 찾을 수 있게 합니다.
    ///
    /// 대상이 없으면 `false`를 반환합니다.
    pub fn alias(&mut self, alias: &str, target: &str) -> bool {
        match self.handlers.get(target).cloned() {
            Some(handler) => {
                self.handlers.insert(alias.to_owned(), handler);
                true
            }
            None => false,
        }
    }

    /// 타입 키로 핸들러를 찾습니다.
    pub fn lookup(&self, kind: &str) -> Handler<'_> {
        match self.handlers.get(kind) {
            Some(handler) => Handler::Registered(handler.as_ref()),
            None => Handler::NoOp,
        }
    }

    /// 키가 등록되어 있는지 여부
    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// 등록된 키 목록 (정렬됨)
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

const BUILTIN_ALIASES: &[(&str, &str)] = &[
    ("field_rename", "rename"),
    ("field_mask", "mask"),
    ("field_extract", "extract"),
    ("regex_extract", "extract"),
    ("combine", "aggregate"),
    ("field_combine", "aggregate"),
    ("field_aggregate", "aggregate"),
    ("timestamp_convert", "timestamp_normalize"),
    ("field_encrypt", "encrypt"),
];

/// 내장 변환 구성 옵션
pub struct BuiltinOptions {
    /// GeoIP 조회기. 없으면 `geoip_enrich`는 레코드를 바꾸지 않습니다.
    pub geoip: Option<Arc<dyn DynGeoIpLookup>>,
    /// GeoIP 캐시 최대 항목 수
    pub geoip_cache_capacity: u64,
    /// 암호화 키 제공자. 없거나 키가 없으면 `encrypt`는 no-op입니다.
    pub key_provider: Option<Arc<dyn KeyProvider>>,
    /// 단계 파라미터 정규식 캐시 최대 항목 수
    pub regex_cache_capacity: u64,
}

impl Default for BuiltinOptions {
    fn default() -> Self {
        Self {
            geoip: None,
            geoip_cache_capacity: 10_000,
            key_provider: None,
            regex_cache_capacity: 1_000,
        }
    }
}

/// 단계 파라미터로 전달된 정규식의 컴파일 캐시
///
/// 같은 패턴을 레코드마다 다시 컴파일하지 않도록 변환기들이 공유합니다.
#[derive(Clone)]
pub struct RegexCache {
    cache: moka::sync::Cache<String, Arc<Regex>>,
}

impl RegexCache {
    /// 최대 항목 수를 지정해 캐시를 생성합니다.
    pub fn new(capacity: u64) -> Self {
        Self {
            cache: moka::sync::Cache::builder().max_capacity(capacity).build(),
        }
    }

    /// 캐시된 정규식을 반환하거나 컴파일해 저장합니다.
    pub fn get(&self, pattern: &str) -> Result<Arc<Regex>, RouterError> {
        if let Some(regex) = self.cache.get(pattern) {
            return Ok(regex);
        }
        let regex = Arc::new(Regex::new(pattern)?);
        self.cache.insert(pattern.to_owned(), Arc::clone(&regex));
        Ok(regex)
    }
}
