//! `ip_anonymize` -- 주소의 하위 비트를 지워 네트워크 접두사만 남깁니다.

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use logroute_core::record::{self, Record};

use super::{TransformContext, Transformer};
use crate::error::RouterError;
use crate::rule::TransformStep;

#[derive(Deserialize)]
struct Params {
    #[serde(default)]
    fields: Vec<String>,
    #[serde(default)]
    field: Option<String>,
}

/// IP 익명화
///
/// IPv4는 마지막 옥텟, IPv6는 하위 64비트를 0으로 만듭니다.
/// 주소로 해석되지 않는 값은 건너뜁니다.
pub struct IpAnonymize;

impl IpAnonymize {
    fn anonymize(mut record: Record, step: &TransformStep) -> Result<Record, RouterError> {
        let params: Params = step.params()?;
        let fields: Vec<&str> = params
            .fields
            .iter()
            .map(String::as_str)
            .chain(params.field.as_deref())
            .collect();
        if fields.is_empty() {
            return Err(RouterError::transform(&step.kind, "no fields given"));
        }

        for field in fields {
            let Some(Value::String(raw)) = record::get_path(&record, field) else {
                continue;
            };
            match raw.trim().parse::<IpAddr>() {
                Ok(ip) => {
                    let masked = anonymize_ip(ip).to_string();
                    record::set_path(&mut record, field, Value::String(masked));
                }
                Err(_) => debug!(field, "value is not an IP address, skipping"),
            }
        }
        Ok(record)
    }
}

/// 주소의 호스트 부분을 0으로 만듭니다.
pub fn anonymize_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(v4) => IpAddr::V4(Ipv4Addr::from(u32::from(v4) & 0xFFFF_FF00)),
        IpAddr::V6(v6) => IpAddr::V6(Ipv6Addr::from(
            u128::from(v6) & 0xFFFF_FFFF_FFFF_FFFF_0000_0000_0000_0000,
        )),
    }
}

impl Transformer for IpAnonymize {
    fn name(&self) -> &str {
        "ip_anonymize"
    }

    fn apply(
        &self,
        record: Record,
        step: &TransformStep,
        _ctx: &mut TransformContext,
    ) -> impl Future<Output = Result<Record, RouterError>> + Send {
        std::future::ready(Self::anonymize(record, step))
    }
}
