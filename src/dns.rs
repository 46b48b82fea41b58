//! DNS record lookups for the diagnostics API.

use hickory_resolver::{
    config::{ResolverConfig, ResolverOpts},
    error::ResolveError,
    proto::rr::{RData, RecordType},
    TokioAsyncResolver,
};
use serde::Serialize;
use tracing::debug;

use crate::error::{LookupError, LookupResult};
use crate::normalize::clean_domain;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MxRecord {
    pub exchange: String,
    pub priority: u16,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SoaRecord {
    pub nsname: String,
    pub hostmaster: String,
    pub serial: u32,
    pub refresh: i32,
    pub retry: i32,
    pub expire: i32,
    pub minttl: u32,
}

/// Records per type. A type whose lookup failed (including "no records") is `None`.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct DnsRecords {
    #[serde(rename = "A")]
    pub a: Option<Vec<String>>,
    #[serde(rename = "AAAA")]
    pub aaaa: Option<Vec<String>>,
    #[serde(rename = "MX")]
    pub mx: Option<Vec<MxRecord>>,
    #[serde(rename = "NS")]
    pub ns: Option<Vec<String>>,
    #[serde(rename = "TXT")]
    pub txt: Option<Vec<Vec<String>>>,
    #[serde(rename = "CNAME")]
    pub cname: Option<Vec<String>>,
    #[serde(rename = "SOA")]
    pub soa: Option<SoaRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DnsReport {
    pub domain: String,
    pub records: DnsRecords,
}

/// Build a resolver from the system configuration, falling back to Cloudflare.
pub fn system_resolver() -> TokioAsyncResolver {
    TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|_| {
        TokioAsyncResolver::tokio(ResolverConfig::cloudflare_tls(), ResolverOpts::default())
    })
}

/// Query A, AAAA, MX, NS, TXT, CNAME and SOA for a domain concurrently.
pub async fn lookup_all(resolver: &TokioAsyncResolver, raw: &str) -> LookupResult<DnsReport> {
    let domain =
        clean_domain(raw).ok_or_else(|| LookupError::InvalidInput("invalid domain".into()))?;
    let name = domain.as_str();

    let (a, aaaa, mx, ns, txt, cname, soa) = tokio::join!(
        resolver.ipv4_lookup(name),
        resolver.ipv6_lookup(name),
        resolver.mx_lookup(name),
        resolver.ns_lookup(name),
        resolver.txt_lookup(name),
        resolver.lookup(name, RecordType::CNAME),
        resolver.soa_lookup(name),
    );

    let records = DnsRecords {
        a: found(name, "A", a).map(|l| l.iter().map(|r| r.to_string()).collect()),
        aaaa: found(name, "AAAA", aaaa).map(|l| l.iter().map(|r| r.to_string()).collect()),
        mx: found(name, "MX", mx).map(|l| {
            l.iter()
                .map(|r| MxRecord {
                    exchange: trim_root(&r.exchange().to_string()),
                    priority: r.preference(),
                })
                .collect()
        }),
        ns: found(name, "NS", ns).map(|l| l.iter().map(|r| trim_root(&r.to_string())).collect()),
        txt: found(name, "TXT", txt).map(|l| {
            l.iter()
                .map(|r| {
                    r.txt_data()
                        .iter()
                        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
                        .collect()
                })
                .collect()
        }),
        cname: found(name, "CNAME", cname).and_then(|l| {
            let names: Vec<String> = l
                .iter()
                .filter_map(|rdata| match rdata {
                    RData::CNAME(target) => Some(trim_root(&target.0.to_string())),
                    _ => None,
                })
                .collect();
            (!names.is_empty()).then_some(names)
        }),
        soa: found(name, "SOA", soa).and_then(|l| {
            l.iter().next().map(|s| SoaRecord {
                nsname: trim_root(&s.mname().to_string()),
                hostmaster: trim_root(&s.rname().to_string()),
                serial: s.serial(),
                refresh: s.refresh(),
                retry: s.retry(),
                expire: s.expire(),
                minttl: s.minimum(),
            })
        }),
    };

    Ok(DnsReport { domain, records })
}

fn found<T>(domain: &str, kind: &str, res: Result<T, ResolveError>) -> Option<T> {
    match res {
        Ok(v) => Some(v),
        Err(e) => {
            debug!(domain, kind, error = %e, "record lookup failed");
            None
        }
    }
}

/// Drop the trailing root dot hickory prints on fully qualified names.
fn trim_root(name: &str) -> String {
    name.strip_suffix('.').unwrap_or(name).to_string()
}
