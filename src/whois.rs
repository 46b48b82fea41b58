//! Minimal WHOIS client (RFC 3912) with a single referral hop.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;
use tracing::{debug, warn};

use crate::error::{LookupError, LookupResult};
use crate::normalize::clean_domain;

pub const DEFAULT_SERVER: &str = "whois.iana.org";
const WHOIS_PORT: u16 = 43;
const QUERY_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RESPONSE_BYTES: u64 = 256 * 1024;

#[derive(Debug, Clone, Serialize)]
pub struct WhoisReport {
    pub domain: String,
    /// Server that produced `raw`.
    pub server: String,
    pub data: BTreeMap<String, String>,
    pub raw: String,
}

/// Query `root_server` for `raw`, following a `refer:`/`whois:` referral once.
pub async fn lookup(root_server: &str, raw: &str) -> LookupResult<WhoisReport> {
    let domain = clean_domain(raw)
        .filter(|d| !d.chars().any(|c| c.is_whitespace() || c.is_control()))
        .ok_or_else(|| LookupError::InvalidInput("invalid domain".into()))?;

    let mut server = root_server.to_string();
    let mut text = query(&server, &domain).await?;

    if let Some(next) = referral(&text) {
        if !next.eq_ignore_ascii_case(&server) {
            match query(&next, &domain).await {
                Ok(t) => {
                    server = next;
                    text = t;
                }
                Err(e) => warn!(%domain, referral = %next, error = %e, "referral query failed"),
            }
        }
    }

    Ok(WhoisReport {
        domain,
        server,
        data: parse_fields(&text),
        raw: text,
    })
}

async fn query(server: &str, domain: &str) -> LookupResult<String> {
    debug!(server, domain, "whois query");
    let exchange = async {
        let mut stream = TcpStream::connect(server_addr(server)).await?;
        stream.write_all(format!("{domain}\r\n").as_bytes()).await?;
        let mut buf = Vec::new();
        stream.take(MAX_RESPONSE_BYTES).read_to_end(&mut buf).await?;
        Ok::<_, std::io::Error>(buf)
    };
    let buf = time::timeout(QUERY_TIMEOUT, exchange)
        .await
        .map_err(|_| LookupError::Timeout(QUERY_TIMEOUT))??;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// `host` or `host:port`; the port defaults to 43.
fn server_addr(server: &str) -> (&str, u16) {
    match server.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => match port.parse() {
            Ok(port) => (host, port),
            Err(_) => (server, WHOIS_PORT),
        },
        _ => (server, WHOIS_PORT),
    }
}

fn referral(text: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let (key, value) = line.trim().split_once(':')?;
        let key = key.trim();
        let value = value.trim();
        ((key.eq_ignore_ascii_case("refer") || key.eq_ignore_ascii_case("whois"))
            && !value.is_empty())
        .then(|| value.to_string())
    })
}

/// Collect `Key: Value` lines. Repeated keys are joined with `, `.
fn parse_fields(text: &str) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(['%', '#']) || line.starts_with(">>>") {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            continue;
        }
        out.entry(key.to_string())
            .and_modify(|v| {
                v.push_str(", ");
                v.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    out
}
