use serde::Deserialize;
use serde_json::Value;

use crate::error::{ScanError, ScanResult};
use crate::types::ScanPlan;

/// Largest allowed `end - start`, i.e. at most 201 ports per scan.
pub const MAX_RANGE_SPAN: i64 = 200;
pub const DEFAULT_START_PORT: i64 = 1;
pub const DEFAULT_END_PORT: i64 = 1024;
/// Upper bound on domain input accepted by DNS and WHOIS lookups.
pub const MAX_DOMAIN_LEN: usize = 255;

/// Scan request as it arrives over the wire. Ports may be numbers or strings.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawScanRequest {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub start_port: Option<Value>,
    #[serde(default)]
    pub end_port: Option<Value>,
}

/// Turn raw input into a scan plan: clean the host, parse ports leniently and clamp the range.
pub fn normalize_request(req: &RawScanRequest) -> ScanResult<ScanPlan> {
    let host = clean_host(req.host.as_deref().unwrap_or(""))?;
    let start = req.start_port.as_ref().and_then(port_value);
    let end = req.end_port.as_ref().and_then(port_value);
    let (start_port, end_port) = clamp_range(start, end)?;
    Ok(ScanPlan {
        host,
        start_port,
        end_port,
    })
}

/// Apply defaults and clamping to a requested port range.
///
/// Missing or zero values fall back to `1` / `1024`. A span wider than
/// [`MAX_RANGE_SPAN`] is cut to `start + 200`; afterwards `start` is raised
/// to 1 and `end` lowered to 65535. An empty resulting range is rejected.
pub fn clamp_range(start: Option<i64>, end: Option<i64>) -> ScanResult<(u16, u16)> {
    let start = start.filter(|&v| v != 0).unwrap_or(DEFAULT_START_PORT);
    let mut end = end.filter(|&v| v != 0).unwrap_or(DEFAULT_END_PORT);

    if end.saturating_sub(start) > MAX_RANGE_SPAN {
        end = start.saturating_add(MAX_RANGE_SPAN);
    }
    let start = start.max(1);
    let end = end.min(i64::from(u16::MAX));

    if start > end {
        return Err(ScanError::InvalidInput(format!(
            "empty port range {start}-{end}"
        )));
    }
    let start = u16::try_from(start)
        .map_err(|_| ScanError::InvalidInput(format!("start port out of range: {start}")))?;
    let end = u16::try_from(end)
        .map_err(|_| ScanError::InvalidInput(format!("end port out of range: {end}")))?;
    Ok((start, end))
}

/// Strip scheme, userinfo, path/query and port suffix from a host string.
///
/// `https://example.com:443/path` becomes `example.com`; `[::1]:80` becomes `::1`.
pub fn clean_host(raw: &str) -> ScanResult<String> {
    let s = cut_path(strip_scheme(raw.trim()));
    let s = s.rsplit_once('@').map_or(s, |(_, h)| h);

    let host = if let Some(rest) = s.strip_prefix('[') {
        rest.split_once(']').map_or(rest, |(inner, _)| inner)
    } else if s.matches(':').count() > 1 {
        // bare IPv6 literal
        s
    } else {
        s.split_once(':').map_or(s, |(h, _)| h)
    };

    let host = host.trim();
    if host.is_empty() {
        return Err(ScanError::InvalidInput("host is required".into()));
    }
    Ok(host.to_string())
}

/// Strip scheme and path from a domain for DNS / WHOIS lookups. The port suffix is left alone.
pub fn clean_domain(raw: &str) -> Option<String> {
    if raw.len() > MAX_DOMAIN_LEN {
        return None;
    }
    let d = cut_path(strip_scheme(raw.trim())).trim();
    (!d.is_empty()).then(|| d.to_string())
}

fn strip_scheme(s: &str) -> &str {
    match s.split_once("://") {
        Some((scheme, rest))
            if !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) =>
        {
            rest
        }
        _ => s,
    }
}

fn cut_path(s: &str) -> &str {
    s.find(['/', '?', '#']).map_or(s, |idx| &s[..idx])
}

/// Read a port field the way a browser form submits it: a JSON number or a string
/// whose leading integer counts (`"80abc"` is 80, `"12.7"` is 12).
fn port_value(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => leading_int(s),
        _ => None,
    }
}

fn leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let digits = &digits[..end];
    if digits.is_empty() {
        return None;
    }
    let magnitude = digits.parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}
