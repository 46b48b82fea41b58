//! IP geolocation via an ip-api.com compatible JSON endpoint.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LookupError, LookupResult};

pub const DEFAULT_ENDPOINT: &str = "http://ip-api.com/json";
const FIELDS: &str =
    "status,message,country,countryCode,region,regionName,city,zip,lat,lon,timezone,isp,org,as,query";
/// Long enough for any IPv6 literal.
const MAX_QUERY_LEN: usize = 45;
const HTTP_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeoInfo {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub region_name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub isp: Option<String>,
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default, rename = "as")]
    pub asn: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
}

/// Thin client around the geolocation endpoint.
#[derive(Debug, Clone)]
pub struct GeoClient {
    http: Client,
    endpoint: String,
}

impl GeoClient {
    pub fn new(endpoint: impl Into<String>) -> LookupResult<Self> {
        let http = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    /// Look up an IP address (or hostname the upstream accepts).
    pub async fn lookup(&self, query: &str) -> LookupResult<GeoInfo> {
        let query = validate_query(query)?;
        let url = format!("{}/{}", self.endpoint, query);
        debug!(%url, "geolocation request");

        let info: GeoInfo = self
            .http
            .get(&url)
            .query(&[("fields", FIELDS)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if info.status == "fail" {
            return Err(LookupError::Rejected(
                info.message.unwrap_or_else(|| "invalid IP".into()),
            ));
        }
        Ok(info)
    }
}

/// Only characters that can appear in an IP literal or hostname, so the value is safe
/// to place in a URL path unescaped.
fn validate_query(raw: &str) -> LookupResult<&str> {
    let q = raw.trim();
    let ok = !q.is_empty()
        && q.len() <= MAX_QUERY_LEN
        && q
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | ':' | '-'));
    if ok {
        Ok(q)
    } else {
        Err(LookupError::InvalidInput("invalid IP".into()))
    }
}
