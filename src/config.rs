use std::path::PathBuf;

use crate::scanner::ScanConfig;
use crate::{geoip, whois};

/// Runtime settings for the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub scan: ScanConfig,
    /// Directory served for every path outside `/api`.
    pub static_dir: PathBuf,
    pub geoip_endpoint: String,
    /// `host` or `host:port` of the first WHOIS server to ask.
    pub whois_server: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 3000,
            scan: ScanConfig::default(),
            static_dir: PathBuf::from("public"),
            geoip_endpoint: geoip::DEFAULT_ENDPOINT.into(),
            whois_server: whois::DEFAULT_SERVER.into(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        if self.bind.contains(':') {
            format!("[{}]:{}", self.bind, self.port)
        } else {
            format!("{}:{}", self.bind, self.port)
        }
    }
}
