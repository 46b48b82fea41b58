use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

use nettools_rs::config::ServerConfig;
use nettools_rs::error::ScanError;
use nettools_rs::normalize::clamp_range;
use nettools_rs::scanner::{self, ScanConfig};
use nettools_rs::types::{ScanPlan, ScanReport};
use nettools_rs::{geoip, normalize, server, whois};

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// nettools-rs: network diagnostics over HTTP with a bounded-rate async TCP port scanner.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "nettools-rs",
    version,
    about = "Network diagnostics over HTTP: TCP port scan, DNS, WHOIS and IP geolocation.",
    long_about = None
)]
struct Cli {
    /// Address to bind the HTTP server to.
    #[arg(long, env = "NETTOOLS_BIND", default_value = "127.0.0.1")]
    bind: String,

    /// Port for the HTTP server.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Concurrent probes per batch.
    #[arg(long = "batch-size", default_value_t = scanner::DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Per-probe connect timeout in milliseconds.
    #[arg(long = "probe-timeout-ms", default_value_t = 1500)]
    probe_timeout_ms: u64,

    /// Directory with the static UI.
    #[arg(long = "static-dir", default_value = "public")]
    static_dir: PathBuf,

    /// ip-api.com compatible geolocation endpoint.
    #[arg(long = "geoip-endpoint", default_value = geoip::DEFAULT_ENDPOINT)]
    geoip_endpoint: String,

    /// First WHOIS server to query (`host` or `host:port`).
    #[arg(long = "whois-server", default_value = whois::DEFAULT_SERVER)]
    whois_server: String,

    /// Log filter, e.g. `info` or `nettools_rs=debug`. Overrides RUST_LOG.
    #[arg(long)]
    log: Option<String>,

    /// Run a single scan against this host and exit instead of serving.
    #[arg(long)]
    scan: Option<String>,

    /// First port of the one-shot scan.
    #[arg(long, default_value_t = 1, requires = "scan", allow_negative_numbers = true)]
    start: i64,

    /// Last port of the one-shot scan (at most start + 200).
    #[arg(long, default_value_t = 1024, requires = "scan")]
    end: i64,

    /// Write the one-shot scan report as pretty JSON to this path.
    #[arg(long, requires = "scan")]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log.as_deref());

    let scan_config = ScanConfig::new(cli.batch_size, Duration::from_millis(cli.probe_timeout_ms));

    // Ctrl-C cancels whatever is running: a one-shot scan or the server.
    let shutdown = CancellationToken::new();
    let on_ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl-C, shutting down");
                on_ctrl_c.cancel();
            }
            Err(e) => warn!(error = %e, "failed to listen for Ctrl-C"),
        }
    });

    if let Some(host) = cli.scan.as_deref() {
        let (start_port, end_port) = clamp_range(Some(cli.start), Some(cli.end))?;
        let plan = ScanPlan {
            host: normalize::clean_host(host)?,
            start_port,
            end_port,
        };
        let deadline = scan_config.deadline_for(plan.port_count());
        let report = tokio::time::timeout(
            deadline,
            scanner::scan_with_cancel(&plan, &scan_config, shutdown),
        )
        .await
        .map_err(|_| ScanError::DeadlineExceeded(deadline))??;
        print_report_table(&report);
        if let Some(path) = cli.output.as_deref() {
            if let Err(e) = write_report_json(path, &report) {
                eprintln!("Failed to write JSON to {}: {}", path.display(), e);
            } else {
                println!("Wrote JSON report to {}", path.display());
            }
        }
        return Ok(());
    }

    let config = ServerConfig {
        bind: cli.bind,
        port: cli.port,
        scan: scan_config,
        static_dir: cli.static_dir,
        geoip_endpoint: cli.geoip_endpoint,
        whois_server: cli.whois_server,
    };
    info!(
        addr = %config.bind_addr(),
        batch_size = config.scan.batch_size,
        probe_timeout_ms = cli.probe_timeout_ms,
        static_dir = %config.static_dir.display(),
        "starting nettools-rs"
    );
    server::serve(config, shutdown).await
}

fn init_tracing(filter: Option<&str>) {
    let filter = match filter {
        Some(f) => EnvFilter::new(f),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn print_report_table(report: &ScanReport) {
    let port_w = 5usize.max("port".len());
    let status_w = 6usize.max("status".len());
    let mut service_w = "service".len();
    for r in &report.open_ports {
        service_w = service_w.max(r.service.len());
    }

    println!(
        "\n{}: {} open of {} scanned ({})",
        report.host,
        report.open_ports.len(),
        report.results.len(),
        report.scanned
    );
    println!(
        "{:>port_w$}  {:<status_w$}  {:<service_w$}",
        "port",
        "status",
        "service",
        port_w = port_w,
        status_w = status_w,
        service_w = service_w
    );
    println!(
        "{:-<port_w$}  {:-<status_w$}  {:-<service_w$}",
        "",
        "",
        "",
        port_w = port_w,
        status_w = status_w,
        service_w = service_w
    );
    for r in &report.open_ports {
        println!(
            "{:>port_w$}  {:<status_w$}  {:<service_w$}",
            r.port,
            "open",
            r.service,
            port_w = port_w,
            status_w = status_w,
            service_w = service_w
        );
    }
}

fn write_report_json(path: &std::path::Path, report: &ScanReport) -> anyhow::Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(())
}
