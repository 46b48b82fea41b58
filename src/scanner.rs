use crate::error::{ScanError, ScanResult};
use crate::types::{PortStatus, ScanPlan, ScanReport};
use ::time::{format_description::well_known, OffsetDateTime};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(1500);

/// Tuning for the port scan engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConfig {
    /// Probes in flight at once. The next batch starts only when the current one has resolved.
    pub batch_size: usize,
    /// Bound on a single connect attempt.
    pub probe_timeout: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl ScanConfig {
    pub fn new(batch_size: usize, probe_timeout: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            probe_timeout,
        }
    }

    /// Worst-case wall clock for a scan of `port_count` ports: one probe timeout per
    /// batch, one more for resolving the host, and a tenth of a timeout for timer slack.
    pub fn deadline_for(&self, port_count: usize) -> Duration {
        let batches = port_count.div_ceil(self.batch_size.max(1)) + 1;
        self.probe_timeout
            .saturating_mul(u32::try_from(batches).unwrap_or(u32::MAX))
            .saturating_add(self.probe_timeout / 10)
    }
}

/// How a scan reaches the network: one name lookup per scan and one connect attempt per port.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Resolve the scan target. An empty list means every probe reports `Closed`.
    async fn resolve(&self, host: &str, limit: Duration) -> Vec<SocketAddr>;

    /// Verdict for one port against the resolved addresses.
    async fn dial(&self, addrs: &[SocketAddr], port: u16, limit: Duration) -> PortStatus;
}

/// TCP connect dialer backed by the OS resolver and socket API.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    async fn resolve(&self, host: &str, limit: Duration) -> Vec<SocketAddr> {
        match time::timeout(limit, tokio::net::lookup_host((host, 0))).await {
            Ok(Ok(found)) => found.collect(),
            Ok(Err(e)) => {
                warn!(host, error = %e, "name resolution failed, all ports will report closed");
                Vec::new()
            }
            Err(_) => {
                warn!(host, "name resolution timed out, all ports will report closed");
                Vec::new()
            }
        }
    }

    async fn dial(&self, addrs: &[SocketAddr], port: u16, limit: Duration) -> PortStatus {
        if addrs.is_empty() {
            return PortStatus::Closed;
        }
        let targets: Vec<SocketAddr> = addrs
            .iter()
            .map(|a| SocketAddr::new(a.ip(), port))
            .collect();

        match time::timeout(limit, TcpStream::connect(targets.as_slice())).await {
            Ok(Ok(stream)) => {
                drop(stream);
                PortStatus::Open
            }
            Ok(Err(e)) => {
                debug!(port, error = %e, "probe refused or unreachable");
                PortStatus::Closed
            }
            Err(_) => PortStatus::Closed,
        }
    }
}

/// Scan every port of the plan and build a report in ascending port order.
///
/// - Probes run in batches of `config.batch_size`; batches run strictly one after another.
/// - Each probe is a TCP connect bounded by `config.probe_timeout`. Connected means `Open`,
///   anything else (refused, timeout, unreachable, unresolvable host) means `Closed`.
/// - Connected sockets are dropped as soon as the verdict is known.
pub async fn scan(plan: &ScanPlan, config: &ScanConfig) -> ScanResult<ScanReport> {
    scan_with_cancel(plan, config, CancellationToken::new()).await
}

/// Variant that accepts a `CancellationToken`. Cancellation aborts the in-flight batch and
/// yields `ScanError::Aborted`; no partial report is produced.
pub async fn scan_with_cancel(
    plan: &ScanPlan,
    config: &ScanConfig,
    cancel: CancellationToken,
) -> ScanResult<ScanReport> {
    scan_with_dialer(plan, config, cancel, Arc::new(TcpDialer)).await
}

/// Run the batched scan with a custom [`Dialer`].
pub async fn scan_with_dialer(
    plan: &ScanPlan,
    config: &ScanConfig,
    cancel: CancellationToken,
    dialer: Arc<dyn Dialer>,
) -> ScanResult<ScanReport> {
    if cancel.is_cancelled() {
        return Err(ScanError::Aborted);
    }

    let started = Instant::now();
    let batch_size = config.batch_size.max(1);
    info!(
        host = %plan.host,
        range = %plan.range_label(),
        batch_size,
        timeout_ms = config.probe_timeout.as_millis() as u64,
        "starting port scan"
    );

    let addrs: Arc<[SocketAddr]> = tokio::select! {
        _ = cancel.cancelled() => return Err(ScanError::Aborted),
        found = dialer.resolve(&plan.host, config.probe_timeout) => found.into(),
    };
    debug!(host = %plan.host, addrs = ?addrs, "resolved scan target");

    let ports: Vec<u16> = plan.ports().collect();
    let mut verdicts = vec![PortStatus::Closed; ports.len()];

    for (batch, slots) in ports.chunks(batch_size).zip(verdicts.chunks_mut(batch_size)) {
        if cancel.is_cancelled() {
            return Err(ScanError::Aborted);
        }
        run_batch(batch, slots, &addrs, config.probe_timeout, &cancel, &dialer).await?;
    }

    let report = ScanReport::from_verdicts(plan, &verdicts, now_rfc3339());
    info!(
        host = %report.host,
        scanned = report.results.len(),
        open = report.open_ports.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "port scan finished"
    );
    Ok(report)
}

/// Probe one batch concurrently, writing each verdict into the slot at the port's position.
async fn run_batch(
    ports: &[u16],
    slots: &mut [PortStatus],
    addrs: &Arc<[SocketAddr]>,
    limit: Duration,
    cancel: &CancellationToken,
    dialer: &Arc<dyn Dialer>,
) -> ScanResult<()> {
    let mut set = JoinSet::new();
    for (idx, &port) in ports.iter().enumerate() {
        let addrs = Arc::clone(addrs);
        let dialer = Arc::clone(dialer);
        set.spawn(async move { (idx, dialer.dial(&addrs, port, limit).await) });
    }

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(in_flight = set.len(), "cancelling batch");
                set.abort_all();
                return Err(ScanError::Aborted);
            }
            joined = set.join_next() => match joined {
                Some(Ok((idx, status))) => slots[idx] = status,
                Some(Err(e)) => return Err(ScanError::Internal(e.to_string())),
                None => return Ok(()),
            },
        }
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
