use serde::{Deserialize, Serialize};

/// Verdict for one probed port. Refused, timed out and unreachable all collapse to `Closed`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PortStatus {
    Open,
    Closed,
}

impl PortStatus {
    pub fn is_open(self) -> bool {
        matches!(self, PortStatus::Open)
    }
}

/// One entry of a scan report.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortProbeResult {
    pub port: u16,
    pub status: PortStatus,
    /// Well-known service label for open ports, empty otherwise.
    pub service: String,
}

/// A normalized scan request: clean host and an inclusive, capped port range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPlan {
    pub host: String,
    pub start_port: u16,
    pub end_port: u16,
}

impl ScanPlan {
    pub fn port_count(&self) -> usize {
        usize::from(self.end_port) - usize::from(self.start_port) + 1
    }

    pub fn ports(&self) -> impl Iterator<Item = u16> {
        self.start_port..=self.end_port
    }

    pub fn range_label(&self) -> String {
        format!("{}-{}", self.start_port, self.end_port)
    }
}

/// Result of a completed scan, in ascending port order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub host: String,
    /// Inclusive range label, e.g. `1-1024`.
    pub scanned: String,
    pub results: Vec<PortProbeResult>,
    pub open_ports: Vec<PortProbeResult>,
    /// RFC 3339 completion time.
    pub timestamp: String,
}

impl ScanReport {
    /// Assemble a report from verdicts laid out in port order, starting at `plan.start_port`.
    pub fn from_verdicts(plan: &ScanPlan, verdicts: &[PortStatus], timestamp: String) -> Self {
        let results: Vec<PortProbeResult> = plan
            .ports()
            .zip(verdicts.iter().copied())
            .map(|(port, status)| PortProbeResult {
                port,
                status,
                service: if status.is_open() {
                    crate::services::service_label(port).to_string()
                } else {
                    String::new()
                },
            })
            .collect();
        let open_ports = results
            .iter()
            .filter(|r| r.status.is_open())
            .cloned()
            .collect();

        Self {
            host: plan.host.clone(),
            scanned: plan.range_label(),
            results,
            open_ports,
            timestamp,
        }
    }
}
