use std::time::Duration;

use ::time::{format_description::well_known, OffsetDateTime};
use serde::{Deserialize, Serialize};

/// A validated, immutable description of one scan session.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    pub host: String,
    pub start_port: u16,
    pub end_port: u16,
    pub timeout: Duration,
    pub worker_count: usize,
}

impl ScanRequest {
    /// Number of ports in the inclusive range.
    pub fn total_ports(&self) -> u64 {
        u64::from(self.end_port) - u64::from(self.start_port) + 1
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PortStatus {
    Open,
}

/// One open port discovered during a session. Closed ports are never materialized.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortResult {
    pub port: u16,
    pub status: PortStatus,
    pub service: String,
}

impl PortResult {
    pub fn open(port: u16) -> Self {
        Self {
            port,
            status: PortStatus::Open,
            service: crate::services::service_name(port).to_string(),
        }
    }
}

/// Events produced by a scan session, in emission order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    Start {
        ip: String,
        start_port: u16,
        end_port: u16,
        timestamp: String,
    },
    PortOpen(PortResult),
    Progress {
        scanned: u64,
        total: u64,
        progress: f64,
    },
    Complete(ScanReport),
    Error {
        message: String,
    },
}

impl ScanEvent {
    pub fn start(request: &ScanRequest) -> Self {
        ScanEvent::Start {
            ip: request.host.clone(),
            start_port: request.start_port,
            end_port: request.end_port,
            timestamp: now_iso_like(),
        }
    }

    pub fn progress(scanned: u64, total: u64) -> Self {
        ScanEvent::Progress {
            scanned,
            total,
            progress: percent(scanned, total),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ScanEvent::Error {
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanEvent::Complete(_) | ScanEvent::Error { .. })
    }
}

/// Final accounting of a completed session; also the `complete` event payload.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub open_ports: Vec<PortResult>,
    pub total_open: usize,
    pub timestamp: String,
}

impl ScanReport {
    pub fn new(open_ports: Vec<PortResult>) -> Self {
        Self {
            total_open: open_ports.len(),
            open_ports,
            timestamp: now_iso_like(),
        }
    }
}

/// Response body of the batch endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BatchScanResponse {
    pub ip: String,
    pub start_port: u16,
    pub end_port: u16,
    #[serde(flatten)]
    pub report: ScanReport,
}

/// Percentage of `scanned` over `total`, rounded to two decimals.
pub fn percent(scanned: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = scanned as f64 / total as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}

pub fn now_iso_like() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
