#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use portstream::{Probe, ProbeOutcome, ScanCoordinator, ScanEvent, ScanRequest, ScanTuning, SessionOutcome};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Probe with a fixed set of open ports that records every port it is asked about.
pub struct ScriptedProbe {
    open: HashSet<u16>,
    delay: Duration,
    panic_on: Option<u16>,
    calls: Mutex<Vec<u16>>,
}

impl ScriptedProbe {
    pub fn new(open: impl IntoIterator<Item = u16>) -> Self {
        Self {
            open: open.into_iter().collect(),
            delay: Duration::ZERO,
            panic_on: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn all_closed() -> Self {
        Self::new(Vec::new())
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn panicking_on(mut self, port: u16) -> Self {
        self.panic_on = Some(port);
        self
    }

    pub fn calls(&self) -> Vec<u16> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn probe(&self, _host: &str, port: u16, _timeout: Duration) -> ProbeOutcome {
        self.calls.lock().unwrap().push(port);
        if self.panic_on == Some(port) {
            panic!("scripted probe failure on port {port}");
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.open.contains(&port) {
            ProbeOutcome::Open
        } else {
            ProbeOutcome::Closed
        }
    }
}

pub fn request(start_port: u16, end_port: u16, worker_count: usize) -> ScanRequest {
    ScanRequest {
        host: "127.0.0.1".into(),
        start_port,
        end_port,
        timeout: Duration::from_millis(500),
        worker_count,
    }
}

pub fn fast_tuning() -> ScanTuning {
    ScanTuning {
        progress_step: 50,
        sample_interval: Duration::from_millis(5),
        grace_period: Duration::from_secs(1),
    }
}

pub fn coordinator(request: ScanRequest, probe: Arc<ScriptedProbe>) -> ScanCoordinator {
    ScanCoordinator::new(request, probe).with_tuning(fast_tuning())
}

/// Run a session to its end, collecting every event it emits.
pub async fn run_to_end(coordinator: ScanCoordinator) -> (Vec<ScanEvent>, SessionOutcome) {
    let (tx, mut rx) = mpsc::channel(16);
    let handle = tokio::spawn(coordinator.run(tx, CancellationToken::new()));
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    (events, handle.await.unwrap())
}

pub fn open_ports_in(events: &[ScanEvent]) -> Vec<u16> {
    events
        .iter()
        .filter_map(|e| match e {
            ScanEvent::PortOpen(r) => Some(r.port),
            _ => None,
        })
        .collect()
}

pub fn progress_in(events: &[ScanEvent]) -> Vec<(u64, u64)> {
    events
        .iter()
        .filter_map(|e| match e {
            ScanEvent::Progress { scanned, total, .. } => Some((*scanned, *total)),
            _ => None,
        })
        .collect()
}
