use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::error::ScanError;
use crate::probe::Probe;
use crate::queue::PortJobQueue;
use crate::types::{PortResult, ScanRequest};

/// Sending half of the result channel workers publish open ports on.
pub type ResultSender = mpsc::UnboundedSender<PortResult>;

/// A fixed set of workers draining one [`PortJobQueue`].
///
/// Cancellation is cooperative: a worker checks the token before taking each
/// port, and an in-flight probe always runs to its own timeout. Dropping the
/// pool cancels and detaches the workers rather than aborting them.
#[derive(Debug)]
pub struct WorkerPool {
    workers: JoinSet<()>,
    cancel: CancellationToken,
}

/// What happened to the workers during [`WorkerPool::join`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct JoinReport {
    pub exited: usize,
    pub abandoned: usize,
    pub panicked: Vec<String>,
}

impl JoinReport {
    fn record(&mut self, res: Result<(), JoinError>) {
        match res {
            Ok(()) => self.exited += 1,
            Err(e) if e.is_panic() => self.panicked.push(e.to_string()),
            // Cancelled tasks only happen if the runtime is shutting down.
            Err(_) => self.exited += 1,
        }
    }
}

impl WorkerPool {
    pub fn start(
        request: &ScanRequest,
        queue: Arc<PortJobQueue>,
        probe: Arc<dyn Probe>,
        cancel: CancellationToken,
        results: ResultSender,
    ) -> Self {
        let host: Arc<str> = Arc::from(request.host.as_str());
        let mut workers = JoinSet::new();
        for id in 0..request.worker_count.max(1) {
            workers.spawn(run_worker(
                id,
                host.clone(),
                request.timeout,
                queue.clone(),
                probe.clone(),
                cancel.clone(),
                results.clone(),
            ));
        }
        Self { workers, cancel }
    }

    /// Raise the cancellation flag. Workers stop before their next port.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Workers not yet observed as exited.
    pub fn active(&self) -> usize {
        self.workers.len()
    }

    /// Collect workers that already exited without waiting on the rest.
    pub fn reap(&mut self) -> Result<usize, ScanError> {
        let mut exited = 0;
        while let Some(res) = self.workers.try_join_next() {
            match res {
                Err(e) if e.is_panic() => return Err(ScanError::WorkerPanicked(e.to_string())),
                _ => exited += 1,
            }
        }
        Ok(exited)
    }

    /// Wait for every worker to exit, or until `grace` elapses. Workers still
    /// running at the deadline are detached and left to finish on their own.
    pub async fn join(&mut self, grace: Duration) -> JoinReport {
        let mut report = JoinReport::default();
        let workers = &mut self.workers;
        let drained = time::timeout(grace, async {
            while let Some(res) = workers.join_next().await {
                report.record(res);
            }
        })
        .await;

        if drained.is_err() {
            report.abandoned = self.workers.len();
            tracing::warn!(
                abandoned = report.abandoned,
                grace_ms = grace.as_millis() as u64,
                "workers still running after grace period; detaching"
            );
            self.workers.detach_all();
        }
        report
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.workers.detach_all();
    }
}

async fn run_worker(
    id: usize,
    host: Arc<str>,
    timeout: Duration,
    queue: Arc<PortJobQueue>,
    probe: Arc<dyn Probe>,
    cancel: CancellationToken,
    results: ResultSender,
) {
    let mut probed = 0u64;
    while !cancel.is_cancelled() {
        let Some(port) = queue.try_take() else {
            break;
        };
        probed += 1;
        let outcome = probe.probe(&host, port, timeout).await;
        if outcome.is_open() && results.send(PortResult::open(port)).is_err() {
            // Nobody is listening for results any more.
            break;
        }
    }
    tracing::trace!(worker = id, probed, "worker exited");
}
