//! Orchestration of one scan session.
//!
//! The coordinator fills the job queue, starts the worker pool and then
//! alternates between draining the result channel and sampling progress on a
//! fixed tick until the queue is exhausted, the consumer goes away, or an
//! internal failure is detected. Every exit path cancels the pool and gives
//! the workers a bounded grace period before abandoning them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::ScanError;
use crate::pool::WorkerPool;
use crate::probe::Probe;
use crate::queue::PortJobQueue;
use crate::session::{ScanSession, SessionState};
use crate::types::{PortResult, ScanEvent, ScanReport, ScanRequest};

/// Pacing knobs for a session. The progress rule is approximate by nature;
/// these are tunables, not protocol guarantees.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanTuning {
    /// Minimum advance in scanned ports between two Progress events.
    pub progress_step: u64,
    /// Wall-clock period between progress samples.
    pub sample_interval: Duration,
    /// How long to wait for workers after cancellation or queue exhaustion.
    pub grace_period: Duration,
}

impl Default for ScanTuning {
    fn default() -> Self {
        Self {
            progress_step: 50,
            sample_interval: Duration::from_millis(200),
            grace_period: Duration::from_secs(5),
        }
    }
}

/// How a session ended.
#[derive(Debug)]
pub enum SessionOutcome {
    Completed(ScanReport),
    Cancelled {
        open_ports: Vec<PortResult>,
        scanned: u64,
    },
    Failed(ScanError),
}

impl SessionOutcome {
    pub fn state(&self) -> SessionState {
        match self {
            SessionOutcome::Completed(_) => SessionState::Completed,
            SessionOutcome::Cancelled { .. } => SessionState::Cancelled,
            SessionOutcome::Failed(_) => SessionState::Failed,
        }
    }
}

/// Drives one [`ScanRequest`] from Start to a terminal event.
pub struct ScanCoordinator {
    request: ScanRequest,
    probe: Arc<dyn Probe>,
    tuning: ScanTuning,
}

impl std::fmt::Debug for ScanCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanCoordinator")
            .field("request", &self.request)
            .field("tuning", &self.tuning)
            .finish_non_exhaustive()
    }
}

impl ScanCoordinator {
    pub fn new(request: ScanRequest, probe: Arc<dyn Probe>) -> Self {
        Self {
            request,
            probe,
            tuning: ScanTuning::default(),
        }
    }

    pub fn with_tuning(mut self, tuning: ScanTuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Run the session, publishing events on `events`.
    ///
    /// Cancelling `cancel` or dropping the receiver moves the session to
    /// CANCELLED; no events are sent after that point.
    pub async fn run(
        self,
        events: mpsc::Sender<ScanEvent>,
        cancel: CancellationToken,
    ) -> SessionOutcome {
        let sink = EventSink { tx: Some(events) };
        self.drive(&sink, cancel).await
    }

    /// Run the session to completion without streaming and return the report.
    pub async fn collect(self, cancel: CancellationToken) -> Result<ScanReport, ScanError> {
        match self.drive(&EventSink { tx: None }, cancel).await {
            SessionOutcome::Completed(report) => Ok(report),
            SessionOutcome::Cancelled { .. } => Err(ScanError::Cancelled),
            SessionOutcome::Failed(e) => Err(e),
        }
    }

    async fn drive(self, sink: &EventSink, cancel: CancellationToken) -> SessionOutcome {
        let ScanCoordinator {
            request,
            probe,
            tuning,
        } = self;
        let started = Instant::now();
        let total = request.total_ports();
        let mut session = ScanSession::new(total, tuning.progress_step);

        tracing::info!(
            host = %request.host,
            start_port = request.start_port,
            end_port = request.end_port,
            workers = request.worker_count,
            timeout_ms = request.timeout.as_millis() as u64,
            "scan session starting"
        );

        if sink.emit(ScanEvent::start(&request), &cancel).await.is_err() {
            session.transition(SessionState::Cancelled);
            tracing::info!("consumer gone before scan started");
            return SessionOutcome::Cancelled {
                open_ports: Vec::new(),
                scanned: 0,
            };
        }

        let queue = Arc::new(PortJobQueue::new(request.start_port, request.end_port));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pool = WorkerPool::start(&request, queue.clone(), probe, cancel.child_token(), tx);
        session.transition(SessionState::Running);

        let mut ticker = time::interval(tuning.sample_interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let ended = 'session: loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ended::Cancelled,
                _ = sink.closed() => break Ended::Cancelled,
                _ = ticker.tick() => {}
            }

            while let Ok(result) = rx.try_recv() {
                session.record_open(result.clone());
                if sink.emit(ScanEvent::PortOpen(result), &cancel).await.is_err() {
                    break 'session Ended::Cancelled;
                }
            }

            if let Err(e) = pool.reap() {
                break Ended::Failed(e);
            }

            if let Some(scanned) = session.sample(queue.taken_count()) {
                let event = ScanEvent::progress(scanned, total);
                if sink.emit(event, &cancel).await.is_err() {
                    break Ended::Cancelled;
                }
            }

            if queue.is_empty() {
                break Ended::Drained;
            }
            if pool.active() == 0 {
                break Ended::Failed(ScanError::WorkersExited {
                    remaining: queue.remaining_count(),
                });
            }
        };

        match ended {
            Ended::Drained => {
                let joined = pool.join(tuning.grace_period).await;
                if let Some(panic) = joined.panicked.into_iter().next() {
                    return fail(sink, &mut session, ScanError::WorkerPanicked(panic)).await;
                }

                while let Ok(result) = rx.try_recv() {
                    session.record_open(result.clone());
                    if sink.emit(ScanEvent::PortOpen(result), &cancel).await.is_err() {
                        return cancelled(&mut pool, &mut rx, session, tuning.grace_period).await;
                    }
                }
                if let Some(scanned) = session.final_sample() {
                    let event = ScanEvent::progress(scanned, total);
                    if sink.emit(event, &cancel).await.is_err() {
                        return cancelled(&mut pool, &mut rx, session, tuning.grace_period).await;
                    }
                }

                session.transition(SessionState::Completed);
                let report = ScanReport::new(session.into_open_ports());
                tracing::info!(
                    total_open = report.total_open,
                    scanned = total,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "scan session completed"
                );
                // Every port was probed; a consumer gone by now does not undo that.
                let _ = sink.emit(ScanEvent::Complete(report.clone()), &cancel).await;
                SessionOutcome::Completed(report)
            }
            Ended::Cancelled => cancelled(&mut pool, &mut rx, session, tuning.grace_period).await,
            Ended::Failed(e) => {
                pool.cancel();
                pool.join(tuning.grace_period).await;
                drain_silently(&mut rx, &mut session);
                fail(sink, &mut session, e).await
            }
        }
    }
}

enum Ended {
    Drained,
    Cancelled,
    Failed(ScanError),
}

async fn cancelled(
    pool: &mut WorkerPool,
    rx: &mut mpsc::UnboundedReceiver<PortResult>,
    mut session: ScanSession,
    grace: Duration,
) -> SessionOutcome {
    pool.cancel();
    let joined = pool.join(grace).await;
    drain_silently(rx, &mut session);
    session.transition(SessionState::Cancelled);
    tracing::info!(
        scanned = session.scanned(),
        total = session.total(),
        open = session.open_ports().len(),
        abandoned = joined.abandoned,
        "scan session cancelled"
    );
    SessionOutcome::Cancelled {
        scanned: session.scanned(),
        open_ports: session.into_open_ports(),
    }
}

async fn fail(sink: &EventSink, session: &mut ScanSession, error: ScanError) -> SessionOutcome {
    session.transition(SessionState::Failed);
    tracing::error!(error = %error, "scan session failed");
    // The session is already over; a missing consumer changes nothing.
    let _ = sink.send_now(ScanEvent::error(error.to_string())).await;
    SessionOutcome::Failed(error)
}

fn drain_silently(rx: &mut mpsc::UnboundedReceiver<PortResult>, session: &mut ScanSession) {
    while let Ok(result) = rx.try_recv() {
        session.record_open(result);
    }
}

#[derive(Debug)]
struct Disconnected;

/// Where session events go. `None` discards them (batch mode).
struct EventSink {
    tx: Option<mpsc::Sender<ScanEvent>>,
}

impl EventSink {
    async fn emit(&self, event: ScanEvent, cancel: &CancellationToken) -> Result<(), Disconnected> {
        if cancel.is_cancelled() {
            return Err(Disconnected);
        }
        let Some(tx) = &self.tx else {
            return Ok(());
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Disconnected),
            sent = tx.send(event) => sent.map_err(|_| Disconnected),
        }
    }

    /// Send regardless of cancellation; used for the terminal Error event.
    async fn send_now(&self, event: ScanEvent) -> Result<(), Disconnected> {
        match &self.tx {
            Some(tx) => tx.send(event).await.map_err(|_| Disconnected),
            None => Ok(()),
        }
    }

    async fn closed(&self) {
        match &self.tx {
            Some(tx) => tx.closed().await,
            None => std::future::pending().await,
        }
    }
}
