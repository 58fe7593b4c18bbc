use std::fmt;

use crate::types::PortResult;

/// Lifecycle of one scan session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Running,
    Cancelled,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Cancelled | SessionState::Completed | SessionState::Failed
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Init => "init",
            SessionState::Running => "running",
            SessionState::Cancelled => "cancelled",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Mutable aggregate owned by the coordinator. Workers never touch it; open
/// ports reach it only through the result channel.
#[derive(Debug)]
pub struct ScanSession {
    state: SessionState,
    total: u64,
    scanned: u64,
    open_ports: Vec<PortResult>,
    progress: ProgressSampler,
}

impl ScanSession {
    pub fn new(total: u64, progress_step: u64) -> Self {
        Self {
            state: SessionState::Init,
            total,
            scanned: 0,
            open_ports: Vec::new(),
            progress: ProgressSampler::new(progress_step),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Move to `next`. Terminal states are sticky.
    pub fn transition(&mut self, next: SessionState) {
        if self.state.is_terminal() {
            return;
        }
        tracing::debug!(from = %self.state, to = %next, "session transition");
        self.state = next;
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn scanned(&self) -> u64 {
        self.scanned
    }

    /// Append a discovery; order of calls is the discovery order.
    pub fn record_open(&mut self, result: PortResult) {
        self.open_ports.push(result);
    }

    pub fn open_ports(&self) -> &[PortResult] {
        &self.open_ports
    }

    pub fn into_open_ports(self) -> Vec<PortResult> {
        self.open_ports
    }

    /// Record a progress sample. Returns the count to report if a Progress
    /// event is due.
    pub fn sample(&mut self, scanned: u64) -> Option<u64> {
        // Samples may race the queue; never let the counter move backwards.
        self.scanned = self.scanned.max(scanned.min(self.total));
        self.progress.observe(self.scanned)
    }

    /// Report total if the last emitted sample fell short of it.
    pub fn final_sample(&mut self) -> Option<u64> {
        self.scanned = self.total;
        self.progress.finish(self.total)
    }
}

/// Emits on the first sample, then whenever the count advanced by at least
/// `step` since the last emitted sample.
#[derive(Debug, Clone)]
pub struct ProgressSampler {
    step: u64,
    last_emitted: Option<u64>,
}

impl ProgressSampler {
    pub fn new(step: u64) -> Self {
        Self {
            step: step.max(1),
            last_emitted: None,
        }
    }

    pub fn observe(&mut self, scanned: u64) -> Option<u64> {
        let due = match self.last_emitted {
            None => true,
            Some(last) => scanned >= last + self.step,
        };
        if due {
            self.last_emitted = Some(scanned);
            Some(scanned)
        } else {
            None
        }
    }

    pub fn finish(&mut self, total: u64) -> Option<u64> {
        if self.last_emitted == Some(total) {
            return None;
        }
        self.last_emitted = Some(total);
        Some(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_always_emits() {
        let mut p = ProgressSampler::new(50);
        assert_eq!(p.observe(0), Some(0));
        assert_eq!(p.observe(10), None);
        assert_eq!(p.observe(49), None);
        assert_eq!(p.observe(50), Some(50));
        assert_eq!(p.observe(99), None);
        assert_eq!(p.observe(130), Some(130));
        assert_eq!(p.finish(130), None);
    }

    #[test]
    fn finish_only_when_short_of_total() {
        let mut p = ProgressSampler::new(50);
        p.observe(100);
        assert_eq!(p.finish(100), None);

        let mut p = ProgressSampler::new(50);
        p.observe(0);
        assert_eq!(p.finish(6), Some(6));
        assert_eq!(p.finish(6), None);
    }

    #[test]
    fn session_scanned_never_decreases() {
        let mut s = ScanSession::new(200, 50);
        assert_eq!(s.sample(60), Some(60));
        assert_eq!(s.sample(40), None);
        assert_eq!(s.scanned(), 60);
        assert_eq!(s.sample(500), Some(200));
        assert_eq!(s.scanned(), 200);
    }

    #[test]
    fn terminal_state_is_sticky() {
        let mut s = ScanSession::new(10, 50);
        s.transition(SessionState::Running);
        s.transition(SessionState::Cancelled);
        s.transition(SessionState::Completed);
        assert_eq!(s.state(), SessionState::Cancelled);
    }

    #[test]
    fn opens_keep_discovery_order() {
        let mut s = ScanSession::new(10, 50);
        s.record_open(PortResult::open(443));
        s.record_open(PortResult::open(22));
        let ports: Vec<u16> = s.open_ports().iter().map(|r| r.port).collect();
        assert_eq!(ports, vec![443, 22]);
    }
}
