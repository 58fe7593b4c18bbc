use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// FIFO of ports still to be probed in one session.
///
/// Filled ascending at construction and only ever drained. Every port is
/// handed out by [`PortJobQueue::try_take`] exactly once.
#[derive(Debug)]
pub struct PortJobQueue {
    total: u64,
    ports: Mutex<VecDeque<u16>>,
}

impl PortJobQueue {
    pub fn new(start_port: u16, end_port: u16) -> Self {
        let ports: VecDeque<u16> = (start_port..=end_port).collect();
        Self {
            total: ports.len() as u64,
            ports: Mutex::new(ports),
        }
    }

    /// Take the next port without blocking; `None` once the queue is drained.
    pub fn try_take(&self) -> Option<u16> {
        self.lock().pop_front()
    }

    pub fn remaining_count(&self) -> u64 {
        self.lock().len() as u64
    }

    /// Ports handed out so far, including those still being probed.
    pub fn taken_count(&self) -> u64 {
        self.total - self.remaining_count()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<u16>> {
        // A worker panicking mid-pop leaves the deque intact; keep serving it.
        self.ports.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn drains_ascending() {
        let q = PortJobQueue::new(20, 25);
        assert_eq!(q.remaining_count(), 6);
        let taken: Vec<u16> = std::iter::from_fn(|| q.try_take()).collect();
        assert_eq!(taken, vec![20, 21, 22, 23, 24, 25]);
        assert_eq!(q.remaining_count(), 0);
        assert_eq!(q.taken_count(), 6);
        assert_eq!(q.try_take(), None);
        assert_eq!(q.try_take(), None);
    }

    #[test]
    fn single_port_range() {
        let q = PortJobQueue::new(65535, 65535);
        assert_eq!(q.try_take(), Some(65535));
        assert!(q.is_empty());
        assert_eq!(q.taken_count(), 1);
    }

    #[test]
    fn concurrent_takers_never_share_a_port() {
        let q = Arc::new(PortJobQueue::new(1, 5000));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let q = q.clone();
                std::thread::spawn(move || std::iter::from_fn(|| q.try_take()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            for port in h.join().unwrap() {
                assert!(seen.insert(port), "port {port} served twice");
            }
        }
        assert_eq!(seen.len(), 5000);
        assert_eq!(q.remaining_count(), 0);
    }
}
