//! Library crate for portstream: a concurrent TCP connect scanner that reports
//! discoveries as a live event stream.
pub mod config;
pub mod coordinator;
pub mod emitter;
pub mod error;
pub mod params;
pub mod pool;
pub mod probe;
pub mod queue;
pub mod server;
pub mod services;
pub mod session;
pub mod types;

pub use coordinator::{ScanCoordinator, ScanTuning, SessionOutcome};
pub use probe::{Probe, ProbeOutcome, TcpConnectProbe};
pub use types::{PortResult, ScanEvent, ScanReport, ScanRequest};
