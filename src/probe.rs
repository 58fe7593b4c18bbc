use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time;

/// Classification of a single connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Open,
    Closed,
}

impl ProbeOutcome {
    pub fn is_open(self) -> bool {
        self == ProbeOutcome::Open
    }
}

/// A single-port liveness check.
///
/// Implementations never fail: every failure mode is reported as
/// [`ProbeOutcome::Closed`].
#[async_trait]
pub trait Probe: Send + Sync + 'static {
    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> ProbeOutcome;
}

/// Full TCP handshake against `host:port`, bounded by the timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnectProbe;

#[async_trait]
impl Probe for TcpConnectProbe {
    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> ProbeOutcome {
        // Name resolution runs inside the timeout too.
        match time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => {
                drop(stream);
                ProbeOutcome::Open
            }
            Ok(Err(e)) => {
                tracing::trace!(host, port, error = %e, "connect failed");
                ProbeOutcome::Closed
            }
            Err(_) => {
                tracing::trace!(host, port, "connect timed out");
                ProbeOutcome::Closed
            }
        }
    }
}
