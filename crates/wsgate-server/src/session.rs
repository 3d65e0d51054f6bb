//! Per-connection gateway session.
//!
//! ```text
//! AwaitingHandshake ──frame ok──→ Bridging ──either side ends──→ Closed
//!         └──────────── bad frame / timeout / close ───────────→ Closed
//! ```
//!
//! Failures are logged and never reported to the peer: the inbound side is
//! simply closed.

use crate::bridge::{ConnectionBridge, RelayStats};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use wsgate_core::{
    handshake, ChunkRead, ChunkStream, ChunkWrite, GateError, GateResult, Identity,
    ParsedRequest,
};

/// Immutable settings shared by every session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub identity: Identity,
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingHandshake,
    Bridging,
    Closed,
}

/// One inbound connection, from handshake to teardown.
pub struct GatewaySession {
    peer: SocketAddr,
    config: Arc<SessionConfig>,
    state: SessionState,
}

impl GatewaySession {
    pub fn new(peer: SocketAddr, config: Arc<SessionConfig>) -> Self {
        Self {
            peer,
            config,
            state: SessionState::AwaitingHandshake,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive the session to completion. `inbound` is closed on every path.
    pub async fn run<I>(&mut self, mut inbound: I) -> GateResult<RelayStats>
    where
        I: ChunkStream,
    {
        let result = match self.accept(&mut inbound).await {
            Ok(request) => {
                self.transition(SessionState::Bridging);
                ConnectionBridge::new(self.config.connect_timeout)
                    .bridge(inbound, request)
                    .await
            }
            Err(e) => {
                if let Err(close_err) = inbound.close().await {
                    debug!(peer = %self.peer, error = %close_err, "inbound close failed");
                }
                Err(e)
            }
        };
        self.transition(SessionState::Closed);

        match &result {
            Ok(stats) => info!(
                peer = %self.peer,
                up = stats.bytes_up,
                down = stats.bytes_down,
                ended_by = %stats.ended_by,
                "session closed"
            ),
            Err(e) => self.log_failure(e),
        }
        result
    }

    /// Read and validate the handshake frame.
    async fn accept<I>(&self, inbound: &mut I) -> GateResult<ParsedRequest>
    where
        I: ChunkRead + ?Sized,
    {
        let frame = self.await_handshake(inbound).await?;
        let request = handshake::parse(&frame, &self.config.identity)?;

        debug!(
            peer = %self.peer,
            destination = %request.destination,
            command = request.command,
            payload = request.payload.len(),
            "handshake accepted"
        );
        Ok(request)
    }

    /// The handshake is exactly the first chunk on the connection.
    async fn await_handshake<I>(&self, inbound: &mut I) -> GateResult<Vec<u8>>
    where
        I: ChunkRead + ?Sized,
    {
        match tokio::time::timeout(self.config.handshake_timeout, inbound.read_chunk()).await {
            Ok(Ok(Some(frame))) => Ok(frame),
            Ok(Ok(None)) => Err(GateError::Transport(
                "connection closed before handshake".into(),
            )),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(GateError::Timeout),
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(peer = %self.peer, from = ?self.state, to = ?next, "session state");
        self.state = next;
    }

    fn log_failure(&self, e: &GateError) {
        match e {
            GateError::InvalidIdentity(received) => {
                warn!(peer = %self.peer, identity = %received, "handshake rejected: identity mismatch")
            }
            e if e.is_handshake() => warn!(peer = %self.peer, error = %e, "handshake rejected"),
            GateError::UpstreamConnect { destination, reason } => {
                warn!(peer = %self.peer, destination = %destination, reason = %reason, "upstream connect failed")
            }
            GateError::Timeout => debug!(peer = %self.peer, "handshake timed out"),
            _ => debug!(peer = %self.peer, error = %e, "session ended with error"),
        }
    }
}
