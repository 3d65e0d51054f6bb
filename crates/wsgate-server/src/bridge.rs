//! Connection bridge: opens the upstream TCP connection for a validated
//! request and relays bytes in both directions until one side ends.
//!
//! Ordering on the wire:
//!
//! ```text
//! connect upstream ─ok→ ack [version, 0] → inbound
//!                       initial payload  → upstream
//!                       inbound → upstream ┐ concurrent, the first to
//!                       upstream → inbound ┘ finish tears down both
//! ```
//!
//! Nothing is written anywhere until the upstream connect succeeds.

use crate::transport::TcpEndpoint;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};
use wsgate_core::{
    acknowledgment, ChunkRead, ChunkStream, ChunkWrite, GateResult, ParsedRequest,
};

/// Which side ended the relay, and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    InboundClosed,
    InboundError,
    UpstreamClosed,
    UpstreamError,
}

impl fmt::Display for RelayEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelayEnd::InboundClosed => "inbound closed",
            RelayEnd::InboundError => "inbound error",
            RelayEnd::UpstreamClosed => "upstream closed",
            RelayEnd::UpstreamError => "upstream error",
        };
        f.write_str(s)
    }
}

/// Byte counts for a finished relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    /// Client → upstream, including the initial payload.
    pub bytes_up: u64,
    /// Upstream → client.
    pub bytes_down: u64,
    pub ended_by: RelayEnd,
}

/// Opens upstream connections and runs the relay.
#[derive(Debug, Clone)]
pub struct ConnectionBridge {
    connect_timeout: Duration,
}

impl ConnectionBridge {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Bridge `inbound` to the destination named in `request`.
    ///
    /// `inbound` is closed on every path. On a connect failure nothing is
    /// written to it first.
    pub async fn bridge<I>(&self, mut inbound: I, request: ParsedRequest) -> GateResult<RelayStats>
    where
        I: ChunkStream,
    {
        let destination = &request.destination;
        let mut upstream = match TcpEndpoint::connect(destination, self.connect_timeout).await {
            Ok(upstream) => upstream,
            Err(e) => {
                let _ = inbound.close().await;
                return Err(e);
            }
        };
        info!(
            destination = %destination,
            resolved = ?upstream.peer_addr(),
            "upstream connected"
        );

        if let Err(e) = inbound.write_chunk(&acknowledgment(request.version)).await {
            let _ = upstream.close().await;
            let _ = inbound.close().await;
            return Err(e);
        }

        let mut bytes_up = 0u64;
        if !request.payload.is_empty() {
            if let Err(e) = upstream.write_chunk(&request.payload).await {
                warn!(destination = %destination, error = %e, "initial payload write failed");
                let _ = upstream.close().await;
                let _ = inbound.close().await;
                return Err(e);
            }
            bytes_up = request.payload.len() as u64;
        }

        let mut stats = relay(inbound, upstream).await;
        stats.bytes_up += bytes_up;
        Ok(stats)
    }
}

/// How one direction of the relay stopped.
enum PumpEnd {
    SourceClosed,
    SourceError,
    SinkError,
}

/// Copy chunks from `from` to `to` until either fails or `from` ends.
async fn pump<R, W>(from: &mut R, to: &mut W, moved: &mut u64, direction: &str) -> PumpEnd
where
    R: ChunkRead + ?Sized,
    W: ChunkWrite + ?Sized,
{
    loop {
        match from.read_chunk().await {
            Ok(Some(chunk)) => {
                if let Err(e) = to.write_chunk(&chunk).await {
                    debug!(direction, error = %e, "relay write failed");
                    return PumpEnd::SinkError;
                }
                *moved += chunk.len() as u64;
            }
            Ok(None) => return PumpEnd::SourceClosed,
            Err(e) => {
                debug!(direction, error = %e, "relay read failed");
                return PumpEnd::SourceError;
            }
        }
    }
}

/// Full-duplex relay between two chunk streams.
///
/// Each direction is copied by its own future, so a stalled write in one
/// direction never blocks reads in the other. Whichever direction finishes
/// first ends the relay, and both sides are closed before returning.
pub async fn relay<A, B>(inbound: A, upstream: B) -> RelayStats
where
    A: ChunkStream,
    B: ChunkStream,
{
    let (mut in_rx, mut in_tx) = inbound.split();
    let (mut up_rx, mut up_tx) = upstream.split();
    let mut bytes_up = 0u64;
    let mut bytes_down = 0u64;

    let ended_by = tokio::select! {
        end = pump(&mut in_rx, &mut up_tx, &mut bytes_up, "up") => match end {
            PumpEnd::SourceClosed => RelayEnd::InboundClosed,
            PumpEnd::SourceError => RelayEnd::InboundError,
            PumpEnd::SinkError => RelayEnd::UpstreamError,
        },
        end = pump(&mut up_rx, &mut in_tx, &mut bytes_down, "down") => match end {
            PumpEnd::SourceClosed => RelayEnd::UpstreamClosed,
            PumpEnd::SourceError => RelayEnd::UpstreamError,
            PumpEnd::SinkError => RelayEnd::InboundError,
        },
    };

    // Tear down both ends, no draining.
    let _ = up_tx.close().await;
    let _ = in_tx.close().await;

    RelayStats {
        bytes_up,
        bytes_down,
        ended_by,
    }
}
