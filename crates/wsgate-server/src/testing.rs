//! Test helpers: an in-memory inbound stream and frame builders.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use wsgate_core::address::{ATYP_IPV4, ATYP_IPV6};
use wsgate_core::{
    AddressKind, BoxFuture, ChunkRead, ChunkStream, ChunkWrite, Destination, GateError,
    GateResult, Identity, ParsedRequest,
};

pub const TEST_UID: &str = "75de94bb-b5cb-4ad4-b72b-251476b36f3a";

pub fn test_identity() -> Identity {
    Identity::parse(TEST_UID).unwrap()
}

/// Gateway side of an in-memory connection.
pub struct ChannelStream {
    reader: ChannelReader,
    writer: ChannelWriter,
}

pub struct ChannelReader {
    incoming: mpsc::Receiver<Vec<u8>>,
}

pub struct ChannelWriter {
    outgoing: Option<mpsc::Sender<Vec<u8>>>,
    closed: Arc<AtomicBool>,
}

/// Client side of an in-memory connection.
pub struct ChannelPeer {
    to_gateway: Option<mpsc::Sender<Vec<u8>>>,
    from_gateway: mpsc::Receiver<Vec<u8>>,
    closed: Arc<AtomicBool>,
}

pub fn channel_pair() -> (ChannelStream, ChannelPeer) {
    let (to_gateway, incoming) = mpsc::channel(64);
    let (outgoing, from_gateway) = mpsc::channel(64);
    let closed = Arc::new(AtomicBool::new(false));
    (
        ChannelStream {
            reader: ChannelReader { incoming },
            writer: ChannelWriter {
                outgoing: Some(outgoing),
                closed: closed.clone(),
            },
        },
        ChannelPeer {
            to_gateway: Some(to_gateway),
            from_gateway,
            closed,
        },
    )
}

impl ChunkRead for ChannelReader {
    fn read_chunk(&mut self) -> BoxFuture<'_, GateResult<Option<Vec<u8>>>> {
        Box::pin(async move { Ok(self.incoming.recv().await) })
    }
}

impl ChunkWrite for ChannelWriter {
    fn write_chunk<'a>(&'a mut self, data: &'a [u8]) -> BoxFuture<'a, GateResult<()>> {
        Box::pin(async move {
            let tx = self
                .outgoing
                .as_ref()
                .ok_or_else(|| GateError::Transport("write after close".into()))?;
            tx.send(data.to_vec())
                .await
                .map_err(|_| GateError::Transport("peer gone".into()))
        })
    }

    fn close(&mut self) -> BoxFuture<'_, GateResult<()>> {
        self.closed.store(true, Ordering::SeqCst);
        self.outgoing = None;
        Box::pin(async { Ok(()) })
    }
}

impl ChunkRead for ChannelStream {
    fn read_chunk(&mut self) -> BoxFuture<'_, GateResult<Option<Vec<u8>>>> {
        self.reader.read_chunk()
    }
}

impl ChunkWrite for ChannelStream {
    fn write_chunk<'a>(&'a mut self, data: &'a [u8]) -> BoxFuture<'a, GateResult<()>> {
        self.writer.write_chunk(data)
    }

    fn close(&mut self) -> BoxFuture<'_, GateResult<()>> {
        self.writer.close()
    }
}

impl ChunkStream for ChannelStream {
    type ReadHalf = ChannelReader;
    type WriteHalf = ChannelWriter;

    fn split(self) -> (ChannelReader, ChannelWriter) {
        (self.reader, self.writer)
    }
}

impl ChannelPeer {
    pub async fn send(&self, data: &[u8]) {
        if let Some(tx) = &self.to_gateway {
            tx.send(data.to_vec()).await.unwrap();
        }
    }

    /// Next chunk from the gateway, `None` once it closed its side.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.from_gateway.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.from_gateway.try_recv().ok()
    }

    /// Collect chunks until `n` bytes arrived.
    pub async fn recv_exactly(&mut self, n: usize) -> Vec<u8> {
        let mut out = Vec::new();
        while out.len() < n {
            match self.recv().await {
                Some(chunk) => out.extend(chunk),
                None => break,
            }
        }
        out
    }

    /// Close the client side.
    pub fn hang_up(&mut self) {
        self.to_gateway = None;
    }

    /// Separate the client side into its sender and receiver, for tests that
    /// upload and download at the same time.
    pub fn into_parts(self) -> (mpsc::Sender<Vec<u8>>, mpsc::Receiver<Vec<u8>>) {
        let tx = self.to_gateway.expect("client side already hung up");
        (tx, self.from_gateway)
    }

    /// Whether the gateway called `close` on its side.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Build a handshake frame addressed at `target`.
pub fn handshake_frame(identity: &[u8; 16], target: SocketAddr, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0u8];
    frame.extend_from_slice(identity);
    frame.push(0); // no addons
    frame.push(1); // connect
    frame.extend_from_slice(&target.port().to_be_bytes());
    match target.ip() {
        IpAddr::V4(ip) => {
            frame.push(ATYP_IPV4);
            frame.extend_from_slice(&ip.octets());
        }
        IpAddr::V6(ip) => {
            frame.push(ATYP_IPV6);
            frame.extend_from_slice(&ip.octets());
        }
    }
    frame.extend_from_slice(payload);
    frame
}

/// A parsed request for an IPv4 `target`, as the handshake parser would produce it.
pub fn local_request(target: SocketAddr, payload: &[u8]) -> ParsedRequest {
    ParsedRequest {
        version: 0,
        command: 1,
        destination: Destination {
            host: target.ip().to_string(),
            port: target.port(),
            kind: AddressKind::Ipv4,
        },
        payload_offset: 26,
        payload: payload.to_vec(),
    }
}
