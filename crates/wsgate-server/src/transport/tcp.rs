//! Outbound TCP endpoint.

use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;
use wsgate_core::{
    BoxFuture, ChunkRead, ChunkStream, ChunkWrite, Destination, GateError, GateResult,
};

const READ_BUF_SIZE: usize = 8192;

/// A TCP connection relaying raw bytes.
pub struct TcpEndpoint {
    reader: TcpReader,
    writer: TcpWriter,
}

/// Receiving half of a [`TcpEndpoint`].
pub struct TcpReader {
    half: OwnedReadHalf,
    buf: Vec<u8>,
}

/// Sending half of a [`TcpEndpoint`]. Closing it shuts down the write side.
pub struct TcpWriter {
    half: OwnedWriteHalf,
    shut: bool,
}

impl TcpEndpoint {
    pub fn new(stream: TcpStream) -> Self {
        let (read, write) = stream.into_split();
        Self {
            reader: TcpReader {
                half: read,
                buf: vec![0u8; READ_BUF_SIZE],
            },
            writer: TcpWriter {
                half: write,
                shut: false,
            },
        }
    }

    /// Connect to `destination`, giving up after `timeout`.
    ///
    /// Both a refused connection and an expired timeout are reported as
    /// [`GateError::UpstreamConnect`].
    pub async fn connect(destination: &Destination, timeout: Duration) -> GateResult<Self> {
        let attempt = TcpStream::connect((destination.host.as_str(), destination.port));
        let stream = match tokio::time::timeout(timeout, attempt).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(GateError::UpstreamConnect {
                    destination: destination.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(GateError::UpstreamConnect {
                    destination: destination.to_string(),
                    reason: format!("timed out after {}ms", timeout.as_millis()),
                })
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "could not set TCP_NODELAY");
        }
        Ok(Self::new(stream))
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.reader.half.peer_addr().ok()
    }
}

impl ChunkRead for TcpReader {
    fn read_chunk(&mut self) -> BoxFuture<'_, GateResult<Option<Vec<u8>>>> {
        Box::pin(async move {
            let n = self
                .half
                .read(&mut self.buf)
                .await
                .map_err(|e| GateError::Transport(format!("TCP read failed: {e}")))?;
            if n == 0 {
                return Ok(None);
            }
            Ok(Some(self.buf[..n].to_vec()))
        })
    }
}

impl ChunkWrite for TcpWriter {
    fn write_chunk<'a>(&'a mut self, data: &'a [u8]) -> BoxFuture<'a, GateResult<()>> {
        Box::pin(async move {
            self.half
                .write_all(data)
                .await
                .map_err(|e| GateError::Transport(format!("TCP write failed: {e}")))
        })
    }

    fn close(&mut self) -> BoxFuture<'_, GateResult<()>> {
        Box::pin(async move {
            if self.shut {
                return Ok(());
            }
            self.shut = true;
            // The peer may already be gone; the socket is released on drop either way.
            let _ = self.half.shutdown().await;
            Ok(())
        })
    }
}

impl ChunkRead for TcpEndpoint {
    fn read_chunk(&mut self) -> BoxFuture<'_, GateResult<Option<Vec<u8>>>> {
        self.reader.read_chunk()
    }
}

impl ChunkWrite for TcpEndpoint {
    fn write_chunk<'a>(&'a mut self, data: &'a [u8]) -> BoxFuture<'a, GateResult<()>> {
        self.writer.write_chunk(data)
    }

    fn close(&mut self) -> BoxFuture<'_, GateResult<()>> {
        self.writer.close()
    }
}

impl ChunkStream for TcpEndpoint {
    type ReadHalf = TcpReader;
    type WriteHalf = TcpWriter;

    fn split(self) -> (TcpReader, TcpWriter) {
        (self.reader, self.writer)
    }
}
