//! Transport abstraction shared by both ends of a bridge.
//!
//! The inbound WebSocket and the outbound TCP socket both implement
//! [`ChunkStream`], so the relay never needs to know which is which. A stream
//! splits into an owned [`ChunkRead`] half and an owned [`ChunkWrite`] half so
//! the two relay directions can make progress independently.

use crate::error::GateResult;
use std::future::Future;
use std::pin::Pin;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The receiving half of a chunk stream.
pub trait ChunkRead: Send {
    /// Wait for the next chunk. `Ok(None)` means the peer ended the stream.
    fn read_chunk(&mut self) -> BoxFuture<'_, GateResult<Option<Vec<u8>>>>;
}

/// The sending half of a chunk stream.
pub trait ChunkWrite: Send {
    /// Write one chunk in full.
    fn write_chunk<'a>(&'a mut self, data: &'a [u8]) -> BoxFuture<'a, GateResult<()>>;

    /// Close the stream. Calling it more than once is harmless.
    fn close(&mut self) -> BoxFuture<'_, GateResult<()>>;
}

/// A full-duplex channel that moves byte chunks.
pub trait ChunkStream: ChunkRead + ChunkWrite {
    type ReadHalf: ChunkRead + 'static;
    type WriteHalf: ChunkWrite + 'static;

    /// Separate the two directions. Closing the write half closes the stream.
    fn split(self) -> (Self::ReadHalf, Self::WriteHalf);
}
