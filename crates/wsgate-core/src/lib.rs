//! wsgate-core: protocol library for the WebSocket-to-TCP gateway.
//!
//! Provides the handshake parser, destination decoding, identity handling,
//! a bounded byte reader, and the transport traits both relay ends implement.

pub mod address;
pub mod error;
pub mod handshake;
pub mod identity;
pub mod reader;
pub mod transport;

// Re-export commonly used items at crate root.
pub use address::{AddressKind, Destination};
pub use error::{GateError, GateResult};
pub use handshake::{acknowledgment, parse, ParsedRequest};
pub use identity::Identity;
pub use reader::{ByteReader, OutOfBounds};
pub use transport::{BoxFuture, ChunkRead, ChunkStream, ChunkWrite};
