//! Concrete [`ChunkStream`](wsgate_core::ChunkStream) endpoints.
//!
//! - [`websocket`]: the inbound side, a WebSocket upgraded from an HTTP/1 request.
//! - [`tcp`]: the outbound side, a plain TCP connection to the requested destination.

pub mod tcp;
pub mod websocket;

pub use tcp::TcpEndpoint;
pub use websocket::WsEndpoint;
