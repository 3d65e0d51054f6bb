//! WebSocket endpoint over an upgraded hyper connection.
//!
//! The gateway shares one HTTP listener with the plain-text routes, so the
//! WebSocket handshake is answered by hand: [`accept_upgrade`] produces the
//! `101 Switching Protocols` response and a [`PendingWebSocket`] that resolves
//! to a [`WsEndpoint`] once hyper hands over the raw connection.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use hyper::header::{
    HeaderMap, HeaderValue, CONNECTION, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY,
    SEC_WEBSOCKET_VERSION, UPGRADE,
};
use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper::{Body, Request, Response, StatusCode};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::{Role, WebSocketConfig};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::debug;
use wsgate_core::{BoxFuture, ChunkRead, ChunkStream, ChunkWrite, GateError, GateResult};

/// Maximum size of a single binary message (1 MiB).
const MAX_WS_FRAME_SIZE: usize = 1_048_576;

/// A WebSocket carrying binary chunks.
pub struct WsEndpoint<S> {
    reader: WsReader<S>,
    writer: WsWriter<S>,
}

/// Receiving half of a [`WsEndpoint`].
pub struct WsReader<S> {
    stream: SplitStream<WebSocketStream<S>>,
}

/// Sending half of a [`WsEndpoint`]. Closing it sends a close frame.
pub struct WsWriter<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
    closed: bool,
}

impl<S> WsEndpoint<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(ws: WebSocketStream<S>) -> Self {
        let (sink, stream) = ws.split();
        Self {
            reader: WsReader { stream },
            writer: WsWriter {
                sink,
                closed: false,
            },
        }
    }

    /// Wrap a raw connection on which the upgrade has already completed.
    ///
    /// Messages and frames over 1 MiB are refused while being read.
    pub async fn from_raw_socket(socket: S) -> Self {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(MAX_WS_FRAME_SIZE);
        config.max_frame_size = Some(MAX_WS_FRAME_SIZE);
        let ws = WebSocketStream::from_raw_socket(socket, Role::Server, Some(config)).await;
        Self::new(ws)
    }
}

impl<S> WsReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Receive the next binary message.
    ///
    /// Returns `None` if the connection is closed. Text, ping and pong
    /// messages are skipped; tungstenite answers pings on its own.
    async fn recv_binary(&mut self) -> GateResult<Option<Vec<u8>>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(data.to_vec())),
                Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(_)) => continue,
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => return Ok(None),
                Some(Err(e)) => {
                    return Err(GateError::Transport(format!("WS recv failed: {e}")));
                }
                None => return Ok(None),
            }
        }
    }
}

impl<S> WsWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send_binary(&mut self, data: &[u8]) -> GateResult<()> {
        if self.closed {
            return Err(GateError::Transport("WS send after close".into()));
        }
        self.sink
            .send(Message::Binary(data.to_vec().into()))
            .await
            .map_err(|e| GateError::Transport(format!("WS send failed: {e}")))
    }

    async fn shutdown(&mut self) -> GateResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.sink.close().await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(GateError::Transport(format!("WS close failed: {e}"))),
        }
    }
}

impl<S> ChunkRead for WsReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn read_chunk(&mut self) -> BoxFuture<'_, GateResult<Option<Vec<u8>>>> {
        Box::pin(self.recv_binary())
    }
}

impl<S> ChunkWrite for WsWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn write_chunk<'a>(&'a mut self, data: &'a [u8]) -> BoxFuture<'a, GateResult<()>> {
        Box::pin(self.send_binary(data))
    }

    fn close(&mut self) -> BoxFuture<'_, GateResult<()>> {
        Box::pin(self.shutdown())
    }
}

impl<S> ChunkRead for WsEndpoint<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn read_chunk(&mut self) -> BoxFuture<'_, GateResult<Option<Vec<u8>>>> {
        self.reader.read_chunk()
    }
}

impl<S> ChunkWrite for WsEndpoint<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn write_chunk<'a>(&'a mut self, data: &'a [u8]) -> BoxFuture<'a, GateResult<()>> {
        self.writer.write_chunk(data)
    }

    fn close(&mut self) -> BoxFuture<'_, GateResult<()>> {
        self.writer.close()
    }
}

impl<S> ChunkStream for WsEndpoint<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type ReadHalf = WsReader<S>;
    type WriteHalf = WsWriter<S>;

    fn split(self) -> (WsReader<S>, WsWriter<S>) {
        (self.reader, self.writer)
    }
}

/// An accepted upgrade waiting for hyper to release the connection.
pub struct PendingWebSocket {
    on_upgrade: OnUpgrade,
}

impl PendingWebSocket {
    /// Wait for the upgrade to complete and wrap the raw connection.
    pub async fn open(self) -> GateResult<WsEndpoint<Upgraded>> {
        let upgraded = self
            .on_upgrade
            .await
            .map_err(|e| GateError::Transport(format!("WS upgrade failed: {e}")))?;
        Ok(WsEndpoint::from_raw_socket(upgraded).await)
    }
}

/// Whether the request asks for a WebSocket upgrade.
pub fn is_upgrade_request<B>(req: &Request<B>) -> bool {
    header_has_token(req.headers(), &UPGRADE, "websocket")
        && header_has_token(req.headers(), &CONNECTION, "upgrade")
}

/// Answer a WebSocket upgrade request.
///
/// On success returns the `101` response to send and the pending socket. On a
/// bad handshake returns the error response to send instead.
pub fn accept_upgrade(
    req: &mut Request<Body>,
) -> Result<(Response<Body>, PendingWebSocket), Response<Body>> {
    let version_ok = req
        .headers()
        .get(SEC_WEBSOCKET_VERSION)
        .map(|v| v.as_bytes() == b"13")
        .unwrap_or(false);
    if !version_ok {
        debug!("WS upgrade with unsupported or missing version");
        return Err(plain(StatusCode::BAD_REQUEST, "unsupported websocket version"));
    }

    let Some(key) = req.headers().get(SEC_WEBSOCKET_KEY) else {
        return Err(plain(StatusCode::BAD_REQUEST, "missing sec-websocket-key"));
    };
    let accept_key = match HeaderValue::from_str(&derive_accept_key(key.as_bytes())) {
        Ok(v) => v,
        Err(_) => return Err(plain(StatusCode::BAD_REQUEST, "invalid sec-websocket-key")),
    };

    let on_upgrade = hyper::upgrade::on(req);

    let mut resp = Response::new(Body::empty());
    *resp.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    resp.headers_mut()
        .insert(UPGRADE, HeaderValue::from_static("websocket"));
    resp.headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("Upgrade"));
    resp.headers_mut().insert(SEC_WEBSOCKET_ACCEPT, accept_key);

    Ok((resp, PendingWebSocket { on_upgrade }))
}

fn header_has_token(headers: &HeaderMap, name: &hyper::header::HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

fn plain(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut resp = Response::new(Body::from(body));
    *resp.status_mut() = status;
    resp
}
