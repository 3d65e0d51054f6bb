//! Core server: one HTTP/1 listener serving the plain-text routes and the
//! WebSocket upgrade that hands connections to a [`GatewaySession`].
//!
//! | Request                         | Response                              |
//! |---------------------------------|---------------------------------------|
//! | `GET /`                         | `Hello world!`                        |
//! | `GET /{sub_path}`               | current connection descriptor         |
//! | WebSocket upgrade on `ws_path`  | `101`, then a gateway session         |
//! | anything else                   | `404`                                 |

use crate::config::ServerConfig;
use crate::session::{GatewaySession, SessionConfig};
use crate::subscription;
use crate::transport::websocket;
use hyper::header::CONTENT_TYPE;
use hyper::server::conn::Http;
use hyper::service::service_fn;
use hyper::{Body, Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use wsgate_core::{GateError, GateResult};

/// The gateway server instance.
pub struct GatewayServer {
    config: Arc<ServerConfig>,
    /// Shared by every session; built once from `config`.
    session_config: Arc<SessionConfig>,
    /// Base64 connection descriptor, empty until generated.
    descriptor: Arc<RwLock<String>>,
}

impl GatewayServer {
    pub fn new(config: ServerConfig) -> Self {
        let session_config = Arc::new(config.session_config());
        Self {
            config: Arc::new(config),
            session_config,
            descriptor: Arc::new(RwLock::new(String::new())),
        }
    }

    /// Bind the configured port, start descriptor generation, and serve.
    pub async fn run(self) -> GateResult<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GateError::Transport(format!("bind {addr} failed: {e}")))?;

        subscription::spawn_generation(self.config.clone(), self.descriptor());
        self.serve(listener).await
    }

    /// Accept connections on `listener` until the task is cancelled.
    pub async fn serve(self, listener: TcpListener) -> GateResult<()> {
        let server = Arc::new(self);

        info!(
            addr = ?listener.local_addr().ok(),
            ws_path = %server.config.ws_path,
            sub_path = %server.config.subscription_route(),
            "wsgate ready"
        );

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let srv = server.clone();
                    tokio::spawn(async move {
                        let service = service_fn(move |req| {
                            let srv = srv.clone();
                            async move { Ok::<_, Infallible>(srv.route(req, peer).await) }
                        });
                        if let Err(e) = Http::new()
                            .serve_connection(stream, service)
                            .with_upgrades()
                            .await
                        {
                            debug!(peer = %peer, error = %e, "HTTP connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "TCP accept failed");
                }
            }
        }
    }

    async fn route(&self, mut req: Request<Body>, peer: SocketAddr) -> Response<Body> {
        let path = req.uri().path().to_string();

        if websocket::is_upgrade_request(&req) {
            if path != self.config.ws_path {
                debug!(peer = %peer, path = %path, "WebSocket upgrade on unknown path");
                return text(StatusCode::NOT_FOUND, "Not Found");
            }
            return match websocket::accept_upgrade(&mut req) {
                Ok((resp, pending)) => {
                    let session_config = self.session_config.clone();
                    tokio::spawn(async move {
                        match pending.open().await {
                            Ok(inbound) => {
                                debug!(peer = %peer, "WebSocket connection accepted");
                                let mut session = GatewaySession::new(peer, session_config);
                                // Outcome is logged by the session itself.
                                let _ = session.run(inbound).await;
                                debug!(peer = %peer, state = ?session.state(), "session finished");
                            }
                            Err(e) => warn!(peer = %peer, error = %e, "WebSocket handshake failed"),
                        }
                    });
                    resp
                }
                Err(resp) => resp,
            };
        }

        if req.method() != Method::GET {
            return text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
        }

        if path == "/" {
            return text(StatusCode::OK, "Hello world!");
        }

        if path == self.config.subscription_route() {
            let body = self.descriptor.read().await.clone();
            let mut resp = Response::new(Body::from(body));
            resp.headers_mut().insert(
                CONTENT_TYPE,
                hyper::header::HeaderValue::from_static("text/plain; charset=utf-8"),
            );
            return resp;
        }

        text(StatusCode::NOT_FOUND, "Not Found")
    }

    /// Handle to the published descriptor.
    pub fn descriptor(&self) -> Arc<RwLock<String>> {
        self.descriptor.clone()
    }
}

fn text(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut resp = Response::new(Body::from(body));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("text/plain"),
    );
    resp
}
