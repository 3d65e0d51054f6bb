//! wsgate: WebSocket-to-TCP gateway.
//!
//! Accepts WebSocket connections carrying a single binary handshake frame
//! (client identity + destination), connects to the destination over TCP, and
//! relays bytes in both directions. The same port serves a plain-text
//! connection descriptor for clients.

mod bridge;
mod config;
mod server;
mod session;
mod subscription;
mod transport;

#[cfg(test)]
mod testing;

use clap::Parser;
use config::{ConfigOverrides, ServerConfig};
use server::GatewayServer;
use std::path::PathBuf;
use tracing::{error, info};

/// wsgate — WebSocket-to-TCP gateway
#[derive(Parser, Debug)]
#[command(name = "wsgate", version, about = "WebSocket-to-TCP gateway")]
struct Cli {
    /// Listen port (falls back to $PORT)
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Client identity, 36-character hyphenated hex
    #[arg(long, env = "UID")]
    uuid: Option<String>,

    /// WebSocket path accepted for handshakes
    #[arg(long, env = "WS_PATH")]
    ws_path: Option<String>,

    /// HTTP path serving the connection descriptor
    #[arg(long, env = "S_PATH")]
    sub_path: Option<String>,

    /// Public domain advertised in the connection descriptor
    #[arg(long, env = "MY_DOMAIN")]
    domain: Option<String>,

    /// Public port advertised in the connection descriptor
    #[arg(long, env = "CPORT")]
    cdn_port: Option<u16>,

    /// Name prefix of the connection descriptor
    #[arg(long, env = "NAME")]
    name: Option<String>,

    /// Directory the descriptor is written to
    #[arg(long, env = "FILE_PATH")]
    file_path: Option<String>,

    /// Upstream connect timeout in seconds
    #[arg(long)]
    connect_timeout: Option<u64>,

    /// Config file path
    #[arg(long, default_value = "~/.wsgate/config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        let port = self
            .port
            .or_else(|| std::env::var("PORT").ok().and_then(|p| p.parse().ok()));
        ConfigOverrides {
            port,
            uuid: self.uuid.clone(),
            ws_path: self.ws_path.clone(),
            sub_path: self.sub_path.clone(),
            domain: self.domain.clone(),
            cdn_port: self.cdn_port,
            name: self.name.clone(),
            file_path: self.file_path.clone(),
            connect_timeout: self.connect_timeout,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    use tracing_subscriber::EnvFilter;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting wsgate");

    let config_path = PathBuf::from(&cli.config);
    let server_config = match ServerConfig::load(Some(&config_path), cli.overrides()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    info!(
        port = server_config.port,
        ws_path = %server_config.ws_path,
        domain = %server_config.domain,
        "configuration loaded"
    );

    let server = GatewayServer::new(server_config);

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(error = %e, "server error");
                std::process::exit(1);
            }
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    info!("wsgate stopped");
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
