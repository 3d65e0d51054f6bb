//! Server configuration: TOML file + CLI/environment overrides.

use crate::session::SessionConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use wsgate_core::{GateError, GateResult, Identity};

/// Identity used when none is configured.
pub const DEFAULT_UUID: &str = "75de94bb-b5cb-4ad4-b72b-251476b36f3a";

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub subscription: SubscriptionSection,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_uuid")]
    pub uuid: String,
    /// Defaults to `/` + the first 8 characters of `uuid`.
    #[serde(default)]
    pub ws_path: Option<String>,
    /// Seconds.
    #[serde(default = "default_timeout")]
    pub connect_timeout: u64,
    /// Seconds.
    #[serde(default = "default_timeout")]
    pub handshake_timeout: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            uuid: default_uuid(),
            ws_path: None,
            connect_timeout: default_timeout(),
            handshake_timeout: default_timeout(),
        }
    }
}

/// `[subscription]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionSection {
    /// Route serving the descriptor. Defaults to the uuid.
    #[serde(default)]
    pub path: Option<String>,
    /// Public domain the gateway is reachable at. Empty disables the descriptor.
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_cdn_port")]
    pub cdn_port: u16,
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_file_path")]
    pub file_path: String,
    #[serde(default = "default_meta_url")]
    pub meta_url: String,
}

impl Default for SubscriptionSection {
    fn default() -> Self {
        Self {
            path: None,
            domain: String::new(),
            cdn_port: default_cdn_port(),
            name: default_name(),
            file_path: default_file_path(),
            meta_url: default_meta_url(),
        }
    }
}

fn default_port() -> u16 {
    3005
}
fn default_uuid() -> String {
    DEFAULT_UUID.to_string()
}
fn default_timeout() -> u64 {
    10
}
fn default_cdn_port() -> u16 {
    443
}
fn default_name() -> String {
    "Vls".to_string()
}
fn default_file_path() -> String {
    "./tmp".to_string()
}
fn default_meta_url() -> String {
    "https://speed.cloudflare.com/meta".to_string()
}

/// Values from the command line or environment; `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub uuid: Option<String>,
    pub ws_path: Option<String>,
    pub sub_path: Option<String>,
    pub domain: Option<String>,
    pub cdn_port: Option<u16>,
    pub name: Option<String>,
    pub file_path: Option<String>,
    pub connect_timeout: Option<u64>,
}

/// Resolved server configuration (paths expanded, overrides applied, identity parsed).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub identity: Identity,
    /// The identity exactly as configured.
    pub uuid: String,
    /// Always starts with `/`.
    pub ws_path: String,
    /// Without the leading `/`.
    pub sub_path: String,
    pub domain: String,
    pub cdn_port: u16,
    pub name: String,
    pub file_path: PathBuf,
    pub meta_url: String,
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
}

impl ServerConfig {
    /// Load config from TOML file, then apply overrides.
    pub fn load(config_path: Option<&Path>, overrides: ConfigOverrides) -> GateResult<Self> {
        let file_config = if let Some(path) = config_path {
            let expanded = expand_tilde(path);
            if expanded.exists() {
                info!(path = %expanded.display(), "loading config file");
                let content = std::fs::read_to_string(&expanded)?;
                toml::from_str::<ConfigFile>(&content)
                    .map_err(|e| GateError::Config(format!("config parse error: {e}")))?
            } else {
                info!(path = %expanded.display(), "config file not found, using defaults");
                ConfigFile::default()
            }
        } else {
            ConfigFile::default()
        };

        Self::resolve(file_config, overrides)
    }

    /// Merge a parsed file with overrides and validate the result.
    pub fn resolve(file: ConfigFile, overrides: ConfigOverrides) -> GateResult<Self> {
        let ConfigFile {
            server,
            subscription,
        } = file;

        let uuid = overrides
            .uuid
            .unwrap_or(server.uuid)
            .trim()
            .to_string();
        let identity = Identity::parse(&uuid)?;

        let ws_path = overrides
            .ws_path
            .or(server.ws_path)
            .filter(|p| !p.trim().is_empty())
            .map(|p| normalize_route(&p))
            .unwrap_or_else(|| format!("/{}", &uuid[..8]));

        let sub_path = overrides
            .sub_path
            .or(subscription.path)
            .map(|p| p.trim().trim_start_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| uuid.clone());

        if format!("/{sub_path}") == ws_path {
            return Err(GateError::Config(format!(
                "subscription path and websocket path are both {ws_path}"
            )));
        }

        let connect_timeout = overrides.connect_timeout.unwrap_or(server.connect_timeout);
        if connect_timeout == 0 || server.handshake_timeout == 0 {
            return Err(GateError::Config("timeouts must be at least 1 second".into()));
        }

        let file_path = overrides.file_path.unwrap_or(subscription.file_path);

        Ok(Self {
            port: overrides.port.unwrap_or(server.port),
            identity,
            uuid,
            ws_path,
            sub_path,
            domain: overrides
                .domain
                .unwrap_or(subscription.domain)
                .trim()
                .to_string(),
            cdn_port: overrides.cdn_port.unwrap_or(subscription.cdn_port),
            name: overrides.name.unwrap_or(subscription.name),
            file_path: expand_tilde_str(&file_path),
            meta_url: subscription.meta_url,
            connect_timeout: Duration::from_secs(connect_timeout),
            handshake_timeout: Duration::from_secs(server.handshake_timeout),
        })
    }

    /// HTTP route serving the connection descriptor.
    pub fn subscription_route(&self) -> String {
        format!("/{}", self.sub_path)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            identity: self.identity,
            connect_timeout: self.connect_timeout,
            handshake_timeout: self.handshake_timeout,
        }
    }
}

fn normalize_route(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Expand `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    expand_tilde_str(&s)
}

fn expand_tilde_str(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}
