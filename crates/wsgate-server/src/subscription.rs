//! Connection descriptor ("subscription") generation.
//!
//! Built once at startup: a share link naming this gateway, labelled with the
//! host's country and network operator, base64-encoded and served over HTTP.

use crate::config::ServerConfig;
use base64::Engine;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use wsgate_core::{GateError, GateResult};

/// Label used when the geolocation lookup fails.
pub const UNKNOWN_ISP: &str = "Unknown-ISP";

/// File the descriptor is persisted to, inside the configured directory.
pub const DESCRIPTOR_FILE: &str = "sub.txt";

/// Subset of the geolocation endpoint's JSON response.
#[derive(Debug, Deserialize)]
struct GeoMeta {
    country: Option<String>,
    #[serde(rename = "asOrganization")]
    as_organization: Option<String>,
}

/// Parameters of the share link.
#[derive(Debug, Clone)]
pub struct LinkParams<'a> {
    /// The identity exactly as configured.
    pub uuid: &'a str,
    pub domain: &'a str,
    pub port: u16,
    pub ws_path: &'a str,
    pub name: &'a str,
}

impl<'a> LinkParams<'a> {
    pub fn from_config(config: &'a ServerConfig) -> Self {
        Self {
            uuid: &config.uuid,
            domain: &config.domain,
            port: config.cdn_port,
            ws_path: &config.ws_path,
            name: &config.name,
        }
    }
}

/// `{country}-{organization}` with every whitespace character replaced by `_`.
pub fn isp_label(country: &str, organization: &str) -> String {
    format!("{country}-{organization}")
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Compose the share link for this gateway.
pub fn build_link(params: &LinkParams<'_>, isp: &str) -> String {
    let LinkParams {
        uuid,
        domain,
        port,
        ws_path,
        name,
    } = params;
    format!(
        "vless://{uuid}@{domain}:{port}?encryption=none&security=tls&sni={domain}\
         &fp=chrome&type=ws&host={domain}&path={path}#{name}-{isp}",
        path = urlencoding::encode(ws_path),
    )
}

/// Standard base64 of the link.
pub fn encode_descriptor(link: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(link.as_bytes())
}

/// Query the geolocation endpoint. Any failure yields [`UNKNOWN_ISP`].
pub async fn lookup_isp(client: &reqwest::Client, url: &str) -> String {
    match fetch_geo_meta(client, url).await {
        Ok(label) => label,
        Err(e) => {
            warn!(url = %url, error = %e, "geolocation lookup failed");
            UNKNOWN_ISP.to_string()
        }
    }
}

async fn fetch_geo_meta(client: &reqwest::Client, url: &str) -> GateResult<String> {
    let meta: GeoMeta = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| GateError::Other(format!("geolocation request failed: {e}")))?
        .json()
        .await
        .map_err(|e| GateError::Other(format!("geolocation response invalid: {e}")))?;

    match (meta.country, meta.as_organization) {
        (Some(country), Some(org)) => Ok(isp_label(&country, &org)),
        _ => Err(GateError::Other(
            "geolocation response missing country or asOrganization".into(),
        )),
    }
}

/// Ensure the working directory exists and drop a descriptor left by a previous run.
pub fn prepare_dir(dir: &Path) -> GateResult<()> {
    if dir.exists() {
        info!(path = %dir.display(), "working directory already exists");
    } else {
        std::fs::create_dir_all(dir)?;
        info!(path = %dir.display(), "working directory created");
    }

    match std::fs::remove_file(dir.join(DESCRIPTOR_FILE)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Build the descriptor and persist it. Returns `None` when no domain is configured.
pub async fn generate(config: &ServerConfig, client: &reqwest::Client) -> GateResult<Option<String>> {
    if config.domain.is_empty() {
        error!("no public domain configured (MY_DOMAIN), connection descriptor not generated");
        return Ok(None);
    }

    let isp = lookup_isp(client, &config.meta_url).await;
    let link = build_link(&LinkParams::from_config(config), &isp);
    let descriptor = encode_descriptor(&link);

    let path = config.file_path.join(DESCRIPTOR_FILE);
    tokio::fs::write(&path, &descriptor).await?;
    info!(path = %path.display(), isp = %isp, "connection descriptor generated");

    Ok(Some(descriptor))
}

/// Run [`prepare_dir`] and [`generate`] in the background, publishing into `slot`.
pub fn spawn_generation(config: Arc<ServerConfig>, slot: Arc<RwLock<String>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = prepare_dir(&config.file_path) {
            warn!(path = %config.file_path.display(), error = %e, "could not prepare working directory");
        }

        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
        {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "failed to build HTTP client");
                return;
            }
        };

        match generate(&config, &client).await {
            Ok(Some(descriptor)) => *slot.write().await = descriptor,
            Ok(None) => {}
            Err(e) => error!(error = %e, "connection descriptor generation failed"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigFile, ConfigOverrides};
    use crate::testing::TEST_UID;

    #[test]
    fn label_replaces_whitespace() {
        assert_eq!(isp_label("US", "Cloudflare, Inc."), "US-Cloudflare,_Inc.");
        assert_eq!(isp_label("DE", "Hetzner\tOnline GmbH"), "DE-Hetzner_Online_GmbH");
    }

    #[test]
    fn link_format() {
        let params = LinkParams {
            uuid: TEST_UID,
            domain: "gw.example.com",
            port: 443,
            ws_path: "/75de94bb",
            name: "Vls",
        };
        assert_eq!(
            build_link(&params, "US-Example"),
            "vless://75de94bb-b5cb-4ad4-b72b-251476b36f3a@gw.example.com:443\
             ?encryption=none&security=tls&sni=gw.example.com&fp=chrome&type=ws\
             &host=gw.example.com&path=%2F75de94bb#Vls-US-Example"
        );
    }

    #[test]
    fn descriptor_is_base64_of_link() {
        assert_eq!(encode_descriptor("vless://x"), "dmxlc3M6Ly94");
    }

    #[test]
    fn prepare_dir_creates_and_cleans() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("work");
        prepare_dir(&dir).unwrap();
        assert!(dir.is_dir());

        std::fs::write(dir.join(DESCRIPTOR_FILE), "stale").unwrap();
        prepare_dir(&dir).unwrap();
        assert!(!dir.join(DESCRIPTOR_FILE).exists());
    }

    #[tokio::test]
    async fn generate_without_domain_is_skipped() {
        let root = tempfile::tempdir().unwrap();
        let cfg = ServerConfig::resolve(
            ConfigFile::default(),
            ConfigOverrides {
                file_path: Some(root.path().display().to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        let client = reqwest::Client::new();
        assert!(generate(&cfg, &client).await.unwrap().is_none());
        assert!(!root.path().join(DESCRIPTOR_FILE).exists());
    }

    #[tokio::test]
    async fn unreachable_geolocation_falls_back() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/meta", listener.local_addr().unwrap());
        drop(listener);

        let client = reqwest::Client::new();
        assert_eq!(lookup_isp(&client, &url).await, UNKNOWN_ISP);
    }
}
