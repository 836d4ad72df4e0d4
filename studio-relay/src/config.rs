//! Configuration for studio-relay
//!
//! Resolution: `--config` → `STUDIO_RELAY_CONFIG` → platform `relay.toml` →
//! compiled defaults. Vendor secrets may additionally be supplied through
//! environment variables, which take precedence over the file.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use studio_common::config::{env_override, load_toml, resolve_config_path};
use studio_common::Result;
use tracing::info;

pub const CONFIG_ENV_VAR: &str = "STUDIO_RELAY_CONFIG";
pub const CONFIG_FILE_NAME: &str = "relay.toml";

/// Top-level relay configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Listen address
    pub bind: String,
    /// Idle time after which the sweep drops a session
    pub session_timeout_secs: u64,
    /// Interval of the sweep task started by the binary
    pub sweep_interval_secs: u64,
    /// Request body limit for the chunk endpoint
    pub max_chunk_bytes: usize,
    /// Request body limit for the whole-file endpoint
    pub max_file_bytes: usize,
    /// Broadcast capacity of the progress event bus
    pub event_capacity: usize,
    pub auth: AuthConfig,
    pub relay: VendorConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5740".to_string(),
            session_timeout_secs: 30 * 60,
            sweep_interval_secs: 300,
            max_chunk_bytes: 16 * 1024 * 1024,
            max_file_bytes: 2 * 1024 * 1024 * 1024,
            event_capacity: 100,
            auth: AuthConfig::default(),
            relay: VendorConfig::default(),
        }
    }
}

impl RelayConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Load from the resolved config file and apply environment overrides
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let path = resolve_config_path(cli_path, CONFIG_ENV_VAR, CONFIG_FILE_NAME);
        let mut config: RelayConfig = load_toml(path.as_deref())?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Overlay vendor credentials from the environment
    pub fn apply_env_overrides(&mut self) {
        let overrides: [(&str, &mut Option<String>); 6] = [
            ("STUDIO_S3_ACCESS_KEY", &mut self.relay.s3.access_key),
            ("STUDIO_S3_SECRET_KEY", &mut self.relay.s3.secret_key),
            ("STUDIO_CDN_ACCESS_KEY", &mut self.relay.cdn.access_key),
            ("STUDIO_PEER_API_KEY", &mut self.relay.peer.api_key),
            ("STUDIO_PEER_SECRET", &mut self.relay.peer.secret),
            ("STUDIO_CF_API_TOKEN", &mut self.relay.cloudflare.api_token),
        ];

        for (name, slot) in overrides {
            if let Some(value) = env_override(name) {
                info!("{} loaded from environment variable", name);
                *slot = Some(value);
            }
        }
    }
}

/// Bearer token table
///
/// Tokens are issued by the hosted identity provider; each maps to the
/// user id progress events are addressed to. An empty table disables
/// authentication.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub tokens: HashMap<String, String>,
}

impl AuthConfig {
    pub fn is_enabled(&self) -> bool {
        !self.tokens.is_empty()
    }
}

/// Which vendor relay receives assembled uploads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelayKind {
    #[default]
    S3Public,
    S3Signed,
    CdnStorage,
    PeerStorage,
    CloudflareStream,
}

impl RelayKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayKind::S3Public => "s3-public",
            RelayKind::S3Signed => "s3-signed",
            RelayKind::CdnStorage => "cdn-storage",
            RelayKind::PeerStorage => "peer-storage",
            RelayKind::CloudflareStream => "cloudflare-stream",
        }
    }
}

/// Vendor selection plus per-vendor settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VendorConfig {
    pub kind: RelayKind,
    /// Request timeout for HTTP vendors
    pub timeout_secs: Option<u64>,
    pub s3: S3Config,
    pub cdn: CdnConfig,
    pub peer: PeerConfig,
    pub cloudflare: CloudflareConfig,
}

/// S3-compatible bucket (path-style addressing)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct S3Config {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Public CDN prefix for `s3-public`
    pub public_base_url: Option<String>,
    /// Lifetime of `s3-signed` read URLs
    pub presign_expires_secs: u64,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: "auto".to_string(),
            bucket: None,
            access_key: None,
            secret_key: None,
            public_base_url: None,
            presign_expires_secs: 3600,
        }
    }
}

/// CDN edge storage zone
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CdnConfig {
    pub endpoint: String,
    pub zone: Option<String>,
    pub access_key: Option<String>,
    /// Public pull-zone URL files are served from
    pub pull_zone_url: Option<String>,
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://storage.bunnycdn.com".to_string(),
            zone: None,
            access_key: None,
            pull_zone_url: None,
        }
    }
}

/// Peer storage gateway
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub secret: Option<String>,
}

/// Cloudflare Stream account
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CloudflareConfig {
    pub api_base: String,
    pub account_id: Option<String>,
    pub api_token: Option<String>,
    /// Playback host; the relay returns `{playback_base}/{uid}/manifest/video.m3u8`
    pub playback_base: String,
}

impl Default for CloudflareConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.cloudflare.com/client/v4".to_string(),
            account_id: None,
            api_token: None,
            playback_base: "https://videodelivery.net".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.session_timeout(), Duration::from_secs(1800));
        assert_eq!(config.relay.kind, RelayKind::S3Public);
        assert!(!config.auth.is_enabled());
        assert_eq!(config.relay.s3.presign_expires_secs, 3600);
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
bind = "0.0.0.0:9000"
session_timeout_secs = 600

[auth.tokens]
"tok-1" = "user-1"

[relay]
kind = "cloudflare-stream"

[relay.cloudflare]
account_id = "acct"
api_token = "cf-token"
"#
        )
        .unwrap();

        let config = RelayConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.bind, "0.0.0.0:9000");
        assert_eq!(config.session_timeout_secs, 600);
        assert_eq!(config.sweep_interval_secs, 300);
        assert_eq!(config.auth.tokens.get("tok-1").map(String::as_str), Some("user-1"));
        assert_eq!(config.relay.kind, RelayKind::CloudflareStream);
        assert_eq!(config.relay.cloudflare.account_id.as_deref(), Some("acct"));
        assert_eq!(
            config.relay.cloudflare.api_base,
            "https://api.cloudflare.com/client/v4"
        );
    }

    #[test]
    #[serial]
    fn test_env_overrides_secrets() {
        std::env::set_var("STUDIO_S3_SECRET_KEY", "from-env");
        let mut config = RelayConfig::default();
        config.relay.s3.secret_key = Some("from-file".to_string());

        config.apply_env_overrides();
        std::env::remove_var("STUDIO_S3_SECRET_KEY");

        assert_eq!(config.relay.s3.secret_key.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_unknown_relay_kind_rejected() {
        let result: std::result::Result<VendorConfig, _> = toml::from_str("kind = \"ftp\"");
        assert!(result.is_err());
    }
}
