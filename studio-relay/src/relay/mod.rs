//! Storage vendor relays
//!
//! Every relay takes a complete file buffer plus a destination key and
//! returns an address the file can be fetched from. The assembly step only
//! ever sees the `StorageRelay` trait.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{RelayKind, VendorConfig};

pub mod cdn;
pub mod cloudflare;
pub mod peer;
pub mod s3;

pub use cdn::CdnStorageRelay;
pub use cloudflare::CloudflareStreamRelay;
pub use peer::PeerStorageRelay;
pub use s3::{S3PublicRelay, S3SignedRelay};

const USER_AGENT: &str = concat!("studio-relay/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Relay errors
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Relay not configured: {0}")]
    Config(String),

    #[error("Vendor authentication failed: {0}")]
    Auth(String),

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Vendor error {status}: {message}")]
    Vendor { status: u16, message: String },

    #[error("Unexpected vendor response: {0}")]
    Parse(String),
}

/// Address of an uploaded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayOutcome {
    /// Public or time-limited signed URL
    pub url: String,
    /// Vendor-assigned identifier, where the vendor issues one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl RelayOutcome {
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            id: None,
        }
    }
}

/// Forwards a complete file buffer to a storage vendor
#[async_trait]
pub trait StorageRelay: Send + Sync {
    /// Relay identifier for logs and health output
    fn name(&self) -> &'static str;

    /// Upload `data` under `key`
    async fn upload(
        &self,
        data: Bytes,
        key: &str,
        content_type: Option<&str>,
    ) -> Result<RelayOutcome, RelayError>;
}

/// Build the relay selected by `config.kind`
pub fn build_relay(config: &VendorConfig) -> Result<Arc<dyn StorageRelay>, RelayError> {
    let relay: Arc<dyn StorageRelay> = match config.kind {
        RelayKind::S3Public => Arc::new(S3PublicRelay::new(&config.s3)?),
        RelayKind::S3Signed => Arc::new(S3SignedRelay::new(&config.s3)?),
        RelayKind::CdnStorage => Arc::new(CdnStorageRelay::new(&config.cdn, http_client(config)?)?),
        RelayKind::PeerStorage => {
            Arc::new(PeerStorageRelay::new(&config.peer, http_client(config)?)?)
        }
        RelayKind::CloudflareStream => Arc::new(CloudflareStreamRelay::new(
            &config.cloudflare,
            http_client(config)?,
        )?),
    };
    Ok(relay)
}

/// Shared HTTP client for the HTTP-based vendors
pub fn http_client(config: &VendorConfig) -> Result<reqwest::Client, RelayError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(
            config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        ))
        .build()
        .map_err(|e| RelayError::Config(format!("HTTP client: {}", e)))
}

/// Required config value or a `Config` error naming it
pub(crate) fn required(value: &Option<String>, name: &str) -> Result<String, RelayError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| RelayError::Config(format!("{} is not set", name)))
}

/// Join a base URL and an object key with exactly one slash
pub(crate) fn join_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key.trim_start_matches('/'))
}

/// Multipart file part sharing the assembled buffer instead of copying it
pub(crate) fn file_part(
    data: Bytes,
    file_name: &str,
    content_type: Option<&str>,
) -> Result<reqwest::multipart::Part, RelayError> {
    let len = data.len() as u64;
    let part = reqwest::multipart::Part::stream_with_length(reqwest::Body::from(data), len)
        .file_name(file_name.to_string());
    match content_type {
        Some(content_type) => part
            .mime_str(content_type)
            .map_err(|e| RelayError::Config(format!("Invalid content type: {}", e))),
        None => Ok(part),
    }
}

/// Map a non-success vendor response to a `RelayError`
pub(crate) async fn vendor_error(response: reqwest::Response) -> RelayError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    if status == 401 || status == 403 {
        RelayError::Auth(format!("HTTP {}: {}", status, message))
    } else {
        RelayError::Vendor { status, message }
    }
}

/// Destination key for an upload: `<upload_id>` or `<upload_id>-<file name>`
///
/// File names are reduced to ASCII alphanumerics, `.`, `-` and `_`.
pub fn object_key(upload_id: &str, file_name: Option<&str>) -> String {
    let sanitized: Option<String> = file_name.map(|name| {
        name.rsplit(['/', '\\'])
            .next()
            .unwrap_or(name)
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    });

    match sanitized {
        Some(name) if !name.trim_matches(['.', '_']).is_empty() => {
            format!("{}-{}", upload_id, name)
        }
        _ => upload_id.to_string(),
    }
}
