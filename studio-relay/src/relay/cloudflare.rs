//! Cloudflare Stream relay
//!
//! Videos are posted as multipart to the account's Stream endpoint. The
//! vendor answers with its usual `{ success, errors, result }` envelope; the
//! video uid becomes the upload id and the HLS manifest the returned URL.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use tracing::info;

use super::{
    file_part, join_url, required, vendor_error, RelayError, RelayOutcome, StorageRelay,
};
use crate::config::CloudflareConfig;

#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<StreamVideo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct StreamVideo {
    uid: String,
}

pub struct CloudflareStreamRelay {
    http_client: reqwest::Client,
    api_base: String,
    account_id: String,
    api_token: String,
    playback_base: String,
}

impl CloudflareStreamRelay {
    pub fn new(config: &CloudflareConfig, http_client: reqwest::Client) -> Result<Self, RelayError> {
        Ok(Self {
            http_client,
            api_base: config.api_base.clone(),
            account_id: required(&config.account_id, "relay.cloudflare.account_id")?,
            api_token: required(&config.api_token, "relay.cloudflare.api_token")?,
            playback_base: config.playback_base.clone(),
        })
    }

    fn stream_url(&self) -> String {
        join_url(&self.api_base, &format!("accounts/{}/stream", self.account_id))
    }

    pub fn playback_url(&self, uid: &str) -> String {
        join_url(&self.playback_base, &format!("{}/manifest/video.m3u8", uid))
    }
}

#[async_trait]
impl StorageRelay for CloudflareStreamRelay {
    fn name(&self) -> &'static str {
        "cloudflare-stream"
    }

    async fn upload(
        &self,
        data: Bytes,
        key: &str,
        content_type: Option<&str>,
    ) -> Result<RelayOutcome, RelayError> {
        let part = file_part(data, key, content_type)?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http_client
            .post(self.stream_url())
            .bearer_auth(&self.api_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(vendor_error(response).await);
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| RelayError::Parse(format!("Stream response: {}", e)))?;

        if !envelope.success {
            let message = envelope
                .errors
                .iter()
                .map(|e| format!("{} ({})", e.message, e.code))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(RelayError::Vendor {
                status: 200,
                message,
            });
        }

        let uid = envelope
            .result
            .map(|video| video.uid)
            .ok_or_else(|| RelayError::Parse("Stream response has no result.uid".to_string()))?;

        let url = self.playback_url(&uid);
        info!(key = %key, uid = %uid, "Uploaded to Cloudflare Stream");
        Ok(RelayOutcome { url, id: Some(uid) })
    }
}
