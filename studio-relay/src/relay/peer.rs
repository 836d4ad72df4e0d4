//! Peer storage relay
//!
//! The gateway requires a session handshake before any transfer: the API key
//! and secret are exchanged for a bearer token at `POST {endpoint}/auth/session`,
//! and the file is then posted as multipart to `POST {endpoint}/upload`.
//! Tokens are cached and re-negotiated once if the gateway rejects them.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{
    file_part, join_url, required, vendor_error, RelayError, RelayOutcome, StorageRelay,
};
use crate::config::PeerConfig;

#[derive(Debug, Serialize)]
struct SessionRequest<'a> {
    api_key: &'a str,
    secret: &'a str,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: Option<String>,
    id: Option<String>,
}

pub struct PeerStorageRelay {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
    secret: String,
    token: Mutex<Option<String>>,
}

impl PeerStorageRelay {
    pub fn new(config: &PeerConfig, http_client: reqwest::Client) -> Result<Self, RelayError> {
        Ok(Self {
            http_client,
            endpoint: required(&config.endpoint, "relay.peer.endpoint")?,
            api_key: required(&config.api_key, "relay.peer.api_key")?,
            secret: required(&config.secret, "relay.peer.secret")?,
            token: Mutex::new(None),
        })
    }

    /// Negotiate a new session token
    async fn handshake(&self) -> Result<String, RelayError> {
        let response = self
            .http_client
            .post(join_url(&self.endpoint, "auth/session"))
            .json(&SessionRequest {
                api_key: &self.api_key,
                secret: &self.secret,
            })
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Auth(format!(
                "Session handshake rejected ({}): {}",
                status, body
            )));
        }

        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| RelayError::Parse(format!("Session response: {}", e)))?;

        debug!("Peer storage session established");
        Ok(session.token)
    }

    /// Cached token, negotiating one if none is held
    async fn session_token(&self) -> Result<String, RelayError> {
        let mut token = self.token.lock().await;
        if let Some(existing) = token.as_ref() {
            return Ok(existing.clone());
        }
        let fresh = self.handshake().await?;
        *token = Some(fresh.clone());
        Ok(fresh)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    async fn post_file(
        &self,
        token: &str,
        data: Bytes,
        key: &str,
        content_type: Option<&str>,
    ) -> Result<reqwest::Response, RelayError> {
        let part = file_part(data, key, content_type)?;
        let form = reqwest::multipart::Form::new()
            .text("name", key.to_string())
            .part("file", part);

        self.http_client
            .post(join_url(&self.endpoint, "upload"))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))
    }
}

#[async_trait]
impl StorageRelay for PeerStorageRelay {
    fn name(&self) -> &'static str {
        "peer-storage"
    }

    async fn upload(
        &self,
        data: Bytes,
        key: &str,
        content_type: Option<&str>,
    ) -> Result<RelayOutcome, RelayError> {
        let token = self.session_token().await?;
        let mut response = self.post_file(&token, data.clone(), key, content_type).await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            warn!("Peer storage session expired, renegotiating");
            self.invalidate_token().await;
            let token = self.session_token().await?;
            response = self.post_file(&token, data, key, content_type).await?;
        }

        if !response.status().is_success() {
            return Err(vendor_error(response).await);
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| RelayError::Parse(format!("Upload response: {}", e)))?;
        let url = body
            .url
            .ok_or_else(|| RelayError::Parse("Upload response has no url".to_string()))?;

        info!(key = %key, url = %url, "Uploaded to peer storage");
        Ok(RelayOutcome { url, id: body.id })
    }
}
