//! HTTP client for the relay
//!
//! Holds the shared reqwest client, base URL, bearer token and retry policy
//! used by the direct, chunked and presigned transfers.

use serde::Deserialize;

use crate::config::UploaderConfig;
use crate::error::UploadError;
use crate::retry::RetryPolicy;

const USER_AGENT: &str = concat!("studio-uploader/", env!("CARGO_PKG_VERSION"));

/// Relay response to an upload request
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    /// `pending` or `complete`
    pub status: String,
    pub upload_id: String,
    #[serde(default)]
    pub received: Option<u32>,
    #[serde(default)]
    pub total: Option<u32>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

impl UploadReceipt {
    pub fn is_complete(&self) -> bool {
        self.status == "complete"
    }
}

#[derive(Debug, Clone)]
pub struct UploadClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    retry: RetryPolicy,
    chunk_size: usize,
}

impl UploadClient {
    pub fn new(config: &UploaderConfig) -> Result<Self, UploadError> {
        Ok(Self {
            http: http_client(config)?,
            base_url: config.base_url()?,
            token: config.token.clone(),
            retry: config.retry_policy(),
            chunk_size: config.chunk_size.max(1),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// `{base_url}/{path}`
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Whole-file endpoint
    pub fn upload_url(&self) -> String {
        self.endpoint("api/upload")
    }

    /// Chunk endpoint
    pub fn chunk_url(&self) -> String {
        self.endpoint("api/upload/chunk")
    }

    /// POST request carrying the bearer token, if one is configured
    pub(crate) fn post(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.http.post(url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// reqwest client with the configured timeout and user agent
pub fn http_client(config: &UploaderConfig) -> Result<reqwest::Client, UploadError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(config.timeout())
        .build()
        .map_err(|e| UploadError::Config(format!("HTTP client: {}", e)))
}

/// Fail non-success responses; success passes through
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, UploadError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(UploadError::from_status(status, body))
}

/// Decode a relay receipt from a success response
pub(crate) async fn read_receipt(response: reqwest::Response) -> Result<UploadReceipt, UploadError> {
    let response = check_status(response).await?;
    let body = response.bytes().await?;
    serde_json::from_slice(&body)
        .map_err(|e| UploadError::InvalidResponse(format!("Upload receipt: {}", e)))
}
