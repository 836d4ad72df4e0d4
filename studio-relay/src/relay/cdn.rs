//! CDN edge storage relay
//!
//! Files are PUT into a storage zone (`{endpoint}/{zone}/{key}`) authenticated
//! with the zone's `AccessKey` header, then served from the zone's pull URL.

use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

use super::{join_url, required, vendor_error, RelayError, RelayOutcome, StorageRelay};
use crate::config::CdnConfig;

pub struct CdnStorageRelay {
    http_client: reqwest::Client,
    endpoint: String,
    zone: String,
    access_key: String,
    pull_zone_url: String,
}

impl CdnStorageRelay {
    pub fn new(config: &CdnConfig, http_client: reqwest::Client) -> Result<Self, RelayError> {
        Ok(Self {
            http_client,
            endpoint: config.endpoint.clone(),
            zone: required(&config.zone, "relay.cdn.zone")?,
            access_key: required(&config.access_key, "relay.cdn.access_key")?,
            pull_zone_url: required(&config.pull_zone_url, "relay.cdn.pull_zone_url")?,
        })
    }

    fn storage_url(&self, key: &str) -> String {
        join_url(&join_url(&self.endpoint, &self.zone), key)
    }
}

#[async_trait]
impl StorageRelay for CdnStorageRelay {
    fn name(&self) -> &'static str {
        "cdn-storage"
    }

    async fn upload(
        &self,
        data: Bytes,
        key: &str,
        content_type: Option<&str>,
    ) -> Result<RelayOutcome, RelayError> {
        let size = data.len();
        let response = self
            .http_client
            .put(self.storage_url(key))
            .header("AccessKey", &self.access_key)
            .header(
                reqwest::header::CONTENT_TYPE,
                content_type.unwrap_or("application/octet-stream"),
            )
            .body(data)
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(vendor_error(response).await);
        }

        let url = join_url(&self.pull_zone_url, key);
        info!(key = %key, bytes = size, url = %url, "Uploaded to CDN storage zone");
        Ok(RelayOutcome::url(url))
    }
}
