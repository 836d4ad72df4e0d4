//! S3-compatible bucket relays
//!
//! Both variants write with path-style addressing (`{endpoint}/{bucket}/{key}`)
//! so they work against any S3-compatible provider. `S3PublicRelay` answers
//! with a permanent URL under the configured CDN prefix; `S3SignedRelay`
//! answers with a presigned GET that expires.

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::time::Duration;
use tracing::{debug, info};

use super::{join_url, required, RelayError, RelayOutcome, StorageRelay};
use crate::config::S3Config;

/// Bucket handle shared by both S3 variants
#[derive(Clone)]
struct Bucket {
    client: Client,
    name: String,
}

impl Bucket {
    fn connect(config: &S3Config) -> Result<Self, RelayError> {
        let name = required(&config.bucket, "relay.s3.bucket")?;
        let endpoint = required(&config.endpoint, "relay.s3.endpoint")?;
        let access_key = required(&config.access_key, "relay.s3.access_key")?;
        let secret_key = required(&config.secret_key, "relay.s3.secret_key")?;

        let credentials = Credentials::new(access_key, secret_key, None, None, "studio-relay");
        let sdk_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(sdk_config),
            name,
        })
    }

    async fn put(&self, data: Bytes, key: &str, content_type: Option<&str>) -> Result<(), RelayError> {
        let size = data.len();
        let mut request = self
            .client
            .put_object()
            .bucket(&self.name)
            .key(key)
            .body(ByteStream::from(data));
        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }

        request.send().await.map_err(|e| {
            RelayError::Transport(format!("PutObject {}: {}", key, DisplayErrorContext(&e)))
        })?;

        debug!(bucket = %self.name, key = %key, bytes = size, "PutObject complete");
        Ok(())
    }
}

/// Path-style upload returning a public CDN address
pub struct S3PublicRelay {
    bucket: Bucket,
    public_base_url: String,
}

impl S3PublicRelay {
    pub fn new(config: &S3Config) -> Result<Self, RelayError> {
        let bucket = Bucket::connect(config)?;
        let public_base_url = required(&config.public_base_url, "relay.s3.public_base_url")?;
        Ok(Self {
            bucket,
            public_base_url,
        })
    }

    pub fn public_url(&self, key: &str) -> String {
        join_url(&self.public_base_url, key)
    }
}

#[async_trait]
impl StorageRelay for S3PublicRelay {
    fn name(&self) -> &'static str {
        "s3-public"
    }

    async fn upload(
        &self,
        data: Bytes,
        key: &str,
        content_type: Option<&str>,
    ) -> Result<RelayOutcome, RelayError> {
        self.bucket.put(data, key, content_type).await?;

        let url = self.public_url(key);
        info!(key = %key, url = %url, "Uploaded to S3 bucket (public)");
        Ok(RelayOutcome::url(url))
    }
}

/// Upload returning a presigned, time-limited read URL
pub struct S3SignedRelay {
    bucket: Bucket,
    expires_in: Duration,
}

impl S3SignedRelay {
    pub fn new(config: &S3Config) -> Result<Self, RelayError> {
        if config.presign_expires_secs == 0 {
            return Err(RelayError::Config(
                "relay.s3.presign_expires_secs must be positive".to_string(),
            ));
        }
        Ok(Self {
            bucket: Bucket::connect(config)?,
            expires_in: Duration::from_secs(config.presign_expires_secs),
        })
    }
}

#[async_trait]
impl StorageRelay for S3SignedRelay {
    fn name(&self) -> &'static str {
        "s3-signed"
    }

    async fn upload(
        &self,
        data: Bytes,
        key: &str,
        content_type: Option<&str>,
    ) -> Result<RelayOutcome, RelayError> {
        self.bucket.put(data, key, content_type).await?;

        let presigning = PresigningConfig::expires_in(self.expires_in)
            .map_err(|e| RelayError::Config(format!("Presigning config: {}", e)))?;
        let presigned = self
            .bucket
            .client
            .get_object()
            .bucket(&self.bucket.name)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| {
                RelayError::Transport(format!("Presign {}: {}", key, DisplayErrorContext(&e)))
            })?;

        info!(
            key = %key,
            expires_secs = self.expires_in.as_secs(),
            "Uploaded to S3 bucket (signed)"
        );
        Ok(RelayOutcome::url(presigned.uri().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> S3Config {
        S3Config {
            endpoint: Some("https://s3.example.com".to_string()),
            region: "auto".to_string(),
            bucket: Some("videos".to_string()),
            access_key: Some("AKIDEXAMPLE".to_string()),
            secret_key: Some("secret".to_string()),
            public_base_url: Some("https://cdn.example.com/videos/".to_string()),
            presign_expires_secs: 900,
        }
    }

    #[test]
    fn test_public_url_uses_cdn_prefix() {
        let relay = S3PublicRelay::new(&config()).unwrap();
        assert_eq!(
            relay.public_url("abc-ep1.mp4"),
            "https://cdn.example.com/videos/abc-ep1.mp4"
        );
    }

    #[test]
    fn test_public_relay_requires_prefix() {
        let mut config = config();
        config.public_base_url = None;
        assert!(matches!(S3PublicRelay::new(&config), Err(RelayError::Config(_))));
    }

    #[test]
    fn test_relays_require_credentials() {
        let mut config = config();
        config.secret_key = None;
        assert!(matches!(S3SignedRelay::new(&config), Err(RelayError::Config(_))));
    }

    #[test]
    fn test_signed_relay_rejects_zero_expiry() {
        let mut config = config();
        config.presign_expires_secs = 0;
        assert!(matches!(S3SignedRelay::new(&config), Err(RelayError::Config(_))));
    }

    #[tokio::test]
    async fn test_presigned_url_is_path_style() {
        let bucket = Bucket::connect(&config()).unwrap();
        let presigned = bucket
            .client
            .get_object()
            .bucket(&bucket.name)
            .key("abc.mp4")
            .presigned(PresigningConfig::expires_in(Duration::from_secs(900)).unwrap())
            .await
            .unwrap();

        let uri = presigned.uri().to_string();
        assert!(uri.starts_with("https://s3.example.com/videos/abc.mp4?"), "{}", uri);
        assert!(uri.contains("X-Amz-Expires=900"), "{}", uri);
    }
}
