//! Transfer to a pre-signed URL
//!
//! The URL already carries the vendor's authorization, so the body is PUT
//! as-is without the relay's bearer token.

use bytes::Bytes;
use std::path::Path;
use tracing::info;

use crate::client::check_status;
use crate::error::UploadError;
use crate::progress::{counting_body, ProgressFn, ProgressTracker};
use crate::retry::RetryPolicy;

/// PUT the contents of `path` to a pre-signed `url`, retrying with backoff
pub async fn upload_presigned(
    http: &reqwest::Client,
    retry: &RetryPolicy,
    path: &Path,
    url: &str,
    content_type: Option<&str>,
    on_progress: ProgressFn,
) -> Result<(), UploadError> {
    let data = Bytes::from(tokio::fs::read(path).await?);
    let tracker = ProgressTracker::new(data.len() as u64, on_progress);
    let content_type = content_type.unwrap_or("application/octet-stream");

    info!(file = %path.display(), bytes = data.len(), "Starting pre-signed upload");

    retry
        .run("presigned upload", || {
            tracker.rewind(0);
            let request = http
                .put(url)
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .header(reqwest::header::CONTENT_LENGTH, data.len())
                .body(counting_body(data.clone(), tracker.clone()));

            async move {
                check_status(request.send().await?).await?;
                Ok(())
            }
        })
        .await?;

    tracker.finish();
    info!(file = %path.display(), "Pre-signed upload complete");
    Ok(())
}
