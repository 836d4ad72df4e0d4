//! Whole-file upload
//!
//! The file is sent as one multipart request (`file` field, optional `key`),
//! retried with backoff on transport errors, timeouts and 5xx responses.

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use std::path::Path;
use tracing::info;

use crate::client::{read_receipt, UploadClient, UploadReceipt};
use crate::error::UploadError;
use crate::progress::{counting_body, ProgressFn, ProgressTracker};

/// File name sent with the multipart part
pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.bin".to_string())
}

/// Upload `path` to `url` in a single request
///
/// `key` overrides the destination key the relay would derive.
/// `on_progress` receives 0-100 as the body is streamed.
pub async fn upload_file(
    client: &UploadClient,
    path: &Path,
    url: &str,
    key: Option<&str>,
    on_progress: ProgressFn,
) -> Result<UploadReceipt, UploadError> {
    let data = Bytes::from(tokio::fs::read(path).await?);
    let file_name = display_name(path);
    let tracker = ProgressTracker::new(data.len() as u64, on_progress);

    info!(file = %path.display(), bytes = data.len(), url = %url, "Starting direct upload");

    let receipt = client
        .retry_policy()
        .run("direct upload", || {
            tracker.rewind(0);
            let part = Part::stream_with_length(
                counting_body(data.clone(), tracker.clone()),
                data.len() as u64,
            )
            .file_name(file_name.clone());
            let mut form = Form::new().part("file", part);
            if let Some(key) = key {
                form = form.text("key", key.to_string());
            }
            let request = client.post(url).multipart(form);

            async move { read_receipt(request.send().await?).await }
        })
        .await?;

    tracker.finish();
    info!(
        upload_id = %receipt.upload_id,
        url = receipt.url.as_deref().unwrap_or_default(),
        "Direct upload complete"
    );
    Ok(receipt)
}
