//! Chunked upload
//!
//! The file is cut into fixed-size chunks posted in index order to the chunk
//! endpoint under one client-generated upload id. Each chunk is retried on
//! its own; the relay reassembles once every chunk has arrived. A 5xx on the
//! final chunk means the relay already consumed the session, so it is
//! returned to the caller rather than retried.

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use std::io::SeekFrom;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::{read_receipt, UploadClient, UploadReceipt};
use crate::direct::display_name;
use crate::error::UploadError;
use crate::progress::{ProgressFn, ProgressTracker};

/// Number of chunks for a file; an empty file is still one (empty) chunk
///
/// Fails when the count does not fit the `u32` chunk index.
pub fn chunk_count(file_size: u64, chunk_size: usize) -> Result<u32, UploadError> {
    let chunk_size = chunk_size.max(1) as u64;
    let count = file_size.div_ceil(chunk_size).max(1);
    u32::try_from(count).map_err(|_| {
        UploadError::Config(format!(
            "Chunk size {} splits {} bytes into {} chunks, more than {} allowed",
            chunk_size,
            file_size,
            count,
            u32::MAX
        ))
    })
}

/// Retry rule for the final chunk
///
/// The relay drops the session once every chunk has arrived, even when the
/// vendor then fails, so a 5xx here is surfaced instead of resending the
/// chunk into a fresh session.
fn final_chunk_retryable(err: &UploadError) -> bool {
    err.is_retryable() && !matches!(err, UploadError::Server { .. })
}

/// One chunk request
struct ChunkRequest<'a> {
    upload_id: &'a str,
    file_name: &'a str,
    content_type: Option<&'a str>,
    index: u32,
    total: u32,
    file_size: u64,
    data: Bytes,
}

impl ChunkRequest<'_> {
    fn form(&self) -> Form {
        let mut form = Form::new()
            .text("uploadId", self.upload_id.to_string())
            .text("chunkIndex", self.index.to_string())
            .text("totalChunks", self.total.to_string())
            .text("fileSize", self.file_size.to_string())
            .text("fileName", self.file_name.to_string());
        if let Some(content_type) = self.content_type {
            form = form.text("contentType", content_type.to_string());
        }
        let body = reqwest::Body::from(self.data.clone());
        form.part(
            "chunk",
            Part::stream_with_length(body, self.data.len() as u64)
                .file_name(self.file_name.to_string()),
        )
    }
}

/// Upload `path` in chunks of `client.chunk_size()` bytes
///
/// Returns the receipt of the final chunk, which carries the relayed URL.
pub async fn upload_chunked(
    client: &UploadClient,
    path: &Path,
    content_type: Option<&str>,
    on_progress: ProgressFn,
) -> Result<UploadReceipt, UploadError> {
    let mut file = tokio::fs::File::open(path).await?;
    let file_size = file.metadata().await?.len();
    let chunk_size = client.chunk_size();
    let total = chunk_count(file_size, chunk_size)?;
    let upload_id = Uuid::new_v4().to_string();
    let file_name = display_name(path);
    let url = client.chunk_url();
    let tracker = ProgressTracker::new(file_size, on_progress);

    info!(
        file = %path.display(),
        upload_id = %upload_id,
        bytes = file_size,
        chunks = total,
        chunk_size,
        "Starting chunked upload"
    );

    let mut last_receipt = None;
    for index in 0..total {
        let offset = index as u64 * chunk_size as u64;
        let len = (file_size - offset).min(chunk_size as u64) as usize;

        file.seek(SeekFrom::Start(offset)).await?;
        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer).await?;

        let chunk = ChunkRequest {
            upload_id: &upload_id,
            file_name: &file_name,
            content_type,
            index,
            total,
            file_size,
            data: Bytes::from(buffer),
        };

        let send = || {
            let request = client.post(&url).multipart(chunk.form());
            async move { read_receipt(request.send().await?).await }
        };
        let is_final = index + 1 == total;
        let result = if is_final {
            client
                .retry_policy()
                .run_while("final chunk upload", final_chunk_retryable, send)
                .await
        } else {
            client.retry_policy().run("chunk upload", send).await
        };
        let receipt = match result {
            Ok(receipt) => receipt,
            Err(err) => {
                if is_final {
                    warn!(
                        upload_id = %upload_id,
                        error = %err,
                        "Final chunk failed; restart the upload from the first chunk"
                    );
                }
                return Err(err);
            }
        };

        tracker.set_position(offset + len as u64);
        debug!(
            upload_id = %upload_id,
            chunk_index = index,
            status = %receipt.status,
            "Chunk acknowledged"
        );
        last_receipt = Some(receipt);
    }

    match last_receipt {
        Some(receipt) if receipt.is_complete() => {
            info!(
                upload_id = %upload_id,
                url = receipt.url.as_deref().unwrap_or_default(),
                "Chunked upload complete"
            );
            Ok(receipt)
        }
        Some(receipt) => Err(UploadError::InvalidResponse(format!(
            "Relay still reports {} after the final chunk ({:?}/{:?} received)",
            receipt.status, receipt.received, receipt.total
        ))),
        None => Err(UploadError::InvalidResponse(
            "No chunk was sent".to_string(),
        )),
    }
}
