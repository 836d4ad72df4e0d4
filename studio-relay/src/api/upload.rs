//! Upload endpoints
//!
//! - `POST /api/upload/chunk`: accumulate one chunk; relay the file when the
//!   last chunk arrives
//! - `POST /api/upload`: relay a whole file in one request
//! - `POST /api/upload/sweep`: drop idle sessions

use axum::extract::multipart::Field;
use axum::extract::{Extension, Multipart, State};
use axum::Json;
use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use std::str::FromStr;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::api::auth::Caller;
use crate::error::{ApiError, ApiResult};
use crate::notifier::{percent_complete, NotifierExt};
use crate::relay::{object_key, RelayOutcome};
use crate::session::{ChunkProgress, ChunkWrite};
use crate::AppState;

/// Upload state reported to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Complete,
}

/// Response body of both upload endpoints
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub status: UploadStatus,
    pub upload_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Vendor-assigned identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl UploadResponse {
    fn pending(upload_id: String, received: u32, total: u32) -> Self {
        Self {
            status: UploadStatus::Pending,
            upload_id,
            received: Some(received),
            total: Some(total),
            url: None,
            id: None,
        }
    }

    fn complete(upload_id: String, outcome: RelayOutcome) -> Self {
        Self {
            status: UploadStatus::Complete,
            upload_id,
            received: None,
            total: None,
            url: Some(outcome.url),
            id: outcome.id,
        }
    }
}

/// Multipart fields of a chunk request
#[derive(Debug, Default)]
struct ChunkForm {
    chunk_index: Option<u32>,
    total_chunks: Option<u32>,
    file_size: Option<u64>,
    upload_id: Option<String>,
    chunk: Option<Bytes>,
    file_name: Option<String>,
    content_type: Option<String>,
}

impl ChunkForm {
    async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut form = ChunkForm::default();

        while let Some(field) = next_field(&mut multipart).await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "chunk" => form.chunk = Some(field_bytes(field).await?),
                "chunkIndex" => form.chunk_index = Some(parse_field(&name, field).await?),
                "totalChunks" => form.total_chunks = Some(parse_field(&name, field).await?),
                "fileSize" => form.file_size = Some(parse_field(&name, field).await?),
                "uploadId" => form.upload_id = Some(field_text(field).await?),
                "fileName" => form.file_name = Some(field_text(field).await?),
                "contentType" => form.content_type = Some(field_text(field).await?),
                other => debug!(field = %other, "Ignoring unknown multipart field"),
            }
        }

        Ok(form)
    }

    fn into_chunk_write(self, user_id: &str) -> ApiResult<ChunkWrite> {
        let data = self
            .chunk
            .ok_or_else(|| ApiError::BadRequest("Missing chunk payload".to_string()))?;
        let upload_id = self
            .upload_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| missing("uploadId"))?;

        Ok(ChunkWrite {
            upload_id,
            user_id: user_id.to_string(),
            chunk_index: self.chunk_index.ok_or_else(|| missing("chunkIndex"))?,
            total_chunks: self.total_chunks.ok_or_else(|| missing("totalChunks"))?,
            file_size: self.file_size.ok_or_else(|| missing("fileSize"))?,
            data,
            file_name: self.file_name,
            content_type: self.content_type,
        })
    }
}

fn missing(field: &str) -> ApiError {
    ApiError::BadRequest(format!("Missing field {}", field))
}

async fn next_field(multipart: &mut Multipart) -> ApiResult<Option<Field<'_>>> {
    multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))
}

async fn field_bytes(field: Field<'_>) -> ApiResult<Bytes> {
    field
        .bytes()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read upload data: {}", e)))
}

async fn field_text(field: Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read field: {}", e)))
}

async fn parse_field<T: FromStr>(name: &str, field: Field<'_>) -> ApiResult<T> {
    let text = field_text(field).await?;
    text.trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Field {} is not a valid number: {:?}", name, text)))
}

/// Hand a complete file to the vendor relay and report the outcome
async fn relay_to_vendor(
    state: &AppState,
    upload_id: &str,
    user_id: &str,
    data: Bytes,
    key: &str,
    content_type: Option<&str>,
) -> ApiResult<RelayOutcome> {
    let size = data.len();
    match state.relay.upload(data, key, content_type).await {
        Ok(outcome) => {
            info!(
                upload_id = %upload_id,
                relay = state.relay.name(),
                bytes = size,
                url = %outcome.url,
                "Upload relayed"
            );
            state.notifier.completed(upload_id, user_id, &outcome.url);
            Ok(outcome)
        }
        Err(e) => {
            error!(
                upload_id = %upload_id,
                relay = state.relay.name(),
                error = %e,
                "Relay failed; the upload must restart from chunk 0"
            );
            state.notifier.failed(upload_id, user_id, &e.to_string());
            Err(e.into())
        }
    }
}

/// POST /api/upload/chunk
///
/// Multipart fields: `chunkIndex`, `totalChunks`, `fileSize`, `uploadId`,
/// `chunk` (binary), optional `fileName` and `contentType`.
#[instrument(skip_all)]
pub async fn upload_chunk(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let chunk = ChunkForm::read(multipart)
        .await?
        .into_chunk_write(&caller.user_id)?;
    let upload_id = chunk.upload_id.clone();

    debug!(
        upload_id = %upload_id,
        chunk_index = chunk.chunk_index,
        total_chunks = chunk.total_chunks,
        bytes = chunk.data.len(),
        "Chunk received"
    );

    match state.sessions.accept_chunk(chunk).await? {
        ChunkProgress::Pending { received, total } => {
            state
                .notifier
                .progress(&upload_id, &caller.user_id, percent_complete(received, total));
            Ok(Json(UploadResponse::pending(upload_id, received, total)))
        }
        ChunkProgress::Complete(assembled) => {
            state.notifier.progress(&upload_id, &caller.user_id, 100);

            let key = object_key(&assembled.upload_id, assembled.file_name.as_deref());
            let outcome = relay_to_vendor(
                &state,
                &assembled.upload_id,
                &assembled.user_id,
                assembled.data,
                &key,
                assembled.content_type.as_deref(),
            )
            .await?;

            Ok(Json(UploadResponse::complete(upload_id, outcome)))
        }
    }
}

/// POST /api/upload
///
/// Multipart fields: `file` (binary), optional `key` overriding the
/// destination key.
#[instrument(skip_all)]
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut data = None;
    let mut file_name = None;
    let mut content_type = None;
    let mut key = None;

    while let Some(field) = next_field(&mut multipart).await? {
        match field.name().unwrap_or_default() {
            "file" => {
                file_name = field.file_name().map(str::to_string);
                content_type = field.content_type().map(str::to_string);
                data = Some(field_bytes(field).await?);
            }
            "key" => key = Some(field_text(field).await?),
            other => debug!(field = %other, "Ignoring unknown multipart field"),
        }
    }

    let data = data.ok_or_else(|| ApiError::BadRequest("Missing file payload".to_string()))?;
    let upload_id = Uuid::new_v4().to_string();
    let key = match key.map(|k| k.trim().trim_start_matches('/').to_string()) {
        Some(k) if k.is_empty() || k.split('/').any(|segment| segment == "..") => {
            return Err(ApiError::BadRequest(format!("Invalid key {:?}", k)));
        }
        Some(k) => k,
        None => object_key(&upload_id, file_name.as_deref()),
    };

    info!(
        upload_id = %upload_id,
        user_id = %caller.user_id,
        key = %key,
        bytes = data.len(),
        "Whole-file upload received"
    );

    let outcome = relay_to_vendor(
        &state,
        &upload_id,
        &caller.user_id,
        data,
        &key,
        content_type.as_deref(),
    )
    .await?;

    Ok(Json(UploadResponse::complete(upload_id, outcome)))
}

/// Sweep result
#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub removed: usize,
    pub active: usize,
}

/// POST /api/upload/sweep
///
/// Drops every session idle for longer than the configured timeout.
pub async fn sweep_sessions(State(state): State<AppState>) -> Json<SweepResponse> {
    let removed = state
        .sessions
        .sweep_expired(state.session_timeout, Utc::now())
        .await;
    let active = state.sessions.active_sessions().await;

    if removed > 0 {
        info!(removed, active, "Swept idle upload sessions");
    }

    Json(SweepResponse { removed, active })
}
