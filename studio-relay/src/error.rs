//! Error types for studio-relay
//!
//! Failures are reported to clients as free-text messages with a coarse code;
//! no structured error catalogue exists.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::relay::RelayError;
use crate::session::SessionError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400), e.g. missing chunk payload
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Missing or unknown bearer token (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Conflict (409), e.g. chunk disagrees with its session
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Storage vendor rejected or failed the transfer (502)
    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// studio-common error
    #[error("Common error: {0}")]
    Common(#[from] studio_common::Error),
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::InvalidChunkIndex { .. } | SessionError::EmptyUpload => {
                ApiError::BadRequest(err.to_string())
            }
            SessionError::TotalChunksMismatch { .. } | SessionError::OwnerMismatch { .. } => {
                ApiError::Conflict(err.to_string())
            }
            SessionError::MissingChunk(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Relay(ref err) => (StatusCode::BAD_GATEWAY, "RELAY_ERROR", err.to_string()),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
            ),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
