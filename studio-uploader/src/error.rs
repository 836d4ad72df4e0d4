//! Error types for the upload client

use reqwest::StatusCode;
use thiserror::Error;

/// Upload client errors
///
/// `is_retryable()` decides whether the retry loop tries again.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Connection refused, reset, DNS failure
    #[error("Network error: {0}")]
    Transport(String),

    /// Request exceeded the client timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Server answered 5xx
    #[error("Server error {status}: {body}")]
    Server { status: u16, body: String },

    /// Server answered 4xx (or any other non-success status)
    #[error("Request rejected {status}: {body}")]
    Client { status: u16, body: String },

    /// Local file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing or invalid client configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Success status with a body the client does not understand
    #[error("Invalid server response: {0}")]
    InvalidResponse(String),
}

impl UploadError {
    /// Transport errors, timeouts and 5xx responses are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UploadError::Transport(_) | UploadError::Timeout(_) | UploadError::Server { .. }
        )
    }

    /// Classify a non-success HTTP status
    pub fn from_status(status: StatusCode, body: String) -> Self {
        if status.is_server_error() {
            UploadError::Server {
                status: status.as_u16(),
                body,
            }
        } else {
            UploadError::Client {
                status: status.as_u16(),
                body,
            }
        }
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UploadError::Timeout(err.to_string())
        } else if err.is_decode() {
            UploadError::InvalidResponse(err.to_string())
        } else {
            UploadError::Transport(err.to_string())
        }
    }
}

impl From<studio_common::Error> for UploadError {
    fn from(err: studio_common::Error) -> Self {
        match err {
            studio_common::Error::Io(e) => UploadError::Io(e),
            other => UploadError::Config(other.to_string()),
        }
    }
}
