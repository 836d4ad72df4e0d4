//! studio-uploader library
//!
//! Upload client for studio-relay: whole-file uploads, chunked uploads and
//! transfers to pre-signed vendor URLs, with exponential backoff retry and
//! percentage progress callbacks.

pub mod chunked;
pub mod client;
pub mod config;
pub mod direct;
pub mod error;
pub mod presigned;
pub mod progress;
pub mod retry;

pub use client::{UploadClient, UploadReceipt};
pub use config::UploaderConfig;
pub use error::UploadError;
pub use progress::ProgressFn;
pub use retry::RetryPolicy;
