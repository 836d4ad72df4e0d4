//! HTTP API handlers for studio-relay

pub mod auth;
pub mod buildinfo;
pub mod health;
pub mod sse;
pub mod upload;

pub use auth::{auth_middleware, Caller};
pub use buildinfo::get_build_info;
pub use health::health_routes;
pub use sse::event_stream;
pub use upload::{sweep_sessions, upload_chunk, upload_file, UploadResponse, UploadStatus};
