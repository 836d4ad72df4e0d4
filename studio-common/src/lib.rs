//! # Studio Common Library
//!
//! Shared code for the studio upload services:
//! - Error type (`Error`, `Result`)
//! - Configuration file resolution and TOML loading
//! - Upload event types and the broadcast `EventBus`
//! - SSE helpers
//! - Time utilities

pub mod config;
pub mod error;
pub mod events;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
pub use events::{EventBus, UploadEvent};
