//! Configuration for studio-uploader
//!
//! Resolution: `--config` → `STUDIO_UPLOADER_CONFIG` → platform
//! `uploader.toml` → compiled defaults. `STUDIO_BASE_URL` and `STUDIO_TOKEN`
//! override the file; command-line flags override both.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use studio_common::config::{env_override, load_toml, resolve_config_path};

use crate::error::UploadError;
use crate::retry::RetryPolicy;

pub const CONFIG_ENV_VAR: &str = "STUDIO_UPLOADER_CONFIG";
pub const CONFIG_FILE_NAME: &str = "uploader.toml";

/// Default chunk size: 5 MiB
pub const DEFAULT_CHUNK_SIZE: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploaderConfig {
    /// Relay base URL, e.g. `https://relay.example.com`
    pub base_url: Option<String>,
    /// Bearer token from the identity provider
    pub token: Option<String>,
    pub chunk_size: usize,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_retries: 3,
            base_delay_ms: 1000,
            timeout_secs: 300,
        }
    }
}

impl UploaderConfig {
    /// Load from the resolved config file and apply environment overrides
    pub fn load(cli_path: Option<&Path>) -> Result<Self, UploadError> {
        let path = resolve_config_path(cli_path, CONFIG_ENV_VAR, CONFIG_FILE_NAME);
        let mut config: UploaderConfig = load_toml(path.as_deref())?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(base_url) = env_override("STUDIO_BASE_URL") {
            self.base_url = Some(base_url);
        }
        if let Some(token) = env_override("STUDIO_TOKEN") {
            self.token = Some(token);
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.base_delay_ms))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> Result<String, UploadError> {
        self.base_url
            .as_deref()
            .map(|url| url.trim().trim_end_matches('/'))
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                UploadError::Config(
                    "No relay base URL (use --base-url, STUDIO_BASE_URL or base_url in uploader.toml)"
                        .to_string(),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = UploaderConfig::default();
        assert_eq!(config.chunk_size, 5 * 1024 * 1024);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert!(config.base_url().is_err());
    }

    #[test]
    fn test_base_url_trims_trailing_slash() {
        let config = UploaderConfig {
            base_url: Some("http://localhost:5740/".to_string()),
            ..UploaderConfig::default()
        };
        assert_eq!(config.base_url().unwrap(), "http://localhost:5740");
    }

    #[test]
    #[serial]
    fn test_load_file_then_env_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "base_url = \"http://file.example\"\ntoken = \"file-token\"\nchunk_size = 1024"
        )
        .unwrap();

        std::env::remove_var("STUDIO_BASE_URL");
        std::env::set_var("STUDIO_TOKEN", "env-token");

        let config = UploaderConfig::load(Some(file.path())).unwrap();

        std::env::remove_var("STUDIO_TOKEN");

        assert_eq!(config.base_url.as_deref(), Some("http://file.example"));
        assert_eq!(config.token.as_deref(), Some("env-token"));
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    #[serial]
    fn test_missing_file_is_error() {
        let result = UploaderConfig::load(Some(Path::new("/nonexistent/uploader.toml")));
        assert!(matches!(result, Err(UploadError::Config(_))));
    }
}
