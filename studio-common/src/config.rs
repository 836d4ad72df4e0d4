//! Configuration file resolution and TOML loading

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Configuration file resolution in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. Platform config file (`~/.config/studio/<file_name>`, then `/etc/studio/<file_name>`)
///
/// Returns `None` when nothing was found; callers fall back to compiled defaults.
pub fn resolve_config_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    file_name: &str,
) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config file
    platform_config_file(file_name)
}

/// Locate a config file in the platform's config directories
fn platform_config_file(file_name: &str) -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("studio").join(file_name));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(unix) {
        let system_config = PathBuf::from("/etc/studio").join(file_name);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Load a TOML config file, or the type's defaults when no path is given
///
/// A path that was resolved but cannot be read is an error, never a
/// fallback to defaults.
pub fn load_toml<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        debug!("No config file resolved, using compiled defaults");
        return Ok(T::default());
    };

    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let config = toml::from_str(&content)?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Read an environment variable, treating empty values as unset
pub fn env_override(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serial_test::serial;
    use std::io::Write;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct SampleConfig {
        name: String,
        port: u16,
    }

    #[test]
    #[serial]
    fn test_cli_arg_takes_priority_over_env() {
        std::env::set_var("STUDIO_TEST_CONFIG", "/from/env.toml");
        let resolved = resolve_config_path(
            Some(Path::new("/from/cli.toml")),
            "STUDIO_TEST_CONFIG",
            "test.toml",
        );
        std::env::remove_var("STUDIO_TEST_CONFIG");

        assert_eq!(resolved, Some(PathBuf::from("/from/cli.toml")));
    }

    #[test]
    #[serial]
    fn test_env_var_used_without_cli_arg() {
        std::env::set_var("STUDIO_TEST_CONFIG", "/from/env.toml");
        let resolved = resolve_config_path(None, "STUDIO_TEST_CONFIG", "test.toml");
        std::env::remove_var("STUDIO_TEST_CONFIG");

        assert_eq!(resolved, Some(PathBuf::from("/from/env.toml")));
    }

    #[test]
    #[serial]
    fn test_empty_env_var_is_ignored() {
        std::env::set_var("STUDIO_TEST_CONFIG", "");
        let resolved = resolve_config_path(
            None,
            "STUDIO_TEST_CONFIG",
            "studio-test-file-that-does-not-exist.toml",
        );
        std::env::remove_var("STUDIO_TEST_CONFIG");

        assert_eq!(resolved, None);
    }

    #[test]
    fn test_load_toml_without_path_returns_defaults() {
        let config: SampleConfig = load_toml(None).unwrap();
        assert_eq!(config, SampleConfig::default());
    }

    #[test]
    fn test_load_toml_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = \"relay\"\nport = 5740").unwrap();

        let config: SampleConfig = load_toml(Some(file.path())).unwrap();
        assert_eq!(config.name, "relay");
        assert_eq!(config.port, 5740);
    }

    #[test]
    fn test_load_toml_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 8080").unwrap();

        let config: SampleConfig = load_toml(Some(file.path())).unwrap();
        assert_eq!(config.name, "");
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_load_toml_missing_file_is_error() {
        let result: Result<SampleConfig> = load_toml(Some(Path::new("/nonexistent/studio.toml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_toml_invalid_syntax_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = [not valid").unwrap();

        let result: Result<SampleConfig> = load_toml(Some(file.path()));
        assert!(matches!(result, Err(Error::Toml(_))));
    }

    #[test]
    #[serial]
    fn test_env_override_filters_blank() {
        std::env::set_var("STUDIO_TEST_SECRET", "   ");
        assert_eq!(env_override("STUDIO_TEST_SECRET"), None);
        std::env::set_var("STUDIO_TEST_SECRET", "abc");
        assert_eq!(env_override("STUDIO_TEST_SECRET"), Some("abc".to_string()));
        std::env::remove_var("STUDIO_TEST_SECRET");
    }
}
