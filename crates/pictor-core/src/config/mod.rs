//! Configuration management for Pictor.
//!
//! Configuration is loaded from a platform config directory with sensible
//! defaults; every sub-struct implements `Default` so a missing file or a
//! partial file both work. Constructed once per run and passed by reference
//! into each component; there are no ambient singletons.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for Pictor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Search provider settings
    pub search: SearchConfig,

    /// Image acquisition and validation settings
    pub fetch: FetchConfig,

    /// Thumbnail generation settings
    pub thumbnail: ThumbnailConfig,

    /// Vision analysis settings
    pub analysis: AnalysisConfig,

    /// Selection engine settings
    pub selection: SelectionConfig,

    /// Image hosting settings
    pub hosting: HostingConfig,

    /// Metadata store settings
    pub storage: StorageConfig,

    /// Retry and backoff settings
    pub retry: RetryConfig,

    /// Top-level run settings
    pub run: RunConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories, falling back to
    /// ~/.pictor/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("dev", "pictor", "pictor")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                let expanded = shellexpand::tilde(&home);
                PathBuf::from(expanded.into_owned())
                    .join(".pictor")
                    .join("config.toml")
            })
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

/// Resolve `${ENV_VAR}` references in config credential strings.
///
/// Plain strings pass through; empty strings and unset variables return `None`.
pub fn resolve_env_var(value: &str) -> Option<String> {
    if value.starts_with("${") && value.ends_with('}') {
        let var_name = &value[2..value.len() - 1];
        std::env::var(var_name).ok()
    } else if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.fetch.concurrency, 5);
        assert_eq!(config.fetch.min_width, 400);
        assert_eq!(config.fetch.min_height, 300);
        assert_eq!(config.fetch.max_size_mb, 10);
        assert_eq!(config.retry.attempts, 3);
        assert_eq!(config.storage.batch_size, 10);
    }

    #[test]
    fn test_default_criteria_weights() {
        let config = Config::default();
        let relevance = &config.selection.criteria[0];
        assert_eq!(relevance.name, "relevance");
        assert_eq!(relevance.weight, 1.5);
    }

    #[test]
    fn test_config_to_toml() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[search]"));
        assert!(toml.contains("[fetch]"));
        assert!(toml.contains("[analysis]"));
        assert!(toml.contains("[[selection.criteria]]"));
    }

    #[test]
    fn test_load_from_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[fetch]\nconcurrency = 2\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.fetch.concurrency, 2);
        // Everything else falls back to defaults
        assert_eq!(config.fetch.min_width, 400);
    }

    #[test]
    fn test_load_from_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[fetch]\nconcurrency = 0\n").unwrap();

        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_resolve_env_var() {
        assert_eq!(resolve_env_var("plain-key"), Some("plain-key".to_string()));
        assert_eq!(resolve_env_var(""), None);
        assert_eq!(resolve_env_var("${DEFINITELY_NOT_SET_XYZ_123}"), None);
    }
}
