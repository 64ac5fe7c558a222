//! Configuration management for buildcache

pub mod inputs;
pub mod schema;

pub use inputs::{ActionInputs, S3Inputs, MAX_KEY_COUNT, MAX_KEY_LENGTH};
pub use schema::Config;

use crate::error::{BuildCacheError, BuildCacheResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("buildcache")
            .join("config.toml")
    }

    /// Get the state directory path
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("buildcache")
    }

    /// Get the default per-run state directory
    pub fn runs_dir() -> PathBuf {
        Self::state_dir().join("runs")
    }

    /// Get the default local store directory
    pub fn store_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("buildcache")
            .join("store")
    }

    /// Load configuration, falling back to defaults if the file is missing
    pub async fn load(&self) -> BuildCacheResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> BuildCacheResult<Config> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            BuildCacheError::io(format!("reading config from {}", path.display()), e)
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| BuildCacheError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if config.cache.timeout_ms == 0 {
            return Err(BuildCacheError::ConfigInvalid {
                path: path.to_path_buf(),
                reason: "cache.timeout_ms must be greater than zero".to_string(),
            });
        }
        if config.cache.upload_chunk_size == 0 {
            return Err(BuildCacheError::ConfigInvalid {
                path: path.to_path_buf(),
                reason: "cache.upload_chunk_size must be greater than zero".to_string(),
            });
        }

        Ok(config)
    }

    /// Whether the cache feature is available for this invocation
    pub fn is_feature_available(config: &Config) -> bool {
        let disabled = std::env::var("BUILDCACHE_DISABLED")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        config.cache.enabled && !disabled
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
