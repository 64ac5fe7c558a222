//! Configuration schema for buildcache
//!
//! Configuration is stored at `~/.config/buildcache/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default transfer timeout for lookups, restores and uploads
pub const DEFAULT_TIMEOUT_MS: u64 = 600_000;

/// Default chunk size for uploads when the input is not supplied
pub const DEFAULT_UPLOAD_CHUNK_SIZE: u64 = 32 * 1024 * 1024;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache behaviour
    pub cache: CacheConfig,

    /// Local blob store settings
    pub store: StoreConfig,

    /// Cross-phase state settings
    pub state: StateConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether the cache feature is available on this runner
    pub enabled: bool,

    /// Backend timeout in milliseconds
    pub timeout_ms: u64,

    /// Upload chunk size in bytes
    pub upload_chunk_size: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            upload_chunk_size: DEFAULT_UPLOAD_CHUNK_SIZE,
        }
    }
}

/// Local blob store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store root directory (defaults to the platform data directory)
    pub root: Option<PathBuf>,
}

/// Run state configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Directory holding one state file per run
    pub dir: Option<PathBuf>,
}
