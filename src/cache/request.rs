//! Validated cache request

use crate::config::inputs::{MAX_KEY_COUNT, MAX_KEY_LENGTH};
use crate::error::{BuildCacheError, BuildCacheResult};
use serde::{Deserialize, Serialize};

/// A validated request to restore or save a cache
///
/// The primary key and paths are never empty. Fallback keys are kept in
/// the order given, which is their priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRequest {
    primary_key: String,
    fallback_keys: Vec<String>,
    paths: Vec<String>,
}

impl CacheRequest {
    /// Build a request, validating keys and paths
    pub fn new(
        primary_key: impl Into<String>,
        fallback_keys: Vec<String>,
        paths: Vec<String>,
    ) -> BuildCacheResult<Self> {
        let primary_key = primary_key.into();
        if primary_key.is_empty() {
            return Err(BuildCacheError::InputRequired("key".to_string()));
        }
        if paths.is_empty() {
            return Err(BuildCacheError::InputRequired("path".to_string()));
        }

        if 1 + fallback_keys.len() > MAX_KEY_COUNT {
            return Err(BuildCacheError::TooManyKeys { max: MAX_KEY_COUNT });
        }
        for key in std::iter::once(&primary_key).chain(fallback_keys.iter()) {
            validate_key(key)?;
        }

        Ok(Self {
            primary_key,
            fallback_keys,
            paths,
        })
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn fallback_keys(&self) -> &[String] {
        &self.fallback_keys
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// Primary key followed by the fallback keys, for log messages
    pub fn all_keys(&self) -> Vec<&str> {
        std::iter::once(self.primary_key.as_str())
            .chain(self.fallback_keys.iter().map(String::as_str))
            .collect()
    }
}

/// Check a single key against length and character limits
pub fn validate_key(key: &str) -> BuildCacheResult<()> {
    if key.chars().count() > MAX_KEY_LENGTH {
        return Err(BuildCacheError::KeyTooLong {
            key: key.to_string(),
            max: MAX_KEY_LENGTH,
        });
    }
    if key.contains(',') {
        return Err(BuildCacheError::KeyContainsComma(key.to_string()));
    }
    Ok(())
}
