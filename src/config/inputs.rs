//! Action inputs as supplied by the pipeline
//!
//! Inputs arrive as loosely-typed strings (flags or `INPUT_*` environment
//! variables). They are validated once here into a [`CacheRequest`] and a
//! [`StorageConfig`]; nothing downstream reads raw inputs.

use crate::cache::CacheRequest;
use crate::config::schema::CacheConfig;
use crate::error::{BuildCacheError, BuildCacheResult};
use crate::storage::{Backend, S3Settings, StorageConfig};

/// Maximum length of a single cache key
pub const MAX_KEY_LENGTH: usize = 512;

/// Maximum number of keys (primary plus restore keys)
pub const MAX_KEY_COUNT: usize = 10;

/// Input names as they appear in the pipeline definition
pub mod names {
    pub const KEY: &str = "key";
    pub const PATH: &str = "path";
    pub const RESTORE_KEYS: &str = "restore-keys";
    pub const UPLOAD_CHUNK_SIZE: &str = "upload-chunk-size";
    pub const S3_ENDPOINT: &str = "s3-endpoint";
    pub const S3_ACCESS_KEY: &str = "s3-access-key";
    pub const S3_SECRET_KEY: &str = "s3-secret-key";
    pub const S3_REGION: &str = "s3-region";
    pub const S3_BUCKET: &str = "s3-bucket";
}

/// Raw S3 inputs
#[derive(Debug, Clone, Default)]
pub struct S3Inputs {
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub region: Option<String>,
    pub bucket: Option<String>,
}

/// Raw action inputs
#[derive(Debug, Clone, Default)]
pub struct ActionInputs {
    /// Primary cache key
    pub key: Option<String>,

    /// Newline separated restore key prefixes
    pub restore_keys: Option<String>,

    /// Newline separated paths to cache
    pub path: Option<String>,

    /// Upload chunk size in bytes
    pub upload_chunk_size: Option<String>,

    /// S3-compatible backend settings
    pub s3: S3Inputs,
}

impl ActionInputs {
    /// The primary key, trimmed; errors if absent or blank
    pub fn primary_key(&self) -> BuildCacheResult<String> {
        non_blank(self.key.as_deref())
            .map(str::to_string)
            .ok_or_else(|| BuildCacheError::InputRequired(names::KEY.to_string()))
    }

    /// Paths to cache; errors if none are given
    pub fn paths(&self) -> BuildCacheResult<Vec<String>> {
        let paths = split_list(self.path.as_deref());
        if paths.is_empty() {
            return Err(BuildCacheError::InputRequired(names::PATH.to_string()));
        }
        Ok(paths)
    }

    /// Restore key prefixes in listed order
    pub fn restore_keys(&self) -> Vec<String> {
        split_list(self.restore_keys.as_deref())
    }

    /// Validate the key and path inputs into a cache request
    pub fn cache_request(&self) -> BuildCacheResult<CacheRequest> {
        CacheRequest::new(self.primary_key()?, self.restore_keys(), self.paths()?)
    }

    /// Validate the backend inputs into a storage configuration
    pub fn storage_config(&self, cache: &CacheConfig) -> BuildCacheResult<StorageConfig> {
        let chunk_size = match non_blank(self.upload_chunk_size.as_deref()) {
            Some(raw) => parse_positive(names::UPLOAD_CHUNK_SIZE, raw)?,
            None => cache.upload_chunk_size,
        };

        Ok(StorageConfig {
            backend: self.s3.backend()?,
            transfer_chunk_size: chunk_size,
            timeout_ms: cache.timeout_ms,
        })
    }
}

impl S3Inputs {
    /// Select the backend; S3 settings are all-or-nothing
    fn backend(&self) -> BuildCacheResult<Backend> {
        let fields = [
            (names::S3_ENDPOINT, non_blank(self.endpoint.as_deref())),
            (names::S3_ACCESS_KEY, non_blank(self.access_key.as_deref())),
            (names::S3_SECRET_KEY, non_blank(self.secret_key.as_deref())),
            (names::S3_REGION, non_blank(self.region.as_deref())),
            (names::S3_BUCKET, non_blank(self.bucket.as_deref())),
        ];

        let missing: Vec<String> = fields
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| name.to_string())
            .collect();

        if missing.len() == fields.len() {
            return Ok(Backend::Default);
        }
        if !missing.is_empty() {
            return Err(BuildCacheError::S3ConfigIncomplete { missing });
        }

        let [endpoint, access_key, secret_key, region, bucket] =
            fields.map(|(_, value)| value.unwrap_or_default().to_string());

        Ok(Backend::S3Compatible(S3Settings {
            endpoint,
            access_key,
            secret_key,
            region,
            bucket,
        }))
    }
}

/// Trimmed value, or `None` if absent or blank
fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Split a multi-line input into trimmed, non-empty entries
pub fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_positive(name: &str, raw: &str) -> BuildCacheResult<u64> {
    match raw.parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(BuildCacheError::InputInvalid {
            name: name.to_string(),
            reason: format!("expected a positive integer, got '{}'", raw),
        }),
    }
}
