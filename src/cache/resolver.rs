//! Key resolution policy
//!
//! The storage backend answers individual lookups; the order and the
//! acceptance rules live here so every backend resolves the same way:
//!
//! 1. exact match on the primary key
//! 2. otherwise each fallback prefix in listed order, newest match first
//! 3. the first fallback with any match wins

use crate::cache::CacheRequest;
use crate::error::{BuildCacheError, BuildCacheResult};
use crate::storage::{ArtifactEntry, StorageClient};
use tracing::debug;

/// Outcome of key resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionResult {
    /// The matched artifact, if any
    pub matched: Option<ArtifactEntry>,

    /// True iff the matched key equals the primary key
    pub is_exact_match: bool,
}

impl ResolutionResult {
    /// Nothing matched
    pub fn no_match() -> Self {
        Self {
            matched: None,
            is_exact_match: false,
        }
    }

    fn matched(entry: ArtifactEntry, primary_key: &str) -> Self {
        let is_exact_match = entry.key == primary_key;
        Self {
            matched: Some(entry),
            is_exact_match,
        }
    }

    /// Key of the matched artifact
    pub fn matched_key(&self) -> Option<&str> {
        self.matched.as_ref().map(|e| e.key.as_str())
    }
}

/// Resolve a request against a storage backend
pub async fn resolve(
    storage: &dyn StorageClient,
    request: &CacheRequest,
) -> BuildCacheResult<ResolutionResult> {
    let primary = request.primary_key();

    if let Some(entry) = storage.find_exact(primary).await? {
        if entry.key != primary {
            return Err(BuildCacheError::BackendContract(format!(
                "exact lookup for {} returned {}",
                primary, entry.key
            )));
        }
        debug!("Exact match for {}", primary);
        return Ok(ResolutionResult::matched(entry, primary));
    }

    for prefix in request.fallback_keys() {
        if let Some(entry) = storage.find_latest_by_prefix(prefix).await? {
            if !entry.key.starts_with(prefix.as_str()) {
                return Err(BuildCacheError::BackendContract(format!(
                    "prefix lookup for {} returned {}",
                    prefix, entry.key
                )));
            }
            debug!("Restore key {} matched {}", prefix, entry.key);
            return Ok(ResolutionResult::matched(entry, primary));
        }
        debug!("No match for restore key {}", prefix);
    }

    Ok(ResolutionResult::no_match())
}
