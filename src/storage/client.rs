//! Storage client abstraction
//!
//! Provides the trait every artifact backend implements, plus the
//! connector used to build a backend from a validated configuration.

use crate::error::BuildCacheResult;
use crate::storage::{ArtifactEntry, SaveReceipt, StorageConfig};
use async_trait::async_trait;
use std::sync::Arc;

/// Abstract artifact store
///
/// Lookups return `Ok(None)` for "no match"; `Err` is reserved for the
/// backend being unreachable or misbehaving.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Find the artifact stored under exactly `key`
    async fn find_exact(&self, key: &str) -> BuildCacheResult<Option<ArtifactEntry>>;

    /// Find the most recently created artifact whose key starts with `prefix`
    async fn find_latest_by_prefix(&self, prefix: &str)
        -> BuildCacheResult<Option<ArtifactEntry>>;

    /// Materialize an artifact at the given paths
    async fn restore(&self, entry: &ArtifactEntry, paths: &[String]) -> BuildCacheResult<()>;

    /// Archive the given paths and store them under `key`
    async fn persist(&self, paths: &[String], key: &str) -> BuildCacheResult<SaveReceipt>;

    /// Human-readable backend name for logs
    fn backend_name(&self) -> &'static str;
}

/// Builds a storage client for a configuration
pub trait StorageConnector: Send + Sync {
    fn connect(&self, config: &StorageConfig) -> BuildCacheResult<Arc<dyn StorageClient>>;
}
