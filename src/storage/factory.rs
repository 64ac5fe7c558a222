//! Backend factory for creating storage clients
//!
//! Selects the backend from the validated [`Backend`] variant.

use crate::error::BuildCacheResult;
use crate::storage::client::{StorageClient, StorageConnector};
use crate::storage::local::LocalStore;
use crate::storage::s3::S3Store;
use crate::storage::{Backend, StorageConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Creates the storage client matching a configuration
pub struct BackendFactory {
    store_root: PathBuf,
}

impl BackendFactory {
    /// Create a factory; `store_root` is used by the local backend
    pub fn new(store_root: PathBuf) -> Self {
        Self { store_root }
    }
}

impl StorageConnector for BackendFactory {
    fn connect(&self, config: &StorageConfig) -> BuildCacheResult<Arc<dyn StorageClient>> {
        match &config.backend {
            Backend::Default => {
                debug!("Using local store at {}", self.store_root.display());
                Ok(Arc::new(LocalStore::new(
                    self.store_root.clone(),
                    config.transfer_chunk_size,
                )))
            }
            Backend::S3Compatible(settings) => {
                debug!(
                    "Using S3 bucket {} at {}",
                    settings.bucket, settings.endpoint
                );
                Ok(Arc::new(S3Store::new(
                    settings.clone(),
                    config.transfer_chunk_size,
                )))
            }
        }
    }
}
