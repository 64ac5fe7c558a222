//! Cross-phase run state
//!
//! The restore phase records which primary key it used and which stored key
//! it matched. The save phase reads those values back instead of
//! re-evaluating its inputs, which may have changed during the build.

pub mod file;
pub mod memory;

pub use file::{run_id_from_env, FileStateStore};
pub use memory::MemoryStateStore;

use crate::error::BuildCacheResult;
use async_trait::async_trait;
use tracing::debug;

/// Names of the state entries
pub mod names {
    /// Primary key used by the restore phase
    pub const CACHE_PRIMARY_KEY: &str = "CACHE_KEY";
    /// Key matched by the restore phase; empty when nothing matched
    pub const CACHE_MATCHED_KEY: &str = "CACHE_RESULT";
}

/// Run-scoped key/value channel
///
/// Repeated writes to one name are allowed; the last one wins.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn put(&self, name: &str, value: &str) -> BuildCacheResult<()>;

    async fn get(&self, name: &str) -> BuildCacheResult<Option<String>>;
}

/// What the restore phase hands to the save phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    pub primary_key: String,
    pub matched_key: Option<String>,
}

impl RunState {
    /// Whether the restore phase hit the primary key exactly
    pub fn is_exact_hit(&self) -> bool {
        self.matched_key.as_deref() == Some(self.primary_key.as_str())
    }

    /// Write both entries
    pub async fn record(&self, store: &dyn StateStore) -> BuildCacheResult<()> {
        store
            .put(names::CACHE_PRIMARY_KEY, &self.primary_key)
            .await?;
        store
            .put(
                names::CACHE_MATCHED_KEY,
                self.matched_key.as_deref().unwrap_or_default(),
            )
            .await?;
        debug!("Recorded run state: {:?}", self);
        Ok(())
    }

    /// Read the state back; `None` if no primary key was recorded
    pub async fn load(store: &dyn StateStore) -> BuildCacheResult<Option<Self>> {
        let Some(primary_key) = store
            .get(names::CACHE_PRIMARY_KEY)
            .await?
            .filter(|k| !k.is_empty())
        else {
            return Ok(None);
        };

        let matched_key = store
            .get(names::CACHE_MATCHED_KEY)
            .await?
            .filter(|k| !k.is_empty());

        Ok(Some(Self {
            primary_key,
            matched_key,
        }))
    }
}
