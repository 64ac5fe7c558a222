//! Restore phase

use crate::cache::resolve;
use crate::config::ActionInputs;
use crate::error::{BuildCacheError, BuildCacheResult};
use crate::event;
use crate::orchestration::{guarded, CacheOrchestrator, SkipReason};
use crate::state::RunState;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How the restore phase ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Nothing was attempted
    Skipped(SkipReason),
    /// No stored key matched
    Miss,
    /// An artifact was restored
    Restored { matched_key: String, exact: bool },
}

impl RestoreOutcome {
    /// The cache-hit signal for this outcome
    pub fn cache_hit(&self) -> bool {
        matches!(self, Self::Restored { exact: true, .. })
    }

    /// Key of the restored artifact
    pub fn matched_key(&self) -> Option<&str> {
        match self {
            Self::Restored { matched_key, .. } => Some(matched_key),
            _ => None,
        }
    }
}

impl CacheOrchestrator {
    /// Run the restore phase
    ///
    /// Returns `Err` only for invalid inputs and backend failures; skipped
    /// runs and misses are `Ok`.
    pub async fn restore(&self, inputs: &ActionInputs) -> BuildCacheResult<RestoreOutcome> {
        if !self.feature_available {
            warn!("Cache service is not available on this runner, skipping restore");
            self.outputs.set_cache_hit(false).await?;
            return Ok(RestoreOutcome::Skipped(SkipReason::FeatureUnavailable));
        }

        if !event::check(&self.event) {
            self.outputs.set_cache_hit(false).await?;
            return Ok(RestoreOutcome::Skipped(SkipReason::IneligibleEvent(
                self.event.event_name.clone(),
            )));
        }

        let request = inputs.cache_request()?;
        let config = inputs.storage_config(&self.cache)?;
        let storage = self.connector.connect(&config)?;
        debug!(
            "Resolving keys {:?} against {} backend",
            request.all_keys(),
            storage.backend_name()
        );

        let resolution = {
            let storage = Arc::clone(&storage);
            let request = request.clone();
            guarded(
                "lookup",
                config.timeout(),
                BuildCacheError::Lookup,
                async move { resolve(storage.as_ref(), &request).await },
            )
            .await?
        };

        let Some(entry) = resolution.matched.clone() else {
            info!(
                "Cache not found for input keys: {}",
                request.all_keys().join(", ")
            );
            RunState {
                primary_key: request.primary_key().to_string(),
                matched_key: None,
            }
            .record(self.state.as_ref())
            .await?;
            self.outputs.set_cache_hit(false).await?;
            return Ok(RestoreOutcome::Miss);
        };

        {
            let storage = Arc::clone(&storage);
            let entry = entry.clone();
            let paths = request.paths().to_vec();
            guarded(
                "restore",
                config.timeout(),
                BuildCacheError::Transfer,
                async move { storage.restore(&entry, &paths).await },
            )
            .await?;
        }

        RunState {
            primary_key: request.primary_key().to_string(),
            matched_key: Some(entry.key.clone()),
        }
        .record(self.state.as_ref())
        .await?;

        self.outputs
            .set_cache_hit(resolution.is_exact_match)
            .await?;
        info!("Cache restored from key: {}", entry.key);

        Ok(RestoreOutcome::Restored {
            matched_key: entry.key,
            exact: resolution.is_exact_match,
        })
    }
}
