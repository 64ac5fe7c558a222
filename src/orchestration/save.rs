//! Save phase

use crate::cache::CacheRequest;
use crate::config::ActionInputs;
use crate::error::{BuildCacheError, BuildCacheResult};
use crate::event;
use crate::orchestration::{guarded, CacheOrchestrator, SkipReason};
use crate::state::RunState;
use crate::storage::{ArtifactId, SaveReceipt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How the save phase ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Nothing was attempted
    Skipped(SkipReason),
    /// Restore hit the primary key exactly; nothing to save
    ExactHit,
    /// A new artifact was stored
    Saved { key: String, id: ArtifactId },
    /// The backend already holds an artifact under this key
    Declined { key: String },
    /// The save failed; the failure was logged as a warning
    Failed(String),
}

impl SaveOutcome {
    /// Whether a new artifact was written
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }
}

impl CacheOrchestrator {
    /// Run the save phase
    ///
    /// Never returns an error: every failure is downgraded to a warning.
    pub async fn save(&self, inputs: &ActionInputs) -> SaveOutcome {
        match self.try_save(inputs).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Failed to save cache: {}", e);
                SaveOutcome::Failed(e.to_string())
            }
        }
    }

    async fn try_save(&self, inputs: &ActionInputs) -> BuildCacheResult<SaveOutcome> {
        if !self.feature_available {
            debug!("Cache service unavailable, skipping save");
            return Ok(SaveOutcome::Skipped(SkipReason::FeatureUnavailable));
        }

        if !event::check(&self.event) {
            return Ok(SaveOutcome::Skipped(SkipReason::IneligibleEvent(
                self.event.event_name.clone(),
            )));
        }

        let Some(state) = RunState::load(self.state.as_ref()).await? else {
            warn!("Error retrieving key from state.");
            return Ok(SaveOutcome::Skipped(SkipReason::MissingState));
        };

        if state.is_exact_hit() {
            info!(
                "Cache hit occurred on the primary key {}, not saving cache.",
                state.primary_key
            );
            return Ok(SaveOutcome::ExactHit);
        }

        // The key recorded by restore wins over the current key input
        let request = CacheRequest::new(state.primary_key, Vec::new(), inputs.paths()?)?;
        let config = inputs.storage_config(&self.cache)?;
        let storage = self.connector.connect(&config)?;
        debug!(
            "Saving {:?} under {} to {} backend",
            request.paths(),
            request.primary_key(),
            storage.backend_name()
        );

        let receipt = {
            let storage = Arc::clone(&storage);
            let paths = request.paths().to_vec();
            let key = request.primary_key().to_string();
            guarded(
                "save",
                config.timeout(),
                BuildCacheError::Transfer,
                async move { storage.persist(&paths, &key).await },
            )
            .await?
        };

        let key = request.primary_key().to_string();
        match receipt {
            SaveReceipt::Stored(id) => {
                info!("Cache saved with key: {}", key);
                debug!("Stored artifact id {}", id);
                Ok(SaveOutcome::Saved { key, id })
            }
            SaveReceipt::Declined => {
                info!(
                    "Cache for key {} already exists or is being saved, not saving cache.",
                    key
                );
                Ok(SaveOutcome::Declined { key })
            }
        }
    }
}
