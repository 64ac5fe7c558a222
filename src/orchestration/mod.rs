//! Restore and save phase orchestration
//!
//! Both phases share one [`CacheOrchestrator`]. Restore runs before the
//! build and fails loudly on bad input or backend errors; save runs after
//! the build and never fails the pipeline.
//!
//! # Error policy
//!
//! | Condition | Restore | Save |
//! |-----------|---------|------|
//! | Feature unavailable / ineligible event | no-op, cache-hit=false | no-op |
//! | Missing or invalid inputs | error | warning |
//! | Lookup or transfer failure | error | warning |
//! | No recorded run state | n/a | warning, no-op |

mod outputs;
mod restore;
mod save;
#[cfg(test)]
pub(crate) mod testing;

pub use outputs::{OutputSink, CACHE_HIT_OUTPUT};
pub use restore::RestoreOutcome;
pub use save::SaveOutcome;

use crate::config::schema::CacheConfig;
use crate::error::{BuildCacheError, BuildCacheResult};
use crate::event::EventContext;
use crate::state::StateStore;
use crate::storage::StorageConnector;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Why a phase did nothing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Caching is disabled for this runner
    FeatureUnavailable,
    /// The triggering event carries no ref
    IneligibleEvent(String),
    /// Save found no primary key recorded by restore
    MissingState,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FeatureUnavailable => write!(f, "cache feature unavailable"),
            Self::IneligibleEvent(name) => write!(f, "event {} is not eligible", name),
            Self::MissingState => write!(f, "no run state recorded"),
        }
    }
}

/// Shared core for the restore and save phases
pub struct CacheOrchestrator {
    connector: Box<dyn StorageConnector>,
    state: Arc<dyn StateStore>,
    outputs: OutputSink,
    event: EventContext,
    cache: CacheConfig,
    feature_available: bool,
}

impl CacheOrchestrator {
    /// Create an orchestrator; the feature is available iff `cache.enabled`
    pub fn new(
        connector: Box<dyn StorageConnector>,
        state: Arc<dyn StateStore>,
        outputs: OutputSink,
        event: EventContext,
        cache: CacheConfig,
    ) -> Self {
        let feature_available = cache.enabled;
        Self {
            connector,
            state,
            outputs,
            event,
            cache,
            feature_available,
        }
    }

    /// Override feature availability
    pub fn with_feature_available(mut self, available: bool) -> Self {
        self.feature_available = available;
        self
    }

    /// Reported outputs
    pub fn outputs(&self) -> &OutputSink {
        &self.outputs
    }

    /// Run state channel
    pub fn state(&self) -> &dyn StateStore {
        self.state.as_ref()
    }
}

/// Run a storage call on its own task with a timeout
///
/// Elapsed timeouts and panics inside the task come back as errors built
/// by `to_error`, so no fault escapes the phase boundary.
pub(crate) async fn guarded<T, Fut>(
    operation: &str,
    timeout: Duration,
    to_error: fn(String) -> BuildCacheError,
    fut: Fut,
) -> BuildCacheResult<T>
where
    T: Send + 'static,
    Fut: Future<Output = BuildCacheResult<T>> + Send + 'static,
{
    let mut handle = tokio::spawn(fut);
    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(to_error(format!("{} aborted: {}", operation, join_err))),
        Err(_) => {
            handle.abort();
            Err(BuildCacheError::BackendTimeout {
                operation: operation.to_string(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })
        }
    }
}
