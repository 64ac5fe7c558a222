//! CLI command implementations

pub mod restore;
pub mod save;

pub use restore::execute as restore;
pub use save::execute as save;

use crate::cli::Cli;
use crate::config::inputs::split_list;
use crate::config::{ActionInputs, Config, ConfigManager};
use crate::error::{BuildCacheError, BuildCacheResult};
use crate::event::EventContext;
use crate::orchestration::{CacheOrchestrator, OutputSink};
use crate::state::{run_id_from_env, FileStateStore};
use crate::storage::BackendFactory;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Locate the state file shared by both phases of this cache step
///
/// A derived run id is combined with the `path` input, so several caches
/// in one job keep separate state.
pub fn state_store(
    cli: &Cli,
    config: &Config,
    inputs: &ActionInputs,
) -> BuildCacheResult<FileStateStore> {
    if let Some(path) = &cli.state_file {
        return Ok(FileStateStore::new(path.clone()));
    }

    let run_id = cli
        .run_id
        .clone()
        .or_else(run_id_from_env)
        .ok_or(BuildCacheError::RunScopeUnknown)?;
    let dir = config
        .state
        .dir
        .clone()
        .unwrap_or_else(ConfigManager::runs_dir);
    let paths = split_list(inputs.path.as_deref());
    Ok(FileStateStore::for_cache(&dir, &run_id, &paths))
}

/// Wire an orchestrator from the command line and configuration
pub fn orchestrator(
    cli: &Cli,
    config: &Config,
    inputs: &ActionInputs,
) -> BuildCacheResult<CacheOrchestrator> {
    let state = state_store(cli, config, inputs)?;
    debug!("Run state file: {}", state.path().display());

    let store_root: PathBuf = cli
        .store_dir
        .clone()
        .or_else(|| config.store.root.clone())
        .unwrap_or_else(ConfigManager::store_dir);

    let event = EventContext::new(cli.event.clone(), cli.git_ref.clone());

    Ok(CacheOrchestrator::new(
        Box::new(BackendFactory::new(store_root)),
        Arc::new(state),
        OutputSink::new(cli.output_file.clone()),
        event,
        config.cache.clone(),
    )
    .with_feature_available(ConfigManager::is_feature_available(config)))
}
