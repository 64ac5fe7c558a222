//! Save command - store the tree after the build
//!
//! Never fails the pipeline: wiring errors are logged like any other save
//! failure and the command exits successfully.

use crate::cli::{Cli, InputArgs};
use crate::config::{ActionInputs, Config};
use crate::error::BuildCacheResult;
use tracing::{debug, warn};

/// Execute the save command
pub async fn execute(cli: &Cli, args: InputArgs, config: &Config) -> BuildCacheResult<()> {
    let inputs = ActionInputs::from(args);
    let orchestrator = match super::orchestrator(cli, config, &inputs) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            warn!("Failed to save cache: {}", e);
            return Ok(());
        }
    };

    let outcome = orchestrator.save(&inputs).await;
    debug!("Save finished: {:?}", outcome);
    Ok(())
}
