//! Restore command - fetch the best matching cache before the build

use crate::cli::{Cli, InputArgs};
use crate::config::{ActionInputs, Config};
use crate::error::BuildCacheResult;
use crate::orchestration::RestoreOutcome;
use tracing::debug;

/// Execute the restore command
pub async fn execute(cli: &Cli, args: InputArgs, config: &Config) -> BuildCacheResult<()> {
    let inputs = ActionInputs::from(args);
    let orchestrator = super::orchestrator(cli, config, &inputs)?;

    match orchestrator.restore(&inputs).await? {
        RestoreOutcome::Skipped(reason) => debug!("Restore skipped: {}", reason),
        RestoreOutcome::Miss => debug!("Restore finished without a match"),
        RestoreOutcome::Restored { matched_key, exact } => {
            debug!("Restored {} (exact: {})", matched_key, exact)
        }
    }
    Ok(())
}
