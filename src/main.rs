//! buildcache - build cache for CI pipelines
//!
//! CLI entry point that dispatches to the restore and save phases.

use buildcache::cli::{Cli, Commands};
use buildcache::config::{Config, ConfigManager};
use buildcache::error::BuildCacheResult;
use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> BuildCacheResult<()> {
    let cli = Cli::parse();

    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };
    let loaded = config_manager.load().await;

    let json = loaded
        .as_ref()
        .map(|c| c.general.log_format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    init_logging(cli.verbose, json);

    let config = match (loaded, &cli.command) {
        (Ok(config), _) => config,
        // Save must not fail the pipeline, even on a broken config file
        (Err(e), Commands::Save(_)) => {
            warn!("Failed to save cache: {}", e);
            return Ok(());
        }
        (Err(e), _) => return Err(e),
    };

    dispatch(&cli, config).await
}

async fn dispatch(cli: &Cli, config: Config) -> BuildCacheResult<()> {
    match &cli.command {
        Commands::Restore(args) => {
            buildcache::cli::commands::restore(cli, args.clone(), &config).await
        }
        Commands::Save(args) => buildcache::cli::commands::save(cli, args.clone(), &config).await,
    }
}

/// Logs go to stderr; stdout carries step outputs only
fn init_logging(verbose: u8, json: bool) {
    // 0 = info, 1 = debug, 2+ = trace; RUST_LOG overrides
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("buildcache=info"),
        1 => EnvFilter::new("buildcache=debug"),
        _ => EnvFilter::new("buildcache=trace"),
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}
