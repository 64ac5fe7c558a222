//! CLI argument definitions using clap derive

use crate::config::{ActionInputs, S3Inputs};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// buildcache - build cache for CI pipelines
///
/// Restores a cached directory tree before a build and saves it afterwards,
/// keyed by a primary key with optional restore-key prefixes.
#[derive(Parser, Debug)]
#[command(name = "buildcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "BUILDCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Identifier shared by the restore and save steps of one run
    #[arg(long, global = true, env = "BUILDCACHE_RUN_ID")]
    pub run_id: Option<String>,

    /// Explicit run state file (overrides --run-id)
    #[arg(long, global = true, env = "BUILDCACHE_STATE_FILE")]
    pub state_file: Option<PathBuf>,

    /// File receiving name=value step outputs
    #[arg(long, global = true, env = "GITHUB_OUTPUT")]
    pub output_file: Option<PathBuf>,

    /// Directory of the local store
    #[arg(long, global = true, env = "BUILDCACHE_STORE_DIR")]
    pub store_dir: Option<PathBuf>,

    /// Name of the triggering event
    #[arg(long, global = true, env = "GITHUB_EVENT_NAME", default_value = "")]
    pub event: String,

    /// Ref the triggering event is tied to
    #[arg(long = "ref", global = true, env = "GITHUB_REF")]
    pub git_ref: Option<String>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Restore a cached tree before the build
    Restore(InputArgs),

    /// Save the tree after the build
    Save(InputArgs),
}

/// Action inputs shared by both phases
#[derive(Args, Debug, Default, Clone)]
pub struct InputArgs {
    /// Primary cache key
    #[arg(long, env = "INPUT_KEY")]
    pub key: Option<String>,

    /// Newline separated restore key prefixes
    #[arg(long, env = "INPUT_RESTORE-KEYS")]
    pub restore_keys: Option<String>,

    /// Newline separated paths to cache
    #[arg(long, env = "INPUT_PATH")]
    pub path: Option<String>,

    /// Upload chunk size in bytes
    #[arg(long, env = "INPUT_UPLOAD-CHUNK-SIZE")]
    pub upload_chunk_size: Option<String>,

    /// S3-compatible endpoint URL
    #[arg(long, env = "INPUT_S3-ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// S3 access key id
    #[arg(long, env = "INPUT_S3-ACCESS-KEY", hide_env_values = true)]
    pub s3_access_key: Option<String>,

    /// S3 secret access key
    #[arg(long, env = "INPUT_S3-SECRET-KEY", hide_env_values = true)]
    pub s3_secret_key: Option<String>,

    /// S3 region
    #[arg(long, env = "INPUT_S3-REGION")]
    pub s3_region: Option<String>,

    /// S3 bucket name
    #[arg(long, env = "INPUT_S3-BUCKET")]
    pub s3_bucket: Option<String>,
}

impl From<InputArgs> for ActionInputs {
    fn from(args: InputArgs) -> Self {
        Self {
            key: args.key,
            restore_keys: args.restore_keys,
            path: args.path,
            upload_chunk_size: args.upload_chunk_size,
            s3: S3Inputs {
                endpoint: args.s3_endpoint,
                access_key: args.s3_access_key,
                secret_key: args.s3_secret_key,
                region: args.s3_region,
                bucket: args.s3_bucket,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_restore_flags() {
        let cli = Cli::try_parse_from([
            "buildcache",
            "-v",
            "--event",
            "push",
            "--ref",
            "refs/heads/main",
            "restore",
            "--key",
            "linux-deps-v2",
            "--restore-keys",
            "linux-deps-",
            "--path",
            "target",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 1);
        assert_eq!(cli.event, "push");
        assert_eq!(cli.git_ref.as_deref(), Some("refs/heads/main"));
        let Commands::Restore(args) = cli.command else {
            panic!("expected restore");
        };
        let inputs = ActionInputs::from(args);
        assert_eq!(inputs.key.as_deref(), Some("linux-deps-v2"));
        assert_eq!(inputs.restore_keys(), vec!["linux-deps-"]);
    }

    #[test]
    fn s3_flags_map_to_inputs() {
        let cli = Cli::try_parse_from([
            "buildcache",
            "save",
            "--s3-endpoint",
            "https://s3.local",
            "--s3-bucket",
            "ci",
        ])
        .unwrap();

        let Commands::Save(args) = cli.command else {
            panic!("expected save");
        };
        let inputs = ActionInputs::from(args);
        assert_eq!(inputs.s3.endpoint.as_deref(), Some("https://s3.local"));
        assert_eq!(inputs.s3.bucket.as_deref(), Some("ci"));
        assert_eq!(inputs.s3.region, None);
    }
}
