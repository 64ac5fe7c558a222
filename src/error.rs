//! Error types for buildcache
//!
//! All modules use `BuildCacheResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for buildcache operations
pub type BuildCacheResult<T> = Result<T, BuildCacheError>;

/// All errors that can occur in buildcache
#[derive(Error, Debug)]
pub enum BuildCacheError {
    // Input errors
    #[error("Input required and not supplied: {0}")]
    InputRequired(String),

    #[error("Invalid input {name}: {reason}")]
    InputInvalid { name: String, reason: String },

    #[error("Key Validation Error: {key} cannot be larger than {max} characters.")]
    KeyTooLong { key: String, max: usize },

    #[error("Key Validation Error: {0} cannot contain commas.")]
    KeyContainsComma(String),

    #[error("Key Validation Error: Keys are limited to a maximum of {max}.")]
    TooManyKeys { max: usize },

    #[error("S3 configuration incomplete, missing: {}", missing.join(", "))]
    S3ConfigIncomplete { missing: Vec<String> },

    #[error("Unable to determine the pipeline run; set --run-id or BUILDCACHE_RUN_ID")]
    RunScopeUnknown,

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create directory {path}: {source}")]
    DirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Backend errors
    #[error("Cache lookup failed: {0}")]
    Lookup(String),

    #[error("Cache transfer failed: {0}")]
    Transfer(String),

    #[error("Storage backend timed out after {timeout_ms} ms during {operation}")]
    BackendTimeout { operation: String, timeout_ms: u64 },

    #[error("Storage backend violated the lookup contract: {0}")]
    BackendContract(String),

    #[error("Cache artifact {key} is corrupt: {reason}")]
    ArtifactCorrupt { key: String, reason: String },

    #[error("Path Validation Error: Path(s) specified for caching do not exist, hence no cache is being saved.")]
    NoPathsToCache,

    // State errors
    #[error("Failed to persist run state: {0}")]
    StatePersist(String),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Required CLI not found: {name}. {hint}")]
    CliNotFound { name: String, hint: String },

    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BuildCacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Whether the error came from the storage backend rather than from input
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            Self::Lookup(_)
                | Self::Transfer(_)
                | Self::BackendTimeout { .. }
                | Self::BackendContract(_)
                | Self::ArtifactCorrupt { .. }
                | Self::CliNotFound { .. }
                | Self::CommandFailed { .. }
                | Self::CommandExecution { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::InputRequired(name) if name == "key" => {
                Some("Pass --key or set INPUT_KEY for the restore step")
            }
            Self::InputRequired(name) if name == "path" => {
                Some("Pass --path or set INPUT_PATH (newline separated)")
            }
            Self::S3ConfigIncomplete { .. } => Some(
                "Set all of s3-endpoint, s3-access-key, s3-secret-key, s3-region and s3-bucket, or none of them",
            ),
            Self::RunScopeUnknown => Some("Pass --run-id or --state-file"),
            Self::CliNotFound { name, .. } if name == "aws" => {
                Some("Install the AWS CLI v2 on the runner")
            }
            _ => None,
        }
    }
}
