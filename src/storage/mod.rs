//! Storage backends for cache artifacts
//!
//! The orchestration core talks to storage only through [`StorageClient`].
//! Two backends are provided:
//! - `Default`: a directory-based blob store on the runner
//! - `S3Compatible`: any S3 endpoint, driven through the `aws` CLI
//!
//! Backend selection happens once, in [`BackendFactory`], from the tagged
//! [`Backend`] variant of a validated [`StorageConfig`].

mod client;
mod factory;
mod local;
mod s3;
mod transfer;

pub use client::{StorageClient, StorageConnector};
pub use factory::BackendFactory;
pub use local::LocalStore;
pub use s3::S3Store;

use crate::error::{BuildCacheError, BuildCacheResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Credentials and location of an S3-compatible bucket
#[derive(Clone, PartialEq, Eq)]
pub struct S3Settings {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub bucket: String,
}

impl fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Settings")
            .field("endpoint", &self.endpoint)
            .field("access_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .finish()
    }
}

/// Selected storage backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Local blob store on the runner
    Default,
    /// S3-compatible object storage
    S3Compatible(S3Settings),
}

impl Backend {
    /// Short backend name for display
    pub fn name(&self) -> &'static str {
        match self {
            Self::Default => "local",
            Self::S3Compatible(_) => "s3",
        }
    }
}

/// Validated storage configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Backend selection plus its settings
    pub backend: Backend,

    /// Chunk size for transfers, in bytes
    pub transfer_chunk_size: u64,

    /// Upper bound for any single backend operation
    pub timeout_ms: u64,
}

impl StorageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// A stored artifact as reported by a lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    /// Key the artifact is stored under
    pub key: String,

    /// When the artifact was written
    pub created_at: DateTime<Utc>,

    /// Stored size in bytes, if the backend reports it
    pub size_bytes: Option<u64>,
}

/// Identifier of a newly written artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactId(pub String);

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of a persist call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveReceipt {
    /// A new artifact was written
    Stored(ArtifactId),
    /// The backend declined to write, e.g. the key already exists
    Declined,
}

/// Pick the most recently created entry; ties go to the lexically greatest key
pub fn newest(entries: impl IntoIterator<Item = ArtifactEntry>) -> Option<ArtifactEntry> {
    entries
        .into_iter()
        .max_by(|a, b| (a.created_at, &a.key).cmp(&(b.created_at, &b.key)))
}

/// Fail unless the artifact was saved for every requested path
///
/// `stored` lists the paths recorded when the artifact was written, present
/// or not. A requested path outside that list would be reported as a hit
/// while nothing is restored for it.
pub(crate) fn check_requested_paths(
    key: &str,
    stored: &[&str],
    requested: &[String],
) -> BuildCacheResult<()> {
    let unknown: Vec<&str> = requested
        .iter()
        .map(String::as_str)
        .filter(|path| !stored.contains(path))
        .collect();

    if unknown.is_empty() {
        return Ok(());
    }
    Err(BuildCacheError::Transfer(format!(
        "artifact {} holds no data for {}; it was saved for {}",
        key,
        unknown.join(", "),
        stored.join(", ")
    )))
}
