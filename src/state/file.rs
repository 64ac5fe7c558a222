//! Append-only state file, one per pipeline run
//!
//! Each `put` appends a JSON line and syncs it to disk before returning, so
//! the restore phase's writes are durable before the build step starts.
//! `get` replays the file and keeps the last value for a name.

use crate::error::{BuildCacheError, BuildCacheResult};
use crate::state::StateStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::warn;

#[derive(Debug, Serialize, Deserialize)]
struct StateLine {
    name: String,
    value: String,
}

/// State store backed by a JSON-lines file
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    /// Use an explicit state file
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Use the state file for `run_id` inside `dir`
    pub fn for_run(dir: &Path, run_id: &str) -> Self {
        Self::new(dir.join(format!("{}.jsonl", sanitize_run_id(run_id))))
    }

    /// Use the state file of one cache step of `run_id`
    ///
    /// Steps of one run that cache different paths get separate files; the
    /// restore and save phases of a step share the same `path` input.
    pub fn for_cache(dir: &Path, run_id: &str, paths: &[String]) -> Self {
        Self::for_run(dir, &format!("{}-{}", run_id, cache_scope(paths)))
    }

    /// State file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn put(&self, name: &str, value: &str) -> BuildCacheResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| BuildCacheError::DirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        let mut line = serde_json::to_string(&StateLine {
            name: name.to_string(),
            value: value.to_string(),
        })?;
        line.push('\n');

        let persist_err =
            |e: std::io::Error| BuildCacheError::StatePersist(format!("{}: {}", self.path.display(), e));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(persist_err)?;
        file.write_all(line.as_bytes()).await.map_err(persist_err)?;
        file.sync_data().await.map_err(persist_err)?;

        Ok(())
    }

    async fn get(&self, name: &str) -> BuildCacheResult<Option<String>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(BuildCacheError::io(
                    format!("reading state file {}", self.path.display()),
                    e,
                ))
            }
        };

        let mut value = None;
        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StateLine>(line) {
                Ok(entry) if entry.name == name => value = Some(entry.value),
                Ok(_) => {}
                Err(e) => warn!(
                    "Ignoring malformed line {} in {}: {}",
                    number + 1,
                    self.path.display(),
                    e
                ),
            }
        }

        Ok(value)
    }
}

/// Short digest of the path list; order matters
fn cache_scope(paths: &[String]) -> String {
    let digest = Sha256::digest(paths.join("\n").as_bytes());
    hex::encode(&digest[..8])
}

/// Keep run ids safe to use as file names
fn sanitize_run_id(run_id: &str) -> String {
    run_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Derive a run id from the CI environment
///
/// Combines `GITHUB_RUN_ID`, `GITHUB_RUN_ATTEMPT` and `GITHUB_JOB`, which
/// are identical for the restore and save steps of one job.
pub fn run_id_from_env() -> Option<String> {
    let run = std::env::var("GITHUB_RUN_ID").ok().filter(|v| !v.is_empty())?;
    let mut id = run;
    for var in ["GITHUB_RUN_ATTEMPT", "GITHUB_JOB"] {
        if let Ok(part) = std::env::var(var) {
            if !part.is_empty() {
                id.push('-');
                id.push_str(&part);
            }
        }
    }
    Some(id)
}
