//! S3-compatible backend using the AWS CLI
//!
//! Artifacts are tar archives stored as `<key>.tar` objects. Each archive
//! carries a `.buildcache-paths.json` member listing the paths it was saved
//! for. The `aws` and `tar` binaries do the transfer work; credentials reach
//! them only through the child process environment. Children are killed when
//! their future is dropped, so a timed-out transfer stops writing.

use crate::error::{BuildCacheError, BuildCacheResult};
use crate::storage::client::StorageClient;
use crate::storage::transfer::{exists, resolve_path};
use crate::storage::{
    check_requested_paths, newest, ArtifactEntry, ArtifactId, S3Settings, SaveReceipt,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

const ARCHIVE_SUFFIX: &str = ".tar";
const PATHS_MEMBER: &str = ".buildcache-paths.json";

/// Paths an archive was saved for, exactly as requested
#[derive(Debug, Serialize, Deserialize)]
struct SavedPaths {
    paths: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HeadObjectResponse {
    last_modified: Option<String>,
    content_length: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListObjectsResponse {
    #[serde(default)]
    contents: Vec<ListedObject>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListedObject {
    key: String,
    last_modified: Option<String>,
    size: Option<u64>,
}

/// Artifact store in an S3-compatible bucket
pub struct S3Store {
    settings: S3Settings,
    chunk_size: u64,
}

impl S3Store {
    /// Create a store for the given bucket settings
    pub fn new(settings: S3Settings, chunk_size: u64) -> Self {
        Self {
            settings,
            chunk_size,
        }
    }

    fn object_key(key: &str) -> String {
        format!("{}{}", key, ARCHIVE_SUFFIX)
    }

    fn object_url(&self, key: &str) -> String {
        format!("s3://{}/{}", self.settings.bucket, Self::object_key(key))
    }

    /// Base `aws` invocation with endpoint and credentials applied
    fn aws(&self) -> Command {
        let mut cmd = Command::new("aws");
        cmd.args(["--endpoint-url", &self.settings.endpoint]);
        cmd.args(["--output", "json"]);
        cmd.env("AWS_ACCESS_KEY_ID", &self.settings.access_key)
            .env("AWS_SECRET_ACCESS_KEY", &self.settings.secret_key)
            .env("AWS_REGION", &self.settings.region)
            .env("AWS_DEFAULT_REGION", &self.settings.region)
            .env("AWS_PAGER", "");
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Run a prepared command, mapping a missing binary to `CliNotFound`
    async fn exec(mut cmd: Command, name: &str, description: &str) -> BuildCacheResult<Output> {
        debug!("Executing: {}", description);
        cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BuildCacheError::CliNotFound {
                    name: name.to_string(),
                    hint: format!("{} must be on PATH for the S3 backend", name),
                }
            } else {
                BuildCacheError::command_failed(description, e)
            }
        })
    }

    async fn tar(args: &[&str], description: &str) -> BuildCacheResult<Output> {
        let mut cmd = Command::new("tar");
        cmd.args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let output = Self::exec(cmd, "tar", description).await?;
        if !output.status.success() {
            return Err(BuildCacheError::command_exec(
                description,
                String::from_utf8_lossy(&output.stderr),
            ));
        }
        Ok(output)
    }

    /// Write an AWS CLI config file carrying the multipart chunk size
    async fn write_transfer_config(&self, path: &Path) -> BuildCacheResult<()> {
        let content = format!(
            "[default]\ns3 =\n  multipart_chunksize = {}\n",
            self.chunk_size
        );
        tokio::fs::write(path, content)
            .await
            .map_err(|e| BuildCacheError::io(format!("writing {}", path.display()), e))
    }

    async fn upload(&self, archive: &Path, key: &str) -> BuildCacheResult<()> {
        let config_path = scratch_path("aws-config");
        self.write_transfer_config(&config_path).await?;

        let archive_str = archive.to_string_lossy().into_owned();
        let url = self.object_url(key);
        let mut cmd = self.aws();
        cmd.env("AWS_CONFIG_FILE", &config_path);
        cmd.args(["s3", "cp", "--only-show-errors", archive_str.as_str(), url.as_str()]);

        let result = Self::exec(cmd, "aws", "aws s3 cp (upload)").await;
        let _ = tokio::fs::remove_file(&config_path).await;

        let output = result?;
        if !output.status.success() {
            return Err(BuildCacheError::Transfer(format!(
                "uploading {}: {}",
                url,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    async fn download(&self, entry: &ArtifactEntry, archive: &Path) -> BuildCacheResult<()> {
        let archive_str = archive.to_string_lossy().into_owned();
        let url = self.object_url(&entry.key);
        let mut cmd = self.aws();
        cmd.args(["s3", "cp", "--only-show-errors", url.as_str(), archive_str.as_str()]);

        let output = Self::exec(cmd, "aws", "aws s3 cp (download)").await?;
        if !output.status.success() {
            return Err(BuildCacheError::Transfer(format!(
                "downloading {}: {}",
                url,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    async fn restore_archive(
        &self,
        entry: &ArtifactEntry,
        archive: &Path,
        paths: &[String],
    ) -> BuildCacheResult<()> {
        self.download(entry, archive).await?;
        let archive_str = archive.to_string_lossy().into_owned();

        let listing = Self::tar(&["-xOf", archive_str.as_str(), PATHS_MEMBER], "tar -xO")
            .await
            .map_err(|e| {
                BuildCacheError::Transfer(format!("reading saved paths of {}: {}", entry.key, e))
            })?;
        let saved = parse_saved_paths(&entry.key, &listing.stdout)?;
        let stored: Vec<&str> = saved.paths.iter().map(String::as_str).collect();
        check_requested_paths(&entry.key, &stored, paths)?;

        Self::tar(
            &["--exclude", PATHS_MEMBER, "-xPf", archive_str.as_str()],
            "tar -x",
        )
        .await
        .map_err(|e| BuildCacheError::Transfer(format!("extracting {}: {}", entry.key, e)))?;
        Ok(())
    }

    async fn archive_paths(
        archive: &Path,
        paths: &[String],
        present: &[String],
    ) -> BuildCacheResult<()> {
        let listing_dir = scratch_path("paths");
        tokio::fs::create_dir_all(&listing_dir)
            .await
            .map_err(|e| BuildCacheError::DirCreate {
                path: listing_dir.clone(),
                source: e,
            })?;

        let result = async {
            let saved = serde_json::to_vec(&SavedPaths {
                paths: paths.to_vec(),
            })?;
            tokio::fs::write(listing_dir.join(PATHS_MEMBER), saved)
                .await
                .map_err(|e| BuildCacheError::io("writing saved path list", e))?;

            let cwd = std::env::current_dir()
                .map_err(|e| BuildCacheError::io("getting current directory", e))?;
            let archive_str = archive.to_string_lossy().into_owned();
            let listing_str = listing_dir.to_string_lossy().into_owned();
            let cwd_str = cwd.to_string_lossy().into_owned();

            let mut args = vec![
                "-cPf",
                archive_str.as_str(),
                "-C",
                listing_str.as_str(),
                PATHS_MEMBER,
                "-C",
                cwd_str.as_str(),
                "--",
            ];
            args.extend(present.iter().map(String::as_str));
            Self::tar(&args, "tar -c")
                .await
                .map_err(|e| BuildCacheError::Transfer(format!("archiving paths: {}", e)))?;
            Ok::<(), BuildCacheError>(())
        }
        .await;

        let _ = tokio::fs::remove_dir_all(&listing_dir).await;
        result
    }
}

#[async_trait]
impl StorageClient for S3Store {
    async fn find_exact(&self, key: &str) -> BuildCacheResult<Option<ArtifactEntry>> {
        let object = Self::object_key(key);
        let mut cmd = self.aws();
        cmd.args(["s3api", "head-object", "--bucket", &self.settings.bucket]);
        cmd.args(["--key", &object]);

        let output = Self::exec(cmd, "aws", "aws s3api head-object").await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_not_found(&stderr) {
                return Ok(None);
            }
            return Err(BuildCacheError::Lookup(stderr.trim().to_string()));
        }

        let head: HeadObjectResponse = serde_json::from_slice(&output.stdout)
            .map_err(|e| BuildCacheError::Lookup(format!("parsing head-object response: {}", e)))?;

        Ok(Some(ArtifactEntry {
            key: key.to_string(),
            created_at: parse_timestamp(head.last_modified.as_deref()),
            size_bytes: head.content_length,
        }))
    }

    async fn find_latest_by_prefix(
        &self,
        prefix: &str,
    ) -> BuildCacheResult<Option<ArtifactEntry>> {
        let mut cmd = self.aws();
        cmd.args(["s3api", "list-objects-v2", "--bucket", &self.settings.bucket]);
        cmd.args(["--prefix", prefix]);

        let output = Self::exec(cmd, "aws", "aws s3api list-objects-v2").await?;
        if !output.status.success() {
            return Err(BuildCacheError::Lookup(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let listing = parse_listing(&output.stdout)?;
        Ok(newest(entries_with_prefix(listing, prefix)))
    }

    async fn restore(&self, entry: &ArtifactEntry, paths: &[String]) -> BuildCacheResult<()> {
        let archive = scratch_path("restore.tar");
        let result = self.restore_archive(entry, &archive, paths).await;
        let _ = tokio::fs::remove_file(&archive).await;
        result
    }

    async fn persist(&self, paths: &[String], key: &str) -> BuildCacheResult<SaveReceipt> {
        if self.find_exact(key).await?.is_some() {
            debug!("Object for {} already exists, declining write", key);
            return Ok(SaveReceipt::Declined);
        }

        let mut present = Vec::new();
        for raw in paths {
            let resolved = resolve_path(raw);
            if exists(&resolved).await {
                present.push(resolved.to_string_lossy().into_owned());
            } else {
                warn!("Path does not exist, not caching: {}", raw);
            }
        }
        if present.is_empty() {
            return Err(BuildCacheError::NoPathsToCache);
        }

        let archive = scratch_path("save.tar");
        let result = match Self::archive_paths(&archive, paths, &present).await {
            Ok(()) => self.upload(&archive, key).await,
            Err(e) => Err(e),
        };
        let _ = tokio::fs::remove_file(&archive).await;
        result?;

        Ok(SaveReceipt::Stored(ArtifactId(self.object_url(key))))
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}

fn scratch_path(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("buildcache-{}-{}", Uuid::new_v4(), label))
}

fn parse_saved_paths(key: &str, stdout: &[u8]) -> BuildCacheResult<SavedPaths> {
    serde_json::from_slice(stdout).map_err(|e| BuildCacheError::ArtifactCorrupt {
        key: key.to_string(),
        reason: format!("unreadable saved path list: {}", e),
    })
}

fn is_not_found(stderr: &str) -> bool {
    stderr.contains("(404)") || stderr.contains("Not Found") || stderr.contains("NoSuchKey")
}

fn parse_listing(stdout: &[u8]) -> BuildCacheResult<ListObjectsResponse> {
    // An empty bucket listing prints nothing at all
    if stdout.iter().all(u8::is_ascii_whitespace) {
        return Ok(ListObjectsResponse::default());
    }
    serde_json::from_slice(stdout)
        .map_err(|e| BuildCacheError::Lookup(format!("parsing list-objects-v2 response: {}", e)))
}

fn entries_with_prefix(listing: ListObjectsResponse, prefix: &str) -> Vec<ArtifactEntry> {
    listing
        .contents
        .into_iter()
        .filter_map(|object| {
            let key = object.key.strip_suffix(ARCHIVE_SUFFIX)?;
            if !key.starts_with(prefix) {
                return None;
            }
            Some(ArtifactEntry {
                key: key.to_string(),
                created_at: parse_timestamp(object.last_modified.as_deref()),
                size_bytes: object.size,
            })
        })
        .collect()
}

/// Parse an S3 timestamp; unknown formats sort as oldest
fn parse_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|s| {
        DateTime::parse_from_rfc3339(s)
            .or_else(|_| DateTime::parse_from_rfc2822(s))
            .ok()
    })
    .map(|dt| dt.with_timezone(&Utc))
    .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
