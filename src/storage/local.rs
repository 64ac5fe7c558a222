//! Directory-based blob store
//!
//! Layout under the store root:
//!
//! ```text
//! entries/<sha256(key)>/manifest.json
//! entries/<sha256(key)>/data/<index>/...
//! entries/.staging-<uuid>/              (in-progress writes)
//! ```
//!
//! An entry becomes visible only when its staging directory is renamed into
//! place, so a lookup never sees a half-written artifact. An entry that
//! already exists is never overwritten.

use crate::error::{BuildCacheError, BuildCacheResult};
use crate::storage::client::StorageClient;
use crate::storage::transfer::{copy_tree, exists, resolve_path, TreeDigest};
use crate::storage::{check_requested_paths, newest, ArtifactEntry, ArtifactId, SaveReceipt};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

const ENTRIES_DIR: &str = "entries";
const MANIFEST_FILE: &str = "manifest.json";
const DATA_DIR: &str = "data";
const STAGING_PREFIX: &str = ".staging-";

/// Manifest written alongside each stored artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    id: Uuid,
    key: String,
    created_at: DateTime<Utc>,
    size_bytes: u64,
    paths: Vec<ManifestPath>,
}

/// One cached path
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestPath {
    /// Path exactly as given in the request
    path: String,
    /// Whether the path existed when the artifact was written
    present: bool,
    /// Digest of the stored tree (present paths only)
    digest: Option<String>,
}

impl Manifest {
    fn entry(&self) -> ArtifactEntry {
        ArtifactEntry {
            key: self.key.clone(),
            created_at: self.created_at,
            size_bytes: Some(self.size_bytes),
        }
    }
}

/// Blob store rooted at a local directory
pub struct LocalStore {
    root: PathBuf,
    chunk_size: u64,
}

impl LocalStore {
    /// Create a store rooted at `root`
    pub fn new(root: PathBuf, chunk_size: u64) -> Self {
        Self { root, chunk_size }
    }

    fn entries_dir(&self) -> PathBuf {
        self.root.join(ENTRIES_DIR)
    }

    fn entry_dir(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.entries_dir().join(hex::encode(digest))
    }

    async fn read_manifest(dir: &Path) -> BuildCacheResult<Option<Manifest>> {
        let path = dir.join(MANIFEST_FILE);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(BuildCacheError::Lookup(format!(
                    "reading {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let manifest = serde_json::from_str(&content).map_err(|e| {
            BuildCacheError::Lookup(format!("parsing {}: {}", path.display(), e))
        })?;
        Ok(Some(manifest))
    }

    async fn manifest_for(&self, key: &str) -> BuildCacheResult<Option<Manifest>> {
        Ok(Self::read_manifest(&self.entry_dir(key))
            .await?
            .filter(|m| m.key == key))
    }

    /// Copy every path into a fresh staging directory and describe it
    async fn stage(&self, staging: &Path, paths: &[String], key: &str) -> BuildCacheResult<Manifest> {
        let mut recorded = Vec::with_capacity(paths.len());
        let mut size_bytes = 0;

        for (index, raw) in paths.iter().enumerate() {
            let source = resolve_path(raw);
            if !exists(&source).await {
                warn!("Path does not exist, not caching: {}", raw);
                recorded.push(ManifestPath {
                    path: raw.clone(),
                    present: false,
                    digest: None,
                });
                continue;
            }

            let target = staging.join(DATA_DIR).join(index.to_string());
            let mut digest = TreeDigest::new();
            copy_tree(&source, &target, self.chunk_size, &mut digest)
                .await
                .map_err(|e| BuildCacheError::Transfer(format!("archiving {}: {}", raw, e)))?;

            debug!("Archived {} ({} bytes)", raw, digest.bytes());
            size_bytes += digest.bytes();
            recorded.push(ManifestPath {
                path: raw.clone(),
                present: true,
                digest: Some(digest.finish()),
            });
        }

        if !recorded.iter().any(|p| p.present) {
            return Err(BuildCacheError::NoPathsToCache);
        }

        Ok(Manifest {
            id: Uuid::new_v4(),
            key: key.to_string(),
            created_at: Utc::now(),
            size_bytes,
            paths: recorded,
        })
    }
}

#[async_trait]
impl StorageClient for LocalStore {
    async fn find_exact(&self, key: &str) -> BuildCacheResult<Option<ArtifactEntry>> {
        Ok(self.manifest_for(key).await?.map(|m| m.entry()))
    }

    async fn find_latest_by_prefix(
        &self,
        prefix: &str,
    ) -> BuildCacheResult<Option<ArtifactEntry>> {
        let entries_dir = self.entries_dir();
        let lookup_err =
            |e: std::io::Error| BuildCacheError::Lookup(format!("scanning {}: {}", entries_dir.display(), e));

        let mut dir = match fs::read_dir(&entries_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(lookup_err(e)),
        };

        let mut matches = Vec::new();
        while let Some(item) = dir.next_entry().await.map_err(lookup_err)? {
            if item.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
                continue;
            }

            match Self::read_manifest(&item.path()).await {
                Ok(Some(manifest)) if manifest.key.starts_with(prefix) => {
                    matches.push(manifest.entry())
                }
                Ok(_) => {}
                Err(e) => debug!("Skipping unreadable entry {}: {}", item.path().display(), e),
            }
        }

        debug!("{} stored key(s) match prefix {}", matches.len(), prefix);
        Ok(newest(matches))
    }

    async fn restore(&self, entry: &ArtifactEntry, paths: &[String]) -> BuildCacheResult<()> {
        let dir = self.entry_dir(&entry.key);
        let manifest = self.manifest_for(&entry.key).await.map_err(|e| {
            BuildCacheError::Transfer(format!("loading artifact {}: {}", entry.key, e))
        })?;
        let manifest = manifest.ok_or_else(|| {
            BuildCacheError::Transfer(format!("artifact {} disappeared before restore", entry.key))
        })?;

        let stored: Vec<&str> = manifest.paths.iter().map(|p| p.path.as_str()).collect();
        check_requested_paths(&entry.key, &stored, paths)?;

        for raw in paths {
            let stored = manifest
                .paths
                .iter()
                .enumerate()
                .find(|(_, p)| &p.path == raw && p.present);

            // Recorded as absent when the artifact was written
            let Some((index, stored)) = stored else {
                debug!("Artifact {} holds nothing for {}", entry.key, raw);
                continue;
            };

            let source = dir.join(DATA_DIR).join(index.to_string());
            let target = resolve_path(raw);
            let mut digest = TreeDigest::new();
            copy_tree(&source, &target, self.chunk_size, &mut digest)
                .await
                .map_err(|e| BuildCacheError::Transfer(format!("restoring {}: {}", raw, e)))?;

            let actual = digest.finish();
            if stored.digest.as_deref() != Some(actual.as_str()) {
                return Err(BuildCacheError::ArtifactCorrupt {
                    key: entry.key.clone(),
                    reason: format!("digest mismatch for {}", raw),
                });
            }
            debug!("Restored {}", raw);
        }

        Ok(())
    }

    async fn persist(&self, paths: &[String], key: &str) -> BuildCacheResult<SaveReceipt> {
        if self.manifest_for(key).await?.is_some() {
            debug!("Key {} already stored, declining write", key);
            return Ok(SaveReceipt::Declined);
        }

        let entries_dir = self.entries_dir();
        fs::create_dir_all(&entries_dir)
            .await
            .map_err(|e| BuildCacheError::DirCreate {
                path: entries_dir.clone(),
                source: e,
            })?;

        let staging = entries_dir.join(format!("{}{}", STAGING_PREFIX, Uuid::new_v4()));
        let manifest = match self.stage(&staging, paths, key).await {
            Ok(manifest) => manifest,
            Err(e) => {
                let _ = fs::remove_dir_all(&staging).await;
                return Err(e);
            }
        };

        let content = serde_json::to_string_pretty(&manifest)?;
        if let Err(e) = fs::write(staging.join(MANIFEST_FILE), content).await {
            let _ = fs::remove_dir_all(&staging).await;
            return Err(BuildCacheError::Transfer(format!("writing manifest: {}", e)));
        }

        let final_dir = self.entry_dir(key);
        if let Err(e) = fs::rename(&staging, &final_dir).await {
            let _ = fs::remove_dir_all(&staging).await;
            if exists(&final_dir).await {
                debug!("Key {} was stored concurrently, declining write", key);
                return Ok(SaveReceipt::Declined);
            }
            return Err(BuildCacheError::Transfer(format!(
                "committing artifact {}: {}",
                key, e
            )));
        }

        Ok(SaveReceipt::Stored(ArtifactId(manifest.id.to_string())))
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        store: LocalStore,
        work: PathBuf,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let store = LocalStore::new(temp.path().join("store"), 4096);
        let work = temp.path().join("work");
        std::fs::create_dir_all(&work).unwrap();
        Fixture {
            _temp: temp,
            store,
            work,
        }
    }

    fn path_str(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn persist_then_find_exact() {
        let f = fixture();
        let deps = f.work.join("deps");
        std::fs::create_dir_all(&deps).unwrap();
        std::fs::write(deps.join("lib.a"), b"archive").unwrap();

        let receipt = f
            .store
            .persist(&[path_str(&deps)], "linux-deps-v1")
            .await
            .unwrap();
        assert!(matches!(receipt, SaveReceipt::Stored(_)));

        let entry = f.store.find_exact("linux-deps-v1").await.unwrap().unwrap();
        assert_eq!(entry.key, "linux-deps-v1");
        assert_eq!(entry.size_bytes, Some(7));
        assert!(f.store.find_exact("linux-deps-v2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn persist_existing_key_is_declined() {
        let f = fixture();
        let file = f.work.join("out.txt");
        std::fs::write(&file, b"one").unwrap();

        let paths = [path_str(&file)];
        f.store.persist(&paths, "k").await.unwrap();
        let second = f.store.persist(&paths, "k").await.unwrap();
        assert_eq!(second, SaveReceipt::Declined);
    }

    #[tokio::test]
    async fn persist_without_existing_paths_fails() {
        let f = fixture();
        let missing = path_str(&f.work.join("nope"));
        let err = f.store.persist(&[missing], "k").await.unwrap_err();
        assert!(matches!(err, BuildCacheError::NoPathsToCache));

        // No half-written entry is left behind
        assert!(f.store.find_exact("k").await.unwrap().is_none());
        let leftovers = std::fs::read_dir(f.store.entries_dir()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn prefix_lookup_returns_newest() {
        let f = fixture();
        let file = f.work.join("f");
        std::fs::write(&file, b"x").unwrap();
        let paths = [path_str(&file)];

        f.store.persist(&paths, "linux-deps-a").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        f.store.persist(&paths, "linux-deps-b").await.unwrap();
        f.store.persist(&paths, "macos-deps-z").await.unwrap();

        let hit = f.store.find_latest_by_prefix("linux-deps-").await.unwrap();
        assert_eq!(hit.unwrap().key, "linux-deps-b");
        assert!(f
            .store
            .find_latest_by_prefix("windows-")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn prefix_lookup_on_empty_store() {
        let f = fixture();
        assert!(f.store.find_latest_by_prefix("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn restore_materializes_requested_paths() {
        let f = fixture();
        let deps = f.work.join("deps");
        std::fs::create_dir_all(deps.join("sub")).unwrap();
        std::fs::write(deps.join("sub/file.txt"), b"cached").unwrap();
        let paths = [path_str(&deps)];

        f.store.persist(&paths, "k").await.unwrap();
        std::fs::remove_dir_all(&deps).unwrap();

        let entry = f.store.find_exact("k").await.unwrap().unwrap();
        f.store.restore(&entry, &paths).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(deps.join("sub/file.txt")).unwrap(),
            "cached"
        );
    }

    #[tokio::test]
    async fn restore_for_other_paths_fails() {
        let f = fixture();
        let saved = f.work.join("a");
        std::fs::create_dir_all(&saved).unwrap();
        std::fs::write(saved.join("obj.o"), b"bits").unwrap();
        f.store.persist(&[path_str(&saved)], "k").await.unwrap();

        let requested = f.work.join("b");
        let entry = f.store.find_exact("k").await.unwrap().unwrap();
        let err = f
            .store
            .restore(&entry, &[path_str(&requested)])
            .await
            .unwrap_err();

        assert!(matches!(err, BuildCacheError::Transfer(msg) if msg.contains("holds no data")));
        assert!(!requested.exists());
    }

    #[tokio::test]
    async fn restore_skips_paths_absent_at_save() {
        let f = fixture();
        let present = f.work.join("present.txt");
        let absent = f.work.join("absent");
        std::fs::write(&present, b"here").unwrap();
        let paths = [path_str(&present), path_str(&absent)];
        f.store.persist(&paths, "k").await.unwrap();
        std::fs::remove_file(&present).unwrap();

        let entry = f.store.find_exact("k").await.unwrap().unwrap();
        f.store.restore(&entry, &paths).await.unwrap();
        assert_eq!(std::fs::read(&present).unwrap(), b"here");
        assert!(!absent.exists());
    }

    #[tokio::test]
    async fn restore_detects_tampering() {
        let f = fixture();
        let file = f.work.join("f.txt");
        std::fs::write(&file, b"original").unwrap();
        let paths = [path_str(&file)];
        f.store.persist(&paths, "k").await.unwrap();

        let stored = f.store.entry_dir("k").join(DATA_DIR).join("0");
        std::fs::write(&stored, b"tampered").unwrap();

        let entry = f.store.find_exact("k").await.unwrap().unwrap();
        let err = f.store.restore(&entry, &paths).await.unwrap_err();
        assert!(matches!(err, BuildCacheError::ArtifactCorrupt { .. }));
    }

    #[tokio::test]
    async fn restore_of_vanished_entry_fails() {
        let f = fixture();
        let entry = ArtifactEntry {
            key: "ghost".to_string(),
            created_at: Utc::now(),
            size_bytes: None,
        };
        let err = f.store.restore(&entry, &["x".to_string()]).await.unwrap_err();
        assert!(matches!(err, BuildCacheError::Transfer(_)));
    }
}
