//! Chunked file-tree copies with content digests
//!
//! Both backends and both directions go through [`copy_tree`], so a tree
//! copied in and copied back out yields the same digest.

use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Running SHA-256 over a walked file tree
pub(crate) struct TreeDigest {
    hasher: Sha256,
    bytes: u64,
}

impl TreeDigest {
    pub(crate) fn new() -> Self {
        Self {
            hasher: Sha256::new(),
            bytes: 0,
        }
    }

    fn record(&mut self, tag: u8, rel: &Path) {
        self.hasher.update([tag]);
        self.hasher.update(normalize(rel).as_bytes());
        self.hasher.update([0]);
    }

    /// Total file bytes seen
    pub(crate) fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Hex digest
    pub(crate) fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

fn normalize(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolve a cache path: `~` expands to home, relative paths stay relative to cwd
pub(crate) fn resolve_path(raw: &str) -> PathBuf {
    if raw == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}

/// Whether anything (file, directory or dangling symlink) exists at `path`
pub(crate) async fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).await.is_ok()
}

/// Copy `src` to `dst` recursively in `chunk_size` pieces, feeding `digest`
///
/// Directory entries are visited in sorted order. Symlinks are recreated,
/// not followed. Existing files at the destination are overwritten.
pub(crate) async fn copy_tree(
    src: &Path,
    dst: &Path,
    chunk_size: u64,
    digest: &mut TreeDigest,
) -> io::Result<()> {
    let chunk = usize::try_from(chunk_size).unwrap_or(usize::MAX).max(1);
    let mut buf = vec![0u8; chunk];
    let mut stack = vec![(src.to_path_buf(), dst.to_path_buf(), PathBuf::new())];

    while let Some((from, to, rel)) = stack.pop() {
        let meta = fs::symlink_metadata(&from).await?;
        let file_type = meta.file_type();

        if file_type.is_dir() {
            digest.record(b'd', &rel);
            fs::create_dir_all(&to).await?;

            let mut names = Vec::new();
            let mut entries = fs::read_dir(&from).await?;
            while let Some(entry) = entries.next_entry().await? {
                names.push(entry.file_name());
            }
            names.sort();

            // Reverse so the stack pops in sorted order
            for name in names.into_iter().rev() {
                stack.push((from.join(&name), to.join(&name), rel.join(&name)));
            }
        } else if file_type.is_symlink() {
            let target = fs::read_link(&from).await?;
            digest.record(b'l', &rel);
            digest.hasher.update(target.to_string_lossy().as_bytes());
            remove_existing(&to).await?;
            make_parent(&to).await?;
            symlink(&target, &to).await?;
        } else {
            digest.record(b'f', &rel);
            make_parent(&to).await?;
            copy_file(&from, &to, &mut buf, digest).await?;
            fs::set_permissions(&to, meta.permissions()).await?;
        }
    }

    Ok(())
}

async fn copy_file(
    from: &Path,
    to: &Path,
    buf: &mut [u8],
    digest: &mut TreeDigest,
) -> io::Result<()> {
    let mut reader = fs::File::open(from).await?;
    let mut writer = fs::File::create(to).await?;

    loop {
        let n = reader.read(buf).await?;
        if n == 0 {
            break;
        }
        digest.hasher.update(&buf[..n]);
        digest.bytes += n as u64;
        writer.write_all(&buf[..n]).await?;
    }

    writer.flush().await?;
    Ok(())
}

async fn make_parent(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

async fn remove_existing(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path).await,
        Ok(_) => fs::remove_file(path).await,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
async fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    fs::symlink(target, link).await
}

#[cfg(not(unix))]
async fn symlink(_target: &Path, link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("cannot recreate symlink {}", link.display()),
    ))
}
