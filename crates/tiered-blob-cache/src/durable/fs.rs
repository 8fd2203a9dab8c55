//! Filesystem durable tier

use super::{DurableBackend, DurableResult};
use crate::error::DurableError;
use crate::hash::ContentHash;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tracing::{debug, info};

const PATHS_DIR: &str = "paths";
const CACHE_DIR: &str = "cache";
const CLEAR_MARKER: &str = "CLEAR";
/// Every path record file name starts with this, keeping names like `.`
/// and `..` off the filesystem and temp files out of listings.
const PATH_FILE_PREFIX: &str = "p-";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Stores path records and payloads as files under a root directory.
///
/// Layout: `<root>/paths/p-<percent-encoded path>`, `<root>/cache/<hash>`
/// and the marker `<root>/CLEAR`. Several processes may share one root.
#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the directory layout if it is missing
    pub async fn init(&self) -> DurableResult<()> {
        fs::create_dir_all(self.root.join(PATHS_DIR)).await?;
        fs::create_dir_all(self.root.join(CACHE_DIR)).await?;
        info!(root = ?self.root, "Filesystem durable tier initialized");
        Ok(())
    }

    fn path_file(&self, path: &str) -> PathBuf {
        self.root.join(PATHS_DIR).join(escape_path(path))
    }

    fn cache_file(&self, hash: &ContentHash) -> PathBuf {
        self.root.join(CACHE_DIR).join(hash.as_str())
    }

    fn marker_file(&self) -> PathBuf {
        self.root.join(CLEAR_MARKER)
    }

    /// Write through a temp file and rename, so readers in other processes
    /// never observe a partial file.
    async fn write_atomic(&self, target: &Path, data: &[u8]) -> io::Result<()> {
        let dir = target
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "target has no parent"))?;
        // Another instance may have wiped the namespace underneath us
        fs::create_dir_all(dir).await?;

        let tmp = dir.join(format!(
            ".tmp-{}-{}",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp, data).await?;
        if let Err(e) = fs::rename(&tmp, target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }
        Ok(())
    }
}

/// Flatten a path key into a single reversible file name (`/` → `%2F`)
pub(crate) fn escape_path(path: &str) -> String {
    format!("{}{}", PATH_FILE_PREFIX, urlencoding::encode(path))
}

pub(crate) fn unescape_path(file_name: &str) -> Option<String> {
    let encoded = file_name.strip_prefix(PATH_FILE_PREFIX)?;
    urlencoding::decode(encoded).ok().map(|s| s.into_owned())
}

fn not_found(err: io::Error, what: impl Into<String>) -> DurableError {
    if err.kind() == io::ErrorKind::NotFound {
        DurableError::NotFound(what.into())
    } else {
        DurableError::Io(err)
    }
}

fn ignore_missing(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[async_trait]
impl DurableBackend for FsBackend {
    async fn read_path(&self, path: &str) -> DurableResult<ContentHash> {
        let contents = fs::read_to_string(self.path_file(path))
            .await
            .map_err(|e| not_found(e, path))?;
        ContentHash::parse(contents.trim())
            .map_err(|_| DurableError::Corrupt(format!("path record {} holds no valid hash", path)))
    }

    async fn read_cache(&self, hash: &ContentHash) -> DurableResult<Vec<u8>> {
        fs::read(self.cache_file(hash))
            .await
            .map_err(|e| not_found(e, hash.as_str()))
    }

    async fn write_path(&self, path: &str, hash: &ContentHash) -> DurableResult<()> {
        self.write_atomic(&self.path_file(path), hash.as_str().as_bytes())
            .await?;
        debug!(path = %path, hash = %hash, "Wrote durable path record");
        Ok(())
    }

    async fn write_cache(&self, hash: &ContentHash, payload: &[u8]) -> DurableResult<()> {
        self.write_atomic(&self.cache_file(hash), payload).await?;
        debug!(hash = %hash, size = payload.len(), "Wrote durable payload");
        Ok(())
    }

    async fn delete_path(&self, path: &str) -> DurableResult<()> {
        ignore_missing(fs::remove_file(self.path_file(path)).await)?;
        Ok(())
    }

    async fn delete_paths_with_prefix(&self, prefix: &str) -> DurableResult<usize> {
        let mut dir = match fs::read_dir(self.root.join(PATHS_DIR)).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            let Some(path) = name.to_str().and_then(unescape_path) else {
                continue;
            };
            if path.starts_with(prefix) {
                ignore_missing(fs::remove_file(entry.path()).await)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn clear_signal_present(&self) -> DurableResult<bool> {
        Ok(fs::try_exists(self.marker_file()).await?)
    }

    async fn raise_clear_signal(&self) -> DurableResult<()> {
        fs::create_dir_all(&self.root).await?;
        fs::write(self.marker_file(), b"").await?;
        info!(root = ?self.root, "Raised durable clear signal");
        Ok(())
    }

    async fn wipe(&self) -> DurableResult<()> {
        ignore_missing(fs::remove_dir_all(self.root.join(PATHS_DIR)).await)?;
        ignore_missing(fs::remove_dir_all(self.root.join(CACHE_DIR)).await)?;
        ignore_missing(fs::remove_file(self.marker_file()).await)?;
        self.init().await
    }
}
