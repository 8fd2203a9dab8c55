//! In-process object-store durable tier

use super::{DurableBackend, DurableResult};
use crate::error::DurableError;
use crate::hash::ContentHash;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

const PATH_PREFIX: &str = "paths/";
const CACHE_PREFIX: &str = "cache/";
const CLEAR_KEY: &str = "clear";

/// A flat key/value namespace with object-storage semantics.
///
/// Path keys are stored verbatim under `paths/`, payloads under `cache/`
/// and the marker under `clear`. Clones share the same namespace, the way
/// several processes share one bucket.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    fail_writes: Arc<AtomicBool>,
    write_delay_ms: Arc<AtomicU64>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write, delete and wipe fail until switched back off
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Delay every write by `delay`, simulating a slow store
    pub fn set_write_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.write_delay_ms.store(millis, Ordering::Relaxed);
    }

    /// Number of objects currently stored, marker included
    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }

    async fn check_writable(&self) -> DurableResult<()> {
        let delay = self.write_delay_ms.load(Ordering::Relaxed);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(DurableError::Unavailable(
                "object store rejected write".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl DurableBackend for MemoryBackend {
    async fn read_path(&self, path: &str) -> DurableResult<ContentHash> {
        let key = format!("{}{}", PATH_PREFIX, path);
        let objects = self.objects.read().await;
        let bytes = objects
            .get(&key)
            .ok_or_else(|| DurableError::NotFound(key.clone()))?;
        let text = std::str::from_utf8(bytes)
            .map_err(|_| DurableError::Corrupt(format!("{} is not utf-8", key)))?;
        ContentHash::parse(text)
            .map_err(|_| DurableError::Corrupt(format!("{} holds no valid hash", key)))
    }

    async fn read_cache(&self, hash: &ContentHash) -> DurableResult<Vec<u8>> {
        let key = format!("{}{}", CACHE_PREFIX, hash);
        self.objects
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or(DurableError::NotFound(key))
    }

    async fn write_path(&self, path: &str, hash: &ContentHash) -> DurableResult<()> {
        self.check_writable().await?;
        let key = format!("{}{}", PATH_PREFIX, path);
        self.objects
            .write()
            .await
            .insert(key, hash.as_str().as_bytes().to_vec());
        Ok(())
    }

    async fn write_cache(&self, hash: &ContentHash, payload: &[u8]) -> DurableResult<()> {
        self.check_writable().await?;
        let key = format!("{}{}", CACHE_PREFIX, hash);
        self.objects.write().await.insert(key, payload.to_vec());
        debug!(hash = %hash, size = payload.len(), "Stored object");
        Ok(())
    }

    async fn delete_path(&self, path: &str) -> DurableResult<()> {
        self.check_writable().await?;
        let key = format!("{}{}", PATH_PREFIX, path);
        self.objects.write().await.remove(&key);
        Ok(())
    }

    async fn delete_paths_with_prefix(&self, prefix: &str) -> DurableResult<usize> {
        self.check_writable().await?;
        let full_prefix = format!("{}{}", PATH_PREFIX, prefix);
        let mut objects = self.objects.write().await;
        let before = objects.len();
        objects.retain(|key, _| !key.starts_with(&full_prefix));
        Ok(before - objects.len())
    }

    async fn clear_signal_present(&self) -> DurableResult<bool> {
        Ok(self.objects.read().await.contains_key(CLEAR_KEY))
    }

    async fn raise_clear_signal(&self) -> DurableResult<()> {
        self.check_writable().await?;
        self.objects
            .write()
            .await
            .insert(CLEAR_KEY.to_string(), Vec::new());
        Ok(())
    }

    async fn wipe(&self) -> DurableResult<()> {
        self.check_writable().await?;
        self.objects.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clones_share_namespace() {
        let first = MemoryBackend::new();
        let second = first.clone();
        let hash = ContentHash::of(b"bucket");

        first.write_cache(&hash, b"bucket").await.unwrap();
        first.write_path("a/b", &hash).await.unwrap();

        assert_eq!(second.read_cache(&hash).await.unwrap(), b"bucket");
        assert_eq!(second.read_path("a/b").await.unwrap(), hash);
    }

    #[test]
    fn test_write_delay_saturates() {
        let backend = MemoryBackend::new();
        backend.set_write_delay(Duration::MAX);
        assert_eq!(backend.write_delay_ms.load(Ordering::Relaxed), u64::MAX);

        backend.set_write_delay(Duration::from_millis(250));
        assert_eq!(backend.write_delay_ms.load(Ordering::Relaxed), 250);
    }

    #[tokio::test]
    async fn test_prefix_delete_only_touches_paths() {
        let backend = MemoryBackend::new();
        let hash = ContentHash::of(b"x");
        backend.write_cache(&hash, b"x").await.unwrap();
        for path in ["img/a", "img/b", "images/c"] {
            backend.write_path(path, &hash).await.unwrap();
        }

        assert_eq!(backend.delete_paths_with_prefix("img/").await.unwrap(), 2);
        assert!(backend.read_path("images/c").await.is_ok());
        assert!(backend.read_cache(&hash).await.is_ok());
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let backend = MemoryBackend::new();
        backend.set_fail_writes(true);
        let hash = ContentHash::of(b"x");

        assert!(matches!(
            backend.write_cache(&hash, b"x").await,
            Err(DurableError::Unavailable(_))
        ));
        assert_eq!(backend.object_count().await, 0);

        backend.set_fail_writes(false);
        backend.write_cache(&hash, b"x").await.unwrap();
        assert_eq!(backend.object_count().await, 1);
    }

    #[tokio::test]
    async fn test_wipe_removes_marker() {
        let backend = MemoryBackend::new();
        backend.raise_clear_signal().await.unwrap();
        assert!(backend.clear_signal_present().await.unwrap());

        backend.wipe().await.unwrap();
        assert!(!backend.clear_signal_present().await.unwrap());
        assert_eq!(backend.object_count().await, 0);
    }
}
