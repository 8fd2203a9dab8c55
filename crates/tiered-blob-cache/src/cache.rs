//! Cache orchestration across the RAM and durable tiers

use crate::durable::DurableBackend;
use crate::error::{CacheError, DurableError, Result};
use crate::eviction::EvictionPolicy;
use crate::hash::ContentHash;
use crate::hash_store::HashStore;
use crate::path_index::PathIndex;
use crate::types::{CacheConfig, CacheStats};
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Whether `put` waits for its durable writes before returning
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// Return once the payload is resident in RAM; durable writes finish in
    /// the background. Falls back to waiting when RAM refuses the payload.
    #[default]
    Background,
    /// Return only after every scheduled durable write has completed
    WaitForDurable,
}

/// A scheduled durable operation. It runs on its own task; every clone
/// resolves to the same outcome.
type DurableTask = Shared<BoxFuture<'static, Result<()>>>;

/// RAM-tier state; every mutation goes through the one mutex around it
struct CacheState {
    store: HashStore,
    index: PathIndex,
}

struct CacheInner {
    state: Mutex<CacheState>,
    durable: Option<Arc<dyn DurableBackend>>,
    clear_poll_interval: Option<Duration>,
    /// Last durable operation scheduled. Each new one starts after it, so
    /// durable mutations land in the order of their RAM steps.
    durable_tail: std::sync::Mutex<Option<DurableTask>>,
    hits: AtomicU64,
    misses: AtomicU64,
    durable_hits: AtomicU64,
}

/// A content-addressed cache with a bounded RAM tier and an optional
/// durable tier behind it.
///
/// Cloning is cheap and every clone drives the same instance.
#[derive(Clone)]
pub struct Cache {
    inner: Arc<CacheInner>,
}

impl Cache {
    /// Create a cache, optionally backed by a durable tier
    pub fn new(config: CacheConfig, durable: Option<Arc<dyn DurableBackend>>) -> Self {
        let state = CacheState {
            store: HashStore::new(config.per_item_limit, config.total_limit),
            index: PathIndex::new(config.path_limit),
        };
        Self {
            inner: Arc::new(CacheInner {
                state: Mutex::new(state),
                durable,
                clear_poll_interval: config.clear_poll_interval,
                durable_tail: std::sync::Mutex::new(None),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                durable_hits: AtomicU64::new(0),
            }),
        }
    }

    /// Create a RAM-only cache
    pub fn in_memory(config: CacheConfig) -> Self {
        Self::new(config, None)
    }

    /// Create a cache backed by `backend`
    pub fn with_durable(config: CacheConfig, backend: impl DurableBackend + 'static) -> Self {
        Self::new(config, Some(Arc::new(backend)))
    }

    pub fn has_durable(&self) -> bool {
        self.inner.durable.is_some()
    }

    pub(crate) fn clear_poll_interval(&self) -> Option<Duration> {
        self.inner.clear_poll_interval
    }

    /// Store `payload`, point each of `paths` at it and return its hash.
    ///
    /// Without a durable tier a payload that cannot be held in RAM is
    /// refused outright. With one, durable writes are scheduled for the
    /// payload (unless already resident) and for every path whose mapping
    /// changed.
    pub async fn put(&self, payload: &[u8], paths: &[&str], mode: WriteMode) -> Result<ContentHash> {
        let hash = ContentHash::of(payload);
        let size = payload.len() as u64;
        let payload: Arc<[u8]> = Arc::from(payload);
        let has_durable = self.inner.durable.is_some();

        let (admitted, task) = {
            let mut state = self.inner.state.lock().await;

            if !has_durable {
                let limit = state.store.per_item_limit().min(state.store.total_limit());
                if size > limit {
                    debug!(hash = %hash, size, limit, "Refusing oversized payload");
                    return Err(CacheError::OversizedPayload { size, limit });
                }
            }

            let resident = match state.store.peek(&hash) {
                Some(existing) if existing[..] != payload[..] => {
                    error!(hash = %hash, "Resident bytes differ from a payload with the same hash");
                    return Err(CacheError::HashCollision(hash));
                }
                Some(_) => true,
                None => false,
            };

            let mut path_writes = Vec::new();
            for path in paths {
                if state.index.get(path) == Some(&hash) {
                    continue;
                }
                if let Some(evicted) = state.index.insert(path, hash.clone()) {
                    debug!(path = %path, evicted = %evicted, "Path window full");
                }
                if has_durable {
                    path_writes.push(path.to_string());
                }
            }

            let payload_write = has_durable && !resident;
            let admitted = state.store.admit(&hash, &payload, Instant::now());

            let task = match &self.inner.durable {
                Some(durable) if payload_write || !path_writes.is_empty() => {
                    let durable = durable.clone();
                    let hash = hash.clone();
                    let payload = payload_write.then_some(payload);
                    Some(self.schedule_durable(async move {
                        let result = write_durable(durable, &hash, payload, path_writes).await;
                        if let Err(e) = &result {
                            warn!(hash = %hash, error = %e, "Durable write failed");
                        }
                        result
                    }))
                }
                _ => None,
            };
            (admitted, task)
        };

        let Some(task) = task else {
            return Ok(hash);
        };
        if admitted && mode == WriteMode::Background {
            return Ok(hash);
        }
        task.await.map(|()| hash)
    }

    /// Fetch a payload by hash, reading through to the durable tier on a RAM miss
    pub async fn get_by_hash(&self, hash: &ContentHash) -> Result<Vec<u8>> {
        let resident = {
            let mut state = self.inner.state.lock().await;
            state.store.get(hash, Instant::now())
        };

        if let Some(payload) = resident {
            self.inner.hits.fetch_add(1, Ordering::Relaxed);
            debug!(hash = %hash, "Cache hit");
            return Ok(payload.to_vec());
        }

        self.inner.misses.fetch_add(1, Ordering::Relaxed);
        debug!(hash = %hash, "Cache miss");
        self.read_through(hash).await
    }

    /// Fetch a payload by path, resolving the path from the durable tier if
    /// it is not indexed in RAM
    pub async fn get_by_path(&self, path: &str) -> Result<Vec<u8>> {
        let indexed = {
            let state = self.inner.state.lock().await;
            state.index.get(path).cloned()
        };

        let hash = match indexed {
            Some(hash) => hash,
            None => self.resolve_durable_path(path).await?,
        };

        self.get_by_hash(&hash).await
    }

    /// Remove one path mapping from both tiers; the payload stays.
    ///
    /// Returns whether the path was indexed in RAM.
    pub async fn delete_by_path(&self, path: &str) -> Result<bool> {
        let (removed, task) = {
            let mut state = self.inner.state.lock().await;
            let removed = state.index.remove_by_exact_path(path);
            let task = self.inner.durable.clone().map(|durable| {
                let path = path.to_string();
                self.schedule_durable(async move {
                    durable.delete_path(&path).await.map_err(durable_write)
                })
            });
            (removed, task)
        };

        if let Some(task) = task {
            task.await?;
        }
        debug!(path = %path, removed, "Deleted path");
        Ok(removed)
    }

    /// Remove every path mapping starting with `prefix` from both tiers.
    ///
    /// Returns how many paths were removed from RAM.
    pub async fn delete_by_path_start(&self, prefix: &str) -> Result<usize> {
        let (removed, task) = {
            let mut state = self.inner.state.lock().await;
            let removed = state.index.remove_by_prefix(prefix).len();
            let task = self.inner.durable.clone().map(|durable| {
                let prefix = prefix.to_string();
                self.schedule_durable(async move {
                    let durable_removed = durable
                        .delete_paths_with_prefix(&prefix)
                        .await
                        .map_err(durable_write)?;
                    debug!(prefix = %prefix, durable_removed, "Deleted durable paths by prefix");
                    Ok::<_, CacheError>(())
                })
            });
            (removed, task)
        };

        if let Some(task) = task {
            task.await?;
        }
        debug!(prefix = %prefix, removed, "Deleted paths by prefix");
        Ok(removed)
    }

    /// Drop every entry from RAM and wipe the durable namespace
    pub async fn clear(&self) -> Result<()> {
        let task = {
            let mut state = self.inner.state.lock().await;
            state.store.clear();
            state.index.clear();
            self.inner.durable.clone().map(|durable| {
                self.schedule_durable(async move { durable.wipe().await.map_err(durable_write) })
            })
        };

        if let Some(task) = task {
            task.await?;
        }
        info!("Cache cleared");
        Ok(())
    }

    /// Check the durable tier for the clear marker and reset if it is there.
    ///
    /// Returns whether a clear was performed.
    pub async fn apply_clear_signal(&self) -> Result<bool> {
        let Some(durable) = &self.inner.durable else {
            return Ok(false);
        };

        let present = durable.clear_signal_present().await.map_err(|e| {
            warn!(error = %e, "Failed to check durable clear signal");
            CacheError::NotFound(format!("clear signal: {}", e))
        })?;
        if !present {
            return Ok(false);
        }

        info!("Durable clear signal found, clearing cache");
        self.clear().await?;
        Ok(true)
    }

    /// Ask every instance sharing the durable namespace to clear itself
    pub async fn raise_clear_signal(&self) -> Result<()> {
        let Some(durable) = self.inner.durable.clone() else {
            return Ok(());
        };
        self.schedule_durable(async move {
            durable.raise_clear_signal().await.map_err(durable_write)
        })
        .await
    }

    /// Wait for every durable operation scheduled so far
    pub async fn flush(&self) {
        let tail = self.lock_tail().clone();
        // Failures were already reported where they were scheduled
        if let Some(task) = tail {
            let _ = task.await;
        }
    }

    /// Set the total RAM budget, evicting immediately if it shrank
    pub async fn set_total_limit(&self, limit: u64) {
        let mut state = self.inner.state.lock().await;
        state.store.set_total_limit(limit, Instant::now());
        info!(limit, resident_size = state.store.resident_size(), "Total limit changed");
    }

    /// Set the per-item RAM budget; affects future admissions only
    pub async fn set_per_item_limit(&self, limit: u64) {
        self.inner.state.lock().await.store.set_per_item_limit(limit);
    }

    /// Set the path window size, dropping the oldest paths if it shrank
    pub async fn set_path_limit(&self, limit: usize) {
        let evicted = self.inner.state.lock().await.index.set_limit(limit);
        if !evicted.is_empty() {
            info!(limit, evicted = evicted.len(), "Path limit changed");
        }
    }

    /// Replace the eviction scoring function for future eviction passes
    pub async fn set_eviction_policy(&self, policy: impl EvictionPolicy + 'static) {
        self.inner.state.lock().await.store.set_policy(Arc::new(policy));
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.inner.state.lock().await;
        CacheStats {
            entries: state.store.len(),
            resident_size: state.store.resident_size(),
            paths: state.index.len(),
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            durable_hits: self.inner.durable_hits.load(Ordering::Relaxed),
            evictions: state.store.evictions(),
        }
    }

    /// Start `op` once every previously scheduled durable operation is done.
    ///
    /// Callers schedule while holding the state lock, so the durable order
    /// matches the RAM order. The lock is never held across the I/O itself.
    fn schedule_durable<F>(&self, op: F) -> DurableTask
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let mut tail = self.lock_tail();
        let previous = tail.take();
        let task = async move {
            if let Some(previous) = previous {
                // Its outcome belongs to whoever scheduled it
                let _ = previous.await;
            }
            op.await
        }
        .boxed()
        .shared();

        tokio::spawn(task.clone());
        *tail = Some(task.clone());
        task
    }

    fn lock_tail(&self) -> std::sync::MutexGuard<'_, Option<DurableTask>> {
        self.inner
            .durable_tail
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn read_through(&self, hash: &ContentHash) -> Result<Vec<u8>> {
        let Some(durable) = &self.inner.durable else {
            return Err(CacheError::NotFound(hash.to_string()));
        };

        let bytes = durable
            .read_cache(hash)
            .await
            .map_err(|e| collapse_read_error(e, hash.as_str()))?;

        if ContentHash::of(&bytes) != *hash {
            warn!(hash = %hash, "Durable payload does not match its hash");
            return Err(CacheError::NotFound(hash.to_string()));
        }

        self.inner.durable_hits.fetch_add(1, Ordering::Relaxed);
        let payload: Arc<[u8]> = Arc::from(bytes.as_slice());
        let admitted = {
            let mut state = self.inner.state.lock().await;
            state.store.admit(hash, &payload, Instant::now())
        };
        debug!(hash = %hash, admitted, "Read through from durable tier");
        Ok(bytes)
    }

    async fn resolve_durable_path(&self, path: &str) -> Result<ContentHash> {
        let Some(durable) = &self.inner.durable else {
            return Err(CacheError::NotFound(path.to_string()));
        };

        let hash = durable
            .read_path(path)
            .await
            .map_err(|e| collapse_read_error(e, path))?;

        let mut state = self.inner.state.lock().await;
        // A put may have indexed the path while the durable read was in flight
        if let Some(current) = state.index.get(path) {
            return Ok(current.clone());
        }
        state.index.insert(path, hash.clone());
        debug!(path = %path, hash = %hash, "Resolved path from durable tier");
        Ok(hash)
    }
}

async fn write_durable(
    durable: Arc<dyn DurableBackend>,
    hash: &ContentHash,
    payload: Option<Arc<[u8]>>,
    paths: Vec<String>,
) -> Result<()> {
    // Payload first, so a durable path record never names a missing payload
    if let Some(payload) = payload {
        durable
            .write_cache(hash, &payload)
            .await
            .map_err(durable_write)?;
    }

    let results = join_all(paths.iter().map(|path| durable.write_path(path, hash))).await;
    for (path, result) in paths.iter().zip(results) {
        result.map_err(|e| CacheError::DurableWrite(format!("path {}: {}", path, e)))?;
    }
    Ok(())
}

fn durable_write(err: DurableError) -> CacheError {
    CacheError::DurableWrite(err.to_string())
}

fn collapse_read_error(err: DurableError, key: &str) -> CacheError {
    if !matches!(err, DurableError::NotFound(_)) {
        warn!(key = %key, error = %err, "Durable read failed");
    }
    CacheError::NotFound(key.to_string())
}
