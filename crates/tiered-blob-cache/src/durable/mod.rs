//! Durable tier behind the RAM cache
//!
//! A backend stores two kinds of objects, path records (path → hex hash)
//! and payloads (hash → bytes), plus a well-known clear marker that any
//! instance sharing the namespace can raise to reset every other one.

mod fs;
mod memory;

pub use fs::FsBackend;
pub use memory::MemoryBackend;

use crate::error::DurableError;
use crate::hash::ContentHash;
use async_trait::async_trait;

pub type DurableResult<T> = std::result::Result<T, DurableError>;

#[async_trait]
pub trait DurableBackend: Send + Sync {
    /// Read the hash recorded for `path`
    async fn read_path(&self, path: &str) -> DurableResult<ContentHash>;

    /// Read the payload stored under `hash`
    async fn read_cache(&self, hash: &ContentHash) -> DurableResult<Vec<u8>>;

    async fn write_path(&self, path: &str, hash: &ContentHash) -> DurableResult<()>;

    async fn write_cache(&self, hash: &ContentHash, payload: &[u8]) -> DurableResult<()>;

    /// Remove a path record; removing an absent path is not an error
    async fn delete_path(&self, path: &str) -> DurableResult<()>;

    /// Remove every path record starting with `prefix`, returning how many went
    async fn delete_paths_with_prefix(&self, prefix: &str) -> DurableResult<usize>;

    async fn clear_signal_present(&self) -> DurableResult<bool>;

    /// Write the clear marker
    async fn raise_clear_signal(&self) -> DurableResult<()>;

    /// Delete all path records, payloads and the clear marker
    async fn wipe(&self) -> DurableResult<()>;
}
