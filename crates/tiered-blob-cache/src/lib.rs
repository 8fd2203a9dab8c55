//! Two-tier content-addressed blob cache
//!
//! Payloads are keyed by the SHA-256 of their bytes and held in a
//! size-bounded RAM tier. An optional durable tier (filesystem or object
//! storage) sits behind it: writes are scheduled to it on `put`, and RAM
//! misses read through to it. Human-readable paths map onto content hashes
//! through a bounded, insertion-ordered index.

pub mod cache;
pub mod durable;
pub mod error;
pub mod eviction;
pub mod hash;
pub mod hash_store;
pub mod path_index;
pub mod types;
pub mod watcher;

pub use cache::{Cache, WriteMode};
pub use durable::{DurableBackend, FsBackend, MemoryBackend};
pub use error::{CacheError, DurableError, Result};
pub use eviction::{AgeSizePolicy, EvictionPolicy};
pub use hash::ContentHash;
pub use types::{CacheConfig, CacheStats};
pub use watcher::ClearWatcher;
