//! Request and response bodies

use serde::{Deserialize, Serialize};
use tiered_blob_cache::{CacheStats, ContentHash};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub durable: bool,
    pub cache: CacheStats,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PutResponse {
    pub hash: ContentHash,
}

#[derive(Debug, Deserialize)]
pub struct PrefixQuery {
    pub prefix: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub removed: usize,
}
