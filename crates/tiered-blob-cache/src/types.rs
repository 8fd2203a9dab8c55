//! Cache configuration and statistics

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Budgets and polling settings for a cache instance
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Largest payload admitted to RAM, in bytes
    pub per_item_limit: u64,
    /// Ceiling on the summed size of resident payloads, in bytes
    pub total_limit: u64,
    /// Maximum number of path mappings kept in RAM
    pub path_limit: usize,
    /// How often to poll the durable tier for a clear marker; `None` disables polling
    pub clear_poll_interval: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            per_item_limit: 8 * 1024 * 1024,       // 8MB
            total_limit: 256 * 1024 * 1024,        // 256MB
            path_limit: 100_000,
            clear_poll_interval: Some(Duration::from_secs(30)),
        }
    }
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub resident_size: u64,
    pub paths: usize,
    pub hits: u64,
    pub misses: u64,
    pub durable_hits: u64,
    pub evictions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.per_item_limit, 8 * 1024 * 1024);
        assert_eq!(config.total_limit, 256 * 1024 * 1024);
        assert_eq!(config.path_limit, 100_000);
        assert_eq!(config.clear_poll_interval, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_cache_stats_default() {
        let stats = CacheStats::default();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.resident_size, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_cache_stats_serialization() {
        let stats = CacheStats {
            entries: 3,
            resident_size: 12345,
            paths: 7,
            hits: 500,
            misses: 50,
            durable_hits: 5,
            evictions: 2,
        };

        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("12345"));
        assert!(json.contains("\"durable_hits\":5"));

        let back: CacheStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);
    }
}
