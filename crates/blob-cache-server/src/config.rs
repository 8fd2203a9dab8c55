use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tiered_blob_cache::CacheConfig;

/// Server configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Root of the filesystem durable tier; `None` runs RAM-only
    pub durable_dir: Option<PathBuf>,
    /// Largest request body accepted by `PUT /blobs`
    pub max_body_bytes: usize,
    pub cache: CacheConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3005,
            durable_dir: None,
            max_body_bytes: 64 * 1024 * 1024, // 64MB
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Parse configuration from any key lookup; unparseable values fall
    /// back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();
        let parse_u64 = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        let port = lookup("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);

        let durable_dir = lookup("CACHE_DURABLE_DIR")
            .filter(|d| !d.is_empty())
            .map(PathBuf::from);

        let max_body_bytes = lookup("CACHE_MAX_BODY_BYTES")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_body_bytes);

        let per_item_limit =
            parse_u64("CACHE_MAX_ITEM_BYTES").unwrap_or(defaults.cache.per_item_limit);
        let total_limit =
            parse_u64("CACHE_MAX_TOTAL_BYTES").unwrap_or(defaults.cache.total_limit);
        let path_limit = lookup("CACHE_MAX_PATHS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.cache.path_limit);

        // 0 disables polling
        let clear_poll_interval = match parse_u64("CACHE_CLEAR_POLL_SECS") {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.cache.clear_poll_interval,
        };

        Self {
            port,
            durable_dir,
            max_body_bytes,
            cache: CacheConfig {
                per_item_limit,
                total_limit,
                path_limit,
                clear_poll_interval,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.port, 3005);
        assert!(config.durable_dir.is_none());
        assert_eq!(config.cache.per_item_limit, 8 * 1024 * 1024);
        assert_eq!(
            config.cache.clear_poll_interval,
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "9000"),
            ("CACHE_DURABLE_DIR", "/var/cache/blobs"),
            ("CACHE_MAX_ITEM_BYTES", "1000"),
            ("CACHE_MAX_TOTAL_BYTES", "5000"),
            ("CACHE_MAX_PATHS", "5"),
            ("CACHE_CLEAR_POLL_SECS", "5"),
        ]);
        assert_eq!(config.port, 9000);
        assert_eq!(config.durable_dir, Some(PathBuf::from("/var/cache/blobs")));
        assert_eq!(config.cache.per_item_limit, 1000);
        assert_eq!(config.cache.total_limit, 5000);
        assert_eq!(config.cache.path_limit, 5);
        assert_eq!(
            config.cache.clear_poll_interval,
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_zero_poll_disables_watcher() {
        let config = config_from(&[("CACHE_CLEAR_POLL_SECS", "0")]);
        assert!(config.cache.clear_poll_interval.is_none());
    }

    #[test]
    fn test_garbage_falls_back() {
        let config = config_from(&[("PORT", "not-a-port"), ("CACHE_MAX_PATHS", "-3")]);
        assert_eq!(config.port, 3005);
        assert_eq!(config.cache.path_limit, 100_000);
    }
}
