//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use feedmesh_shared::constants::{
    DEFAULT_CACHE_LIMIT, DEFAULT_CACHE_TTL_SECS, DEFAULT_FANOUT_BATCH_SIZE, DEFAULT_HTTP_PORT,
    DEFAULT_SHARD_COUNT,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP + WebSocket server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Directory holding the authoring database and message partitions.
    /// Env: `DATA_DIR`
    /// Default: `./data`
    pub data_dir: PathBuf,

    /// Number of shards, shared by the delivery queues and the message
    /// partitions. Must never change once data exists.
    /// Env: `SHARD_COUNT`
    pub shard_count: usize,

    /// Friend ids per fan-out batch.
    /// Env: `FANOUT_BATCH_SIZE`
    pub fanout_batch_size: usize,

    /// Entries kept per cached list.
    /// Env: `FEED_CACHE_LIMIT`
    pub cache_limit: usize,

    /// Env: `CACHE_TTL_SECS`
    pub cache_ttl: Duration,

    /// Depth of each shard delivery queue.
    /// Env: `QUEUE_CAPACITY`
    pub queue_capacity: usize,

    /// Env: `PUBLISH_TIMEOUT_MS`
    pub publish_timeout: Duration,

    /// Bound on a single store call made on behalf of a request or worker.
    /// Env: `STORE_TIMEOUT_MS`
    pub store_timeout: Duration,

    /// Outbound frames buffered per live connection before frames for that
    /// connection are dropped.
    /// Env: `CONNECTION_BUFFER`
    pub connection_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            data_dir: PathBuf::from("./data"),
            shard_count: DEFAULT_SHARD_COUNT,
            fanout_batch_size: DEFAULT_FANOUT_BATCH_SIZE,
            cache_limit: DEFAULT_CACHE_LIMIT,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            queue_capacity: 1024,
            publish_timeout: Duration::from_millis(500),
            store_timeout: Duration::from_millis(2000),
            connection_buffer: 64,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            parse_into(&mut config.http_addr, "HTTP_ADDR", &addr);
        }

        if let Some(dir) = lookup("DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        if let Some(val) = lookup("SHARD_COUNT") {
            parse_positive(&mut config.shard_count, "SHARD_COUNT", &val);
        }
        if let Some(val) = lookup("FANOUT_BATCH_SIZE") {
            parse_positive(&mut config.fanout_batch_size, "FANOUT_BATCH_SIZE", &val);
        }
        if let Some(val) = lookup("FEED_CACHE_LIMIT") {
            parse_positive(&mut config.cache_limit, "FEED_CACHE_LIMIT", &val);
        }
        if let Some(val) = lookup("QUEUE_CAPACITY") {
            parse_positive(&mut config.queue_capacity, "QUEUE_CAPACITY", &val);
        }
        if let Some(val) = lookup("CONNECTION_BUFFER") {
            parse_positive(&mut config.connection_buffer, "CONNECTION_BUFFER", &val);
        }

        if let Some(val) = lookup("CACHE_TTL_SECS") {
            let mut secs = config.cache_ttl.as_secs();
            parse_positive(&mut secs, "CACHE_TTL_SECS", &val);
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(val) = lookup("PUBLISH_TIMEOUT_MS") {
            let mut ms = config.publish_timeout.as_millis() as u64;
            parse_positive(&mut ms, "PUBLISH_TIMEOUT_MS", &val);
            config.publish_timeout = Duration::from_millis(ms);
        }
        if let Some(val) = lookup("STORE_TIMEOUT_MS") {
            let mut ms = config.store_timeout.as_millis() as u64;
            parse_positive(&mut ms, "STORE_TIMEOUT_MS", &val);
            config.store_timeout = Duration::from_millis(ms);
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

fn parse_into<T: FromStr>(slot: &mut T, name: &str, raw: &str) {
    match raw.trim().parse::<T>() {
        Ok(parsed) => *slot = parsed,
        Err(_) => tracing::warn!(value = %raw, var = name, "Invalid value, using default"),
    }
}

fn parse_positive<T>(slot: &mut T, name: &str, raw: &str)
where
    T: FromStr + PartialOrd + Default + Copy,
{
    match raw.trim().parse::<T>() {
        Ok(parsed) if parsed > T::default() => *slot = parsed,
        _ => tracing::warn!(value = %raw, var = name, "Expected a positive integer, using default"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> ServerConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.shard_count, 8);
        assert_eq!(config.fanout_batch_size, 100);
        assert_eq!(config.cache_limit, 1000);
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
    }

    #[test]
    fn test_env_overrides() {
        let config = from_pairs(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("SHARD_COUNT", "2"),
            ("CACHE_TTL_SECS", "10"),
            ("STORE_TIMEOUT_MS", "250"),
            ("DATA_DIR", "/var/lib/feedmesh"),
        ]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.shard_count, 2);
        assert_eq!(config.cache_ttl, Duration::from_secs(10));
        assert_eq!(config.store_timeout, Duration::from_millis(250));
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/feedmesh"));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_pairs(&[
            ("HTTP_ADDR", "not-an-addr"),
            ("SHARD_COUNT", "0"),
            ("FANOUT_BATCH_SIZE", "-3"),
            ("FEED_CACHE_LIMIT", "lots"),
        ]);
        let default = ServerConfig::default();
        assert_eq!(config.http_addr, default.http_addr);
        assert_eq!(config.shard_count, default.shard_count);
        assert_eq!(config.fanout_batch_size, default.fanout_batch_size);
        assert_eq!(config.cache_limit, default.cache_limit);
    }
}
