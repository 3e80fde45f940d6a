/// Default number of shards (queues and message partitions).
pub const DEFAULT_SHARD_COUNT: usize = 8;

/// Maximum friend ids handled per fan-out batch.
pub const DEFAULT_FANOUT_BATCH_SIZE: usize = 100;

/// Maximum entries kept per cached list (feed or conversation).
pub const DEFAULT_CACHE_LIMIT: usize = 1000;

/// Time-to-live of a cached list, in seconds (5 minutes).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Prefix of the per-shard delivery queue names.
pub const DELIVERY_QUEUE_PREFIX: &str = "shard-delivery-";

/// Cache key prefix for a user's feed.
pub const FEED_CACHE_PREFIX: &str = "friend_posts:";

/// Cache key prefix for a conversation.
pub const DIALOG_CACHE_PREFIX: &str = "dialog:";

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Name of the delivery queue bound to `shard`.
pub fn delivery_queue_name(shard: usize) -> String {
    format!("{DELIVERY_QUEUE_PREFIX}{shard}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_name() {
        assert_eq!(delivery_queue_name(0), "shard-delivery-0");
        assert_eq!(delivery_queue_name(7), "shard-delivery-7");
    }
}
