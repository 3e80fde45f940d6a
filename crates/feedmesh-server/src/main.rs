//! # feedmesh-server
//!
//! Social feed and messaging backend.
//!
//! This binary provides:
//! - **Post fan-out**: new posts are announced to the author's friends via
//!   per-shard delivery queues drained by one worker each
//! - **Push connections** over WebSocket, tracked per user in a registry
//! - **Read-through caching** of friend feeds and conversations
//! - **Sharded message storage**: one SQLite partition per shard, placed by
//!   the unordered pair of participants
//! - **REST API** (axum) for posts, friends, feeds and dialogs

mod api;
mod broker;
mod cache;
mod config;
mod consumer;
mod dialog;
mod error;
mod feed;
mod publisher;
mod push;
mod registry;
mod storage;
#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Duration;

use feedmesh_shared::shard::ShardRouter;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::broker::MemoryBroker;
use crate::cache::{MemoryCacheStore, ReadThroughCache};
use crate::config::ServerConfig;
use crate::consumer::ShardConsumerPool;
use crate::dialog::DialogService;
use crate::feed::FeedService;
use crate::publisher::FanoutPublisher;
use crate::registry::ConnectionRegistry;
use crate::storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,feedmesh_server=debug")),
        )
        .init();

    info!("Starting feedmesh server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    let router = ShardRouter::new(config.shard_count)?;

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // Authoring database plus one message partition per shard. A partition
    // layout that disagrees with SHARD_COUNT refuses to open.
    let storage = Storage::open(&config.data_dir, router, config.store_timeout)?;
    info!(
        data_dir = %config.data_dir.display(),
        partitions = router.shard_count(),
        "Storage opened"
    );

    let broker = Arc::new(MemoryBroker::new(config.queue_capacity, config.publish_timeout));
    let registry = ConnectionRegistry::new();

    // Queues are declared by the pool, so it must be up before the first
    // publish.
    let pool = ShardConsumerPool::start(broker.clone(), registry.clone(), router.shard_count()).await?;

    let cache_store = MemoryCacheStore::new();
    let cache = ReadThroughCache::new(
        Arc::new(cache_store.clone()),
        config.cache_limit,
        config.cache_ttl,
    );

    let publisher = FanoutPublisher::new(
        Arc::new(storage.clone()),
        broker,
        router,
        config.fanout_batch_size,
    );

    let app_state = AppState {
        feed: FeedService::new(storage.clone(), cache.clone(), publisher),
        dialog: DialogService::new(storage, cache),
        registry,
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Periodic cache cleanup (every minute)
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            cache_store.purge_expired().await;
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    let served = tokio::select! {
        result = api::serve(app_state, config.http_addr) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            Ok(())
        }
    };

    // Workers finish the task they are delivering before exiting.
    pool.shutdown().await;
    info!("Shard consumers stopped");

    if let Err(e) = &served {
        tracing::error!(error = %e, "HTTP server failed");
    }
    served
}
