//! Read-through list cache in front of the durable store.
//!
//! The cache is allowed to be stale for at most one TTL and never holds more
//! than `limit` entries per key. Concurrent misses may populate the same key
//! twice; that is tolerated rather than prevented.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::CacheError;

/// Which end of a cached list holds the newest entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewestAt {
    /// Newest-first lists, e.g. feeds.
    Front,
    /// Oldest-first lists, e.g. conversations.
    Back,
}

/// List primitives of the external key-value cache store.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// The whole list, or `None` if the key is absent or expired.
    async fn range(&self, key: &str) -> Result<Option<Vec<String>>, CacheError>;

    /// Atomically replace the list stored at `key` with the `max_len`
    /// newest of `items`, expiring after `ttl`. The key is never visible
    /// without its deadline.
    async fn replace(
        &self,
        key: &str,
        items: Vec<String>,
        max_len: usize,
        newest: NewestAt,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Atomically add `item` as the newest entry of every key in `keys` that
    /// currently exists, trimming each to `max_len`. Missing keys are left
    /// missing so that the next read repopulates them in full. Returns the
    /// number of keys updated.
    async fn append_existing(
        &self,
        keys: &[String],
        item: String,
        max_len: usize,
        newest: NewestAt,
    ) -> Result<usize, CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

// ---------------------------------------------------------------------------
// In-process store
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct CachedList {
    items: VecDeque<String>,
    expires_at: Option<Instant>,
}

impl CachedList {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| now < deadline)
    }

    fn trim(&mut self, max_len: usize, newest: NewestAt) {
        while self.items.len() > max_len {
            match newest {
                NewestAt::Front => self.items.pop_back(),
                NewestAt::Back => self.items.pop_front(),
            };
        }
    }
}

/// [`CacheStore`] kept in process memory. Expired keys are invisible at
/// once and reclaimed by [`purge_expired`](Self::purge_expired).
#[derive(Clone, Default)]
pub struct MemoryCacheStore {
    lists: Arc<RwLock<HashMap<String, CachedList>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evict expired keys.
    pub async fn purge_expired(&self) {
        let now = Instant::now();
        let mut lists = self.lists.write().await;
        let before = lists.len();
        lists.retain(|_, list| list.is_live(now));
        let removed = before - lists.len();
        if removed > 0 {
            debug!(removed, "Purged expired cache keys");
        }
    }

    pub async fn key_count(&self) -> usize {
        self.lists.read().await.len()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn range(&self, key: &str) -> Result<Option<Vec<String>>, CacheError> {
        let lists = self.lists.read().await;
        Ok(lists
            .get(key)
            .filter(|list| list.is_live(Instant::now()))
            .map(|list| list.items.iter().cloned().collect()))
    }

    async fn replace(
        &self,
        key: &str,
        items: Vec<String>,
        max_len: usize,
        newest: NewestAt,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut list = CachedList {
            items: items.into(),
            expires_at: Some(Instant::now() + ttl),
        };
        list.trim(max_len, newest);
        self.lists.write().await.insert(key.to_string(), list);
        Ok(())
    }

    async fn append_existing(
        &self,
        keys: &[String],
        item: String,
        max_len: usize,
        newest: NewestAt,
    ) -> Result<usize, CacheError> {
        let now = Instant::now();
        let mut lists = self.lists.write().await;
        let mut updated = 0;

        for key in keys {
            let Some(list) = lists.get_mut(key).filter(|list| list.is_live(now)) else {
                continue;
            };
            match newest {
                NewestAt::Front => list.items.push_front(item.clone()),
                NewestAt::Back => list.items.push_back(item.clone()),
            }
            list.trim(max_len, newest);
            updated += 1;
        }

        Ok(updated)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.lists.write().await.remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Read-through layer
// ---------------------------------------------------------------------------

/// Slice of a list requested by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: usize,
    pub limit: Option<usize>,
}

impl Window {
    pub fn all() -> Self {
        Self {
            offset: 0,
            limit: None,
        }
    }

    pub fn page(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: Some(limit),
        }
    }

    fn apply<T>(self, items: Vec<T>) -> Vec<T> {
        let take = self.limit.unwrap_or(usize::MAX);
        items.into_iter().skip(self.offset).take(take).collect()
    }
}

#[derive(Clone)]
pub struct ReadThroughCache {
    store: Arc<dyn CacheStore>,
    limit: usize,
    ttl: Duration,
}

impl ReadThroughCache {
    pub fn new(store: Arc<dyn CacheStore>, limit: usize, ttl: Duration) -> Self {
        Self {
            store,
            limit: limit.max(1),
            ttl,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Serve `window` of the list at `key`, loading it with `loader` on a
    /// miss. Cache failures fall through to the loader; loader failures are
    /// returned to the caller.
    pub async fn get_or_populate<T, E, F, Fut>(
        &self,
        key: &str,
        newest: NewestAt,
        window: Window,
        loader: F,
    ) -> Result<Vec<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>, E>>,
    {
        match self.store.range(key).await {
            Ok(Some(raw)) => {
                debug!(key, entries = raw.len(), "Cache hit");
                return Ok(window.apply(decode(key, raw)));
            }
            Ok(None) => debug!(key, "Cache miss"),
            Err(e) => warn!(key, error = %e, "Cache read failed, falling through to store"),
        }

        let loaded = keep_newest(loader().await?, self.limit, newest);
        if let Err(e) = self.populate(key, &loaded, newest).await {
            // A half-written key may lack its deadline; drop it.
            warn!(key, error = %e, "Cache population failed, invalidating");
            self.invalidate(key).await;
        }

        Ok(window.apply(loaded))
    }

    /// Add `item` as the newest entry of every existing key in `keys`, in a
    /// single atomic store operation. Best-effort.
    pub async fn append_existing<T: Serialize>(&self, keys: &[String], item: &T, newest: NewestAt) {
        let encoded = match serde_json::to_string(item) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, "Failed to encode cache entry");
                return;
            }
        };

        match self
            .store
            .append_existing(keys, encoded, self.limit, newest)
            .await
        {
            Ok(updated) => debug!(?keys, updated, "Cache append"),
            Err(e) => {
                // The entry may now be missing from a cached list; drop the
                // keys so the next read reloads them.
                warn!(?keys, error = %e, "Cache append failed, invalidating");
                for key in keys {
                    self.invalidate(key).await;
                }
            }
        }
    }

    pub async fn invalidate(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            warn!(key, error = %e, "Cache invalidation failed");
        }
    }

    async fn populate<T: Serialize>(
        &self,
        key: &str,
        items: &[T],
        newest: NewestAt,
    ) -> Result<(), CacheError> {
        let encoded = items
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;

        self.store
            .replace(key, encoded, self.limit, newest, self.ttl)
            .await
    }
}

fn keep_newest<T>(mut items: Vec<T>, limit: usize, newest: NewestAt) -> Vec<T> {
    if items.len() > limit {
        match newest {
            NewestAt::Front => items.truncate(limit),
            NewestAt::Back => {
                items.drain(..items.len() - limit);
            }
        }
    }
    items
}

fn decode<T: DeserializeOwned>(key: &str, raw: Vec<String>) -> Vec<T> {
    raw.into_iter()
        .filter_map(|entry| match serde_json::from_str(&entry) {
            Ok(item) => Some(item),
            Err(e) => {
                debug!(key, error = %e, "Skipping undecodable cache entry");
                None
            }
        })
        .collect()
}
