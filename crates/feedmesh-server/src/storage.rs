//! Async access to the SQLite stores.
//!
//! rusqlite is blocking, so every call runs on the blocking pool and is
//! bounded by the configured store timeout; a slow database never hangs a
//! request or a worker indefinitely.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use feedmesh_shared::shard::ShardRouter;
use feedmesh_shared::types::{Message, Post, UserId};
use feedmesh_store::{Database, MessageId, PartitionedStore, Schema, StoreError};

use crate::error::ServerError;
use crate::publisher::SocialGraph;

#[derive(Clone)]
pub struct Storage {
    authoring: Arc<Mutex<Database>>,
    messages: Arc<PartitionedStore>,
    timeout: Duration,
}

impl Storage {
    /// Open `<data_dir>/feedmesh.db` and the message partitions under
    /// `<data_dir>/messages/`.
    pub fn open(data_dir: &Path, router: ShardRouter, timeout: Duration) -> Result<Self, StoreError> {
        let authoring = Database::open_at(&data_dir.join("feedmesh.db"), Schema::Authoring)?;
        let messages = PartitionedStore::open(&data_dir.join("messages"), router)?;
        Ok(Self::from_parts(authoring, messages, timeout))
    }

    pub fn in_memory(router: ShardRouter, timeout: Duration) -> Result<Self, StoreError> {
        let authoring = Database::open_in_memory(Schema::Authoring)?;
        let messages = PartitionedStore::in_memory(router)?;
        Ok(Self::from_parts(authoring, messages, timeout))
    }

    fn from_parts(authoring: Database, messages: PartitionedStore, timeout: Duration) -> Self {
        Self {
            authoring: Arc::new(Mutex::new(authoring)),
            messages: Arc::new(messages),
            timeout,
        }
    }

    pub async fn insert_post(&self, author: UserId, text: String) -> Result<Post, ServerError> {
        self.with_authoring("insert_post", move |db| db.insert_post(&author, &text))
            .await
    }

    pub async fn friend_posts(&self, user: UserId, limit: usize) -> Result<Vec<Post>, ServerError> {
        self.with_authoring("friend_posts", move |db| db.get_friend_posts(&user, limit))
            .await
    }

    pub async fn add_friend(&self, user: UserId, friend: UserId) -> Result<(), ServerError> {
        self.with_authoring("add_friend", move |db| db.add_friend(&user, &friend))
            .await
    }

    pub async fn remove_friend(&self, user: UserId, friend: UserId) -> Result<bool, ServerError> {
        self.with_authoring("remove_friend", move |db| db.remove_friend(&user, &friend))
            .await
    }

    pub async fn write_message(&self, message: Message) -> Result<MessageId, ServerError> {
        let messages = self.messages.clone();
        self.blocking("write_message", move || messages.write_message(&message))
            .await
    }

    pub async fn read_conversation(&self, a: UserId, b: UserId) -> Result<Vec<Message>, ServerError> {
        let messages = self.messages.clone();
        self.blocking("read_conversation", move || messages.read_conversation(&a, &b))
            .await
    }

    async fn with_authoring<T, F>(&self, op: &'static str, f: F) -> Result<T, ServerError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
    {
        let authoring = self.authoring.clone();
        self.blocking(op, move || {
            let db = authoring.lock().map_err(|_| StoreError::Poisoned(0))?;
            f(&db)
        })
        .await
    }

    async fn blocking<T, F>(&self, op: &'static str, f: F) -> Result<T, ServerError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    {
        match tokio::time::timeout(self.timeout, tokio::task::spawn_blocking(f)).await {
            Ok(Ok(result)) => result.map_err(ServerError::from),
            Ok(Err(e)) => Err(ServerError::Internal(format!("{op} panicked: {e}"))),
            Err(_) => {
                tracing::warn!(op, timeout_ms = self.timeout.as_millis() as u64, "Store call timed out");
                Err(ServerError::StoreTimeout(op))
            }
        }
    }
}

#[async_trait]
impl SocialGraph for Storage {
    async fn friend_ids(&self, author: &UserId) -> Result<Vec<UserId>, ServerError> {
        let author = author.clone();
        self.with_authoring("friend_ids", move |db| db.get_friend_ids(&author))
            .await
    }
}
