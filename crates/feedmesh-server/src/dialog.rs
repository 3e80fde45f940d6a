//! Private conversations between two users.
//!
//! A conversation is cached once, under the sorted pair
//! (`dialog:<lo>:<hi>`), so both participants always read the same list.
//! A send appends to that list only if it is already cached.

use chrono::Utc;
use feedmesh_shared::constants::DIALOG_CACHE_PREFIX;
use feedmesh_shared::types::{Message, UserId};
use feedmesh_store::MessageId;
use tracing::debug;

use crate::cache::{NewestAt, ReadThroughCache, Window};
use crate::error::ServerError;
use crate::storage::Storage;

/// Cache key of the conversation between `a` and `b`, in either order.
pub fn dialog_key(a: &UserId, b: &UserId) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{DIALOG_CACHE_PREFIX}{lo}:{hi}")
}

#[derive(Clone)]
pub struct DialogService {
    storage: Storage,
    cache: ReadThroughCache,
}

impl DialogService {
    pub fn new(storage: Storage, cache: ReadThroughCache) -> Self {
        Self { storage, cache }
    }

    pub async fn send_message(
        &self,
        from: UserId,
        to: UserId,
        text: String,
    ) -> Result<MessageId, ServerError> {
        if text.trim().is_empty() {
            return Err(ServerError::BadRequest("Message text is empty".into()));
        }

        let message = Message::new(from, to, text, Utc::now());
        let id = self.storage.write_message(message.clone()).await?;
        debug!(id = %id, from = %message.from_user_id, to = %message.to_user_id, "Message stored");

        let keys = [dialog_key(&message.from_user_id, &message.to_user_id)];
        self.cache
            .append_existing(&keys, &message, NewestAt::Back)
            .await;

        Ok(id)
    }

    /// Full history between `me` and `other`, oldest first.
    pub async fn get_dialog(&self, me: &UserId, other: &UserId) -> Result<Vec<Message>, ServerError> {
        let storage = self.storage.clone();
        let (a, b) = (me.clone(), other.clone());

        self.cache
            .get_or_populate(
                &dialog_key(me, other),
                NewestAt::Back,
                Window::all(),
                move || async move { storage.read_conversation(a, b).await },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use feedmesh_shared::shard::ShardRouter;

    use super::*;
    use crate::cache::{CacheStore, MemoryCacheStore};
    use crate::test_support::user;

    fn service() -> (DialogService, MemoryCacheStore) {
        let storage = Storage::in_memory(ShardRouter::new(4).unwrap(), Duration::from_secs(5)).unwrap();
        let store = MemoryCacheStore::new();
        let cache = ReadThroughCache::new(Arc::new(store.clone()), 1000, Duration::from_secs(300));
        (DialogService::new(storage, cache), store)
    }

    fn texts(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.text.as_str()).collect()
    }

    #[tokio::test]
    async fn test_both_participants_see_same_history() {
        let (dialogs, _) = service();
        let (a, b) = (user("alice"), user("bob"));

        dialogs.send_message(a.clone(), b.clone(), "hi".into()).await.unwrap();
        dialogs.send_message(b.clone(), a.clone(), "hey".into()).await.unwrap();

        let from_a = dialogs.get_dialog(&a, &b).await.unwrap();
        let from_b = dialogs.get_dialog(&b, &a).await.unwrap();
        assert_eq!(texts(&from_a), vec!["hi", "hey"]);
        assert_eq!(from_a, from_b);
    }

    #[test]
    fn test_key_is_order_independent() {
        let (a, b) = (user("alice"), user("bob"));
        assert_eq!(dialog_key(&a, &b), "dialog:alice:bob");
        assert_eq!(dialog_key(&b, &a), "dialog:alice:bob");
    }

    #[tokio::test]
    async fn test_send_appends_to_cached_conversation() {
        let (dialogs, store) = service();
        let (a, b) = (user("alice"), user("bob"));

        dialogs.send_message(a.clone(), b.clone(), "one".into()).await.unwrap();
        dialogs.get_dialog(&a, &b).await.unwrap();
        dialogs.get_dialog(&b, &a).await.unwrap();
        assert_eq!(store.key_count().await, 1);

        dialogs.send_message(b.clone(), a.clone(), "two".into()).await.unwrap();

        let cached = store.range(&dialog_key(&a, &b)).await.unwrap().unwrap();
        assert_eq!(cached.len(), 2);
        assert_eq!(texts(&dialogs.get_dialog(&b, &a).await.unwrap()), vec!["one", "two"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_read_and_send_keep_views_identical() {
        let (dialogs, store) = service();
        let (a, b) = (user("alice"), user("bob"));

        for round in 0..50 {
            store.delete(&dialog_key(&a, &b)).await.unwrap();

            let reader = {
                let (dialogs, a, b) = (dialogs.clone(), a.clone(), b.clone());
                tokio::spawn(async move { dialogs.get_dialog(&a, &b).await })
            };
            let sender = {
                let (dialogs, a, b) = (dialogs.clone(), a.clone(), b.clone());
                tokio::spawn(async move { dialogs.send_message(a, b, format!("m{round}")).await })
            };
            reader.await.unwrap().unwrap();
            sender.await.unwrap().unwrap();

            let from_a = dialogs.get_dialog(&a, &b).await.unwrap();
            let from_b = dialogs.get_dialog(&b, &a).await.unwrap();
            assert_eq!(from_a, from_b, "round {round}");
        }
    }

    #[tokio::test]
    async fn test_send_does_not_create_cache_entries() {
        let (dialogs, store) = service();
        dialogs
            .send_message(user("alice"), user("bob"), "hi".into())
            .await
            .unwrap();
        assert_eq!(store.key_count().await, 0);
    }

    #[tokio::test]
    async fn test_conversations_stay_separate() {
        let (dialogs, _) = service();
        dialogs.send_message(user("a"), user("b"), "ab".into()).await.unwrap();
        dialogs.send_message(user("a"), user("c"), "ac".into()).await.unwrap();

        assert_eq!(texts(&dialogs.get_dialog(&user("b"), &user("a")).await.unwrap()), vec!["ab"]);
        assert_eq!(texts(&dialogs.get_dialog(&user("c"), &user("a")).await.unwrap()), vec!["ac"]);
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let (dialogs, _) = service();
        let result = dialogs.send_message(user("a"), user("b"), "".into()).await;
        assert!(matches!(result, Err(ServerError::BadRequest(_))));
    }
}
