//! Post authoring and the friends feed.

use feedmesh_shared::constants::FEED_CACHE_PREFIX;
use feedmesh_shared::protocol::PostAnnouncement;
use feedmesh_shared::types::{Post, UserId};
use tracing::{debug, info};

use crate::cache::{NewestAt, ReadThroughCache, Window};
use crate::error::ServerError;
use crate::publisher::FanoutPublisher;
use crate::storage::Storage;

pub fn feed_key(user: &UserId) -> String {
    format!("{FEED_CACHE_PREFIX}{user}")
}

#[derive(Clone)]
pub struct FeedService {
    storage: Storage,
    cache: ReadThroughCache,
    publisher: FanoutPublisher,
}

impl FeedService {
    pub fn new(storage: Storage, cache: ReadThroughCache, publisher: FanoutPublisher) -> Self {
        Self {
            storage,
            cache,
            publisher,
        }
    }

    /// Persist a post, then announce it to the author's friends in the
    /// background. The caller gets the post as soon as it is durable.
    pub async fn create_post(&self, author: UserId, text: String) -> Result<Post, ServerError> {
        if text.trim().is_empty() {
            return Err(ServerError::BadRequest("Post text is empty".into()));
        }

        let post = self.storage.insert_post(author.clone(), text).await?;
        info!(post = %post.id, author = %author, "Post created");

        let announcement = PostAnnouncement {
            post_id: post.id,
            text: post.text.clone(),
            author_id: author.clone(),
        };
        self.publisher.spawn_publish(author, announcement);

        Ok(post)
    }

    /// Newest-first page of posts written by the people `user` follows.
    pub async fn get_feed(
        &self,
        user: &UserId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Post>, ServerError> {
        let limit = limit.min(self.cache.limit());
        let storage = self.storage.clone();
        let owner = user.clone();
        let depth = self.cache.limit();

        self.cache
            .get_or_populate(
                &feed_key(user),
                NewestAt::Front,
                Window::page(offset, limit),
                move || async move { storage.friend_posts(owner, depth).await },
            )
            .await
    }

    /// Start following `friend`. The follower's cached feed is dropped so
    /// the next read includes the new author's posts.
    pub async fn follow(&self, user: &UserId, friend: &UserId) -> Result<(), ServerError> {
        if user == friend {
            return Err(ServerError::BadRequest("Cannot follow yourself".into()));
        }
        self.storage.add_friend(user.clone(), friend.clone()).await?;
        self.cache.invalidate(&feed_key(user)).await;
        Ok(())
    }

    pub async fn unfollow(&self, user: &UserId, friend: &UserId) -> Result<(), ServerError> {
        if self.storage.remove_friend(user.clone(), friend.clone()).await? {
            self.cache.invalidate(&feed_key(user)).await;
        } else {
            debug!(user = %user, friend = %friend, "Unfollow of a non-friend ignored");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use feedmesh_shared::constants::delivery_queue_name;
    use feedmesh_shared::shard::ShardRouter;

    use super::*;
    use crate::broker::{Broker, MemoryBroker};
    use crate::cache::MemoryCacheStore;
    use crate::test_support::user;

    struct Fixture {
        feed: FeedService,
        store: MemoryCacheStore,
        broker: Arc<MemoryBroker>,
        router: ShardRouter,
    }

    async fn fixture() -> Fixture {
        let router = ShardRouter::new(2).unwrap();
        let storage = Storage::in_memory(router, Duration::from_secs(5)).unwrap();
        let broker = Arc::new(MemoryBroker::new(16, Duration::from_millis(100)));
        for shard in 0..router.shard_count() {
            broker.declare(&delivery_queue_name(shard)).await.unwrap();
        }
        let store = MemoryCacheStore::new();
        let cache = ReadThroughCache::new(Arc::new(store.clone()), 1000, Duration::from_secs(300));
        let publisher = FanoutPublisher::new(Arc::new(storage.clone()), broker.clone(), router, 100);
        Fixture {
            feed: FeedService::new(storage, cache, publisher),
            store,
            broker,
            router,
        }
    }

    #[tokio::test]
    async fn test_empty_post_rejected() {
        let fx = fixture().await;
        let result = fx.feed.create_post(user("u1"), "   ".into()).await;
        assert!(matches!(result, Err(ServerError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_feed_shows_followed_authors_newest_first() {
        let fx = fixture().await;
        fx.feed.follow(&user("reader"), &user("u1")).await.unwrap();

        let first = fx.feed.create_post(user("u1"), "first".into()).await.unwrap();
        let second = fx.feed.create_post(user("u1"), "second".into()).await.unwrap();
        fx.feed.create_post(user("stranger"), "unseen".into()).await.unwrap();

        let page = fx.feed.get_feed(&user("reader"), 0, 10).await.unwrap();
        assert_eq!(page.iter().map(|p| p.id).collect::<Vec<_>>(), vec![second.id, first.id]);

        let tail = fx.feed.get_feed(&user("reader"), 1, 10).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].id, first.id);
    }

    #[tokio::test]
    async fn test_follow_invalidates_cached_feed() {
        let fx = fixture().await;
        fx.feed.create_post(user("u1"), "hello".into()).await.unwrap();

        assert!(fx.feed.get_feed(&user("reader"), 0, 10).await.unwrap().is_empty());
        assert_eq!(fx.store.key_count().await, 1);

        fx.feed.follow(&user("reader"), &user("u1")).await.unwrap();
        assert_eq!(fx.store.key_count().await, 0);
        assert_eq!(fx.feed.get_feed(&user("reader"), 0, 10).await.unwrap().len(), 1);

        fx.feed.unfollow(&user("reader"), &user("u1")).await.unwrap();
        assert!(fx.feed.get_feed(&user("reader"), 0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_friendship_changes_are_idempotent() {
        let fx = fixture().await;
        fx.feed.unfollow(&user("reader"), &user("u1")).await.unwrap();

        fx.feed.follow(&user("reader"), &user("u1")).await.unwrap();
        fx.feed.follow(&user("reader"), &user("u1")).await.unwrap();
        fx.feed.create_post(user("u1"), "once".into()).await.unwrap();
        assert_eq!(fx.feed.get_feed(&user("reader"), 0, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_self_follow_rejected() {
        let fx = fixture().await;
        let result = fx.feed.follow(&user("u1"), &user("u1")).await;
        assert!(matches!(result, Err(ServerError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_create_post_enqueues_delivery_for_followers() {
        let fx = fixture().await;
        fx.feed.follow(&user("reader"), &user("u1")).await.unwrap();

        let shard = fx.router.shard_of_user(&user("reader"));
        let mut queue = fx.broker.consume(&delivery_queue_name(shard)).await.unwrap();

        let post = fx.feed.create_post(user("u1"), "hi".into()).await.unwrap();

        let body = tokio::time::timeout(Duration::from_secs(5), queue.recv())
            .await
            .unwrap()
            .unwrap();
        let task = feedmesh_shared::protocol::DeliveryTask::from_bytes(&body).unwrap();
        assert_eq!(task.payload.post_id, post.id);
        assert!(task.target_user_ids.contains(&user("reader")));
    }
}
