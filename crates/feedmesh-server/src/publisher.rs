//! Fan-out of new posts onto the per-shard delivery queues.
//!
//! Delivery is best-effort and at-most-once: a broker failure drops the
//! affected tasks for this post and is only logged. The post itself has
//! already been committed and is never rolled back.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use feedmesh_shared::constants::delivery_queue_name;
use feedmesh_shared::protocol::{DeliveryTask, PostAnnouncement};
use feedmesh_shared::shard::ShardRouter;
use feedmesh_shared::types::UserId;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broker::Broker;
use crate::error::ServerError;

/// Resolves the audience of an author's posts.
#[async_trait]
pub trait SocialGraph: Send + Sync {
    async fn friend_ids(&self, author: &UserId) -> Result<Vec<UserId>, ServerError>;
}

/// What happened to one publish call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    pub recipients: usize,
    pub tasks_enqueued: usize,
    pub tasks_dropped: usize,
}

#[derive(Clone)]
pub struct FanoutPublisher {
    graph: Arc<dyn SocialGraph>,
    broker: Arc<dyn Broker>,
    router: ShardRouter,
    batch_size: usize,
}

impl FanoutPublisher {
    pub fn new(
        graph: Arc<dyn SocialGraph>,
        broker: Arc<dyn Broker>,
        router: ShardRouter,
        batch_size: usize,
    ) -> Self {
        Self {
            graph,
            broker,
            router,
            batch_size: batch_size.max(1),
        }
    }

    /// Run [`publish`](Self::publish) detached from the caller.
    pub fn spawn_publish(&self, author: UserId, announcement: PostAnnouncement) -> JoinHandle<()> {
        let publisher = self.clone();
        tokio::spawn(async move {
            publisher.publish(&author, announcement).await;
        })
    }

    pub async fn publish(&self, author: &UserId, announcement: PostAnnouncement) -> PublishReport {
        let friends = match self.graph.friend_ids(author).await {
            Ok(friends) => friends,
            Err(e) => {
                warn!(author = %author, post = %announcement.post_id, error = %e,
                    "Could not resolve audience, dropping fan-out");
                return PublishReport::default();
            }
        };

        let mut report = PublishReport {
            recipients: friends.len(),
            ..Default::default()
        };

        for (shard, task) in plan_tasks(&self.router, self.batch_size, &friends, &announcement) {
            let queue = delivery_queue_name(shard);
            let body = match task.to_bytes() {
                Ok(body) => body,
                Err(e) => {
                    warn!(queue = %queue, error = %e, "Failed to encode delivery task");
                    report.tasks_dropped += 1;
                    continue;
                }
            };

            match self.broker.publish(&queue, body).await {
                Ok(()) => report.tasks_enqueued += 1,
                Err(e) => {
                    warn!(
                        queue = %queue,
                        post = %announcement.post_id,
                        targets = task.target_user_ids.len(),
                        error = %e,
                        "Dropping delivery task"
                    );
                    report.tasks_dropped += 1;
                }
            }
        }

        if report.recipients > 0 {
            info!(
                author = %author,
                post = %announcement.post_id,
                recipients = report.recipients,
                enqueued = report.tasks_enqueued,
                dropped = report.tasks_dropped,
                "Fan-out published"
            );
        } else {
            debug!(author = %author, "No audience, nothing to fan out");
        }

        report
    }
}

/// Split `friends` into batches of at most `batch_size` ids, then group
/// each batch by shard. One task per non-empty (batch, shard) pair.
pub fn plan_tasks(
    router: &ShardRouter,
    batch_size: usize,
    friends: &[UserId],
    announcement: &PostAnnouncement,
) -> Vec<(usize, DeliveryTask)> {
    let mut tasks = Vec::new();

    for batch in friends.chunks(batch_size.max(1)) {
        let mut by_shard: BTreeMap<usize, BTreeSet<UserId>> = BTreeMap::new();
        for friend in batch {
            by_shard
                .entry(router.shard_of_user(friend))
                .or_default()
                .insert(friend.clone());
        }

        tasks.extend(by_shard.into_iter().map(|(shard, targets)| {
            (
                shard,
                DeliveryTask {
                    target_user_ids: targets,
                    payload: announcement.clone(),
                },
            )
        }));
    }

    tasks
}
