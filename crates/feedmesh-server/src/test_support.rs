//! Helpers shared by the unit tests.

use std::collections::HashMap;

use async_trait::async_trait;
use feedmesh_shared::protocol::PostAnnouncement;
use feedmesh_shared::shard::ShardRouter;
use feedmesh_shared::types::UserId;
use uuid::Uuid;

use crate::error::ServerError;
use crate::publisher::SocialGraph;

pub fn user(s: &str) -> UserId {
    UserId::new(s).unwrap()
}

pub fn announcement(author: &str) -> PostAnnouncement {
    PostAnnouncement {
        post_id: Uuid::new_v4(),
        text: format!("post by {author}"),
        author_id: user(author),
    }
}

/// The first `n` ids of the form `user-<i>` that route to `shard`.
pub fn users_on_shard(router: &ShardRouter, shard: usize, n: usize) -> Vec<UserId> {
    (0..)
        .map(|i| user(&format!("user-{i}")))
        .filter(|id| router.shard_of_user(id) == shard)
        .take(n)
        .collect()
}

#[derive(Default)]
pub struct StaticGraph {
    audiences: HashMap<UserId, Vec<UserId>>,
}

impl StaticGraph {
    pub fn with(mut self, author: &str, friends: &[&UserId]) -> Self {
        self.audiences
            .insert(user(author), friends.iter().map(|f| (*f).clone()).collect());
        self
    }
}

#[async_trait]
impl SocialGraph for StaticGraph {
    async fn friend_ids(&self, author: &UserId) -> Result<Vec<UserId>, ServerError> {
        Ok(self.audiences.get(author).cloned().unwrap_or_default())
    }
}

pub struct FailingGraph;

#[async_trait]
impl SocialGraph for FailingGraph {
    async fn friend_ids(&self, _: &UserId) -> Result<Vec<UserId>, ServerError> {
        Err(ServerError::StoreTimeout("friend_ids"))
    }
}
