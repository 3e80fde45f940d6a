//! The partitioned message store.
//!
//! One [`Database`] per partition, each behind its own lock so that a slow
//! partition never blocks the others. Placement is a pure function of the
//! pair shard key and is recorded in every partition file at creation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use feedmesh_shared::shard::{ShardKey, ShardRouter};
use feedmesh_shared::types::{Message, UserId};
use tracing::{debug, info};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::migrations::Schema;
use crate::models::MessageId;

pub struct PartitionedStore {
    router: ShardRouter,
    partitions: Vec<Mutex<Database>>,
}

impl PartitionedStore {
    /// Open (or create) `messages-<n>.db` for every partition under `dir`.
    ///
    /// Fails if any existing file was created for a different partition
    /// count.
    pub fn open(dir: &Path, router: ShardRouter) -> Result<Self> {
        std::fs::create_dir_all(dir)?;

        let count = router.shard_count();
        let mut partitions = Vec::with_capacity(count);
        for index in 0..count {
            let db = Database::open_at(&dir.join(format!("messages-{index}.db")), Schema::Partition)?;
            db.claim_partition(index, count)?;
            partitions.push(Mutex::new(db));
        }

        info!(dir = %dir.display(), partitions = count, "partitioned store ready");
        Ok(Self { router, partitions })
    }

    /// Purely in-memory partitions.
    pub fn in_memory(router: ShardRouter) -> Result<Self> {
        let count = router.shard_count();
        let mut partitions = Vec::with_capacity(count);
        for index in 0..count {
            let db = Database::open_in_memory(Schema::Partition)?;
            db.claim_partition(index, count)?;
            partitions.push(Mutex::new(db));
        }
        Ok(Self { router, partitions })
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Partition holding the conversation between `a` and `b`.
    pub fn partition_of(&self, a: &UserId, b: &UserId) -> usize {
        self.router.shard_of_pair(a, b)
    }

    pub fn write_message(&self, message: &Message) -> Result<MessageId> {
        let expected = ShardKey::for_pair(&message.from_user_id, &message.to_user_id);
        if expected.0 != message.shard_key {
            return Err(StoreError::ShardKeyMismatch {
                expected: expected.0,
                found: message.shard_key,
            });
        }

        let partition = self.router.shard_of_key(expected);
        let seq = self.lock(partition)?.insert_message(message)?;

        debug!(
            partition,
            seq,
            from = %message.from_user_id,
            to = %message.to_user_id,
            "message stored"
        );
        Ok(MessageId { partition, seq })
    }

    /// The conversation between `a` and `b`, oldest first. Symmetric in its
    /// arguments.
    pub fn read_conversation(&self, a: &UserId, b: &UserId) -> Result<Vec<Message>> {
        let key = ShardKey::for_pair(a, b);
        let partition = self.router.shard_of_key(key);
        self.lock(partition)?.get_conversation(key.0, a, b)
    }

    fn lock(&self, partition: usize) -> Result<MutexGuard<'_, Database>> {
        self.partitions[partition]
            .lock()
            .map_err(|_| StoreError::Poisoned(partition))
    }
}
