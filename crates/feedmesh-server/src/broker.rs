//! Per-shard delivery queues.
//!
//! [`Broker`] is the contract the publisher and the consumers rely on:
//! named queues, bounded publish, exclusive auto-ack consumption.
//! [`MemoryBroker`] implements it in-process on bounded tokio channels.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::error::QueueError;

/// Receiving end of a queue. A message is gone once received.
pub type QueueReceiver = mpsc::Receiver<Vec<u8>>;

#[async_trait]
pub trait Broker: Send + Sync {
    /// Create `queue` if it does not exist yet.
    async fn declare(&self, queue: &str) -> Result<(), QueueError>;

    async fn publish(&self, queue: &str, body: Vec<u8>) -> Result<(), QueueError>;

    /// Attach the single consumer of `queue`.
    async fn consume(&self, queue: &str) -> Result<QueueReceiver, QueueError>;
}

struct Queue {
    tx: mpsc::Sender<Vec<u8>>,
    rx: Option<QueueReceiver>,
}

pub struct MemoryBroker {
    queues: Mutex<HashMap<String, Queue>>,
    capacity: usize,
    publish_timeout: Duration,
}

impl MemoryBroker {
    pub fn new(capacity: usize, publish_timeout: Duration) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            publish_timeout,
        }
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn declare(&self, queue: &str) -> Result<(), QueueError> {
        let mut queues = self.queues.lock().await;
        if !queues.contains_key(queue) {
            let (tx, rx) = mpsc::channel(self.capacity);
            queues.insert(queue.to_string(), Queue { tx, rx: Some(rx) });
            info!(queue, capacity = self.capacity, "Declared queue");
        }
        Ok(())
    }

    async fn publish(&self, queue: &str, body: Vec<u8>) -> Result<(), QueueError> {
        let tx = {
            let queues = self.queues.lock().await;
            queues
                .get(queue)
                .map(|q| q.tx.clone())
                .ok_or_else(|| QueueError::UnknownQueue(queue.to_string()))?
        };

        match tokio::time::timeout(self.publish_timeout, tx.send(body)).await {
            Ok(Ok(())) => {
                debug!(queue, "Published message");
                Ok(())
            }
            Ok(Err(_)) => Err(QueueError::Closed(queue.to_string())),
            Err(_) => Err(QueueError::PublishTimeout(queue.to_string())),
        }
    }

    async fn consume(&self, queue: &str) -> Result<QueueReceiver, QueueError> {
        let mut queues = self.queues.lock().await;
        let entry = queues
            .get_mut(queue)
            .ok_or_else(|| QueueError::UnknownQueue(queue.to_string()))?;
        entry
            .rx
            .take()
            .ok_or_else(|| QueueError::AlreadyConsumed(queue.to_string()))
    }
}
