//! One delivery worker per shard queue.
//!
//! A worker only ever reads its own shard's queue, so a stuck shard cannot
//! stall the others. Messages are auto-acknowledged: once dequeued a task
//! is gone, whether or not it reached any connection.

use std::sync::Arc;

use feedmesh_shared::constants::delivery_queue_name;
use feedmesh_shared::protocol::DeliveryTask;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broker::{Broker, QueueReceiver};
use crate::error::QueueError;
use crate::registry::{BroadcastOutcome, ConnectionRegistry};

pub struct ShardConsumerPool {
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl ShardConsumerPool {
    /// Declare every shard queue and attach one worker to each.
    pub async fn start(
        broker: Arc<dyn Broker>,
        registry: ConnectionRegistry,
        shard_count: usize,
    ) -> Result<Self, QueueError> {
        let (shutdown, signal) = watch::channel(false);
        let mut workers = Vec::with_capacity(shard_count);

        for shard in 0..shard_count {
            let queue = delivery_queue_name(shard);
            broker.declare(&queue).await?;
            let receiver = broker.consume(&queue).await?;
            workers.push(tokio::spawn(run_worker(
                shard,
                receiver,
                registry.clone(),
                signal.clone(),
            )));
        }

        info!(workers = workers.len(), "Shard consumer pool started");
        Ok(Self { shutdown, workers })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Stop dequeuing, let every worker finish its in-flight task, and wait
    /// for all of them.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for worker in self.workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Shard consumer exited abnormally");
            }
        }
        info!("Shard consumer pool stopped");
    }
}

async fn run_worker(
    shard: usize,
    mut queue: QueueReceiver,
    registry: ConnectionRegistry,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(shard, "Shard consumer running");

    loop {
        let body = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            body = queue.recv() => match body {
                Some(body) => body,
                None => {
                    warn!(shard, "Delivery queue closed");
                    break;
                }
            },
        };

        handle_delivery(shard, &body, &registry).await;
    }

    debug!(shard, "Shard consumer stopped");
}

/// Decode one queue message and hand it to the registry. A malformed task
/// is discarded; it never takes the worker down.
pub async fn handle_delivery(
    shard: usize,
    body: &[u8],
    registry: &ConnectionRegistry,
) -> Option<BroadcastOutcome> {
    let task = match DeliveryTask::from_bytes(body) {
        Ok(task) => task,
        Err(e) => {
            warn!(shard, error = %e, bytes = body.len(), "Discarding malformed delivery task");
            return None;
        }
    };

    let outcome = registry.broadcast(&task.target_user_ids, &task.payload).await;
    debug!(
        shard,
        post = %task.payload.post_id,
        targets = task.target_user_ids.len(),
        delivered = outcome.delivered,
        dropped = outcome.dropped,
        "Delivery task consumed"
    );
    Some(outcome)
}
