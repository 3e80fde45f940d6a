//! Directory of live push connections keyed by user.
//!
//! The registry does not own transports: it holds the sending half of each
//! connection's outbound frame channel. The task that accepted the socket
//! owns the receiving half and the socket itself.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use feedmesh_shared::protocol::PostAnnouncement;
use feedmesh_shared::types::UserId;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A serialized frame, shared by every connection it is sent to.
pub type Frame = Arc<str>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Non-owning handle to one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<Frame>,
}

impl ConnectionHandle {
    /// Create a handle and the receiver the connection's writer drains.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let handle = Self {
            id: ConnectionId(Uuid::new_v4()),
            tx,
        };
        (handle, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

/// Result of one broadcast.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Frames accepted by a connection's buffer.
    pub delivered: usize,
    /// Frames dropped because the connection's buffer was full.
    pub dropped: usize,
    /// Dead connections removed from the registry.
    pub pruned: usize,
}

type Connections = HashMap<UserId, HashMap<ConnectionId, ConnectionHandle>>;

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<Connections>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, user: UserId, handle: ConnectionHandle) {
        let mut connections = self.connections.write().await;
        let live = connections.entry(user.clone()).or_default();
        live.insert(handle.id, handle);

        info!(user = %user, connections = live.len(), "Connection registered");
    }

    /// Remove a connection. A user left with no connections is removed
    /// entirely.
    pub async fn unregister(&self, user: &UserId, handle: &ConnectionHandle) {
        let mut connections = self.connections.write().await;
        if remove_connection(&mut connections, user, handle.id) {
            info!(user = %user, connection = %handle.id, "Connection unregistered");
        }
    }

    /// Push `announcement` to every live connection of every target.
    ///
    /// The target handles are snapshotted under the read lock; dispatch
    /// happens after the lock is released and never waits on a connection.
    /// A full buffer drops the frame for that connection only, a closed one
    /// is pruned.
    pub async fn broadcast(
        &self,
        targets: &BTreeSet<UserId>,
        announcement: &PostAnnouncement,
    ) -> BroadcastOutcome {
        let frame: Frame = match announcement.to_frame() {
            Ok(frame) => frame.into(),
            Err(e) => {
                warn!(error = %e, post = %announcement.post_id, "Failed to encode announcement");
                return BroadcastOutcome::default();
            }
        };

        let snapshot: Vec<(UserId, ConnectionHandle)> = {
            let connections = self.connections.read().await;
            targets
                .iter()
                .filter_map(|user| connections.get(user).map(|live| (user, live)))
                .flat_map(|(user, live)| live.values().map(move |h| (user.clone(), h.clone())))
                .collect()
        };

        let mut outcome = BroadcastOutcome::default();
        let mut dead = Vec::new();

        for (user, handle) in snapshot {
            match handle.tx.try_send(frame.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    outcome.dropped += 1;
                    debug!(user = %user, connection = %handle.id, "Dropping frame for slow connection");
                }
                Err(TrySendError::Closed(_)) => dead.push((user, handle.id)),
            }
        }

        if !dead.is_empty() {
            let mut connections = self.connections.write().await;
            for (user, id) in dead {
                if remove_connection(&mut connections, &user, id) {
                    outcome.pruned += 1;
                    debug!(user = %user, connection = %id, "Pruned dead connection");
                }
            }
        }

        outcome
    }

    pub async fn connection_count(&self, user: &UserId) -> usize {
        self.connections
            .read()
            .await
            .get(user)
            .map(|live| live.len())
            .unwrap_or(0)
    }

    pub async fn user_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

fn remove_connection(connections: &mut Connections, user: &UserId, id: ConnectionId) -> bool {
    let Some(live) = connections.get_mut(user) else {
        return false;
    };
    let removed = live.remove(&id).is_some();
    if live.is_empty() {
        connections.remove(user);
    }
    removed
}
