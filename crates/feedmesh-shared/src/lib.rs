//! # feedmesh-shared
//!
//! Types shared by the store and the server: user identities, the payloads
//! that travel over the per-shard delivery queues, and the shard router that
//! decides which partition a user or a conversation belongs to.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod shard;
pub mod types;

pub use error::ProtocolError;
pub use protocol::{DeliveryTask, PostAnnouncement};
pub use shard::{ShardKey, ShardRouter};
pub use types::UserId;
