//! # feedmesh-store
//!
//! Durable storage for the feed and conversation pipeline, backed by SQLite.
//!
//! Two kinds of databases share one schema:
//! - the **authoring** database holds posts and the friendship graph;
//! - the **partitioned** message store holds one database per shard, and
//!   every message lands on the partition chosen by its pair shard key, so
//!   a conversation's full history is always local to one partition.

pub mod database;
pub mod friends;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod partitioned;
pub mod posts;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use migrations::Schema;
pub use models::MessageId;
pub use partitioned::PartitionedStore;
