//! Row conversions shared by the CRUD modules.
//!
//! Domain types themselves live in `feedmesh_shared::types`; this module
//! only adds what is specific to storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use feedmesh_shared::types::UserId;

/// Location of a stored message: its partition and the partition-local
/// sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId {
    pub partition: usize,
    pub seq: i64,
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.partition, self.seq)
    }
}

pub(crate) fn to_micros(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

pub(crate) fn from_micros(idx: usize, micros: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        rusqlite::Error::IntegralValueOutOfRange(idx, micros)
    })
}

pub(crate) fn user_id(idx: usize, raw: String) -> rusqlite::Result<UserId> {
    UserId::new(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Shard keys are `u64`; SQLite integers are `i64`. The bit pattern is kept.
pub(crate) fn key_to_sql(key: u64) -> i64 {
    key as i64
}

pub(crate) fn key_from_sql(raw: i64) -> u64 {
    raw as u64
}
