use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Generic I/O error (e.g. creating the data directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// A partition database was created for a different shard layout.
    #[error("Partition file {found_index} of {found_count} opened as partition {index} of {count}")]
    PartitionMismatch {
        index: usize,
        count: usize,
        found_index: usize,
        found_count: usize,
    },

    /// The message's shard key does not match its participants.
    #[error("Shard key {found:#x} does not belong to the pair (expected {expected:#x})")]
    ShardKeyMismatch { expected: u64, found: u64 },

    /// A thread panicked while holding a partition lock.
    #[error("Partition {0} lock poisoned")]
    Poisoned(usize),

    /// A stored value could not be converted back into a domain type.
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
