//! Partition v001 -- `messages` and `partition_meta`.
//!
//! No global primary key: `seq` is local to the partition database, and the
//! pair shard key is stored on every row.

use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    seq          INTEGER PRIMARY KEY AUTOINCREMENT,
    from_user_id TEXT NOT NULL,
    to_user_id   TEXT NOT NULL,
    text         TEXT NOT NULL,
    created_at   INTEGER NOT NULL,             -- microseconds since epoch
    shard_key    INTEGER NOT NULL              -- u64 stored as two's complement
);

CREATE INDEX IF NOT EXISTS idx_messages_shard_ts
    ON messages(shard_key, created_at, seq);

-- Single row recording which partition of which layout this file is.
CREATE TABLE IF NOT EXISTS partition_meta (
    id              INTEGER PRIMARY KEY CHECK (id = 0),
    partition_index INTEGER NOT NULL,
    partition_count INTEGER NOT NULL
);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
