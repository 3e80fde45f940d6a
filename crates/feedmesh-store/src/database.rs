//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] and guarantees that
//! migrations are run before any other operation.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, StoreError};
use crate::migrations::{self, Schema};

/// Wrapper around a [`rusqlite::Connection`].
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) a database holding `schema` at an explicit path.
    pub fn open_at(path: &Path, schema: Schema) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), ?schema, "opening database");

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        Self::init(conn, schema)
    }

    /// Open a private in-memory database (tests, ephemeral deployments).
    pub fn open_in_memory(schema: Schema) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, schema)
    }

    fn init(conn: Connection, schema: Schema) -> Result<Self> {
        migrations::run_migrations(&conn, schema)?;
        Ok(Self { conn })
    }

    /// Return a reference to the underlying `rusqlite::Connection`.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn
            .path()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }

    /// Bind this database to partition `index` of a `count`-way layout.
    ///
    /// The first call records the layout; later opens must present the same
    /// partition count, otherwise conversations already stored would be
    /// routed somewhere else.
    pub fn claim_partition(&self, index: usize, count: usize) -> Result<()> {
        let recorded: Option<(i64, i64)> = self
            .conn
            .query_row(
                "SELECT partition_index, partition_count FROM partition_meta WHERE id = 0",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match recorded {
            None => {
                self.conn.execute(
                    "INSERT INTO partition_meta (id, partition_index, partition_count)
                     VALUES (0, ?1, ?2)",
                    params![index as i64, count as i64],
                )?;
                tracing::info!(index, count, "partition layout recorded");
                Ok(())
            }
            Some((found_index, found_count))
                if found_index as usize == index && found_count as usize == count =>
            {
                Ok(())
            }
            Some((found_index, found_count)) => Err(StoreError::PartitionMismatch {
                index,
                count,
                found_index: found_index as usize,
                found_count: found_count as usize,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("test.db");

        let db = Database::open_at(&path, Schema::Partition).expect("should open");
        assert!(db.path().is_some());
    }

    #[test]
    fn in_memory_has_no_path() {
        let db = Database::open_in_memory(Schema::Authoring).unwrap();
        assert!(db.path().is_none());
    }

    #[test]
    fn partition_claim_is_sticky() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages-1.db");

        {
            let db = Database::open_at(&path, Schema::Partition).unwrap();
            db.claim_partition(1, 4).unwrap();
            db.claim_partition(1, 4).unwrap();
        }

        let reopened = Database::open_at(&path, Schema::Partition).unwrap();
        assert!(matches!(
            reopened.claim_partition(1, 8),
            Err(StoreError::PartitionMismatch {
                count: 8,
                found_count: 4,
                ..
            })
        ));
    }

    #[test]
    fn partition_claim_reports_both_indexes() {
        let db = Database::open_in_memory(Schema::Partition).unwrap();
        db.claim_partition(2, 4).unwrap();

        let err = db.claim_partition(3, 4).unwrap_err();
        assert!(matches!(
            err,
            StoreError::PartitionMismatch {
                index: 3,
                count: 4,
                found_index: 2,
                found_count: 4,
            }
        ));
        assert_eq!(
            err.to_string(),
            "Partition file 2 of 4 opened as partition 3 of 4"
        );
    }
}
