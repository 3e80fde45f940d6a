//! Database migration runner.
//!
//! There are two schemas: the authoring database (posts and friendships)
//! and the message partitions. Each has its own ordered migration list and
//! tracks its progress in the `user_version` pragma. The `application_id`
//! pragma marks which schema a file holds, so a partition file can never be
//! opened as the authoring database or the other way round.

pub mod authoring_v001;
pub mod partition_v001;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

type Migration = (&'static str, fn(&Connection) -> std::result::Result<(), rusqlite::Error>);

const AUTHORING: &[Migration] = &[("authoring_v001", authoring_v001::up)];

const PARTITION: &[Migration] = &[("partition_v001", partition_v001::up)];

/// Which of the two schemas a database file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    Authoring,
    Partition,
}

impl Schema {
    fn migrations(self) -> &'static [Migration] {
        match self {
            Schema::Authoring => AUTHORING,
            Schema::Partition => PARTITION,
        }
    }

    /// Value stored in the `application_id` pragma ("FMAU" / "FMPT").
    fn application_id(self) -> i32 {
        match self {
            Schema::Authoring => 0x464d_4155,
            Schema::Partition => 0x464d_5054,
        }
    }

    /// Schema version reached once every migration has run.
    pub fn current_version(self) -> u32 {
        self.migrations().len() as u32
    }
}

/// Run all pending migrations of `schema` against the open connection.
pub fn run_migrations(conn: &Connection, schema: Schema) -> Result<()> {
    let app_id: i32 = conn.pragma_query_value(None, "application_id", |row| row.get(0))?;
    if app_id == 0 {
        conn.pragma_update(None, "application_id", schema.application_id())?;
    } else if app_id != schema.application_id() {
        return Err(StoreError::Migration(format!(
            "database holds application id {app_id:#x}, expected {schema:?} ({:#x})",
            schema.application_id()
        )));
    }

    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    tracing::debug!(
        ?schema,
        current_version = current,
        target_version = schema.current_version(),
        "checking database migrations"
    );

    for (version, (name, up)) in (1u32..).zip(schema.migrations()) {
        if current < version {
            tracing::info!(?schema, migration = name, "applying migration");
            up(conn).map_err(|e| StoreError::Migration(format!("{name}: {e}")))?;
            conn.pragma_update(None, "user_version", version)?;
        }
    }

    Ok(())
}
