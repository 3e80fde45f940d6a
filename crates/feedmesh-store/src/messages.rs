use rusqlite::params;

use feedmesh_shared::types::{Message, UserId};

use crate::database::Database;
use crate::error::Result;
use crate::models::{from_micros, key_from_sql, key_to_sql, to_micros, user_id};

impl Database {
    /// Append a message to this partition and return its partition-local
    /// sequence number.
    pub fn insert_message(&self, message: &Message) -> Result<i64> {
        self.conn().execute(
            "INSERT INTO messages (from_user_id, to_user_id, text, created_at, shard_key)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                message.from_user_id.as_str(),
                message.to_user_id.as_str(),
                message.text,
                to_micros(&message.created_at),
                key_to_sql(message.shard_key),
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    /// Every message exchanged between `a` and `b`, oldest first. Messages
    /// with identical timestamps keep their insertion order.
    pub fn get_conversation(&self, shard_key: u64, a: &UserId, b: &UserId) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT from_user_id, to_user_id, text, created_at, shard_key
             FROM messages
             WHERE shard_key = ?1
               AND ((from_user_id = ?2 AND to_user_id = ?3)
                 OR (from_user_id = ?3 AND to_user_id = ?2))
             ORDER BY created_at ASC, seq ASC",
        )?;

        let rows = stmt.query_map(
            params![key_to_sql(shard_key), a.as_str(), b.as_str()],
            row_to_message,
        )?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        from_user_id: user_id(0, row.get(0)?)?,
        to_user_id: user_id(1, row.get(1)?)?,
        text: row.get(2)?,
        created_at: from_micros(3, row.get(3)?)?,
        shard_key: key_from_sql(row.get(4)?),
    })
}
