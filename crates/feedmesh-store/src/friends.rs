//! The friendship graph: `user_id` follows `friend_id`.

use rusqlite::params;

use feedmesh_shared::types::UserId;

use crate::database::Database;
use crate::error::Result;
use crate::models::user_id;

impl Database {
    /// Make `user` follow `friend`. Adding an existing edge is a no-op.
    pub fn add_friend(&self, user: &UserId, friend: &UserId) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO friends (user_id, friend_id) VALUES (?1, ?2)",
            params![user.as_str(), friend.as_str()],
        )?;
        Ok(())
    }

    /// Returns `true` if an edge was removed.
    pub fn remove_friend(&self, user: &UserId, friend: &UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM friends WHERE user_id = ?1 AND friend_id = ?2",
            params![user.as_str(), friend.as_str()],
        )?;
        Ok(affected > 0)
    }

    /// Everyone who has `author` as a friend, i.e. the audience of the
    /// author's posts.
    pub fn get_friend_ids(&self, author: &UserId) -> Result<Vec<UserId>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id FROM friends WHERE friend_id = ?1 ORDER BY user_id",
        )?;

        let rows = stmt.query_map(params![author.as_str()], |row| user_id(0, row.get(0)?))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::Schema;

    fn user(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    #[test]
    fn audience_of_author() {
        let db = Database::open_in_memory(Schema::Authoring).unwrap();
        let author = user("author");
        db.add_friend(&user("u3"), &author).unwrap();
        db.add_friend(&user("u2"), &author).unwrap();
        db.add_friend(&user("u2"), &author).unwrap();
        db.add_friend(&author, &user("u9")).unwrap();

        assert_eq!(db.get_friend_ids(&author).unwrap(), vec![user("u2"), user("u3")]);
        assert!(db.get_friend_ids(&user("nobody")).unwrap().is_empty());
    }

    #[test]
    fn remove_friend_reports_change() {
        let db = Database::open_in_memory(Schema::Authoring).unwrap();
        db.add_friend(&user("a"), &user("b")).unwrap();

        assert!(db.remove_friend(&user("a"), &user("b")).unwrap());
        assert!(!db.remove_friend(&user("a"), &user("b")).unwrap());
        assert!(db.get_friend_ids(&user("b")).unwrap().is_empty());
    }
}
