//! CRUD operations for [`Post`] records.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use feedmesh_shared::types::{Post, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{from_micros, to_micros, user_id};

impl Database {
    /// Insert a new post authored by `author` and return it.
    ///
    /// The insert is committed when this returns; fan-out may start only
    /// afterwards.
    pub fn insert_post(&self, author: &UserId, text: &str) -> Result<Post> {
        self.insert_post_at(author, text, Utc::now())
    }

    pub fn insert_post_at(
        &self,
        author: &UserId,
        text: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Post> {
        let post = Post {
            id: Uuid::new_v4(),
            author_user_id: author.clone(),
            text: text.to_string(),
            created_at,
        };

        self.conn().execute(
            "INSERT INTO posts (id, author_user_id, text, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                post.id.to_string(),
                post.author_user_id.as_str(),
                post.text,
                to_micros(&post.created_at),
            ],
        )?;
        Ok(post)
    }

    pub fn get_post(&self, id: Uuid) -> Result<Post> {
        self.conn()
            .query_row(
                "SELECT id, author_user_id, text, created_at FROM posts WHERE id = ?1",
                params![id.to_string()],
                row_to_post,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// The feed of `user`: posts written by the people `user` follows,
    /// newest first, at most `limit` of them.
    pub fn get_friend_posts(&self, user: &UserId, limit: usize) -> Result<Vec<Post>> {
        let mut stmt = self.conn().prepare(
            "SELECT posts.id, posts.author_user_id, posts.text, posts.created_at
             FROM posts
             JOIN friends ON posts.author_user_id = friends.friend_id
             WHERE friends.user_id = ?1
             ORDER BY posts.created_at DESC, posts.seq DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![user.as_str(), limit as i64], row_to_post)?;

        let mut posts = Vec::new();
        for row in rows {
            posts.push(row?);
        }
        Ok(posts)
    }
}

fn row_to_post(row: &rusqlite::Row<'_>) -> rusqlite::Result<Post> {
    let id_str: String = row.get(0)?;
    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Post {
        id,
        author_user_id: user_id(1, row.get(1)?)?,
        text: row.get(2)?,
        created_at: from_micros(3, row.get(3)?)?,
    })
}
