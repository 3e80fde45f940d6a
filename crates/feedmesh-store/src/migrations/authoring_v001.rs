//! Authoring v001 -- `posts` and `friends`.

use rusqlite::Connection;

/// SQL executed when upgrading an authoring database from version 0 to 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Posts
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS posts (
    seq            INTEGER PRIMARY KEY AUTOINCREMENT,
    id             TEXT NOT NULL UNIQUE,       -- UUID v4
    author_user_id TEXT NOT NULL,
    text           TEXT NOT NULL,
    created_at     INTEGER NOT NULL            -- microseconds since epoch
);

CREATE INDEX IF NOT EXISTS idx_posts_author_ts
    ON posts(author_user_id, created_at DESC);

-- ----------------------------------------------------------------
-- Friends: `user_id` follows `friend_id`
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS friends (
    user_id   TEXT NOT NULL,
    friend_id TEXT NOT NULL,

    PRIMARY KEY (user_id, friend_id)
);

CREATE INDEX IF NOT EXISTS idx_friends_friend_id ON friends(friend_id);
"#;

/// Apply the initial authoring migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
