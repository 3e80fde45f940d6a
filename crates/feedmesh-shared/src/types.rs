use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProtocolError;
use crate::shard::ShardKey;

/// Opaque user identity (UUID-shaped in practice).
///
/// Nothing is assumed about the contents beyond equality, ordering and
/// hashing; the shard router hashes the raw bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Result<Self, ProtocolError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() || trimmed.len() != id.len() {
            return Err(ProtocolError::InvalidUserId(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl FromStr for UserId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for UserId {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A published post. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    pub id: Uuid,
    pub author_user_id: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A direct message between two users.
///
/// `shard_key` is derived from the unordered pair and is never supplied by
/// the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    #[serde(rename = "from")]
    pub from_user_id: UserId,
    #[serde(rename = "to")]
    pub to_user_id: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub shard_key: u64,
}

impl Message {
    pub fn new(from: UserId, to: UserId, text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        let shard_key = ShardKey::for_pair(&from, &to).0;
        Self {
            from_user_id: from,
            to_user_id: to,
            text: text.into(),
            created_at,
            shard_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_rejects_blank() {
        assert!(UserId::new("").is_err());
        assert!(UserId::new("   ").is_err());
        assert!(UserId::new(" padded").is_err());
        assert!(UserId::new("7f1c2a9e-0b51-4c1e-9a53-2f0c5d9b8e41").is_ok());
    }

    #[test]
    fn test_user_id_serializes_as_plain_string() {
        let id: UserId = "u-1".parse().unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"u-1\"");
    }

    #[test]
    fn test_message_key_is_symmetric() {
        let a = UserId::new("a").unwrap();
        let b = UserId::new("b").unwrap();
        let now = Utc::now();
        let ab = Message::new(a.clone(), b.clone(), "hi", now);
        let ba = Message::new(b, a, "hi", now);
        assert_eq!(ab.shard_key, ba.shard_key);
    }
}
