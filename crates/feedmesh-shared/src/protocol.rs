use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProtocolError;
use crate::types::UserId;

/// Notification pushed to live connections when a friend publishes a post.
///
/// Field names are part of the push-channel contract with clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostAnnouncement {
    #[serde(rename = "postId")]
    pub post_id: Uuid,
    #[serde(rename = "postText")]
    pub text: String,
    #[serde(rename = "author_user_id")]
    pub author_id: UserId,
}

impl PostAnnouncement {
    /// Frame sent to a push connection.
    pub fn to_frame(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Unit of work carried on a shard's delivery queue.
///
/// Exists only between publish and consume; never persisted by us.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryTask {
    #[serde(rename = "friend_ids")]
    pub target_user_ids: BTreeSet<UserId>,
    #[serde(rename = "post")]
    pub payload: PostAnnouncement,
}

impl DeliveryTask {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn announcement() -> PostAnnouncement {
        PostAnnouncement {
            post_id: Uuid::nil(),
            text: "hello".into(),
            author_id: UserId::new("author").unwrap(),
        }
    }

    #[test]
    fn test_announcement_wire_names() {
        let value: serde_json::Value =
            serde_json::from_str(&announcement().to_frame().unwrap()).unwrap();
        assert_eq!(value["postId"], Uuid::nil().to_string());
        assert_eq!(value["postText"], "hello");
        assert_eq!(value["author_user_id"], "author");
    }

    #[test]
    fn test_task_wire_layout() {
        let body = br#"{
            "friend_ids": ["u2", "u4", "u2"],
            "post": {"postId": "00000000-0000-0000-0000-000000000000",
                     "postText": "hello", "author_user_id": "author"}
        }"#;
        let task = DeliveryTask::from_bytes(body).unwrap();
        assert_eq!(task.target_user_ids.len(), 2);
        assert_eq!(task.payload, announcement());
    }

    #[test]
    fn test_malformed_task_is_an_error() {
        assert!(matches!(
            DeliveryTask::from_bytes(b"{not json"),
            Err(ProtocolError::MalformedTask(_))
        ));
        // Blank ids are not valid identities.
        assert!(DeliveryTask::from_bytes(
            br#"{"friend_ids":[""],"post":{"postId":"00000000-0000-0000-0000-000000000000","postText":"","author_user_id":"a"}}"#
        )
        .is_err());
    }
}
