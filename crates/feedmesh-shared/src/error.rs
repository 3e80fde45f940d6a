use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid user id: {0}")]
    InvalidUserId(String),

    #[error("Malformed delivery task: {0}")]
    MalformedTask(#[from] serde_json::Error),

    #[error("Shard count must be at least 1")]
    ZeroShards,
}
