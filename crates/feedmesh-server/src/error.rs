use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use feedmesh_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Store call timed out: {0}")]
    StoreTimeout(&'static str),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::Store(StoreError::NotFound) => {
                (StatusCode::NOT_FOUND, "Record not found".to_string())
            }
            ServerError::Store(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Store error".to_string())
            }
            ServerError::StoreTimeout(_) => {
                (StatusCode::GATEWAY_TIMEOUT, "Store unavailable".to_string())
            }
            ServerError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Failures of the external key-value cache store. Never surfaced to
/// callers: a failing cache degrades to a read from the durable store.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache store unavailable: {0}")]
    Unavailable(String),

    #[error("Cache value encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failures of the delivery queue broker.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue {0} is not declared")]
    UnknownQueue(String),

    #[error("Queue {0} already has a consumer")]
    AlreadyConsumed(String),

    #[error("Publish to {0} timed out")]
    PublishTimeout(String),

    #[error("Queue {0} is closed")]
    Closed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ServerError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (ServerError::Store(StoreError::NotFound), StatusCode::NOT_FOUND),
            (ServerError::Store(StoreError::Poisoned(1)), StatusCode::INTERNAL_SERVER_ERROR),
            (ServerError::StoreTimeout("read"), StatusCode::GATEWAY_TIMEOUT),
            (ServerError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
