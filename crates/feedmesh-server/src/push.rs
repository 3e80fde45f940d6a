//! WebSocket endpoint that delivers post announcements to online users.
//!
//! The socket is split: a writer task drains the connection's frame
//! channel into the sink, while this task reads until the client goes
//! away. Inbound frames carry nothing and are ignored.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use feedmesh_shared::types::UserId;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::api::AppState;
use crate::error::ServerError;
use crate::registry::{ConnectionHandle, ConnectionRegistry};

#[derive(Deserialize)]
pub struct PushParams {
    token: String,
}

pub async fn push_handler(
    Query(params): Query<PushParams>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Result<Response, ServerError> {
    let user = UserId::new(params.token).map_err(|e| ServerError::BadRequest(e.to_string()))?;
    let registry = state.registry.clone();
    let buffer = state.config.connection_buffer;

    Ok(ws.on_upgrade(move |socket| serve_connection(socket, user, registry, buffer)))
}

async fn serve_connection(
    socket: WebSocket,
    user: UserId,
    registry: ConnectionRegistry,
    buffer: usize,
) {
    let (handle, mut frames) = ConnectionHandle::new(buffer);
    registry.register(user.clone(), handle.clone()).await;

    let (mut sink, mut stream) = socket.split();
    let connection = handle.id();

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if let Err(e) = sink.send(Message::Text(frame.to_string())).await {
                debug!(connection = %connection, error = %e, "Push write failed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    let reader = async {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(connection = %connection, error = %e, "Push socket error");
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = &mut writer => {}
        _ = reader => {}
    }

    registry.unregister(&user, &handle).await;
    writer.abort();
}
