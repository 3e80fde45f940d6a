use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, Method},
    routing::{get, post},
    Json, Router,
};
use feedmesh_shared::types::{Message, Post, UserId};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::dialog::DialogService;
use crate::error::ServerError;
use crate::feed::FeedService;
use crate::push::push_handler;
use crate::registry::ConnectionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub feed: FeedService,
    pub dialog: DialogService,
    pub registry: ConnectionRegistry,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/post/create", post(create_post))
        .route("/post/feed", get(get_feed))
        .route("/friend/:user_id", post(add_friend).delete(remove_friend))
        .route("/dialog/:user_id/send", post(send_message))
        .route("/dialog/:user_id/list", get(list_dialog))
        .route("/ws", get(push_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Identity of the caller, taken from the `User-Id` header. Authentication
/// happens upstream of this service.
pub struct Caller(pub UserId);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("user-id")
            .ok_or_else(|| ServerError::BadRequest("Missing User-Id header".into()))?
            .to_str()
            .map_err(|_| ServerError::BadRequest("User-Id header is not valid text".into()))?;
        Ok(Caller(parse_user(raw)?))
    }
}

fn parse_user(raw: &str) -> Result<UserId, ServerError> {
    UserId::new(raw).map_err(|e| ServerError::BadRequest(e.to_string()))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Deserialize)]
struct CreatePostRequest {
    text: String,
}

#[derive(Serialize)]
struct CreatePostResponse {
    id: String,
}

#[derive(Deserialize)]
struct FeedQuery {
    #[serde(default)]
    offset: usize,
    #[serde(default = "default_page_size")]
    limit: usize,
}

fn default_page_size() -> usize {
    10
}

#[derive(Deserialize)]
struct SendMessageRequest {
    text: String,
}

#[derive(Serialize)]
struct SendMessageResponse {
    id: String,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn create_post(
    State(state): State<AppState>,
    Caller(author): Caller,
    Json(req): Json<CreatePostRequest>,
) -> Result<Json<CreatePostResponse>, ServerError> {
    let post = state.feed.create_post(author, req.text).await?;
    Ok(Json(CreatePostResponse {
        id: post.id.to_string(),
    }))
}

async fn get_feed(
    State(state): State<AppState>,
    Caller(user): Caller,
    Query(query): Query<FeedQuery>,
) -> Result<Json<Vec<Post>>, ServerError> {
    let posts = state.feed.get_feed(&user, query.offset, query.limit).await?;
    Ok(Json(posts))
}

async fn add_friend(
    State(state): State<AppState>,
    Caller(user): Caller,
    Path(friend): Path<String>,
) -> Result<(), ServerError> {
    let friend = parse_user(&friend)?;
    state.feed.follow(&user, &friend).await?;
    info!(user = %user, friend = %friend, "Friend added");
    Ok(())
}

async fn remove_friend(
    State(state): State<AppState>,
    Caller(user): Caller,
    Path(friend): Path<String>,
) -> Result<(), ServerError> {
    let friend = parse_user(&friend)?;
    state.feed.unfollow(&user, &friend).await?;
    info!(user = %user, friend = %friend, "Friend removed");
    Ok(())
}

async fn send_message(
    State(state): State<AppState>,
    Caller(from): Caller,
    Path(to): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ServerError> {
    let to = parse_user(&to)?;
    let id = state.dialog.send_message(from, to, req.text).await?;
    Ok(Json(SendMessageResponse { id: id.to_string() }))
}

async fn list_dialog(
    State(state): State<AppState>,
    Caller(me): Caller,
    Path(other): Path<String>,
) -> Result<Json<Vec<Message>>, ServerError> {
    let other = parse_user(&other)?;
    let history = state.dialog.get_dialog(&me, &other).await?;
    Ok(Json(history))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
