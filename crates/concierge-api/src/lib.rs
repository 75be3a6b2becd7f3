//! HTTP surface of the messaging subsystem.

pub mod community;
pub mod conversations;
pub mod error;
pub mod media;
pub mod middleware;
pub mod state;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

/// Every REST route. Bearer auth covers everything except `/health` and the
/// attachment downloads, whose names are unguessable.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/media/{name}", get(media::serve_media))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/conversations", get(conversations::inbox).post(conversations::find_or_create))
        .route("/conversations/start", post(conversations::start))
        .route("/conversations/unread", get(conversations::unread))
        .route(
            "/conversations/{conversation_id}/messages",
            get(conversations::get_messages).post(conversations::send_message),
        )
        .route("/conversations/{conversation_id}/media", post(conversations::send_media))
        .route("/conversations/{conversation_id}/read", post(conversations::mark_read))
        .route("/community", get(community::recent).post(community::post))
        .route("/community/media", post(community::post_media))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(axum::middleware::from_fn_with_state(state.clone(), middleware::require_auth))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}

pub async fn health() -> &'static str {
    "ok"
}
