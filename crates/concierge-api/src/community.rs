use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use concierge_types::api::{CommunityQuery, MediaUploadQuery, PostCommunityRequest};
use concierge_types::models::Party;

use crate::conversations::media_file;
use crate::error::ApiError;
use crate::state::AppState;

/// GET /community?limit=N: newest posts, oldest first.
pub async fn recent(
    State(state): State<AppState>,
    Query(query): Query<CommunityQuery>,
    Extension(_party): Extension<Party>,
) -> Result<impl IntoResponse, ApiError> {
    let community = &state.messaging.community;
    let limit = query.limit.unwrap_or_else(|| community.default_window());
    Ok(Json(community.recent(limit).await?))
}

pub async fn post(
    State(state): State<AppState>,
    Extension(party): Extension<Party>,
    Json(req): Json<PostCommunityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let post = state.messaging.community.post_as(&party, &req.content).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn post_media(
    State(state): State<AppState>,
    Query(query): Query<MediaUploadQuery>,
    Extension(party): Extension<Party>,
    bytes: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let file = media_file(query, bytes)?;
    let post = state.messaging.community.post_media(&party, file).await?;
    Ok((StatusCode::CREATED, Json(post)))
}
