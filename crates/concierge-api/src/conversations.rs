use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use concierge_messaging::{MediaFile, MessagingError};
use concierge_types::api::{
    FindOrCreateRequest, HistoryQuery, MarkReadResponse, MediaUploadQuery, SendMessageRequest,
    StartConversationResponse, UnreadResponse,
};
use concierge_types::models::{MediaKind, Party, Role};

use crate::error::ApiError;
use crate::state::AppState;

/// POST /conversations/start: the calling resident's conversation with staff.
pub async fn start(
    State(state): State<AppState>,
    Extension(party): Extension<Party>,
) -> Result<impl IntoResponse, ApiError> {
    if party.is_staff() {
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "only residents can start a conversation",
        ));
    }

    let conversation = state.messaging.direct.start_conversation(&party.id).await?;
    Ok(Json(StartConversationResponse {
        conversation_id: conversation.id,
    }))
}

/// POST /conversations
pub async fn find_or_create(
    State(state): State<AppState>,
    Extension(party): Extension<Party>,
    Json(req): Json<FindOrCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let role = req.counterpart_role.unwrap_or(match party.role {
        Role::Resident => Role::Staff,
        Role::Staff => Role::Resident,
    });
    let counterpart = Party {
        id: req.counterpart_id,
        role,
    };

    let conversation = state
        .messaging
        .direct
        .find_or_create(&party, &counterpart)
        .await?;
    Ok(Json(conversation))
}

/// GET /conversations
pub async fn inbox(
    State(state): State<AppState>,
    Extension(party): Extension<Party>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.messaging.direct.inbox(&party).await?))
}

/// GET /conversations/unread
pub async fn unread(
    State(state): State<AppState>,
    Extension(party): Extension<Party>,
) -> Result<impl IntoResponse, ApiError> {
    let unread = state.messaging.direct.unread_badge(&party).await?;
    Ok(Json(UnreadResponse { unread }))
}

/// GET /conversations/{id}/messages: the full log, or one page with `limit`.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Query(query): Query<HistoryQuery>,
    Extension(party): Extension<Party>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = state
        .messaging
        .direct
        .history(&conversation_id, &party, query.limit, query.before)
        .await?;
    Ok(Json(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Extension(party): Extension<Party>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state
        .messaging
        .direct
        .send(&conversation_id, &party, &req.content)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// POST /conversations/{id}/media?kind=image&filename=... with the raw file as body.
pub async fn send_media(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Query(query): Query<MediaUploadQuery>,
    Extension(party): Extension<Party>,
    bytes: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let file = media_file(query, bytes)?;
    let message = state
        .messaging
        .direct
        .send_media(&conversation_id, &party, file)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Extension(party): Extension<Party>,
) -> Result<impl IntoResponse, ApiError> {
    let cleared = state
        .messaging
        .direct
        .mark_read(&conversation_id, &party)
        .await?;
    Ok(Json(MarkReadResponse { cleared }))
}

pub(crate) fn media_file(query: MediaUploadQuery, bytes: Bytes) -> Result<MediaFile, MessagingError> {
    let kind: MediaKind = query
        .kind
        .parse()
        .map_err(|_| MessagingError::UnsupportedMedia(query.kind.clone()))?;
    Ok(MediaFile {
        filename: query.filename,
        kind,
        bytes,
    })
}
