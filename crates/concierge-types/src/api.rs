use serde::{Deserialize, Serialize};

use crate::models::{Conversation, Role};

// -- Session claims --

/// Session token claims issued by the identity service. Shared by the REST
/// middleware and the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: usize,
}

// -- Conversations --

#[derive(Debug, Serialize, Deserialize)]
pub struct StartConversationResponse {
    pub conversation_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FindOrCreateRequest {
    pub counterpart_id: String,
    /// Defaults to the role opposite the caller's.
    #[serde(default)]
    pub counterpart_role: Option<Role>,
}

/// A conversation as shown in a participant's inbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxEntry {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub has_unread: bool,
    /// Resident's display name, hydrated for staff viewers only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterpart_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadResponse {
    pub unread: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkReadResponse {
    pub cleared: bool,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
}

/// Query string accompanying a raw media upload body.
#[derive(Debug, Deserialize)]
pub struct MediaUploadQuery {
    /// `image` or `video`; anything else is refused as unsupported media.
    pub kind: String,
    pub filename: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
    /// Id of the oldest message the client already has.
    pub before: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CommunityQuery {
    pub limit: Option<u32>,
}

// -- Community --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostCommunityRequest {
    pub content: String,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
