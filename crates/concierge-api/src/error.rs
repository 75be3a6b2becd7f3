use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{debug, error};

use concierge_messaging::MessagingError;
use concierge_types::api::ErrorBody;

/// An HTTP error with a JSON `{ "error": ... }` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

pub fn status_for(e: &MessagingError) -> StatusCode {
    match e {
        MessagingError::ConversationNotFound(_) => StatusCode::NOT_FOUND,
        MessagingError::NotAParticipant { .. } => StatusCode::FORBIDDEN,
        MessagingError::SameParticipant
        | MessagingError::NotResidentStaffPair
        | MessagingError::EmptyContent
        | MessagingError::ContentTooLong { .. }
        | MessagingError::EmptyAttachment => StatusCode::BAD_REQUEST,
        MessagingError::AttachmentTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        MessagingError::UnsupportedMedia(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        MessagingError::Attachment(_) => StatusCode::BAD_GATEWAY,
        MessagingError::Store(_) | MessagingError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<MessagingError> for ApiError {
    fn from(e: MessagingError) -> Self {
        let status = status_for(&e);
        let message = match status {
            StatusCode::BAD_GATEWAY => {
                error!("Attachment upload failed: {:#}", e);
                "attachment upload failed".to_string()
            }
            StatusCode::INTERNAL_SERVER_ERROR => {
                error!("Messaging error: {:#}", e);
                "internal error".to_string()
            }
            _ => {
                debug!("Rejected request: {}", e);
                e.to_string()
            }
        };
        Self { status, message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_keep_their_message() {
        let err = ApiError::from(MessagingError::EmptyContent);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "message content is empty");
    }

    #[test]
    fn server_errors_are_masked() {
        let err = ApiError::from(MessagingError::Store(anyhow::anyhow!("disk I/O error")));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "internal error");

        let err = ApiError::from(MessagingError::Attachment(anyhow::anyhow!("timeout")));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn participation_and_lookup_map_to_403_and_404() {
        let forbidden = MessagingError::NotAParticipant {
            conversation_id: "c".into(),
            user_id: "r-2".into(),
        };
        assert_eq!(status_for(&forbidden), StatusCode::FORBIDDEN);
        assert_eq!(
            status_for(&MessagingError::ConversationNotFound("c".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&MessagingError::UnsupportedMedia("audio".into())),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
    }
}
