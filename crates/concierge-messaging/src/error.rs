use concierge_types::models::MediaKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("conversation {0} not found")]
    ConversationNotFound(String),

    #[error("{user_id} is not a participant of conversation {conversation_id}")]
    NotAParticipant {
        conversation_id: String,
        user_id: String,
    },

    #[error("a conversation needs two distinct participants")]
    SameParticipant,

    #[error("a conversation pairs one resident with the staff")]
    NotResidentStaffPair,

    #[error("message content is empty")]
    EmptyContent,

    #[error("message content exceeds {max} characters")]
    ContentTooLong { max: usize },

    #[error("attachment is empty")]
    EmptyAttachment,

    #[error("unsupported media type '{0}'")]
    UnsupportedMedia(String),

    #[error("{kind} attachment of {size} bytes exceeds the {max} byte limit")]
    AttachmentTooLarge {
        kind: MediaKind,
        size: usize,
        max: usize,
    },

    /// Upload to the blob store failed; nothing was persisted.
    #[error("attachment upload failed: {0}")]
    Attachment(#[source] anyhow::Error),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl MessagingError {
    /// Errors caused by the caller's input rather than by the system.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Attachment(_) | Self::Store(_) | Self::Task(_))
    }
}
