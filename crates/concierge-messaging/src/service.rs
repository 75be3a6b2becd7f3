use std::sync::Arc;

use tracing::{debug, info, warn};

use concierge_types::api::InboxEntry;
use concierge_types::models::{
    Conversation, MediaAttachment, Message, Party, Role, STAFF_SENTINEL,
};

use crate::MessagingConfig;
use crate::attachments::{AttachmentResolver, MediaFile};
use crate::directory::ConversationDirectory;
use crate::dispatcher::{Dispatcher, MessagingEvent};
use crate::error::MessagingError;
use crate::log::{MessageLog, ensure_participant};
use crate::profiles::ProfileDirectory;
use crate::store::{SharedStore, blocking};
use crate::subscription::{InboxStream, MessageStream};
use crate::unread;

/// Resident <-> staff chat: send, send media, mark read, and the views the
/// chat screens need.
#[derive(Clone)]
pub struct DirectMessagingService {
    directory: ConversationDirectory,
    log: MessageLog,
    store: SharedStore,
    dispatcher: Dispatcher,
    attachments: Arc<dyn AttachmentResolver>,
    profiles: Arc<dyn ProfileDirectory>,
    config: Arc<MessagingConfig>,
}

impl DirectMessagingService {
    pub fn new(
        directory: ConversationDirectory,
        log: MessageLog,
        store: SharedStore,
        dispatcher: Dispatcher,
        attachments: Arc<dyn AttachmentResolver>,
        profiles: Arc<dyn ProfileDirectory>,
        config: Arc<MessagingConfig>,
    ) -> Self {
        Self {
            directory,
            log,
            store,
            dispatcher,
            attachments,
            profiles,
            config,
        }
    }

    pub fn directory(&self) -> &ConversationDirectory {
        &self.directory
    }

    /// The resident's conversation with the staff pool, created on first use.
    pub async fn start_conversation(&self, resident_id: &str) -> Result<Conversation, MessagingError> {
        self.directory
            .find_or_create(&Party::resident(resident_id), &Party::staff(STAFF_SENTINEL))
            .await
    }

    pub async fn find_or_create(
        &self,
        requester: &Party,
        counterpart: &Party,
    ) -> Result<Conversation, MessagingError> {
        self.directory.find_or_create(requester, counterpart).await
    }

    /// Append a text message, then update the conversation summary.
    pub async fn send(
        &self,
        conversation_id: &str,
        sender: &Party,
        content: &str,
    ) -> Result<Message, MessagingError> {
        let message = self.log.append(conversation_id, sender, content, None).await?;
        self.update_summary(&message, &message.content).await;
        Ok(message)
    }

    /// Upload the file, then append a placeholder message pointing at it.
    /// Nothing is written if the upload fails.
    pub async fn send_media(
        &self,
        conversation_id: &str,
        sender: &Party,
        file: MediaFile,
    ) -> Result<Message, MessagingError> {
        let conversation = self.directory.get(conversation_id).await?;
        ensure_participant(&conversation, sender)?;

        let media = upload_media(self.attachments.as_ref(), &self.config, file).await?;
        let placeholder = media.media_type.placeholder();

        let message = self
            .log
            .append(conversation_id, sender, placeholder, Some(media))
            .await?;
        self.update_summary(&message, placeholder).await;
        Ok(message)
    }

    /// Reset the unread counter for `reader` unless their side wrote the
    /// latest message. Returns whether a reset happened; repeated calls are
    /// no-ops.
    pub async fn mark_read(&self, conversation_id: &str, reader: &Party) -> Result<bool, MessagingError> {
        let conversation = self.directory.get(conversation_id).await?;
        ensure_participant(&conversation, reader)?;

        if !unread::is_unread_for(&conversation, reader) {
            return Ok(false);
        }

        let id = conversation.id.clone();
        let seen = conversation.last_sender_id.clone();
        match blocking(&self.store, move |s| s.clear_unread(&id, seen.as_deref())).await? {
            Some(updated) => {
                debug!("{} read conversation {}", reader.id, updated.id);
                self.dispatcher
                    .publish(MessagingEvent::ConversationUpdated(updated));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Live stream of a conversation the viewer takes part in.
    pub async fn stream_from(
        &self,
        conversation_id: &str,
        viewer: &Party,
    ) -> Result<MessageStream, MessagingError> {
        let conversation = self.directory.get(conversation_id).await?;
        ensure_participant(&conversation, viewer)?;
        self.log.stream_from(conversation_id).await
    }

    /// Full history, or one page of it when `limit` is given.
    pub async fn history(
        &self,
        conversation_id: &str,
        viewer: &Party,
        limit: Option<u32>,
        before: Option<String>,
    ) -> Result<Vec<Message>, MessagingError> {
        let conversation = self.directory.get(conversation_id).await?;
        ensure_participant(&conversation, viewer)?;
        match limit {
            Some(limit) => self.log.page(conversation_id, limit, before).await,
            None => self.log.history(conversation_id).await,
        }
    }

    /// Live conversation list for `viewer`.
    pub async fn list_for(&self, viewer: &Party) -> Result<InboxStream, MessagingError> {
        InboxStream::open(self.store.clone(), &self.dispatcher, viewer.clone()).await
    }

    /// Current inbox of `viewer`, most recent first.
    pub async fn inbox(&self, viewer: &Party) -> Result<Vec<InboxEntry>, MessagingError> {
        let conversations = self.directory.list_for(viewer).await?;
        Ok(self.hydrate(viewer, conversations).await)
    }

    pub async fn unread_badge(&self, viewer: &Party) -> Result<usize, MessagingError> {
        let conversations = self.directory.list_for(viewer).await?;
        Ok(unread::badge_count(&conversations, viewer))
    }

    /// Attach unread flags and, for staff, the resident's display name.
    pub async fn hydrate(&self, viewer: &Party, conversations: Vec<Conversation>) -> Vec<InboxEntry> {
        let mut entries = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let counterpart_name = match (viewer.role, conversation.resident_id()) {
                (Role::Staff, Some(resident_id)) => self.display_name(resident_id).await,
                _ => None,
            };
            entries.push(InboxEntry {
                has_unread: unread::is_unread_for(&conversation, viewer),
                counterpart_name,
                conversation,
            });
        }
        entries
    }

    async fn display_name(&self, user_id: &str) -> Option<String> {
        match self.profiles.get(user_id).await {
            Ok(profile) => profile.map(|p| p.display_name()),
            Err(e) => {
                warn!("Profile lookup for {} failed: {}", user_id, e);
                None
            }
        }
    }

    /// Summary failures leave the message stored but the sidebar stale until
    /// the next successful send; the sender is not told.
    async fn update_summary(&self, message: &Message, preview: &str) {
        let id = message.conversation_id.clone();
        let preview = preview.to_string();
        let sender_id = message.sender_id.clone();
        let at = message.created_at;

        match blocking(&self.store, move |s| s.record_last_message(&id, &preview, &sender_id, at)).await {
            Ok(Some(conversation)) => {
                self.dispatcher
                    .publish(MessagingEvent::ConversationUpdated(conversation));
            }
            Ok(None) => debug!(
                "Summary of conversation {} already past message {}",
                message.conversation_id, message.id
            ),
            Err(e) => warn!(
                "Summary update for conversation {} failed after message {} was stored: {}",
                message.conversation_id, message.id, e
            ),
        }
    }
}

/// Enforce the per-kind size limit, then upload.
pub(crate) async fn upload_media(
    attachments: &dyn AttachmentResolver,
    config: &MessagingConfig,
    file: MediaFile,
) -> Result<MediaAttachment, MessagingError> {
    let size = file.bytes.len();
    if size == 0 {
        return Err(MessagingError::EmptyAttachment);
    }
    let max = config.max_bytes(file.kind);
    if size > max {
        return Err(MessagingError::AttachmentTooLarge {
            kind: file.kind,
            size,
            max,
        });
    }

    let stored = attachments
        .upload(&file.filename, file.bytes)
        .await
        .map_err(MessagingError::Attachment)?;
    info!("Uploaded {} attachment {} ({} bytes)", file.kind, file.filename, size);

    Ok(MediaAttachment {
        media_url: stored.url,
        media_type: file.kind,
    })
}
