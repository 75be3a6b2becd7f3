use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use concierge_types::models::{Conversation, MediaAttachment, Message, Party};

use crate::clock::MonotonicClock;
use crate::dispatcher::{Dispatcher, MessagingEvent};
use crate::error::MessagingError;
use crate::store::{SharedStore, blocking};
use crate::subscription::MessageStream;
use crate::{MessagingConfig, clamp_window, validate_content};

/// Append-only, time-ordered log of every conversation. There is no update
/// or delete path.
#[derive(Clone)]
pub struct MessageLog {
    store: SharedStore,
    clock: Arc<MonotonicClock>,
    dispatcher: Dispatcher,
    config: Arc<MessagingConfig>,
    /// Held from timestamp assignment to publication so live subscribers see
    /// appends in timestamp order.
    append_lock: Arc<Mutex<()>>,
}

impl MessageLog {
    pub fn new(
        store: SharedStore,
        clock: Arc<MonotonicClock>,
        dispatcher: Dispatcher,
        config: Arc<MessagingConfig>,
    ) -> Self {
        Self {
            store,
            clock,
            dispatcher,
            config,
            append_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Append a message from `sender`, who must be one of the conversation's
    /// participants. The stored record is returned and published.
    pub async fn append(
        &self,
        conversation_id: &str,
        sender: &Party,
        content: &str,
        media: Option<MediaAttachment>,
    ) -> Result<Message, MessagingError> {
        let content = validate_content(content, self.config.max_content_chars)?.to_string();
        let conversation = self.conversation(conversation_id).await?;
        ensure_participant(&conversation, sender)?;

        let _guard = self.append_lock.lock().await;
        let message = Message {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation.id,
            sender_id: sender.id.clone(),
            content,
            media,
            read: false,
            created_at: self.clock.now(),
        };

        let record = message.clone();
        blocking(&self.store, move |s| s.append_message(&record)).await?;
        debug!("Appended {} to conversation {}", message.id, message.conversation_id);

        self.dispatcher
            .publish(MessagingEvent::MessageAppended(message.clone()));
        Ok(message)
    }

    /// Live stream of the conversation: the whole current log, then new appends.
    pub async fn stream_from(&self, conversation_id: &str) -> Result<MessageStream, MessagingError> {
        MessageStream::open(self.store.clone(), &self.dispatcher, conversation_id.to_string()).await
    }

    /// The whole log, oldest first.
    pub async fn history(&self, conversation_id: &str) -> Result<Vec<Message>, MessagingError> {
        let id = conversation_id.to_string();
        blocking(&self.store, move |s| s.messages(&id)).await
    }

    /// One page of history older than `before` (or the latest page), oldest first.
    pub async fn page(
        &self,
        conversation_id: &str,
        limit: u32,
        before: Option<String>,
    ) -> Result<Vec<Message>, MessagingError> {
        let id = conversation_id.to_string();
        let limit = clamp_window(limit);
        blocking(&self.store, move |s| s.messages_page(&id, limit, before.as_deref())).await
    }

    async fn conversation(&self, conversation_id: &str) -> Result<Conversation, MessagingError> {
        let id = conversation_id.to_string();
        blocking(&self.store, move |s| s.conversation(&id))
            .await?
            .ok_or_else(|| MessagingError::ConversationNotFound(conversation_id.to_string()))
    }
}

pub(crate) fn ensure_participant(conversation: &Conversation, party: &Party) -> Result<(), MessagingError> {
    if conversation.admits(party) {
        Ok(())
    } else {
        Err(MessagingError::NotAParticipant {
            conversation_id: conversation.id.clone(),
            user_id: party.id.clone(),
        })
    }
}
