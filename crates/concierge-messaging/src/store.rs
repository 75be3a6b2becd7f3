use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use tracing::warn;

use concierge_db::Database;
use concierge_db::models::{CommunityMessageRow, ConversationRow, MessageRow};
use concierge_types::models::{CommunityMessage, Conversation, MediaAttachment, Message};

use crate::error::MessagingError;

/// Persistence used by the messaging components. Calls are blocking; the
/// components run them on the blocking pool.
pub trait MessagingStore: Send + Sync + 'static {
    fn conversation(&self, id: &str) -> Result<Option<Conversation>>;

    /// Conversations listing `participant` among their two participants.
    fn conversations_for(&self, participant: &str) -> Result<Vec<Conversation>>;

    fn all_conversations(&self) -> Result<Vec<Conversation>>;

    /// Insert unless the id is taken. Returns true when created.
    fn create_conversation(&self, conversation: &Conversation) -> Result<bool>;

    /// Set preview, last sender and time, and raise the unread counter to 1.
    /// Returns None when a newer message already holds the summary.
    fn record_last_message(
        &self,
        id: &str,
        preview: &str,
        sender_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Conversation>>;

    /// Reset the unread counter if `seen_sender_id` still wrote the latest
    /// message. Returns the updated conversation when a reset happened.
    fn clear_unread(&self, id: &str, seen_sender_id: Option<&str>) -> Result<Option<Conversation>>;

    fn append_message(&self, message: &Message) -> Result<()>;

    /// Full log, oldest first.
    fn messages(&self, conversation_id: &str) -> Result<Vec<Message>>;

    /// Up to `limit` messages older than `before`, oldest first.
    fn messages_page(&self, conversation_id: &str, limit: u32, before: Option<&str>) -> Result<Vec<Message>>;

    fn append_community_message(&self, message: &CommunityMessage) -> Result<()>;

    /// The `limit` most recent community posts, newest first.
    fn recent_community_messages(&self, limit: u32) -> Result<Vec<CommunityMessage>>;
}

pub type SharedStore = Arc<dyn MessagingStore>;

/// Run a store call off the async runtime.
pub(crate) async fn blocking<T, F>(store: &SharedStore, f: F) -> Result<T, MessagingError>
where
    F: FnOnce(&dyn MessagingStore) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = store.clone();
    let out = tokio::task::spawn_blocking(move || f(store.as_ref())).await?;
    Ok(out?)
}

impl MessagingStore for Database {
    fn conversation(&self, id: &str) -> Result<Option<Conversation>> {
        Ok(self.get_conversation(id)?.map(conversation_from_row))
    }

    fn conversations_for(&self, participant: &str) -> Result<Vec<Conversation>> {
        Ok(self
            .get_conversations_for(participant)?
            .into_iter()
            .map(conversation_from_row)
            .collect())
    }

    fn all_conversations(&self) -> Result<Vec<Conversation>> {
        Ok(self
            .get_all_conversations()?
            .into_iter()
            .map(conversation_from_row)
            .collect())
    }

    fn create_conversation(&self, conversation: &Conversation) -> Result<bool> {
        let [a, b] = &conversation.participants;
        self.insert_conversation(&ConversationRow {
            id: conversation.id.clone(),
            participant_a: a.clone(),
            participant_b: b.clone(),
            last_message: conversation.last_message.clone(),
            last_sender_id: conversation.last_sender_id.clone(),
            last_message_time: conversation.last_message_time.timestamp_millis(),
            unread_count: i64::from(conversation.unread_count),
            created_at: conversation.created_at.timestamp_millis(),
        })
    }

    fn record_last_message(
        &self,
        id: &str,
        preview: &str,
        sender_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Conversation>> {
        Ok(self
            .update_conversation_summary(id, preview, sender_id, at.timestamp_millis())?
            .map(conversation_from_row))
    }

    fn clear_unread(&self, id: &str, seen_sender_id: Option<&str>) -> Result<Option<Conversation>> {
        Ok(Database::clear_unread(self, id, seen_sender_id)?.map(conversation_from_row))
    }

    fn append_message(&self, message: &Message) -> Result<()> {
        let (media_url, media_type) = media_columns(message.media.as_ref());
        self.insert_message(&MessageRow {
            id: message.id.clone(),
            conversation_id: message.conversation_id.clone(),
            sender_id: message.sender_id.clone(),
            content: message.content.clone(),
            media_url,
            media_type,
            read: message.read,
            created_at: message.created_at.timestamp_millis(),
        })
    }

    fn messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        Ok(self
            .get_messages(conversation_id)?
            .into_iter()
            .map(message_from_row)
            .collect())
    }

    fn messages_page(&self, conversation_id: &str, limit: u32, before: Option<&str>) -> Result<Vec<Message>> {
        let mut page: Vec<Message> = self
            .get_messages_page(conversation_id, limit, before)?
            .into_iter()
            .map(message_from_row)
            .collect();
        page.reverse();
        Ok(page)
    }

    fn append_community_message(&self, message: &CommunityMessage) -> Result<()> {
        let (media_url, media_type) = media_columns(message.media.as_ref());
        self.insert_community_message(&CommunityMessageRow {
            id: message.id.clone(),
            sender_id: message.sender_id.clone(),
            sender_name: message.sender_name.clone(),
            content: message.content.clone(),
            media_url,
            media_type,
            created_at: message.created_at.timestamp_millis(),
        })
    }

    fn recent_community_messages(&self, limit: u32) -> Result<Vec<CommunityMessage>> {
        Ok(self
            .get_recent_community_messages(limit)?
            .into_iter()
            .map(|row| CommunityMessage {
                media: media_from_columns(&row.id, row.media_url, row.media_type),
                created_at: timestamp(&row.id, row.created_at),
                id: row.id,
                sender_id: row.sender_id,
                sender_name: row.sender_name,
                content: row.content,
            })
            .collect())
    }
}

fn conversation_from_row(row: ConversationRow) -> Conversation {
    Conversation {
        last_message_time: timestamp(&row.id, row.last_message_time),
        created_at: timestamp(&row.id, row.created_at),
        unread_count: u32::try_from(row.unread_count).unwrap_or_else(|_| {
            warn!("Corrupt unread_count {} on conversation '{}'", row.unread_count, row.id);
            0
        }),
        id: row.id,
        participants: [row.participant_a, row.participant_b],
        last_message: row.last_message,
        last_sender_id: row.last_sender_id,
    }
}

fn message_from_row(row: MessageRow) -> Message {
    Message {
        media: media_from_columns(&row.id, row.media_url, row.media_type),
        created_at: timestamp(&row.id, row.created_at),
        id: row.id,
        conversation_id: row.conversation_id,
        sender_id: row.sender_id,
        content: row.content,
        read: row.read,
    }
}

fn media_columns(media: Option<&MediaAttachment>) -> (Option<String>, Option<String>) {
    match media {
        Some(m) => (Some(m.media_url.clone()), Some(m.media_type.as_str().to_string())),
        None => (None, None),
    }
}

fn media_from_columns(
    record_id: &str,
    url: Option<String>,
    kind: Option<String>,
) -> Option<MediaAttachment> {
    match (url, kind) {
        (Some(media_url), Some(kind)) => match kind.parse() {
            Ok(media_type) => Some(MediaAttachment { media_url, media_type }),
            Err(e) => {
                warn!("Dropping media on '{}': {}", record_id, e);
                None
            }
        },
        (None, None) => None,
        _ => {
            warn!("Half-populated media columns on '{}'", record_id);
            None
        }
    }
}

fn timestamp(record_id: &str, ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(|| {
        warn!("Corrupt timestamp {} on '{}'", ms, record_id);
        DateTime::default()
    })
}
