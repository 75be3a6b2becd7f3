use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use concierge_types::models::{Conversation, Party};

use crate::DirectoryMode;
use crate::clock::MonotonicClock;
use crate::dispatcher::{Dispatcher, MessagingEvent};
use crate::error::MessagingError;
use crate::store::{SharedStore, blocking};

/// Preview shown for a conversation nobody has written in yet.
pub const NEW_CONVERSATION_PREVIEW: &str = "Nouvelle conversation";

/// Resolves "the conversation between this resident and the staff" to a
/// single record, creating it on first use. Staff identifiers are folded
/// into the sentinel participant, so each resident has one shared inbox.
#[derive(Clone)]
pub struct ConversationDirectory {
    store: SharedStore,
    clock: Arc<MonotonicClock>,
    dispatcher: Dispatcher,
    mode: DirectoryMode,
}

impl ConversationDirectory {
    pub fn new(
        store: SharedStore,
        clock: Arc<MonotonicClock>,
        dispatcher: Dispatcher,
        mode: DirectoryMode,
    ) -> Self {
        Self {
            store,
            clock,
            dispatcher,
            mode,
        }
    }

    pub async fn find_or_create(
        &self,
        requester: &Party,
        counterpart: &Party,
    ) -> Result<Conversation, MessagingError> {
        let me = requester.directory_key().to_string();
        let other = counterpart.directory_key().to_string();
        if me == other {
            return Err(MessagingError::SameParticipant);
        }
        if requester.role == counterpart.role {
            return Err(MessagingError::NotResidentStaffPair);
        }

        match self.mode {
            DirectoryMode::LookupThenCreate => self.lookup_then_create(me, other).await,
            DirectoryMode::CanonicalPair => self.create_canonical(me, other).await,
        }
    }

    pub async fn get(&self, conversation_id: &str) -> Result<Conversation, MessagingError> {
        let id = conversation_id.to_string();
        blocking(&self.store, move |s| s.conversation(&id))
            .await?
            .ok_or_else(|| MessagingError::ConversationNotFound(conversation_id.to_string()))
    }

    /// Snapshot of what `viewer` may see: staff see every conversation,
    /// residents only their own. Most recent first.
    pub async fn list_for(&self, viewer: &Party) -> Result<Vec<Conversation>, MessagingError> {
        let viewer = viewer.clone();
        let mut list = blocking(&self.store, move |s| {
            if viewer.is_staff() {
                s.all_conversations()
            } else {
                s.conversations_for(&viewer.id)
            }
        })
        .await?;
        most_recent_first(&mut list);
        Ok(list)
    }

    async fn lookup_then_create(&self, me: String, other: String) -> Result<Conversation, MessagingError> {
        let key = me.clone();
        let mut existing: Vec<Conversation> = blocking(&self.store, move |s| s.conversations_for(&key))
            .await?
            .into_iter()
            .filter(|c| c.other_participant(&me) == Some(other.as_str()))
            .collect();

        // Earlier races may have left duplicates; settle on the oldest.
        existing.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        if let Some(found) = existing.into_iter().next() {
            debug!("Found conversation {} for {} / {}", found.id, me, other);
            return Ok(found);
        }

        let conversation = self.fresh(Uuid::new_v4().to_string(), me, other);
        let record = conversation.clone();
        blocking(&self.store, move |s| s.create_conversation(&record)).await?;

        info!("Created conversation {} for {:?}", conversation.id, conversation.participants);
        self.dispatcher
            .publish(MessagingEvent::ConversationUpdated(conversation.clone()));
        Ok(conversation)
    }

    async fn create_canonical(&self, me: String, other: String) -> Result<Conversation, MessagingError> {
        let id = canonical_pair_id(&me, &other);
        let candidate = self.fresh(id.clone(), me, other);

        let record = candidate.clone();
        let lookup = id.clone();
        let (created, stored) = blocking(&self.store, move |s| {
            let created = s.create_conversation(&record)?;
            Ok((created, s.conversation(&lookup)?))
        })
        .await?;
        let conversation = stored.ok_or_else(|| MessagingError::ConversationNotFound(id))?;

        if created {
            info!("Created conversation {} for {:?}", conversation.id, conversation.participants);
            self.dispatcher
                .publish(MessagingEvent::ConversationUpdated(conversation.clone()));
        }
        Ok(conversation)
    }

    fn fresh(&self, id: String, me: String, other: String) -> Conversation {
        let now = self.clock.now();
        Conversation {
            id,
            participants: [me, other],
            last_message: NEW_CONVERSATION_PREVIEW.to_string(),
            last_sender_id: None,
            last_message_time: now,
            unread_count: 0,
            created_at: now,
        }
    }
}

/// Conversation id derived from the unordered participant pair.
pub fn canonical_pair_id(a: &str, b: &str) -> String {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    let mut hasher = Sha256::new();
    hasher.update(first.as_bytes());
    hasher.update([0u8]);
    hasher.update(second.as_bytes());
    format!("pair-{}", hex::encode(hasher.finalize()))
}

/// Sort by last activity, newest first. Ties fall back to creation time, then id.
pub fn most_recent_first(list: &mut [Conversation]) {
    list.sort_by(|a, b| {
        b.last_message_time
            .cmp(&a.last_message_time)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}
