//! Live, cancellable views over the messaging store.
//!
//! Each handle subscribes to the [`Dispatcher`] before reading its snapshot,
//! so nothing written in between is lost, and filters out records the
//! snapshot already contained. Dropping a handle ends the subscription.

use std::collections::{HashMap, HashSet, VecDeque};

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use concierge_types::models::{CommunityMessage, Conversation, Message, Party, Role};

use crate::directory::most_recent_first;
use crate::dispatcher::{Dispatcher, MessagingEvent};
use crate::error::MessagingError;
use crate::store::{SharedStore, blocking};

/// Ordered log of one conversation: the full current log, then every
/// message appended afterwards.
pub struct MessageStream {
    conversation_id: String,
    store: SharedStore,
    events: broadcast::Receiver<MessagingEvent>,
    pending: VecDeque<Message>,
    delivered: HashSet<String>,
}

impl MessageStream {
    pub(crate) async fn open(
        store: SharedStore,
        dispatcher: &Dispatcher,
        conversation_id: String,
    ) -> Result<Self, MessagingError> {
        let events = dispatcher.subscribe();
        let id = conversation_id.clone();
        let backlog = blocking(&store, move |s| s.messages(&id)).await?;

        Ok(Self {
            conversation_id,
            store,
            events,
            pending: backlog.into(),
            delivered: HashSet::new(),
        })
    }

    /// Next message in log order. Returns `None` once the dispatcher is gone.
    pub async fn next(&mut self) -> Option<Message> {
        loop {
            if let Some(message) = self.pending.pop_front() {
                if self.delivered.insert(message.id.clone()) {
                    return Some(message);
                }
                continue;
            }

            match self.events.recv().await {
                Ok(MessagingEvent::MessageAppended(message))
                    if message.conversation_id == self.conversation_id =>
                {
                    self.pending.push_back(message);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => {
                    warn!(
                        "Message stream for {} lagged by {} events, reloading log",
                        self.conversation_id, n
                    );
                    if let Err(e) = self.resync().await {
                        warn!("Reloading log for {} failed: {}", self.conversation_id, e);
                    }
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    async fn resync(&mut self) -> Result<(), MessagingError> {
        let id = self.conversation_id.clone();
        let log = blocking(&self.store, move |s| s.messages(&id)).await?;
        let delivered = &self.delivered;
        self.pending = log.into_iter().filter(|m| !delivered.contains(&m.id)).collect();
        Ok(())
    }
}

/// A participant's conversation list, most recent first, re-emitted in full
/// after every relevant change.
pub struct InboxStream {
    viewer: Party,
    store: SharedStore,
    events: broadcast::Receiver<MessagingEvent>,
    conversations: HashMap<String, Conversation>,
    primed: bool,
}

impl InboxStream {
    pub(crate) async fn open(
        store: SharedStore,
        dispatcher: &Dispatcher,
        viewer: Party,
    ) -> Result<Self, MessagingError> {
        let events = dispatcher.subscribe();
        let mut stream = Self {
            viewer,
            store,
            events,
            conversations: HashMap::new(),
            primed: false,
        };
        stream.reload().await?;
        Ok(stream)
    }

    /// The current list: immediately on the first call, then after each change.
    pub async fn next(&mut self) -> Option<Vec<Conversation>> {
        if !self.primed {
            self.primed = true;
            return Some(self.snapshot());
        }

        loop {
            match self.events.recv().await {
                Ok(MessagingEvent::ConversationUpdated(conversation)) if self.visible(&conversation) => {
                    self.conversations.insert(conversation.id.clone(), conversation);
                    return Some(self.snapshot());
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => {
                    warn!("Inbox stream for {} lagged by {} events, reloading", self.viewer.id, n);
                    match self.reload().await {
                        Ok(()) => return Some(self.snapshot()),
                        Err(e) => warn!("Reloading inbox for {} failed: {}", self.viewer.id, e),
                    }
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    fn visible(&self, conversation: &Conversation) -> bool {
        match self.viewer.role {
            Role::Staff => true,
            Role::Resident => conversation.admits(&self.viewer),
        }
    }

    fn snapshot(&self) -> Vec<Conversation> {
        let mut list: Vec<Conversation> = self.conversations.values().cloned().collect();
        most_recent_first(&mut list);
        list
    }

    async fn reload(&mut self) -> Result<(), MessagingError> {
        let viewer = self.viewer.clone();
        let list = blocking(&self.store, move |s| match viewer.role {
            Role::Staff => s.all_conversations(),
            Role::Resident => s.conversations_for(&viewer.id),
        })
        .await?;
        self.conversations = list.into_iter().map(|c| (c.id.clone(), c)).collect();
        Ok(())
    }
}

/// The newest `limit` community posts in chronological order, re-emitted
/// whenever a post arrives.
pub struct CommunityStream {
    limit: usize,
    store: SharedStore,
    events: broadcast::Receiver<MessagingEvent>,
    window: VecDeque<CommunityMessage>,
    primed: bool,
}

impl CommunityStream {
    pub(crate) async fn open(
        store: SharedStore,
        dispatcher: &Dispatcher,
        limit: u32,
    ) -> Result<Self, MessagingError> {
        let events = dispatcher.subscribe();
        let mut stream = Self {
            limit: limit as usize,
            store,
            events,
            window: VecDeque::new(),
            primed: false,
        };
        stream.reload().await?;
        Ok(stream)
    }

    pub async fn next(&mut self) -> Option<Vec<CommunityMessage>> {
        if !self.primed {
            self.primed = true;
            return Some(self.window.iter().cloned().collect());
        }

        loop {
            match self.events.recv().await {
                Ok(MessagingEvent::CommunityPosted(post)) => {
                    if self.window.iter().any(|m| m.id == post.id) {
                        continue;
                    }
                    self.window.push_back(post);
                    while self.window.len() > self.limit {
                        self.window.pop_front();
                    }
                    return Some(self.window.iter().cloned().collect());
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => {
                    warn!("Community stream lagged by {} events, reloading", n);
                    match self.reload().await {
                        Ok(()) => return Some(self.window.iter().cloned().collect()),
                        Err(e) => warn!("Reloading community window failed: {}", e),
                    }
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    async fn reload(&mut self) -> Result<(), MessagingError> {
        let limit = self.limit as u32;
        let mut recent = blocking(&self.store, move |s| s.recent_community_messages(limit)).await?;
        recent.reverse();
        self.window = recent.into();
        Ok(())
    }
}
