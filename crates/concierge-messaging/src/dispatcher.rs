use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::trace;

use concierge_types::models::{CommunityMessage, Conversation, Message};

/// Something that changed in the messaging store.
#[derive(Debug, Clone)]
pub enum MessagingEvent {
    /// A message was appended to a conversation log
    MessageAppended(Message),

    /// A conversation was created or its summary changed
    ConversationUpdated(Conversation),

    /// A post was added to the community feed
    CommunityPosted(CommunityMessage),
}

impl MessagingEvent {
    /// The conversation this event is scoped to, if any.
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            Self::MessageAppended(m) => Some(&m.conversation_id),
            Self::ConversationUpdated(c) => Some(&c.id),
            Self::CommunityPosted(_) => None,
        }
    }
}

/// Fans out every write to all live subscriptions. Publishing never waits
/// for subscribers.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    broadcast_tx: broadcast::Sender<MessagingEvent>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner { broadcast_tx }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MessagingEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    pub fn publish(&self, event: MessagingEvent) {
        // No receivers is fine: nobody is watching.
        if let Err(e) = self.inner.broadcast_tx.send(event) {
            trace!("No subscribers for {:?}", e.0.conversation_id());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.broadcast_tx.receiver_count()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
