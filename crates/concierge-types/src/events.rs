use serde::{Deserialize, Serialize};

use crate::api::InboxEntry;
use crate::models::{CommunityMessage, Message, Role};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: String, role: Role },

    /// A message from an open conversation, replayed or newly appended
    MessageCreate { message: Message },

    /// The caller's inbox, recomputed after any change
    InboxUpdate {
        conversations: Vec<InboxEntry>,
        unread: usize,
    },

    /// The current community window, oldest first
    CommunityUpdate { messages: Vec<CommunityMessage> },

    /// A command failed; the connection stays usable
    Error { message: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Stream a conversation's log and mark it read
    OpenConversation { conversation_id: String },

    /// Stop streaming a conversation
    CloseConversation { conversation_id: String },

    /// Receive inbox updates
    WatchInbox,

    /// Receive the most recent community posts
    WatchCommunity { limit: Option<u32> },

    /// Reset the unread counter of a conversation
    MarkRead { conversation_id: String },
}
