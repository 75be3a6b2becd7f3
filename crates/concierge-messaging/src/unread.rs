//! Unread counter rules.
//!
//! The counter is a flag: every send sets it to 1 and records the sender, so
//! several unseen messages still read as 1. Whether a participant has
//! something unread depends on the counter *and* on which side wrote last.
//! Staff members share one side, so a reply from any of them counts as the
//! staff's reply.

use concierge_types::models::{Conversation, Party, STAFF_SENTINEL};

/// The two states a conversation moves between. New conversations start
/// settled; none ever closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    /// The last message has not been seen by the other party yet
    AwaitingReply,
    Settled,
}

pub fn state(conversation: &Conversation) -> ConversationState {
    if conversation.unread_count > 0 {
        ConversationState::AwaitingReply
    } else {
        ConversationState::Settled
    }
}

/// Directory key of the side that wrote the latest message: the resident's
/// id, or the staff sentinel for any staff member.
pub fn last_sender_side(conversation: &Conversation) -> Option<&str> {
    let sender = conversation.last_sender_id.as_deref()?;
    if conversation.resident_id() == Some(sender) {
        Some(sender)
    } else {
        Some(STAFF_SENTINEL)
    }
}

/// Whether `viewer` has an unseen reply from the other side waiting. This is
/// both the badge rule and the condition under which opening the
/// conversation resets the counter.
pub fn is_unread_for(conversation: &Conversation, viewer: &Party) -> bool {
    conversation.unread_count > 0 && last_sender_side(conversation) != Some(viewer.directory_key())
}

/// Number of conversations contributing to `viewer`'s unread badge.
pub fn badge_count<'a>(
    conversations: impl IntoIterator<Item = &'a Conversation>,
    viewer: &Party,
) -> usize {
    conversations
        .into_iter()
        .filter(|c| is_unread_for(c, viewer))
        .count()
}
