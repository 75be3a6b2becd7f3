use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Participant id standing in for the whole staff pool until a specific
/// staff member is bound to a conversation.
pub const STAFF_SENTINEL: &str = "admin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Resident,
    Staff,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resident => "resident",
            Self::Staff => "staff",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resident" => Ok(Self::Resident),
            // The portal historically labels staff accounts "admin".
            "staff" | "admin" => Ok(Self::Staff),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// The authenticated caller of an operation, as supplied by the session layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Party {
    pub id: String,
    pub role: Role,
}

impl Party {
    pub fn resident(id: impl Into<String>) -> Self {
        Self { id: id.into(), role: Role::Resident }
    }

    pub fn staff(id: impl Into<String>) -> Self {
        Self { id: id.into(), role: Role::Staff }
    }

    pub fn is_staff(&self) -> bool {
        self.role == Role::Staff
    }

    /// Key under which this party appears in a conversation's participants.
    /// Every staff member shares the sentinel.
    pub fn directory_key(&self) -> &str {
        match self.role {
            Role::Staff => STAFF_SENTINEL,
            Role::Resident => &self.id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    /// Text stored as the message body and conversation preview for media.
    pub fn placeholder(&self) -> &'static str {
        match self {
            Self::Image => "📷 Photo",
            Self::Video => "🎥 Vidéo",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            other => Err(format!("unsupported media kind '{}'", other)),
        }
    }
}

/// A resolved attachment. URL and kind always travel together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub media_url: String,
    pub media_type: MediaKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub participants: [String; 2],
    pub last_message: String,
    pub last_sender_id: Option<String>,
    pub last_message_time: DateTime<Utc>,
    pub unread_count: u32,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Whether `party` may read or write this conversation. Staff members are
    /// participants of any conversation bound to the sentinel.
    pub fn admits(&self, party: &Party) -> bool {
        self.participants
            .iter()
            .any(|p| p == &party.id || p == party.directory_key())
    }

    /// The participant that is not `key`, if `key` is one of the two.
    pub fn other_participant(&self, key: &str) -> Option<&str> {
        match &self.participants {
            [a, b] if a == key => Some(b.as_str()),
            [a, b] if b == key => Some(a.as_str()),
            _ => None,
        }
    }

    /// The resident side of the conversation.
    pub fn resident_id(&self) -> Option<&str> {
        self.other_participant(STAFF_SENTINEL)
    }
}

/// One immutable entry in a conversation's log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaAttachment>,
    /// Always written `false`; the conversation's unread counter is authoritative.
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// One immutable entry in the shared community feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityMessage {
    pub id: String,
    pub sender_id: String,
    /// Display name captured at post time; never re-derived.
    pub sender_name: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaAttachment>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

impl Profile {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation(a: &str, b: &str) -> Conversation {
        let now = Utc::now();
        Conversation {
            id: "c1".into(),
            participants: [a.into(), b.into()],
            last_message: String::new(),
            last_sender_id: None,
            last_message_time: now,
            unread_count: 0,
            created_at: now,
        }
    }

    #[test]
    fn staff_share_the_sentinel_key() {
        assert_eq!(Party::staff("s-42").directory_key(), STAFF_SENTINEL);
        assert_eq!(Party::resident("r-1").directory_key(), "r-1");
    }

    #[test]
    fn any_staff_member_is_admitted_to_a_sentinel_conversation() {
        let conv = conversation("r-1", STAFF_SENTINEL);
        assert!(conv.admits(&Party::resident("r-1")));
        assert!(conv.admits(&Party::staff("s-1")));
        assert!(conv.admits(&Party::staff("s-2")));
        assert!(!conv.admits(&Party::resident("r-2")));
        assert_eq!(conv.resident_id(), Some("r-1"));
    }

    #[test]
    fn media_kind_parsing() {
        assert_eq!("image".parse::<MediaKind>().unwrap(), MediaKind::Image);
        assert_eq!("video".parse::<MediaKind>().unwrap(), MediaKind::Video);
        assert!("audio".parse::<MediaKind>().is_err());
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Staff);
    }
}
