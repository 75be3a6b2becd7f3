/// Database row types, mapped directly from SQLite rows. Timestamps are Unix
/// milliseconds. Distinct from concierge-types models to keep the DB layer
/// independent.

pub struct ProfileRow {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
}

pub struct ConversationRow {
    pub id: String,
    pub participant_a: String,
    pub participant_b: String,
    pub last_message: String,
    pub last_sender_id: Option<String>,
    pub last_message_time: i64,
    pub unread_count: i64,
    pub created_at: i64,
}

pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
    pub read: bool,
    pub created_at: i64,
}

pub struct CommunityMessageRow {
    pub id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
    pub created_at: i64,
}
