use crate::Database;
use crate::models::{CommunityMessageRow, ConversationRow, MessageRow, ProfileRow};
use anyhow::Result;
use rusqlite::{Connection, Row};

const CONVERSATION_COLUMNS: &str = "id, participant_a, participant_b, last_message, last_sender_id, \
     last_message_time, unread_count, created_at";

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, sender_id, content, media_url, media_type, read, created_at";

const COMMUNITY_COLUMNS: &str =
    "id, sender_id, sender_name, content, media_url, media_type, created_at";

impl Database {
    // -- Profiles --

    pub fn upsert_profile(&self, id: &str, first_name: &str, last_name: &str, role: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO profiles (id, first_name, last_name, role) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET first_name = ?2, last_name = ?3, role = ?4",
                (id, first_name, last_name, role),
            )?;
            Ok(())
        })
    }

    pub fn get_profile(&self, id: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, first_name, last_name, role FROM profiles WHERE id = ?1",
                [id],
                |row| {
                    Ok(ProfileRow {
                        id: row.get(0)?,
                        first_name: row.get(1)?,
                        last_name: row.get(2)?,
                        role: row.get(3)?,
                    })
                },
            )
            .optional()
        })
    }

    // -- Conversations --

    /// Insert unless a conversation with the same id exists.
    /// Returns true when this call created the row.
    pub fn insert_conversation(&self, row: &ConversationRow) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO conversations
                    (id, participant_a, participant_b, last_message, last_sender_id,
                     last_message_time, unread_count, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    row.id,
                    row.participant_a,
                    row.participant_b,
                    row.last_message,
                    row.last_sender_id,
                    row.last_message_time,
                    row.unread_count,
                    row.created_at,
                ],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| query_conversation(conn, id))
    }

    /// Every conversation `participant` takes part in, unordered.
    pub fn get_conversations_for(&self, participant: &str) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM conversations WHERE participant_a = ?1 OR participant_b = ?1",
                CONVERSATION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([participant], conversation_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_all_conversations(&self) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM conversations", CONVERSATION_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], conversation_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Record the latest message and flag the conversation as unread.
    /// An update older than the stored summary is skipped, so the preview,
    /// sender and time always describe the same message. Returns None when
    /// nothing was written.
    pub fn update_conversation_summary(
        &self,
        id: &str,
        last_message: &str,
        last_sender_id: &str,
        last_message_time: i64,
    ) -> Result<Option<ConversationRow>> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE conversations
                 SET last_message = ?2,
                     last_sender_id = ?3,
                     last_message_time = ?4,
                     unread_count = 1
                 WHERE id = ?1 AND last_message_time <= ?4",
                rusqlite::params![id, last_message, last_sender_id, last_message_time],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_conversation(conn, id)
        })
    }

    /// Reset the unread counter, provided the latest message is still the
    /// one from `seen_sender_id` the reader saw. Returns the updated row, or
    /// None when nothing changed.
    pub fn clear_unread(&self, id: &str, seen_sender_id: Option<&str>) -> Result<Option<ConversationRow>> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE conversations
                 SET unread_count = 0
                 WHERE id = ?1
                   AND unread_count > 0
                   AND last_sender_id IS ?2",
                rusqlite::params![id, seen_sender_id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_conversation(conn, id)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, row: &MessageRow) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages
                    (id, conversation_id, sender_id, content, media_url, media_type, read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    row.id,
                    row.conversation_id,
                    row.sender_id,
                    row.content,
                    row.media_url,
                    row.media_type,
                    row.read,
                    row.created_at,
                ],
            )?;
            Ok(())
        })
    }

    /// Full log of a conversation, oldest first. Equal timestamps keep
    /// insertion order.
    pub fn get_messages(&self, conversation_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM messages WHERE conversation_id = ?1 ORDER BY created_at ASC, seq ASC",
                MESSAGE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([conversation_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Up to `limit` messages older than the `before` message, newest first.
    /// Without a cursor the page ends at the latest message.
    pub fn get_messages_page(
        &self,
        conversation_id: &str,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let rows = match before {
                None => {
                    let sql = format!(
                        "SELECT {} FROM messages WHERE conversation_id = ?1
                         ORDER BY created_at DESC, seq DESC LIMIT ?2",
                        MESSAGE_COLUMNS
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    stmt.query_map(rusqlite::params![conversation_id, limit], message_from_row)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
                Some(cursor) => {
                    let sql = format!(
                        "SELECT {cols} FROM messages m
                         WHERE m.conversation_id = ?1
                           AND EXISTS (
                             SELECT 1 FROM messages c
                             WHERE c.id = ?2 AND c.conversation_id = ?1
                               AND (m.created_at < c.created_at
                                    OR (m.created_at = c.created_at AND m.seq < c.seq))
                           )
                         ORDER BY m.created_at DESC, m.seq DESC LIMIT ?3",
                        cols = MESSAGE_COLUMNS
                            .split(", ")
                            .map(|c| format!("m.{}", c))
                            .collect::<Vec<_>>()
                            .join(", ")
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    stmt.query_map(rusqlite::params![conversation_id, cursor, limit], message_from_row)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
            };
            Ok(rows)
        })
    }

    // -- Community --

    pub fn insert_community_message(&self, row: &CommunityMessageRow) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO community_messages
                    (id, sender_id, sender_name, content, media_url, media_type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    row.id,
                    row.sender_id,
                    row.sender_name,
                    row.content,
                    row.media_url,
                    row.media_type,
                    row.created_at,
                ],
            )?;
            Ok(())
        })
    }

    /// The `limit` most recent community posts, newest first.
    pub fn get_recent_community_messages(&self, limit: u32) -> Result<Vec<CommunityMessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM community_messages ORDER BY created_at DESC, seq DESC LIMIT ?1",
                COMMUNITY_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([limit], |row| {
                    Ok(CommunityMessageRow {
                        id: row.get(0)?,
                        sender_id: row.get(1)?,
                        sender_name: row.get(2)?,
                        content: row.get(3)?,
                        media_url: row.get(4)?,
                        media_type: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_conversation(conn: &Connection, id: &str) -> Result<Option<ConversationRow>> {
    let sql = format!("SELECT {} FROM conversations WHERE id = ?1", CONVERSATION_COLUMNS);
    conn.query_row(&sql, [id], conversation_from_row).optional()
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        participant_a: row.get(1)?,
        participant_b: row.get(2)?,
        last_message: row.get(3)?,
        last_sender_id: row.get(4)?,
        last_message_time: row.get(5)?,
        unread_count: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        content: row.get(3)?,
        media_url: row.get(4)?,
        media_type: row.get(5)?,
        read: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation(id: &str, a: &str, b: &str) -> ConversationRow {
        ConversationRow {
            id: id.into(),
            participant_a: a.into(),
            participant_b: b.into(),
            last_message: "Nouvelle conversation".into(),
            last_sender_id: None,
            last_message_time: 1_000,
            unread_count: 0,
            created_at: 1_000,
        }
    }

    fn message(id: &str, conversation_id: &str, created_at: i64) -> MessageRow {
        MessageRow {
            id: id.into(),
            conversation_id: conversation_id.into(),
            sender_id: "r-1".into(),
            content: format!("body {}", id),
            media_url: None,
            media_type: None,
            read: false,
            created_at,
        }
    }

    #[test]
    fn insert_conversation_is_conditional() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.insert_conversation(&conversation("c1", "r-1", "admin")).unwrap());
        assert!(!db.insert_conversation(&conversation("c1", "r-1", "admin")).unwrap());
        assert_eq!(db.get_conversations_for("admin").unwrap().len(), 1);
        assert_eq!(db.get_conversations_for("r-1").unwrap().len(), 1);
        assert!(db.get_conversations_for("r-2").unwrap().is_empty());
    }

    #[test]
    fn messages_keep_insertion_order_on_equal_timestamps() {
        let db = Database::open_in_memory().unwrap();
        db.insert_conversation(&conversation("c1", "r-1", "admin")).unwrap();
        db.insert_message(&message("m2", "c1", 5)).unwrap();
        db.insert_message(&message("m1", "c1", 5)).unwrap();
        db.insert_message(&message("m0", "c1", 3)).unwrap();

        let ids: Vec<String> = db.get_messages("c1").unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["m0", "m2", "m1"]);
    }

    #[test]
    fn page_walks_backwards_from_cursor() {
        let db = Database::open_in_memory().unwrap();
        db.insert_conversation(&conversation("c1", "r-1", "admin")).unwrap();
        for i in 0..5 {
            db.insert_message(&message(&format!("m{}", i), "c1", i)).unwrap();
        }

        let latest: Vec<String> = db
            .get_messages_page("c1", 2, None)
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(latest, vec!["m4", "m3"]);

        let older: Vec<String> = db
            .get_messages_page("c1", 10, Some("m3"))
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(older, vec!["m2", "m1", "m0"]);
    }

    #[test]
    fn messages_reject_updates_and_deletes() {
        let db = Database::open_in_memory().unwrap();
        db.insert_conversation(&conversation("c1", "r-1", "admin")).unwrap();
        db.insert_message(&message("m1", "c1", 1)).unwrap();

        let update = db.with_conn_mut(|conn| {
            conn.execute("UPDATE messages SET content = 'edited' WHERE id = 'm1'", [])?;
            Ok(())
        });
        assert!(update.is_err());

        let delete = db.with_conn_mut(|conn| {
            conn.execute("DELETE FROM messages WHERE id = 'm1'", [])?;
            Ok(())
        });
        assert!(delete.is_err());
        assert_eq!(db.get_messages("c1").unwrap()[0].content, "body m1");
    }

    #[test]
    fn clear_unread_requires_the_sender_the_reader_saw() {
        let db = Database::open_in_memory().unwrap();
        db.insert_conversation(&conversation("c1", "r-1", "admin")).unwrap();
        db.update_conversation_summary("c1", "Fuite d'eau", "r-1", 2_000).unwrap();

        // A reply from s-1 landed after the reader looked at r-1's message.
        db.update_conversation_summary("c1", "Un technicien va venir", "s-1", 3_000).unwrap();
        assert!(db.clear_unread("c1", Some("r-1")).unwrap().is_none());
        assert_eq!(db.get_conversation("c1").unwrap().unwrap().unread_count, 1);

        let cleared = db.clear_unread("c1", Some("s-1")).unwrap().unwrap();
        assert_eq!(cleared.unread_count, 0);
        assert!(db.clear_unread("c1", Some("s-1")).unwrap().is_none());
    }

    #[test]
    fn older_summary_never_overwrites_a_newer_one() {
        let db = Database::open_in_memory().unwrap();
        db.insert_conversation(&conversation("c1", "r-1", "admin")).unwrap();
        db.update_conversation_summary("c1", "Un technicien va venir", "s-1", 5_000).unwrap();

        let stale = db.update_conversation_summary("c1", "Fuite d'eau", "r-1", 4_000).unwrap();
        assert!(stale.is_none());

        let row = db.get_conversation("c1").unwrap().unwrap();
        assert_eq!(row.last_message, "Un technicien va venir");
        assert_eq!(row.last_sender_id.as_deref(), Some("s-1"));
        assert_eq!(row.last_message_time, 5_000);
    }

    #[test]
    fn file_database_reads_through_reader_pool() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("portal.db")).unwrap();
        db.upsert_profile("r-1", "Awa", "Diallo", "resident").unwrap();
        let profile = db.get_profile("r-1").unwrap().unwrap();
        assert_eq!(profile.first_name, "Awa");
        assert!(db.get_profile("missing").unwrap().is_none());
    }
}
