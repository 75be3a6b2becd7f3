use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (messaging schema)");
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS profiles (
                id          TEXT PRIMARY KEY,
                first_name  TEXT NOT NULL,
                last_name   TEXT NOT NULL,
                role        TEXT NOT NULL
            );

            -- No uniqueness on the participant pair: at-most-one-per-pair is
            -- the directory's job.
            CREATE TABLE conversations (
                id                  TEXT PRIMARY KEY,
                participant_a       TEXT NOT NULL,
                participant_b       TEXT NOT NULL,
                last_message        TEXT NOT NULL,
                last_sender_id      TEXT,
                last_message_time   INTEGER NOT NULL,
                unread_count        INTEGER NOT NULL DEFAULT 0,
                created_at          INTEGER NOT NULL
            );

            CREATE INDEX idx_conversations_a ON conversations(participant_a);
            CREATE INDEX idx_conversations_b ON conversations(participant_b);

            CREATE TABLE messages (
                seq             INTEGER PRIMARY KEY AUTOINCREMENT,
                id              TEXT NOT NULL UNIQUE,
                conversation_id TEXT NOT NULL REFERENCES conversations(id),
                sender_id       TEXT NOT NULL,
                content         TEXT NOT NULL,
                media_url       TEXT,
                media_type      TEXT,
                read            INTEGER NOT NULL DEFAULT 0,
                created_at      INTEGER NOT NULL,
                CHECK ((media_url IS NULL) = (media_type IS NULL))
            );

            CREATE INDEX idx_messages_conversation
                ON messages(conversation_id, created_at, seq);

            CREATE TABLE community_messages (
                seq             INTEGER PRIMARY KEY AUTOINCREMENT,
                id              TEXT NOT NULL UNIQUE,
                sender_id       TEXT NOT NULL,
                sender_name     TEXT NOT NULL,
                content         TEXT NOT NULL,
                media_url       TEXT,
                media_type      TEXT,
                created_at      INTEGER NOT NULL,
                CHECK ((media_url IS NULL) = (media_type IS NULL))
            );

            CREATE INDEX idx_community_created
                ON community_messages(created_at, seq);

            -- Both logs are append-only.
            CREATE TRIGGER messages_no_update BEFORE UPDATE ON messages
                BEGIN SELECT RAISE(ABORT, 'messages are append-only'); END;
            CREATE TRIGGER messages_no_delete BEFORE DELETE ON messages
                BEGIN SELECT RAISE(ABORT, 'messages are append-only'); END;
            CREATE TRIGGER community_no_update BEFORE UPDATE ON community_messages
                BEGIN SELECT RAISE(ABORT, 'community messages are append-only'); END;
            CREATE TRIGGER community_no_delete BEFORE DELETE ON community_messages
                BEGIN SELECT RAISE(ABORT, 'community messages are append-only'); END;

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
