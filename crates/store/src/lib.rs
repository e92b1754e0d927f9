//! SQLite persistence: channels, contacts, conversations, and the
//! append-only message log.
//!
//! The three contention points of ingestion — conversation natural-key
//! upsert, the handoff counter, and first-contact creation — are each a
//! single conditional statement so concurrent duplicate webhook deliveries
//! cannot race application-side read-modify-write logic.

pub mod channels;
pub mod contacts;
pub mod conversations;
pub mod error;
pub mod messages;

use std::time::{SystemTime, UNIX_EPOCH};

pub use {
    channels::{BotRecord, ChannelRecord, ChannelStore, NewChannel},
    contacts::{ContactRecord, ContactStore},
    conversations::{ConversationRecord, ConversationStore, GateDecision},
    error::{Error, Result},
    messages::{MessageRecord, MessageStore, StatusUpgrade},
};

/// Current time in unix milliseconds.
#[must_use]
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Create all tables. Safe to run repeatedly; used both at startup and by
/// tests with in-memory databases.
pub async fn init_schema(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS bots (
            id             TEXT    PRIMARY KEY,
            workspace_id   TEXT    NOT NULL,
            name           TEXT    NOT NULL,
            automation_url TEXT,
            created_at     INTEGER NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS channels (
            id               TEXT    PRIMARY KEY,
            bot_id           TEXT    NOT NULL,
            workspace_id     TEXT    NOT NULL,
            channel_type     TEXT    NOT NULL,
            public_id        TEXT    NOT NULL,
            secret           TEXT,
            config           TEXT    NOT NULL DEFAULT '{}',
            is_enabled       INTEGER NOT NULL DEFAULT 1,
            status           TEXT    NOT NULL DEFAULT 'pending',
            status_message   TEXT,
            last_activity_at INTEGER,
            created_at       INTEGER NOT NULL,
            updated_at       INTEGER NOT NULL,
            UNIQUE (channel_type, public_id)
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS contacts (
            id                   TEXT    PRIMARY KEY,
            workspace_id         TEXT    NOT NULL,
            channel_type         TEXT    NOT NULL,
            external_id          TEXT    NOT NULL,
            name                 TEXT,
            phone                TEXT,
            metadata             TEXT    NOT NULL DEFAULT '{}',
            total_conversations  INTEGER NOT NULL DEFAULT 0,
            last_conversation_at INTEGER,
            last_seen_at         INTEGER NOT NULL,
            created_at           INTEGER NOT NULL,
            updated_at           INTEGER NOT NULL,
            UNIQUE (workspace_id, channel_type, external_id)
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS conversations (
            id                  TEXT    PRIMARY KEY,
            bot_id              TEXT    NOT NULL,
            channel_type        TEXT    NOT NULL,
            external_thread_id  TEXT    NOT NULL,
            contact_id          TEXT,
            status              TEXT    NOT NULL DEFAULT 'bot',
            unread_count        INTEGER NOT NULL DEFAULT 0,
            unanswered_count    INTEGER NOT NULL DEFAULT 0,
            last_user_at        INTEGER,
            last_agent_reply_at INTEGER,
            agent_read_at       INTEGER,
            handoff_reason      TEXT,
            handoff_at          INTEGER,
            message_count       INTEGER NOT NULL DEFAULT 0,
            revision            INTEGER NOT NULL DEFAULT 1,
            created_at          INTEGER NOT NULL,
            updated_at          INTEGER NOT NULL,
            UNIQUE (bot_id, channel_type, external_thread_id)
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS messages (
            id                  TEXT    PRIMARY KEY,
            conversation_id     TEXT    NOT NULL,
            role                TEXT    NOT NULL,
            content             TEXT    NOT NULL,
            raw                 TEXT    NOT NULL DEFAULT '{}',
            provider_message_id TEXT,
            status              TEXT,
            created_at          INTEGER NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_messages_conversation
         ON messages (conversation_id, created_at)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_messages_provider_id
         ON messages (provider_message_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
