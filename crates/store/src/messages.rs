//! Append-only message log with monotonic delivery-status upgrades.

use {sqlx::SqlitePool, tracing::debug, uuid::Uuid};

use courier_common::{DeliveryStatus, MessageRole};

use crate::{
    error::{Error, Result},
    now_ms,
};

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    conversation_id: String,
    role: String,
    content: String,
    raw: String,
    provider_message_id: Option<String>,
    status: Option<String>,
    created_at: i64,
}

#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub raw: serde_json::Value,
    pub provider_message_id: Option<String>,
    pub status: Option<String>,
    pub created_at: i64,
}

impl TryFrom<MessageRow> for MessageRecord {
    type Error = Error;

    fn try_from(r: MessageRow) -> Result<Self> {
        Ok(Self {
            id: r.id,
            conversation_id: r.conversation_id,
            role: r.role,
            content: r.content,
            raw: serde_json::from_str(&r.raw)?,
            provider_message_id: r.provider_message_id,
            status: r.status,
            created_at: r.created_at,
        })
    }
}

/// Outcome of applying a provider delivery receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpgrade {
    /// The stored status moved to a strictly higher rank.
    Upgraded {
        message_id: String,
        conversation_id: String,
    },
    /// The receipt's rank is not above the stored one; nothing changed.
    Stale,
    /// No local message carries this provider id. Receipts can race ahead of
    /// the local write or belong to another workspace's channel, so this is
    /// logged and ignored rather than treated as an error.
    Unknown,
}

/// Lattice rank of a status column value, computed in SQL so the compare and
/// the write are one statement.
const RANK: &str = "CASE {col} WHEN 'failed' THEN 0 WHEN 'sent' THEN 1 \
                    WHEN 'delivered' THEN 2 WHEN 'read' THEN 3 ELSE -1 END";

fn rank_expr(col: &str) -> String {
    RANK.replace("{col}", col)
}

/// SQLite-backed message store.
#[derive(Clone)]
pub struct MessageStore {
    pool: SqlitePool,
}

impl MessageStore {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a message and bump the conversation's message counter.
    pub async fn append(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
        raw: &serde_json::Value,
    ) -> Result<MessageRecord> {
        let id = Uuid::new_v4().to_string();
        let now = now_ms();

        sqlx::query(
            "INSERT INTO messages (id, conversation_id, role, content, raw, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(conversation_id)
        .bind(role.as_str())
        .bind(content)
        .bind(serde_json::to_string(raw)?)
        .bind(now)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "UPDATE conversations SET message_count = message_count + 1, updated_at = ? \
             WHERE id = ?",
        )
        .bind(now)
        .bind(conversation_id)
        .execute(&self.pool)
        .await?;

        self.get(&id)
            .await?
            .ok_or_else(|| Error::not_found("message", id))
    }

    /// Stamp a successfully dispatched message.
    pub async fn mark_sent(&self, message_id: &str, provider_message_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE messages SET provider_message_id = ?, status = 'sent' WHERE id = ?",
        )
        .bind(provider_message_id)
        .bind(message_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, message_id: &str) -> Result<()> {
        sqlx::query("UPDATE messages SET status = 'failed' WHERE id = ?")
            .bind(message_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Apply a delivery receipt under the monotonic lattice rule
    /// `failed < sent < delivered < read`: the write happens only when the
    /// new rank is strictly greater than the stored one.
    pub async fn upgrade_delivery_status(
        &self,
        provider_message_id: &str,
        status: DeliveryStatus,
    ) -> Result<StatusUpgrade> {
        let sql = format!(
            "UPDATE messages SET status = ?1 \
             WHERE provider_message_id = ?2 AND {} < {} \
             RETURNING id, conversation_id",
            rank_expr("status"),
            rank_expr("?1"),
        );

        let upgraded = sqlx::query_as::<_, (String, String)>(&sql)
            .bind(status.as_str())
            .bind(provider_message_id)
            .fetch_optional(&self.pool)
            .await?;

        if let Some((message_id, conversation_id)) = upgraded {
            return Ok(StatusUpgrade::Upgraded {
                message_id,
                conversation_id,
            });
        }

        let exists = sqlx::query_scalar::<_, String>(
            "SELECT id FROM messages WHERE provider_message_id = ? LIMIT 1",
        )
        .bind(provider_message_id)
        .fetch_optional(&self.pool)
        .await?
        .is_some();

        if exists {
            debug!(provider_message_id, new_status = %status, "stale delivery receipt ignored");
            Ok(StatusUpgrade::Stale)
        } else {
            debug!(provider_message_id, "delivery receipt for unknown message");
            Ok(StatusUpgrade::Unknown)
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<MessageRecord>> {
        let row = sqlx::query_as::<_, MessageRow>("SELECT * FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn list(&self, conversation_id: &str) -> Result<Vec<MessageRecord>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT * FROM messages WHERE conversation_id = ? ORDER BY created_at, id",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn count(&self, conversation_id: &str) -> Result<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?",
        )
        .bind(conversation_id)
        .fetch_one(&self.pool)
        .await?)
    }
}
