//! Conversation threads and the handoff gatekeeper.
//!
//! The natural key `(bot_id, channel_type, external_thread_id)` is unique,
//! so redelivered webhooks always land on the same row. The gatekeeper's
//! read-decide-write is expressed as conditional UPDATE statements; the
//! decision and the mutation are one indivisible operation per statement.

use {sqlx::SqlitePool, tracing::debug, uuid::Uuid};

use courier_common::ConversationStatus;

use crate::{
    error::{Error, Result},
    now_ms,
};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ConversationRecord {
    pub id: String,
    pub bot_id: String,
    pub channel_type: String,
    pub external_thread_id: String,
    pub contact_id: Option<String>,
    pub status: String,
    pub unread_count: i64,
    pub unanswered_count: i64,
    pub last_user_at: Option<i64>,
    pub last_agent_reply_at: Option<i64>,
    pub agent_read_at: Option<i64>,
    pub handoff_reason: Option<String>,
    pub message_count: i64,
}

impl ConversationRecord {
    #[must_use]
    pub fn is_human(&self) -> bool {
        self.status == ConversationStatus::Human.as_str()
    }
}

/// Outcome of the gatekeeper for one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Forward to the automation engine. `reverted` is set when this event
    /// flipped the conversation from `human` back to `bot`.
    Forward { reverted: bool },
    /// Conversation is owned by a human; persist but do not forward.
    Suppress { unanswered: i64 },
}

impl GateDecision {
    #[must_use]
    pub fn should_forward(&self) -> bool {
        matches!(self, Self::Forward { .. })
    }
}

const SELECT_CONVERSATION: &str = r#"
    SELECT id, bot_id, channel_type, external_thread_id, contact_id, status,
           unread_count, unanswered_count, last_user_at, last_agent_reply_at,
           agent_read_at, handoff_reason, message_count
    FROM conversations
"#;

/// SQLite-backed conversation store.
#[derive(Clone)]
pub struct ConversationStore {
    pool: SqlitePool,
}

impl ConversationStore {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert-or-update on an inbound message, as one atomic statement.
    ///
    /// New threads start at `bot` with one unread message. Existing threads
    /// get `last_user_at` refreshed, the unread counter bumped, the read
    /// marker cleared, and `contact_id` filled only if still unset. The
    /// `revision` counter makes creation detection exact: it is 1 only on
    /// the insert path.
    pub async fn upsert_on_inbound(
        &self,
        bot_id: &str,
        channel_type: &str,
        external_thread_id: &str,
        contact_id: Option<&str>,
    ) -> Result<(String, bool)> {
        let now = now_ms();
        let id = Uuid::new_v4().to_string();

        let (id, revision) = sqlx::query_as::<_, (String, i64)>(
            r#"INSERT INTO conversations
               (id, bot_id, channel_type, external_thread_id, contact_id, status,
                unread_count, last_user_at, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, 'bot', 1, ?, ?, ?)
               ON CONFLICT (bot_id, channel_type, external_thread_id) DO UPDATE SET
                 last_user_at = excluded.last_user_at,
                 unread_count = conversations.unread_count + 1,
                 agent_read_at = NULL,
                 contact_id = COALESCE(conversations.contact_id, excluded.contact_id),
                 revision = conversations.revision + 1,
                 updated_at = excluded.updated_at
               RETURNING id, revision"#,
        )
        .bind(&id)
        .bind(bot_id)
        .bind(channel_type)
        .bind(external_thread_id)
        .bind(contact_id)
        .bind(now)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok((id, revision == 1))
    }

    pub async fn get(&self, id: &str) -> Result<Option<ConversationRecord>> {
        let row = sqlx::query_as::<_, ConversationRecord>(&format!(
            "{SELECT_CONVERSATION} WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Decide whether an inbound message may be forwarded to the automation
    /// engine, mutating the handoff state in the same statements.
    ///
    /// In `human` state the conversation reverts to `bot` when the agent has
    /// been silent longer than `timeout_ms` (a never-replied agent counts as
    /// infinitely silent) OR the unanswered counter has reached
    /// `max_unanswered`; the two triggers are independent. Otherwise the
    /// counter is incremented and the event is suppressed.
    pub async fn gate_inbound(
        &self,
        id: &str,
        now_ms: i64,
        timeout_ms: i64,
        max_unanswered: i64,
    ) -> Result<GateDecision> {
        // Revert-if-due: the condition and the reset are one statement, so
        // two concurrent deliveries cannot both read a stale counter.
        let reverted = sqlx::query(
            r#"UPDATE conversations SET
                 status = 'bot', unanswered_count = 0, updated_at = ?2
               WHERE id = ?1 AND status = 'human'
                 AND (last_agent_reply_at IS NULL
                      OR ?2 - last_agent_reply_at > ?3
                      OR unanswered_count >= ?4)"#,
        )
        .bind(id)
        .bind(now_ms)
        .bind(timeout_ms)
        .bind(max_unanswered)
        .execute(&self.pool)
        .await?
        .rows_affected()
            > 0;

        if reverted {
            debug!(conversation_id = id, "handoff reverted to bot");
            return Ok(GateDecision::Forward { reverted: true });
        }

        // Still human: count this message as unanswered and suppress.
        let unanswered = sqlx::query_scalar::<_, i64>(
            r#"UPDATE conversations SET
                 unanswered_count = unanswered_count + 1, updated_at = ?2
               WHERE id = ?1 AND status = 'human'
               RETURNING unanswered_count"#,
        )
        .bind(id)
        .bind(now_ms)
        .fetch_optional(&self.pool)
        .await?;

        match unanswered {
            Some(unanswered) => Ok(GateDecision::Suppress { unanswered }),
            None => Ok(GateDecision::Forward { reverted: false }),
        }
    }

    /// Operator takes the conversation over. Stamps the agent-activity clock
    /// so the handoff timeout starts counting from now.
    pub async fn take_over(&self, id: &str) -> Result<ConversationRecord> {
        sqlx::query(
            r#"UPDATE conversations SET
                 status = 'human', last_agent_reply_at = ?, unanswered_count = 0, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(now_ms())
        .bind(now_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;
        self.require(id).await
    }

    /// Automation-triggered handoff to a human.
    pub async fn hand_off(&self, id: &str, reason: Option<&str>) -> Result<ConversationRecord> {
        sqlx::query(
            r#"UPDATE conversations SET
                 status = 'human', handoff_at = ?, handoff_reason = ?,
                 unanswered_count = 0, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(now_ms())
        .bind(reason)
        .bind(now_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;
        self.require(id).await
    }

    /// Hand the conversation back to the automation engine.
    pub async fn return_to_bot(&self, id: &str) -> Result<ConversationRecord> {
        sqlx::query(
            "UPDATE conversations SET status = 'bot', unanswered_count = 0, updated_at = ? \
             WHERE id = ?",
        )
        .bind(now_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;
        self.require(id).await
    }

    /// Record an operator reply: refreshes the timeout clock and clears the
    /// unanswered counter.
    pub async fn mark_agent_reply(&self, id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE conversations SET last_agent_reply_at = ?, unanswered_count = 0, \
             updated_at = ? WHERE id = ?",
        )
        .bind(now_ms())
        .bind(now_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Operator opened the thread; clear the unread badge.
    pub async fn mark_read(&self, id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE conversations SET agent_read_at = ?, unread_count = 0, updated_at = ? \
             WHERE id = ?",
        )
        .bind(now_ms())
        .bind(now_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn require(&self, id: &str) -> Result<ConversationRecord> {
        self.get(id)
            .await?
            .ok_or_else(|| Error::not_found("conversation", id))
    }

    /// Test hook: force handoff fields to a known state.
    #[doc(hidden)]
    pub async fn force_handoff_state(
        &self,
        id: &str,
        status: ConversationStatus,
        unanswered_count: i64,
        last_agent_reply_at: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE conversations SET status = ?, unanswered_count = ?, \
             last_agent_reply_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(unanswered_count)
        .bind(last_agent_reply_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::init_schema};

    const TIMEOUT_MS: i64 = 5 * 60 * 1000;
    const MAX_UNANSWERED: i64 = 3;

    async fn store() -> ConversationStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        init_schema(&pool).await.unwrap();
        ConversationStore::new(pool)
    }

    async fn new_conversation(store: &ConversationStore) -> String {
        let (id, created) = store
            .upsert_on_inbound("bot-1", "telegram", "42", Some("contact-1"))
            .await
            .unwrap();
        assert!(created);
        id
    }

    #[tokio::test]
    async fn repeated_deliveries_yield_exactly_one_row() {
        let store = store().await;
        let (first, created) = store
            .upsert_on_inbound("bot-1", "telegram", "42", Some("contact-1"))
            .await
            .unwrap();
        assert!(created);

        for _ in 0..4 {
            let (id, created) = store
                .upsert_on_inbound("bot-1", "telegram", "42", None)
                .await
                .unwrap();
            assert_eq!(id, first);
            assert!(!created);
        }

        let conv = store.get(&first).await.unwrap().unwrap();
        assert_eq!(conv.unread_count, 5);
        assert_eq!(conv.status, "bot");
        // contact_id kept from the first delivery
        assert_eq!(conv.contact_id.as_deref(), Some("contact-1"));
    }

    #[tokio::test]
    async fn distinct_threads_get_distinct_rows() {
        let store = store().await;
        let (a, _) = store
            .upsert_on_inbound("bot-1", "telegram", "42", None)
            .await
            .unwrap();
        let (b, _) = store
            .upsert_on_inbound("bot-1", "telegram", "43", None)
            .await
            .unwrap();
        let (c, _) = store
            .upsert_on_inbound("bot-1", "whatsapp", "42", None)
            .await
            .unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn upsert_clears_read_marker() {
        let store = store().await;
        let id = new_conversation(&store).await;
        store.mark_read(&id).await.unwrap();

        store
            .upsert_on_inbound("bot-1", "telegram", "42", None)
            .await
            .unwrap();
        let conv = store.get(&id).await.unwrap().unwrap();
        assert!(conv.agent_read_at.is_none());
        assert_eq!(conv.unread_count, 1);
    }

    #[tokio::test]
    async fn bot_conversation_always_forwards() {
        let store = store().await;
        let id = new_conversation(&store).await;

        let decision = store
            .gate_inbound(&id, now_ms(), TIMEOUT_MS, MAX_UNANSWERED)
            .await
            .unwrap();
        assert_eq!(decision, GateDecision::Forward { reverted: false });
    }

    #[tokio::test]
    async fn human_conversation_suppresses_and_counts() {
        let store = store().await;
        let id = new_conversation(&store).await;
        let now = now_ms();
        store
            .force_handoff_state(&id, ConversationStatus::Human, 0, Some(now))
            .await
            .unwrap();

        let first = store
            .gate_inbound(&id, now + 1_000, TIMEOUT_MS, MAX_UNANSWERED)
            .await
            .unwrap();
        assert_eq!(first, GateDecision::Suppress { unanswered: 1 });

        let second = store
            .gate_inbound(&id, now + 2_000, TIMEOUT_MS, MAX_UNANSWERED)
            .await
            .unwrap();
        assert_eq!(second, GateDecision::Suppress { unanswered: 2 });
    }

    #[tokio::test]
    async fn unanswered_threshold_reverts_to_bot() {
        let store = store().await;
        let id = new_conversation(&store).await;
        let now = now_ms();
        store
            .force_handoff_state(&id, ConversationStatus::Human, 2, Some(now))
            .await
            .unwrap();

        // Third message: counter reaches 3 but the threshold check ran
        // against 2, so it still suppresses.
        let third = store
            .gate_inbound(&id, now + 1_000, TIMEOUT_MS, MAX_UNANSWERED)
            .await
            .unwrap();
        assert_eq!(third, GateDecision::Suppress { unanswered: 3 });

        // Fourth message sees the counter at the threshold and reverts.
        let fourth = store
            .gate_inbound(&id, now + 2_000, TIMEOUT_MS, MAX_UNANSWERED)
            .await
            .unwrap();
        assert_eq!(fourth, GateDecision::Forward { reverted: true });

        let conv = store.get(&id).await.unwrap().unwrap();
        assert_eq!(conv.status, "bot");
        assert_eq!(conv.unanswered_count, 0);
    }

    #[tokio::test]
    async fn agent_silence_past_timeout_reverts_to_bot() {
        let store = store().await;
        let id = new_conversation(&store).await;
        let agent_replied_at = 1_000_000;
        store
            .force_handoff_state(&id, ConversationStatus::Human, 0, Some(agent_replied_at))
            .await
            .unwrap();

        // 6 minutes later, 5 minute timeout: revert and forward.
        let decision = store
            .gate_inbound(
                &id,
                agent_replied_at + 6 * 60 * 1000,
                TIMEOUT_MS,
                MAX_UNANSWERED,
            )
            .await
            .unwrap();
        assert_eq!(decision, GateDecision::Forward { reverted: true });
        assert_eq!(store.get(&id).await.unwrap().unwrap().status, "bot");
    }

    #[tokio::test]
    async fn never_replied_agent_counts_as_infinite_silence() {
        let store = store().await;
        let id = new_conversation(&store).await;
        store
            .force_handoff_state(&id, ConversationStatus::Human, 0, None)
            .await
            .unwrap();

        let decision = store
            .gate_inbound(&id, now_ms(), TIMEOUT_MS, MAX_UNANSWERED)
            .await
            .unwrap();
        assert_eq!(decision, GateDecision::Forward { reverted: true });
    }

    #[tokio::test]
    async fn recent_agent_reply_keeps_human_ownership() {
        let store = store().await;
        let id = new_conversation(&store).await;
        let now = now_ms();
        store
            .force_handoff_state(&id, ConversationStatus::Human, 0, Some(now))
            .await
            .unwrap();

        let decision = store
            .gate_inbound(&id, now + 60_000, TIMEOUT_MS, MAX_UNANSWERED)
            .await
            .unwrap();
        assert!(!decision.should_forward());
    }

    #[tokio::test]
    async fn take_over_and_return_roundtrip() {
        let store = store().await;
        let id = new_conversation(&store).await;

        let conv = store.take_over(&id).await.unwrap();
        assert!(conv.is_human());
        assert!(conv.last_agent_reply_at.is_some());
        assert_eq!(conv.unanswered_count, 0);

        let conv = store.return_to_bot(&id).await.unwrap();
        assert!(!conv.is_human());
    }

    #[tokio::test]
    async fn hand_off_records_reason() {
        let store = store().await;
        let id = new_conversation(&store).await;

        let conv = store.hand_off(&id, Some("customer asked for a human")).await.unwrap();
        assert!(conv.is_human());
        assert_eq!(
            conv.handoff_reason.as_deref(),
            Some("customer asked for a human")
        );
    }
}
