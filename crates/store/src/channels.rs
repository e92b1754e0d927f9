//! Bot and channel records.
//!
//! A channel's `public_id` and `secret` are written once at creation and
//! never regenerated; rotating either means creating a new channel.

use {sqlx::SqlitePool, uuid::Uuid};

use crate::{
    error::{Error, Result},
    now_ms,
};

/// A workspace-scoped bot owning channels and conversations.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BotRecord {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    pub automation_url: Option<String>,
}

/// Internal row type for sqlx mapping.
#[derive(sqlx::FromRow)]
struct ChannelRow {
    id: String,
    bot_id: String,
    workspace_id: String,
    channel_type: String,
    public_id: String,
    secret: Option<String>,
    config: String,
    is_enabled: bool,
    status: String,
    automation_url: Option<String>,
}

/// A channel joined with its bot's automation settings.
#[derive(Debug, Clone)]
pub struct ChannelRecord {
    pub id: String,
    pub bot_id: String,
    pub workspace_id: String,
    pub channel_type: String,
    pub public_id: String,
    pub secret: Option<String>,
    /// Opaque provider credential blob.
    pub config: serde_json::Value,
    pub is_enabled: bool,
    pub status: String,
    /// Automation webhook base inherited from the owning bot.
    pub automation_url: Option<String>,
}

impl TryFrom<ChannelRow> for ChannelRecord {
    type Error = Error;

    fn try_from(r: ChannelRow) -> Result<Self> {
        Ok(Self {
            id: r.id,
            bot_id: r.bot_id,
            workspace_id: r.workspace_id,
            channel_type: r.channel_type,
            public_id: r.public_id,
            secret: r.secret,
            config: serde_json::from_str(&r.config)?,
            is_enabled: r.is_enabled,
            status: r.status,
            automation_url: r.automation_url,
        })
    }
}

/// Parameters for channel creation.
#[derive(Debug, Clone)]
pub struct NewChannel {
    pub bot_id: String,
    pub workspace_id: String,
    pub channel_type: String,
    pub public_id: String,
    pub secret: Option<String>,
    pub config: serde_json::Value,
}

const SELECT_CHANNEL: &str = r#"
    SELECT c.id, c.bot_id, c.workspace_id, c.channel_type, c.public_id,
           c.secret, c.config, c.is_enabled, c.status, b.automation_url
    FROM channels c
    JOIN bots b ON b.id = c.bot_id
"#;

/// SQLite-backed bot/channel store.
#[derive(Clone)]
pub struct ChannelStore {
    pool: SqlitePool,
}

impl ChannelStore {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_bot(
        &self,
        workspace_id: &str,
        name: &str,
        automation_url: Option<&str>,
    ) -> Result<BotRecord> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO bots (id, workspace_id, name, automation_url, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(workspace_id)
        .bind(name)
        .bind(automation_url)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;

        Ok(BotRecord {
            id,
            workspace_id: workspace_id.to_string(),
            name: name.to_string(),
            automation_url: automation_url.map(str::to_string),
        })
    }

    pub async fn create(&self, new: NewChannel) -> Result<ChannelRecord> {
        let id = Uuid::new_v4().to_string();
        let now = now_ms();
        sqlx::query(
            r#"INSERT INTO channels
               (id, bot_id, workspace_id, channel_type, public_id, secret, config,
                created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(&new.bot_id)
        .bind(&new.workspace_id)
        .bind(&new.channel_type)
        .bind(&new.public_id)
        .bind(&new.secret)
        .bind(serde_json::to_string(&new.config)?)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get(&id)
            .await?
            .ok_or_else(|| Error::not_found("channel", id))
    }

    pub async fn get_bot(&self, id: &str) -> Result<Option<BotRecord>> {
        Ok(sqlx::query_as::<_, BotRecord>(
            "SELECT id, workspace_id, name, automation_url FROM bots WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn get(&self, id: &str) -> Result<Option<ChannelRecord>> {
        let row =
            sqlx::query_as::<_, ChannelRow>(&format!("{SELECT_CHANNEL} WHERE c.id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(TryInto::try_into).transpose()
    }

    /// Resolve an enabled channel from its webhook path identity.
    pub async fn find_by_public_id(
        &self,
        channel_type: &str,
        public_id: &str,
    ) -> Result<Option<ChannelRecord>> {
        let row = sqlx::query_as::<_, ChannelRow>(&format!(
            "{SELECT_CHANNEL} WHERE c.channel_type = ? AND c.public_id = ? AND c.is_enabled = 1"
        ))
        .bind(channel_type)
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    /// Resolve the enabled channel a conversation sends through.
    pub async fn find_for_conversation(
        &self,
        bot_id: &str,
        channel_type: &str,
    ) -> Result<Option<ChannelRecord>> {
        let row = sqlx::query_as::<_, ChannelRow>(&format!(
            "{SELECT_CHANNEL} WHERE c.bot_id = ? AND c.channel_type = ? AND c.is_enabled = 1"
        ))
        .bind(bot_id)
        .bind(channel_type)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    /// Record traffic on a channel and refresh its connection status.
    pub async fn mark_activity(&self, id: &str, status: &str) -> Result<()> {
        sqlx::query(
            "UPDATE channels SET last_activity_at = ?, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(now_ms())
        .bind(status)
        .bind(now_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<ChannelRecord>> {
        let rows = sqlx::query_as::<_, ChannelRow>(&format!(
            "{SELECT_CHANNEL} ORDER BY c.created_at"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::init_schema};

    async fn store() -> ChannelStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        init_schema(&pool).await.unwrap();
        ChannelStore::new(pool)
    }

    #[tokio::test]
    async fn create_and_find_by_public_id() {
        let store = store().await;
        let bot = store
            .create_bot("ws-1", "support-bot", Some("https://n8n.example"))
            .await
            .unwrap();
        store
            .create(NewChannel {
                bot_id: bot.id.clone(),
                workspace_id: "ws-1".into(),
                channel_type: "telegram".into(),
                public_id: "pub-tg".into(),
                secret: Some("s3cret".into()),
                config: serde_json::json!({"bot_token": "123:abc"}),
            })
            .await
            .unwrap();

        let found = store
            .find_by_public_id("telegram", "pub-tg")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.bot_id, bot.id);
        assert_eq!(found.secret.as_deref(), Some("s3cret"));
        assert_eq!(found.config["bot_token"], "123:abc");
        assert_eq!(found.automation_url.as_deref(), Some("https://n8n.example"));
    }

    #[tokio::test]
    async fn wrong_type_or_unknown_public_id_misses() {
        let store = store().await;
        let bot = store.create_bot("ws-1", "bot", None).await.unwrap();
        store
            .create(NewChannel {
                bot_id: bot.id,
                workspace_id: "ws-1".into(),
                channel_type: "telegram".into(),
                public_id: "pub-tg".into(),
                secret: None,
                config: serde_json::json!({}),
            })
            .await
            .unwrap();

        assert!(store
            .find_by_public_id("whatsapp", "pub-tg")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .find_by_public_id("telegram", "nope")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn duplicate_public_id_is_rejected() {
        let store = store().await;
        let bot = store.create_bot("ws-1", "bot", None).await.unwrap();
        let new = NewChannel {
            bot_id: bot.id,
            workspace_id: "ws-1".into(),
            channel_type: "telegram".into(),
            public_id: "pub-tg".into(),
            secret: None,
            config: serde_json::json!({}),
        };
        store.create(new.clone()).await.unwrap();
        assert!(store.create(new).await.is_err());
    }

    #[tokio::test]
    async fn mark_activity_updates_status() {
        let store = store().await;
        let bot = store.create_bot("ws-1", "bot", None).await.unwrap();
        let channel = store
            .create(NewChannel {
                bot_id: bot.id,
                workspace_id: "ws-1".into(),
                channel_type: "telegram".into(),
                public_id: "pub-tg".into(),
                secret: None,
                config: serde_json::json!({}),
            })
            .await
            .unwrap();

        store.mark_activity(&channel.id, "connected").await.unwrap();
        let got = store.get(&channel.id).await.unwrap().unwrap();
        assert_eq!(got.status, "connected");
    }
}
