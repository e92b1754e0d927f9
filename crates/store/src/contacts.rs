//! Durable contact records keyed by `(workspace, channel type, external id)`.

use {sqlx::SqlitePool, uuid::Uuid};

use courier_common::SenderProfile;

use crate::{
    error::{Error, Result},
    now_ms,
};

#[derive(sqlx::FromRow)]
struct ContactRow {
    id: String,
    workspace_id: String,
    channel_type: String,
    external_id: String,
    name: Option<String>,
    phone: Option<String>,
    metadata: String,
    total_conversations: i64,
    last_seen_at: i64,
}

#[derive(Debug, Clone)]
pub struct ContactRecord {
    pub id: String,
    pub workspace_id: String,
    pub channel_type: String,
    pub external_id: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub metadata: serde_json::Value,
    pub total_conversations: i64,
    pub last_seen_at: i64,
}

impl TryFrom<ContactRow> for ContactRecord {
    type Error = Error;

    fn try_from(r: ContactRow) -> Result<Self> {
        Ok(Self {
            id: r.id,
            workspace_id: r.workspace_id,
            channel_type: r.channel_type,
            external_id: r.external_id,
            name: r.name,
            phone: r.phone,
            metadata: serde_json::from_str(&r.metadata)?,
            total_conversations: r.total_conversations,
            last_seen_at: r.last_seen_at,
        })
    }
}

/// SQLite-backed contact store.
#[derive(Clone)]
pub struct ContactStore {
    pool: SqlitePool,
}

impl ContactStore {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Find or create a contact for an inbound sender.
    ///
    /// Creation is a conditional insert on the natural key, so concurrent
    /// first-contact arrivals collapse to a single row. On an existing
    /// match, `last_seen_at` is refreshed, the profile is merged into
    /// metadata field-by-field (last write wins), and the display name is
    /// overwritten only when a non-empty name is available this time.
    pub async fn find_or_create(
        &self,
        workspace_id: &str,
        channel_type: &str,
        external_id: &str,
        profile: &SenderProfile,
    ) -> Result<(String, bool)> {
        let now = now_ms();
        let name = profile.display_name().unwrap_or_default();
        let metadata = serde_json::to_string(&profile.raw)?;

        let id = Uuid::new_v4().to_string();
        let inserted = sqlx::query(
            r#"INSERT INTO contacts
               (id, workspace_id, channel_type, external_id, name, phone, metadata,
                last_seen_at, created_at, updated_at)
               VALUES (?, ?, ?, ?, NULLIF(?, ''), ?, ?, ?, ?, ?)
               ON CONFLICT (workspace_id, channel_type, external_id) DO NOTHING"#,
        )
        .bind(&id)
        .bind(workspace_id)
        .bind(channel_type)
        .bind(external_id)
        .bind(name)
        .bind(&profile.phone)
        .bind(&metadata)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted > 0 {
            return Ok((id, true));
        }

        let existing = sqlx::query_scalar::<_, String>(
            r#"UPDATE contacts SET
                 last_seen_at = ?,
                 updated_at = ?,
                 metadata = json_patch(metadata, ?),
                 name = COALESCE(NULLIF(?, ''), name)
               WHERE workspace_id = ? AND channel_type = ? AND external_id = ?
               RETURNING id"#,
        )
        .bind(now)
        .bind(now)
        .bind(&metadata)
        .bind(name)
        .bind(workspace_id)
        .bind(channel_type)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("contact", external_id))?;

        Ok((existing, false))
    }

    /// Bump contact stats when a new conversation is opened for them.
    pub async fn link_conversation(&self, contact_id: &str) -> Result<()> {
        sqlx::query(
            r#"UPDATE contacts SET
                 total_conversations = total_conversations + 1,
                 last_conversation_at = ?
               WHERE id = ?"#,
        )
        .bind(now_ms())
        .bind(contact_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<ContactRecord>> {
        let row = sqlx::query_as::<_, ContactRow>(
            r#"SELECT id, workspace_id, channel_type, external_id, name, phone, metadata,
                      total_conversations, last_seen_at
               FROM contacts WHERE id = ?"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {serde_json::json, super::*, crate::init_schema};

    async fn store() -> ContactStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        init_schema(&pool).await.unwrap();
        ContactStore::new(pool)
    }

    fn profile(name: Option<&str>, phone: Option<&str>) -> SenderProfile {
        SenderProfile {
            name: name.map(str::to_string),
            username: None,
            phone: phone.map(str::to_string),
            raw: json!({"name": name}),
        }
    }

    #[tokio::test]
    async fn first_contact_creates_row() {
        let store = store().await;
        let (id, created) = store
            .find_or_create("ws-1", "whatsapp", "628123", &profile(Some("Budi"), Some("+628123")))
            .await
            .unwrap();
        assert!(created);

        let contact = store.get(&id).await.unwrap().unwrap();
        assert_eq!(contact.name.as_deref(), Some("Budi"));
        assert_eq!(contact.phone.as_deref(), Some("+628123"));
    }

    #[tokio::test]
    async fn repeat_arrival_resolves_to_same_row() {
        let store = store().await;
        let (first, created_first) = store
            .find_or_create("ws-1", "telegram", "42", &profile(Some("Ana"), None))
            .await
            .unwrap();
        let (second, created_second) = store
            .find_or_create("ws-1", "telegram", "42", &profile(Some("Ana"), None))
            .await
            .unwrap();

        assert!(created_first);
        assert!(!created_second);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn empty_name_never_overwrites() {
        let store = store().await;
        let (id, _) = store
            .find_or_create("ws-1", "telegram", "42", &profile(Some("Ana"), None))
            .await
            .unwrap();

        store
            .find_or_create("ws-1", "telegram", "42", &profile(None, None))
            .await
            .unwrap();
        let contact = store.get(&id).await.unwrap().unwrap();
        assert_eq!(contact.name.as_deref(), Some("Ana"));

        store
            .find_or_create("ws-1", "telegram", "42", &profile(Some("Ana W"), None))
            .await
            .unwrap();
        let contact = store.get(&id).await.unwrap().unwrap();
        assert_eq!(contact.name.as_deref(), Some("Ana W"));
    }

    #[tokio::test]
    async fn metadata_merges_field_by_field() {
        let store = store().await;
        let mut profile_a = profile(Some("Ana"), None);
        profile_a.raw = json!({"username": "anaw", "lang": "id"});
        let (id, _) = store
            .find_or_create("ws-1", "telegram", "42", &profile_a)
            .await
            .unwrap();

        let mut profile_b = profile(Some("Ana"), None);
        profile_b.raw = json!({"lang": "en"});
        store
            .find_or_create("ws-1", "telegram", "42", &profile_b)
            .await
            .unwrap();

        let contact = store.get(&id).await.unwrap().unwrap();
        assert_eq!(contact.metadata["username"], "anaw");
        assert_eq!(contact.metadata["lang"], "en");
    }

    #[tokio::test]
    async fn distinct_channels_get_distinct_contacts() {
        let store = store().await;
        let (a, _) = store
            .find_or_create("ws-1", "telegram", "42", &profile(Some("Ana"), None))
            .await
            .unwrap();
        let (b, _) = store
            .find_or_create("ws-1", "whatsapp", "42", &profile(Some("Ana"), None))
            .await
            .unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn link_conversation_bumps_stats() {
        let store = store().await;
        let (id, _) = store
            .find_or_create("ws-1", "telegram", "42", &profile(Some("Ana"), None))
            .await
            .unwrap();

        store.link_conversation(&id).await.unwrap();
        store.link_conversation(&id).await.unwrap();

        let contact = store.get(&id).await.unwrap().unwrap();
        assert_eq!(contact.total_conversations, 2);
    }
}
