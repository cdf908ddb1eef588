//! SQLite-backed store

use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::error::StoreError;
use crate::types::{Credential, Identity, Platform, PublishStatus, SocialAccount};

use super::{
    CommentRow, ConversationRow, MessageRow, MetricKey, MetricRow, PostRow, Store,
};

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if necessary) the database at `db_path` and run
    /// migrations.
    pub async fn new(db_path: &str) -> Result<Self, StoreError> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(StoreError::IoError)?;
        }

        // Forward slashes keep the URL valid on Windows; mode=rwc
        // creates the file when absent.
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(StoreError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(StoreError::MigrationError)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Flatten a metric natural key into the UNIQUE column. SQLite treats
/// NULLs as distinct under UNIQUE, so nullable key parts are encoded
/// with a sentinel.
fn metric_key_string(key: &MetricKey) -> String {
    format!(
        "{}|{}|{}|{}|{}",
        key.account_id,
        key.platform_post_id.as_deref().unwrap_or("-"),
        key.metric_type,
        key.period_start
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string()),
        key.period_end
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string()),
    )
}

fn decode_json<T: serde::de::DeserializeOwned>(raw: &str, what: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw)
        .map_err(|e| StoreError::CorruptRow(format!("undecodable {}: {}", what, e)))
}

fn conversation_from_row(r: &sqlx::sqlite::SqliteRow) -> ConversationRow {
    ConversationRow {
        id: r.get("id"),
        account_id: r.get("account_id"),
        platform_conversation_id: r.get("platform_conversation_id"),
        recipient: Identity {
            id: r.get("recipient_id"),
            name: r.get("recipient_name"),
            avatar_url: r.get("recipient_avatar"),
        },
        last_message_at: r.get("last_message_at"),
        read: r.get::<i64, _>("is_read") != 0,
        unread_count: r.get::<Option<i64>, _>("unread_count").map(|v| v as u32),
        snippet: r.get("snippet"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}

fn message_from_row(r: &sqlx::sqlite::SqliteRow) -> Result<MessageRow, StoreError> {
    Ok(MessageRow {
        id: r.get("id"),
        conversation_id: r.get("conversation_id"),
        platform_message_id: r.get("platform_message_id"),
        sender: Identity {
            id: r.get("sender_id"),
            name: r.get("sender_name"),
            avatar_url: r.get("sender_avatar"),
        },
        body: r.get("body"),
        attachments: decode_json(r.get::<String, _>("attachments").as_str(), "attachments")?,
        from_me: r.get::<i64, _>("from_me") != 0,
        read: r.get::<i64, _>("is_read") != 0,
        sent_at: r.get("sent_at"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

fn comment_from_row(r: &sqlx::sqlite::SqliteRow) -> CommentRow {
    CommentRow {
        id: r.get("id"),
        account_id: r.get("account_id"),
        post_id: r.get("post_id"),
        platform_post_id: r.get("platform_post_id"),
        platform_comment_id: r.get("platform_comment_id"),
        parent_comment_id: r.get("parent_comment_id"),
        author: Identity {
            id: r.get("author_id"),
            name: r.get("author_name"),
            avatar_url: r.get("author_avatar"),
        },
        body: r.get("body"),
        is_reply: r.get::<i64, _>("is_reply") != 0,
        like_count: r.get("like_count"),
        reply_count: r.get("reply_count"),
        counters_touched_at: r.get("counters_touched_at"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}

fn post_from_row(r: &sqlx::sqlite::SqliteRow) -> Result<PostRow, StoreError> {
    let status: String = r.get("status");
    Ok(PostRow {
        id: r.get("id"),
        account_id: r.get("account_id"),
        platform_post_id: r.get("platform_post_id"),
        content: r.get("content"),
        media_urls: decode_json(r.get::<String, _>("media_urls").as_str(), "media_urls")?,
        status: status
            .parse::<PublishStatus>()
            .map_err(StoreError::CorruptRow)?,
        scheduled_at: r.get("scheduled_at"),
        published_at: r.get("published_at"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

fn metric_from_row(r: &sqlx::sqlite::SqliteRow) -> Result<MetricRow, StoreError> {
    Ok(MetricRow {
        id: r.get("id"),
        account_id: r.get("account_id"),
        platform_post_id: r.get("platform_post_id"),
        metric_type: r.get("metric_type"),
        value: decode_json(r.get::<String, _>("value").as_str(), "metric value")?,
        period_start: r.get("period_start"),
        period_end: r.get("period_end"),
        updated_at: r.get("updated_at"),
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_account(&self, account: &SocialAccount) -> Result<(), StoreError> {
        let metadata = serde_json::to_string(&account.metadata)
            .map_err(|e| StoreError::CorruptRow(format!("unencodable metadata: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO accounts (id, platform, owner_id, access_token, refresh_token, token_secret, expires_at, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                token_secret = excluded.token_secret,
                expires_at = excluded.expires_at,
                metadata = excluded.metadata
            "#,
        )
        .bind(&account.id)
        .bind(account.platform.as_str())
        .bind(&account.owner_id)
        .bind(&account.credential.access_token)
        .bind(&account.credential.refresh_token)
        .bind(&account.credential.token_secret)
        .bind(account.credential.expires_at)
        .bind(metadata)
        .execute(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        Ok(())
    }

    async fn find_account(&self, account_id: &str) -> Result<Option<SocialAccount>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, platform, owner_id, access_token, refresh_token, token_secret, expires_at, metadata
            FROM accounts WHERE id = ?
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        let Some(r) = row else { return Ok(None) };

        let platform: String = r.get("platform");
        Ok(Some(SocialAccount {
            id: r.get("id"),
            platform: platform
                .parse::<Platform>()
                .map_err(StoreError::CorruptRow)?,
            owner_id: r.get("owner_id"),
            credential: Credential {
                access_token: r.get("access_token"),
                refresh_token: r.get("refresh_token"),
                token_secret: r.get("token_secret"),
                expires_at: r.get("expires_at"),
            },
            metadata: decode_json(r.get::<String, _>("metadata").as_str(), "metadata")?,
        }))
    }

    async fn upsert_conversation(&self, row: &ConversationRow) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO conversations (id, account_id, platform_conversation_id, recipient_id,
                recipient_name, recipient_avatar, last_message_at, is_read, unread_count, snippet,
                created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(account_id, platform_conversation_id) DO UPDATE SET
                recipient_id = excluded.recipient_id,
                recipient_name = excluded.recipient_name,
                recipient_avatar = excluded.recipient_avatar,
                last_message_at = excluded.last_message_at,
                is_read = excluded.is_read,
                unread_count = excluded.unread_count,
                snippet = excluded.snippet,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&row.id)
        .bind(&row.account_id)
        .bind(&row.platform_conversation_id)
        .bind(&row.recipient.id)
        .bind(&row.recipient.name)
        .bind(&row.recipient.avatar_url)
        .bind(row.last_message_at)
        .bind(row.read as i64)
        .bind(row.unread_count.map(|v| v as i64))
        .bind(&row.snippet)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        Ok(())
    }

    async fn find_conversation(
        &self,
        account_id: &str,
        platform_conversation_id: &str,
    ) -> Result<Option<ConversationRow>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM conversations
            WHERE account_id = ? AND platform_conversation_id = ?
            "#,
        )
        .bind(account_id)
        .bind(platform_conversation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        Ok(row.as_ref().map(conversation_from_row))
    }

    async fn list_conversations(
        &self,
        account_id: &str,
    ) -> Result<Vec<ConversationRow>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM conversations
            WHERE account_id = ?
            ORDER BY last_message_at DESC
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        Ok(rows.iter().map(conversation_from_row).collect())
    }

    async fn upsert_message(&self, row: &MessageRow) -> Result<(), StoreError> {
        let attachments = serde_json::to_string(&row.attachments)
            .map_err(|e| StoreError::CorruptRow(format!("unencodable attachments: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, platform_message_id, sender_id, sender_name,
                sender_avatar, body, attachments, from_me, is_read, sent_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(conversation_id, platform_message_id) DO UPDATE SET
                sender_id = excluded.sender_id,
                sender_name = excluded.sender_name,
                sender_avatar = excluded.sender_avatar,
                body = excluded.body,
                attachments = excluded.attachments,
                from_me = excluded.from_me,
                is_read = excluded.is_read,
                sent_at = excluded.sent_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&row.id)
        .bind(&row.conversation_id)
        .bind(&row.platform_message_id)
        .bind(&row.sender.id)
        .bind(&row.sender.name)
        .bind(&row.sender.avatar_url)
        .bind(&row.body)
        .bind(attachments)
        .bind(row.from_me as i64)
        .bind(row.read as i64)
        .bind(row.sent_at)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        Ok(())
    }

    async fn find_message(
        &self,
        conversation_id: &str,
        platform_message_id: &str,
    ) -> Result<Option<MessageRow>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM messages
            WHERE conversation_id = ? AND platform_message_id = ?
            "#,
        )
        .bind(conversation_id)
        .bind(platform_message_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        row.as_ref().map(message_from_row).transpose()
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<MessageRow>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM messages
            WHERE conversation_id = ?
            ORDER BY sent_at ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        rows.iter().map(message_from_row).collect()
    }

    async fn upsert_comment(&self, row: &CommentRow) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO comments (id, account_id, post_id, platform_post_id, platform_comment_id,
                parent_comment_id, author_id, author_name, author_avatar, body, is_reply,
                like_count, reply_count, counters_touched_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(account_id, platform_comment_id) DO UPDATE SET
                post_id = excluded.post_id,
                parent_comment_id = excluded.parent_comment_id,
                author_id = excluded.author_id,
                author_name = excluded.author_name,
                author_avatar = excluded.author_avatar,
                body = excluded.body,
                is_reply = excluded.is_reply,
                like_count = excluded.like_count,
                reply_count = excluded.reply_count,
                counters_touched_at = excluded.counters_touched_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&row.id)
        .bind(&row.account_id)
        .bind(&row.post_id)
        .bind(&row.platform_post_id)
        .bind(&row.platform_comment_id)
        .bind(&row.parent_comment_id)
        .bind(&row.author.id)
        .bind(&row.author.name)
        .bind(&row.author.avatar_url)
        .bind(&row.body)
        .bind(row.is_reply as i64)
        .bind(row.like_count)
        .bind(row.reply_count)
        .bind(row.counters_touched_at)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        Ok(())
    }

    async fn find_comment(
        &self,
        account_id: &str,
        platform_comment_id: &str,
    ) -> Result<Option<CommentRow>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM comments
            WHERE account_id = ? AND platform_comment_id = ?
            "#,
        )
        .bind(account_id)
        .bind(platform_comment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        Ok(row.as_ref().map(comment_from_row))
    }

    async fn list_comments(
        &self,
        account_id: &str,
        platform_post_id: &str,
    ) -> Result<Vec<CommentRow>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM comments
            WHERE account_id = ? AND platform_post_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(account_id)
        .bind(platform_post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        Ok(rows.iter().map(comment_from_row).collect())
    }

    async fn upsert_post(&self, row: &PostRow) -> Result<(), StoreError> {
        let media_urls = serde_json::to_string(&row.media_urls)
            .map_err(|e| StoreError::CorruptRow(format!("unencodable media urls: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO posts (id, account_id, platform_post_id, content, media_urls, status,
                scheduled_at, published_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(account_id, platform_post_id) DO UPDATE SET
                content = excluded.content,
                media_urls = excluded.media_urls,
                status = excluded.status,
                scheduled_at = excluded.scheduled_at,
                published_at = excluded.published_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&row.id)
        .bind(&row.account_id)
        .bind(&row.platform_post_id)
        .bind(&row.content)
        .bind(media_urls)
        .bind(row.status.as_str())
        .bind(row.scheduled_at)
        .bind(row.published_at)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        Ok(())
    }

    async fn find_post(
        &self,
        account_id: &str,
        platform_post_id: &str,
    ) -> Result<Option<PostRow>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM posts
            WHERE account_id = ? AND platform_post_id = ?
            "#,
        )
        .bind(account_id)
        .bind(platform_post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        row.as_ref().map(post_from_row).transpose()
    }

    async fn list_posts(&self, account_id: &str) -> Result<Vec<PostRow>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM posts
            WHERE account_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        rows.iter().map(post_from_row).collect()
    }

    async fn upsert_metric(&self, row: &MetricRow) -> Result<(), StoreError> {
        let value = serde_json::to_string(&row.value)
            .map_err(|e| StoreError::CorruptRow(format!("unencodable metric value: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO metrics (id, metric_key, account_id, platform_post_id, metric_type, value,
                period_start, period_end, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(metric_key) DO UPDATE SET
                value = excluded.value,
                period_start = excluded.period_start,
                period_end = excluded.period_end,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&row.id)
        .bind(metric_key_string(&row.key()))
        .bind(&row.account_id)
        .bind(&row.platform_post_id)
        .bind(&row.metric_type)
        .bind(value)
        .bind(row.period_start)
        .bind(row.period_end)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        Ok(())
    }

    async fn find_metric(&self, key: &MetricKey) -> Result<Option<MetricRow>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM metrics WHERE metric_key = ?
            "#,
        )
        .bind(metric_key_string(key))
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        row.as_ref().map(metric_from_row).transpose()
    }

    async fn list_metrics(&self, account_id: &str) -> Result<Vec<MetricRow>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM metrics WHERE account_id = ?
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        rows.iter().map(metric_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, SqliteStore) {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("socialhub.db");
        let store = SqliteStore::new(&path.to_string_lossy()).await.unwrap();
        (temp, store)
    }

    fn sample_account() -> SocialAccount {
        let mut account = SocialAccount::new(
            Platform::LinkedIn,
            "owner-1".to_string(),
            Credential {
                access_token: "at".to_string(),
                refresh_token: Some("rt".to_string()),
                token_secret: None,
                expires_at: Some(1_800_000_000),
            },
        );
        account
            .metadata
            .insert("organization_urn".to_string(), "urn:li:organization:7".to_string());
        account
    }

    #[tokio::test]
    async fn test_account_roundtrip() {
        let (_temp, store) = setup().await;
        let account = sample_account();
        store.upsert_account(&account).await.unwrap();

        let found = store.find_account(&account.id).await.unwrap().unwrap();
        assert_eq!(found.platform, Platform::LinkedIn);
        assert_eq!(found.credential.refresh_token.as_deref(), Some("rt"));
        assert_eq!(
            found.metadata.get("organization_urn").unwrap(),
            "urn:li:organization:7"
        );
    }

    #[tokio::test]
    async fn test_account_upsert_replaces_credential() {
        let (_temp, store) = setup().await;
        let mut account = sample_account();
        store.upsert_account(&account).await.unwrap();

        account.credential.access_token = "at2".to_string();
        store.upsert_account(&account).await.unwrap();

        let found = store.find_account(&account.id).await.unwrap().unwrap();
        assert_eq!(found.credential.access_token, "at2");
    }

    #[tokio::test]
    async fn test_conversation_natural_key_upsert() {
        let (_temp, store) = setup().await;
        let mut row = ConversationRow {
            id: "c-local".to_string(),
            account_id: "a1".to_string(),
            platform_conversation_id: "t_9".to_string(),
            recipient: Identity {
                id: "peer".to_string(),
                name: Some("Peer".to_string()),
                avatar_url: None,
            },
            last_message_at: 100,
            read: false,
            unread_count: Some(2),
            snippet: Some("hey".to_string()),
            created_at: 100,
            updated_at: 100,
        };
        store.upsert_conversation(&row).await.unwrap();

        // Same natural key, different local id: must update in place.
        row.id = "c-other".to_string();
        row.last_message_at = 200;
        row.read = true;
        store.upsert_conversation(&row).await.unwrap();

        let rows = store.list_conversations("a1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "c-local", "local id is immutable on upsert");
        assert_eq!(rows[0].last_message_at, 200);
        assert!(rows[0].read);
    }

    #[tokio::test]
    async fn test_message_attachments_roundtrip() {
        let (_temp, store) = setup().await;
        let row = MessageRow {
            id: "m-local".to_string(),
            conversation_id: "c1".to_string(),
            platform_message_id: "mid_1".to_string(),
            sender: Identity::bare("peer"),
            body: "photo".to_string(),
            attachments: vec!["https://cdn.example/a.jpg".to_string()],
            from_me: false,
            read: false,
            sent_at: 50,
            created_at: 50,
            updated_at: 50,
        };
        store.upsert_message(&row).await.unwrap();

        let found = store.find_message("c1", "mid_1").await.unwrap().unwrap();
        assert_eq!(found.attachments, vec!["https://cdn.example/a.jpg"]);
        assert!(!found.from_me);
    }

    #[tokio::test]
    async fn test_post_status_roundtrip() {
        let (_temp, store) = setup().await;
        let mut row = PostRow {
            id: "p-local".to_string(),
            account_id: "a1".to_string(),
            platform_post_id: "post_1".to_string(),
            content: "hello".to_string(),
            media_urls: vec![],
            status: PublishStatus::Published,
            scheduled_at: None,
            published_at: Some(123),
            created_at: 123,
            updated_at: 123,
        };
        store.upsert_post(&row).await.unwrap();

        row.status = PublishStatus::Deleted;
        store.upsert_post(&row).await.unwrap();

        let found = store.find_post("a1", "post_1").await.unwrap().unwrap();
        assert_eq!(found.status, PublishStatus::Deleted);
        assert_eq!(
            store.list_posts("a1").await.unwrap().len(),
            1,
            "delete is a soft transition, row stays"
        );
    }

    #[tokio::test]
    async fn test_metric_key_upsert_with_nullable_parts() {
        let (_temp, store) = setup().await;
        let mut row = MetricRow {
            id: "m-local".to_string(),
            account_id: "a1".to_string(),
            platform_post_id: None,
            metric_type: "followers".to_string(),
            value: serde_json::json!({ "total": 10 }),
            period_start: None,
            period_end: None,
            updated_at: 1,
        };
        store.upsert_metric(&row).await.unwrap();

        row.value = serde_json::json!({ "total": 12 });
        store.upsert_metric(&row).await.unwrap();

        let found = store.find_metric(&row.key()).await.unwrap().unwrap();
        assert_eq!(found.value["total"], 12);
        assert_eq!(store.list_metrics("a1").await.unwrap().len(), 1);
    }
}
