//! In-memory store
//!
//! Backs the integration tests and embedders that do not need
//! persistence. Keyed exactly like the sqlite store; shared via `Arc`
//! and safe under concurrent upserts.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::SocialAccount;

use super::{
    CommentRow, ConversationRow, MessageRow, MetricKey, MetricRow, PostRow, Store,
};

#[derive(Default)]
struct Inner {
    accounts: HashMap<String, SocialAccount>,
    // (account_id, platform_conversation_id) → row
    conversations: HashMap<(String, String), ConversationRow>,
    // (conversation_id, platform_message_id) → row
    messages: HashMap<(String, String), MessageRow>,
    // (account_id, platform_comment_id) → row
    comments: HashMap<(String, String), CommentRow>,
    // (account_id, platform_post_id) → row
    posts: HashMap<(String, String), PostRow>,
    metrics: HashMap<MetricKey, MetricRow>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Lock poisoning only happens after a panicking test thread;
        // propagate the panic rather than limp along.
        self.inner.lock().unwrap()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_account(&self, account: &SocialAccount) -> Result<(), StoreError> {
        self.lock()
            .accounts
            .insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn find_account(&self, account_id: &str) -> Result<Option<SocialAccount>, StoreError> {
        Ok(self.lock().accounts.get(account_id).cloned())
    }

    async fn upsert_conversation(&self, row: &ConversationRow) -> Result<(), StoreError> {
        let key = (row.account_id.clone(), row.platform_conversation_id.clone());
        self.lock().conversations.insert(key, row.clone());
        Ok(())
    }

    async fn find_conversation(
        &self,
        account_id: &str,
        platform_conversation_id: &str,
    ) -> Result<Option<ConversationRow>, StoreError> {
        let key = (
            account_id.to_string(),
            platform_conversation_id.to_string(),
        );
        Ok(self.lock().conversations.get(&key).cloned())
    }

    async fn list_conversations(
        &self,
        account_id: &str,
    ) -> Result<Vec<ConversationRow>, StoreError> {
        let mut rows: Vec<_> = self
            .lock()
            .conversations
            .values()
            .filter(|row| row.account_id == account_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        Ok(rows)
    }

    async fn upsert_message(&self, row: &MessageRow) -> Result<(), StoreError> {
        let key = (row.conversation_id.clone(), row.platform_message_id.clone());
        self.lock().messages.insert(key, row.clone());
        Ok(())
    }

    async fn find_message(
        &self,
        conversation_id: &str,
        platform_message_id: &str,
    ) -> Result<Option<MessageRow>, StoreError> {
        let key = (conversation_id.to_string(), platform_message_id.to_string());
        Ok(self.lock().messages.get(&key).cloned())
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<MessageRow>, StoreError> {
        let mut rows: Vec<_> = self
            .lock()
            .messages
            .values()
            .filter(|row| row.conversation_id == conversation_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.sent_at.cmp(&b.sent_at));
        Ok(rows)
    }

    async fn upsert_comment(&self, row: &CommentRow) -> Result<(), StoreError> {
        let key = (row.account_id.clone(), row.platform_comment_id.clone());
        self.lock().comments.insert(key, row.clone());
        Ok(())
    }

    async fn find_comment(
        &self,
        account_id: &str,
        platform_comment_id: &str,
    ) -> Result<Option<CommentRow>, StoreError> {
        let key = (account_id.to_string(), platform_comment_id.to_string());
        Ok(self.lock().comments.get(&key).cloned())
    }

    async fn list_comments(
        &self,
        account_id: &str,
        platform_post_id: &str,
    ) -> Result<Vec<CommentRow>, StoreError> {
        let mut rows: Vec<_> = self
            .lock()
            .comments
            .values()
            .filter(|row| row.account_id == account_id && row.platform_post_id == platform_post_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }

    async fn upsert_post(&self, row: &PostRow) -> Result<(), StoreError> {
        let key = (row.account_id.clone(), row.platform_post_id.clone());
        self.lock().posts.insert(key, row.clone());
        Ok(())
    }

    async fn find_post(
        &self,
        account_id: &str,
        platform_post_id: &str,
    ) -> Result<Option<PostRow>, StoreError> {
        let key = (account_id.to_string(), platform_post_id.to_string());
        Ok(self.lock().posts.get(&key).cloned())
    }

    async fn list_posts(&self, account_id: &str) -> Result<Vec<PostRow>, StoreError> {
        let mut rows: Vec<_> = self
            .lock()
            .posts
            .values()
            .filter(|row| row.account_id == account_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn upsert_metric(&self, row: &MetricRow) -> Result<(), StoreError> {
        self.lock().metrics.insert(row.key(), row.clone());
        Ok(())
    }

    async fn find_metric(&self, key: &MetricKey) -> Result<Option<MetricRow>, StoreError> {
        Ok(self.lock().metrics.get(key).cloned())
    }

    async fn list_metrics(&self, account_id: &str) -> Result<Vec<MetricRow>, StoreError> {
        Ok(self
            .lock()
            .metrics
            .values()
            .filter(|row| row.account_id == account_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Credential, Identity, Platform};

    fn conversation(account: &str, pcid: &str, last: i64) -> ConversationRow {
        ConversationRow {
            id: uuid::Uuid::new_v4().to_string(),
            account_id: account.to_string(),
            platform_conversation_id: pcid.to_string(),
            recipient: Identity::bare("peer"),
            last_message_at: last,
            read: false,
            unread_count: None,
            snippet: None,
            created_at: last,
            updated_at: last,
        }
    }

    #[tokio::test]
    async fn test_account_roundtrip() {
        let store = MemoryStore::new();
        let account = SocialAccount::new(
            Platform::Facebook,
            "owner".to_string(),
            Credential::new("tok".to_string()),
        );
        store.upsert_account(&account).await.unwrap();
        let found = store.find_account(&account.id).await.unwrap().unwrap();
        assert_eq!(found.owner_id, "owner");
        assert!(store.find_account("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_conversation_upsert_replaces_by_key() {
        let store = MemoryStore::new();
        let mut row = conversation("a1", "t_1", 100);
        store.upsert_conversation(&row).await.unwrap();

        row.last_message_at = 200;
        store.upsert_conversation(&row).await.unwrap();

        let rows = store.list_conversations("a1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].last_message_at, 200);
    }

    #[tokio::test]
    async fn test_list_conversations_newest_first() {
        let store = MemoryStore::new();
        store
            .upsert_conversation(&conversation("a1", "t_old", 100))
            .await
            .unwrap();
        store
            .upsert_conversation(&conversation("a1", "t_new", 300))
            .await
            .unwrap();
        store
            .upsert_conversation(&conversation("other", "t_x", 999))
            .await
            .unwrap();

        let rows = store.list_conversations("a1").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].platform_conversation_id, "t_new");
    }

    #[tokio::test]
    async fn test_post_metric_rolls_forward() {
        let store = MemoryStore::new();
        let mut row = MetricRow {
            id: "m".to_string(),
            account_id: "a1".to_string(),
            platform_post_id: Some("p1".to_string()),
            metric_type: "impressions".to_string(),
            value: serde_json::json!(10),
            period_start: Some(0),
            period_end: Some(100),
            updated_at: 1,
        };
        store.upsert_metric(&row).await.unwrap();

        row.value = serde_json::json!(25);
        row.period_start = Some(100);
        row.period_end = Some(200);
        store.upsert_metric(&row).await.unwrap();

        let rows = store.list_metrics("a1").await.unwrap();
        assert_eq!(rows.len(), 1, "post metric is a rolling snapshot");
        assert_eq!(rows[0].value, serde_json::json!(25));
    }
}
