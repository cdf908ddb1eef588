//! Keyed persistence boundary
//!
//! The store is a collaborator, not part of the core: keyed upsert/find
//! per entity kind, no multi-entity transactions. [`Store`] is the
//! boundary trait; [`MemoryStore`] backs tests and light embedding,
//! [`SqliteStore`] is the shipped implementation.
//!
//! Row types here are the *local* shapes: natural keys plus local ids,
//! mutable fields, and the `updated_at` / `counters_touched_at`
//! wall-clock columns the reconciliation engine's last-writer-wins
//! merge depends on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::types::{Identity, PublishStatus, SocialAccount};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Local conversation row. Natural key: (account_id,
/// platform_conversation_id). Created on first sight, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRow {
    pub id: String,
    pub account_id: String,
    pub platform_conversation_id: String,
    pub recipient: Identity,
    pub last_message_at: i64,
    pub read: bool,
    pub unread_count: Option<u32>,
    pub snippet: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Local message row. Natural key: (conversation_id, platform_message_id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub platform_message_id: String,
    pub sender: Identity,
    pub body: String,
    pub attachments: Vec<String>,
    pub from_me: bool,
    pub read: bool,
    pub sent_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Local comment row. Natural key: (account_id, platform_comment_id).
///
/// `parent_comment_id` is the *local* id of the parent row, resolved at
/// reconcile time; null when the parent is not yet known locally.
/// `counters_touched_at` is the watermark for the counter merge rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentRow {
    pub id: String,
    pub account_id: String,
    pub post_id: Option<String>,
    pub platform_post_id: String,
    pub platform_comment_id: String,
    pub parent_comment_id: Option<String>,
    pub author: Identity,
    pub body: String,
    pub is_reply: bool,
    pub like_count: i64,
    pub reply_count: i64,
    pub counters_touched_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Local post row. Natural key: (account_id, platform_post_id).
/// Deletion is a status transition; the row stays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostRow {
    pub id: String,
    pub account_id: String,
    pub platform_post_id: String,
    pub content: String,
    pub media_urls: Vec<String>,
    pub status: PublishStatus,
    pub scheduled_at: Option<i64>,
    pub published_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Local metric snapshot.
///
/// Account metrics key on (account_id, metric_type, period_start,
/// period_end) with `platform_post_id` null; post metrics key on
/// (account_id, platform_post_id, metric_type) and roll forward as the
/// latest snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRow {
    pub id: String,
    pub account_id: String,
    pub platform_post_id: Option<String>,
    pub metric_type: String,
    pub value: serde_json::Value,
    pub period_start: Option<i64>,
    pub period_end: Option<i64>,
    pub updated_at: i64,
}

/// The natural key of a metric row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricKey {
    pub account_id: String,
    pub platform_post_id: Option<String>,
    pub metric_type: String,
    pub period_start: Option<i64>,
    pub period_end: Option<i64>,
}

impl MetricRow {
    pub fn key(&self) -> MetricKey {
        match self.platform_post_id {
            // Post metrics are a rolling snapshot; period is not part
            // of the key.
            Some(_) => MetricKey {
                account_id: self.account_id.clone(),
                platform_post_id: self.platform_post_id.clone(),
                metric_type: self.metric_type.clone(),
                period_start: None,
                period_end: None,
            },
            None => MetricKey {
                account_id: self.account_id.clone(),
                platform_post_id: None,
                metric_type: self.metric_type.clone(),
                period_start: self.period_start,
                period_end: self.period_end,
            },
        }
    }
}

/// Keyed persistence for the six entity kinds.
///
/// Upserts are keyed by each row's natural key: a second upsert with
/// the same key replaces the stored row wholesale (the reconciliation
/// engine owns the merge; the store just stores). Each upsert is atomic
/// per entity kind; nothing here spans kinds.
#[async_trait]
pub trait Store: Send + Sync {
    async fn upsert_account(&self, account: &SocialAccount) -> Result<(), StoreError>;
    async fn find_account(&self, account_id: &str) -> Result<Option<SocialAccount>, StoreError>;

    async fn upsert_conversation(&self, row: &ConversationRow) -> Result<(), StoreError>;
    async fn find_conversation(
        &self,
        account_id: &str,
        platform_conversation_id: &str,
    ) -> Result<Option<ConversationRow>, StoreError>;
    async fn list_conversations(&self, account_id: &str)
        -> Result<Vec<ConversationRow>, StoreError>;

    async fn upsert_message(&self, row: &MessageRow) -> Result<(), StoreError>;
    async fn find_message(
        &self,
        conversation_id: &str,
        platform_message_id: &str,
    ) -> Result<Option<MessageRow>, StoreError>;
    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<MessageRow>, StoreError>;

    async fn upsert_comment(&self, row: &CommentRow) -> Result<(), StoreError>;
    async fn find_comment(
        &self,
        account_id: &str,
        platform_comment_id: &str,
    ) -> Result<Option<CommentRow>, StoreError>;
    async fn list_comments(
        &self,
        account_id: &str,
        platform_post_id: &str,
    ) -> Result<Vec<CommentRow>, StoreError>;

    async fn upsert_post(&self, row: &PostRow) -> Result<(), StoreError>;
    async fn find_post(
        &self,
        account_id: &str,
        platform_post_id: &str,
    ) -> Result<Option<PostRow>, StoreError>;
    async fn list_posts(&self, account_id: &str) -> Result<Vec<PostRow>, StoreError>;

    async fn upsert_metric(&self, row: &MetricRow) -> Result<(), StoreError>;
    async fn find_metric(&self, key: &MetricKey) -> Result<Option<MetricRow>, StoreError>;
    async fn list_metrics(&self, account_id: &str) -> Result<Vec<MetricRow>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric_row(post: Option<&str>, period: Option<(i64, i64)>) -> MetricRow {
        MetricRow {
            id: "m1".to_string(),
            account_id: "acct".to_string(),
            platform_post_id: post.map(str::to_string),
            metric_type: "impressions".to_string(),
            value: serde_json::json!(1),
            period_start: period.map(|p| p.0),
            period_end: period.map(|p| p.1),
            updated_at: 0,
        }
    }

    #[test]
    fn test_post_metric_key_ignores_period() {
        let a = metric_row(Some("p1"), Some((0, 100)));
        let b = metric_row(Some("p1"), Some((100, 200)));
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_account_metric_key_includes_period() {
        let a = metric_row(None, Some((0, 100)));
        let b = metric_row(None, Some((100, 200)));
        assert_ne!(a.key(), b.key());
    }
}
