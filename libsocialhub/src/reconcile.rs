//! Reconciliation of remote pages into the local store
//!
//! Remote collections arrive as pages of canonical records with no
//! delivery guarantees: pages can overlap, arrive twice, or interleave
//! across concurrent syncs. The engine folds them into the store so
//! that replaying any page is a no-op: rows are keyed by natural key,
//! local ids and `created_at` never change after first sight, and
//! mutable fields merge by rule rather than blind overwrite.
//!
//! Counter merges (likes, replies) are last-writer-wins on the
//! `counters_touched_at` watermark, so a stale page observed earlier
//! than the stored snapshot cannot roll counters backwards.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::store::{CommentRow, ConversationRow, MessageRow, MetricRow, PostRow, Store};
use crate::types::{
    CanonicalComment, CanonicalConversation, CanonicalMessage, CanonicalMetric, CanonicalPost,
    Identity, PublishStatus,
};

const LOCK_STRIPES: usize = 16;

pub struct Reconciler {
    store: Arc<dyn Store>,
    /// Striped per-key locks: concurrent syncs touching the same
    /// natural key serialize, unrelated keys proceed in parallel.
    stripes: Vec<Mutex<()>>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn Store>) -> Self {
        let stripes = (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect();
        Self { store, stripes }
    }

    fn stripe(&self, key: &(impl Hash + ?Sized)) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.stripes[(hasher.finish() as usize) % LOCK_STRIPES]
    }

    /// Fold a page of conversations into the store. Returns the stored
    /// rows in page order.
    pub async fn reconcile_conversations(
        &self,
        account_id: &str,
        page: &[CanonicalConversation],
    ) -> Result<Vec<ConversationRow>> {
        let now = chrono::Utc::now().timestamp();
        let mut rows = Vec::with_capacity(page.len());
        for remote in page {
            let key = (account_id, remote.platform_conversation_id.as_str());
            let _guard = self.stripe(&key).lock().await;

            let row = match self
                .store
                .find_conversation(account_id, &remote.platform_conversation_id)
                .await?
            {
                Some(mut existing) => {
                    existing.recipient = merge_identity(existing.recipient, &remote.recipient);
                    existing.last_message_at = remote.last_message_at;
                    existing.read = remote.read;
                    existing.unread_count = remote.unread_count;
                    existing.snippet = remote.snippet.clone().or(existing.snippet);
                    existing.updated_at = now;
                    existing
                }
                None => ConversationRow {
                    id: Uuid::new_v4().to_string(),
                    account_id: account_id.to_string(),
                    platform_conversation_id: remote.platform_conversation_id.clone(),
                    recipient: remote.recipient.clone(),
                    last_message_at: remote.last_message_at,
                    read: remote.read,
                    unread_count: remote.unread_count,
                    snippet: remote.snippet.clone(),
                    created_at: now,
                    updated_at: now,
                },
            };
            self.store.upsert_conversation(&row).await?;
            rows.push(row);
        }
        debug!(account = account_id, count = rows.len(), "reconciled conversations");
        Ok(rows)
    }

    /// Fold a page of messages belonging to one local conversation.
    /// Messages are immutable once seen apart from the read flag.
    pub async fn reconcile_messages(
        &self,
        conversation_id: &str,
        page: &[CanonicalMessage],
    ) -> Result<Vec<MessageRow>> {
        let now = chrono::Utc::now().timestamp();
        let mut rows = Vec::with_capacity(page.len());
        for remote in page {
            let key = (conversation_id, remote.platform_message_id.as_str());
            let _guard = self.stripe(&key).lock().await;

            let row = match self
                .store
                .find_message(conversation_id, &remote.platform_message_id)
                .await?
            {
                Some(mut existing) => {
                    existing.sender = merge_identity(existing.sender, &remote.sender);
                    existing.read = remote.read;
                    existing.updated_at = now;
                    existing
                }
                None => MessageRow {
                    id: Uuid::new_v4().to_string(),
                    conversation_id: conversation_id.to_string(),
                    platform_message_id: remote.platform_message_id.clone(),
                    sender: remote.sender.clone(),
                    body: remote.body.clone(),
                    attachments: remote.attachments.clone(),
                    from_me: remote.from_me,
                    read: remote.read,
                    sent_at: remote.sent_at,
                    created_at: now,
                    updated_at: now,
                },
            };
            self.store.upsert_message(&row).await?;
            rows.push(row);
        }
        debug!(conversation = conversation_id, count = rows.len(), "reconciled messages");
        Ok(rows)
    }

    /// Fold a page of comments.
    ///
    /// Parent references are remote ids; they resolve to the parent's
    /// *local* id when the parent row is already known (including when
    /// it appeared earlier in this same page), and stay null otherwise.
    /// A later page containing the parent fills the reference in.
    pub async fn reconcile_comments(
        &self,
        account_id: &str,
        post_id: Option<&str>,
        page: &[CanonicalComment],
    ) -> Result<Vec<CommentRow>> {
        let now = chrono::Utc::now().timestamp();
        let mut rows = Vec::with_capacity(page.len());
        for remote in page {
            let parent_comment_id = match &remote.parent_comment_id {
                Some(remote_parent) => {
                    let parent = self.store.find_comment(account_id, remote_parent).await?;
                    if parent.is_none() {
                        debug!(
                            account = account_id,
                            parent = %remote_parent,
                            "comment parent not yet local, leaving unresolved"
                        );
                    }
                    parent.map(|p| p.id)
                }
                None => None,
            };

            let key = (account_id, remote.platform_comment_id.as_str());
            let _guard = self.stripe(&key).lock().await;

            let row = match self
                .store
                .find_comment(account_id, &remote.platform_comment_id)
                .await?
            {
                Some(mut existing) => {
                    existing.author = merge_identity(existing.author, &remote.author);
                    existing.body = remote.body.clone();
                    existing.post_id = post_id.map(str::to_string).or(existing.post_id);
                    existing.parent_comment_id =
                        parent_comment_id.or(existing.parent_comment_id);
                    if remote.observed_at >= existing.counters_touched_at {
                        existing.like_count = remote.like_count;
                        existing.reply_count = remote.reply_count;
                        existing.counters_touched_at = remote.observed_at;
                    }
                    existing.updated_at = now;
                    existing
                }
                None => CommentRow {
                    id: Uuid::new_v4().to_string(),
                    account_id: account_id.to_string(),
                    post_id: post_id.map(str::to_string),
                    platform_post_id: remote.platform_post_id.clone(),
                    platform_comment_id: remote.platform_comment_id.clone(),
                    parent_comment_id,
                    author: remote.author.clone(),
                    body: remote.body.clone(),
                    is_reply: remote.is_reply,
                    like_count: remote.like_count,
                    reply_count: remote.reply_count,
                    counters_touched_at: remote.observed_at,
                    created_at: now,
                    updated_at: now,
                },
            };
            self.store.upsert_comment(&row).await?;
            rows.push(row);
        }
        debug!(account = account_id, count = rows.len(), "reconciled comments");
        Ok(rows)
    }

    /// Apply a local reaction to a comment's like counter without
    /// waiting for the next remote page. Clamped at zero; a stale
    /// remote page cannot later undo it thanks to the watermark.
    pub async fn apply_reaction_delta(
        &self,
        account_id: &str,
        platform_comment_id: &str,
        delta: i64,
    ) -> Result<Option<CommentRow>> {
        let key = (account_id, platform_comment_id);
        let _guard = self.stripe(&key).lock().await;

        let Some(mut row) = self
            .store
            .find_comment(account_id, platform_comment_id)
            .await?
        else {
            warn!(
                account = account_id,
                comment = platform_comment_id,
                "reaction delta for unknown comment"
            );
            return Ok(None);
        };

        let now = chrono::Utc::now().timestamp();
        row.like_count = (row.like_count + delta).max(0);
        row.counters_touched_at = now;
        row.updated_at = now;
        self.store.upsert_comment(&row).await?;
        Ok(Some(row))
    }

    /// Fold a page of posts. A post is never deleted by reconciliation;
    /// a locally deleted post stays `Deleted` even when a stale page
    /// still lists it as published.
    pub async fn reconcile_posts(
        &self,
        account_id: &str,
        page: &[CanonicalPost],
    ) -> Result<Vec<PostRow>> {
        let now = chrono::Utc::now().timestamp();
        let mut rows = Vec::with_capacity(page.len());
        for remote in page {
            let key = (account_id, remote.platform_post_id.as_str());
            let _guard = self.stripe(&key).lock().await;

            let row = match self
                .store
                .find_post(account_id, &remote.platform_post_id)
                .await?
            {
                Some(mut existing) => {
                    if existing.status != PublishStatus::Deleted {
                        existing.status = remote.status;
                    }
                    existing.content = remote.content.clone();
                    existing.media_urls = remote.media_urls.clone();
                    existing.scheduled_at = remote.scheduled_at.or(existing.scheduled_at);
                    existing.published_at = remote.published_at.or(existing.published_at);
                    existing.updated_at = now;
                    existing
                }
                None => PostRow {
                    id: Uuid::new_v4().to_string(),
                    account_id: account_id.to_string(),
                    platform_post_id: remote.platform_post_id.clone(),
                    content: remote.content.clone(),
                    media_urls: remote.media_urls.clone(),
                    status: remote.status,
                    scheduled_at: remote.scheduled_at,
                    published_at: remote.published_at,
                    created_at: now,
                    updated_at: now,
                },
            };
            self.store.upsert_post(&row).await?;
            rows.push(row);
        }
        debug!(account = account_id, count = rows.len(), "reconciled posts");
        Ok(rows)
    }

    /// Fold a batch of metric snapshots. The store keys them (rolling
    /// per post, per-period for account metrics), so this is a straight
    /// keyed upsert.
    pub async fn reconcile_metrics(
        &self,
        account_id: &str,
        batch: &[CanonicalMetric],
    ) -> Result<Vec<MetricRow>> {
        let now = chrono::Utc::now().timestamp();
        let mut rows = Vec::with_capacity(batch.len());
        for remote in batch {
            let candidate = MetricRow {
                id: Uuid::new_v4().to_string(),
                account_id: account_id.to_string(),
                platform_post_id: remote.platform_post_id.clone(),
                metric_type: remote.metric_type.clone(),
                value: remote.value.clone(),
                period_start: remote.period_start,
                period_end: remote.period_end,
                updated_at: now,
            };

            let key = candidate.key();
            let stripe_key = (account_id, remote.metric_type.as_str(), remote.platform_post_id.as_deref());
            let _guard = self.stripe(&stripe_key).lock().await;
            let row = match self.store.find_metric(&key).await? {
                Some(mut existing) => {
                    existing.value = remote.value.clone();
                    existing.updated_at = now;
                    existing
                }
                None => candidate,
            };
            self.store.upsert_metric(&row).await?;
            rows.push(row);
        }
        debug!(account = account_id, count = rows.len(), "reconciled metrics");
        Ok(rows)
    }
}

/// Identity fields enrich, never degrade: an incoming record missing a
/// display name or avatar does not erase one we already learned.
fn merge_identity(existing: Identity, incoming: &Identity) -> Identity {
    Identity {
        id: incoming.id.clone(),
        name: incoming.name.clone().or(existing.name),
        avatar_url: incoming.avatar_url.clone().or(existing.avatar_url),
    }
}
