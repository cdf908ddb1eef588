//! Page sync operations
//!
//! The read path: fetch one page from the platform, fold it into the
//! store, and hand back the local rows plus a re-encodable cursor for
//! the next page. Cursors cross this boundary as opaque strings; the
//! adapter that issued one is the only thing that ever interprets it.

use tracing::debug;

use crate::cursor::Cursor;
use crate::error::Result;
use crate::service::{single, SocialService};
use crate::store::{CommentRow, ConversationRow, MessageRow, MetricRow};
use crate::types::CanonicalConversation;

/// One synced page of local rows.
#[derive(Debug, Clone)]
pub struct SyncPage<T> {
    pub records: Vec<T>,
    /// Encoded cursor for the next page, absent at the end of the
    /// collection.
    pub next_cursor: Option<String>,
}

impl<T> SyncPage<T> {
    fn new(records: Vec<T>, next: Option<Cursor>) -> Self {
        Self {
            records,
            next_cursor: next.map(|cursor| cursor.encode()),
        }
    }
}

fn decode_cursor(cursor: Option<&str>) -> Result<Option<Cursor>> {
    Ok(cursor.map(Cursor::decode).transpose()?)
}

impl SocialService {
    pub async fn fetch_conversations(
        &self,
        account_id: &str,
        limit: Option<u32>,
        cursor: Option<&str>,
    ) -> Result<SyncPage<ConversationRow>> {
        let account = self.account(account_id).await?;
        let adapter = self.adapter(account.platform)?;
        let messaging = adapter.messaging()?;
        let auth = adapter.auth()?;
        let cursor = decode_cursor(cursor)?;

        let account_ref = &account;
        let cursor_ref = cursor.as_ref();
        let page = self
            .with_credential(account_ref, auth, |credential| async move {
                messaging
                    .conversations(account_ref, &credential, limit, cursor_ref)
                    .await
            })
            .await?;

        debug!(
            account = %account.id,
            platform = %account.platform,
            fetched = page.records.len(),
            "synced conversation page"
        );
        let rows = self
            .reconciler
            .reconcile_conversations(&account.id, &page.records)
            .await?;
        Ok(SyncPage::new(rows, page.next))
    }

    /// Sync a page of messages for a conversation that has already been
    /// seen locally (messages are keyed under the local conversation
    /// row). A conversation that was never synced gets a minimal local
    /// row first.
    pub async fn fetch_messages(
        &self,
        account_id: &str,
        platform_conversation_id: &str,
        limit: Option<u32>,
        cursor: Option<&str>,
    ) -> Result<SyncPage<MessageRow>> {
        let account = self.account(account_id).await?;
        let adapter = self.adapter(account.platform)?;
        let messaging = adapter.messaging()?;
        let auth = adapter.auth()?;
        let cursor = decode_cursor(cursor)?;

        let account_ref = &account;
        let cursor_ref = cursor.as_ref();
        let page = self
            .with_credential(account_ref, auth, |credential| async move {
                messaging
                    .messages(
                        account_ref,
                        &credential,
                        platform_conversation_id,
                        limit,
                        cursor_ref,
                    )
                    .await
            })
            .await?;

        let conversation = match self
            .store
            .find_conversation(&account.id, platform_conversation_id)
            .await?
        {
            Some(row) => row,
            None => {
                let placeholder = CanonicalConversation {
                    platform_conversation_id: platform_conversation_id.to_string(),
                    recipient: Default::default(),
                    last_message_at: page
                        .records
                        .iter()
                        .map(|m| m.sent_at)
                        .max()
                        .unwrap_or_default(),
                    read: true,
                    unread_count: None,
                    snippet: None,
                };
                let rows = self
                    .reconciler
                    .reconcile_conversations(&account.id, std::slice::from_ref(&placeholder))
                    .await?;
                single(rows)?
            }
        };

        let rows = self
            .reconciler
            .reconcile_messages(&conversation.id, &page.records)
            .await?;
        Ok(SyncPage::new(rows, page.next))
    }

    pub async fn fetch_comments(
        &self,
        account_id: &str,
        platform_post_id: &str,
        limit: Option<u32>,
        cursor: Option<&str>,
    ) -> Result<SyncPage<CommentRow>> {
        let account = self.account(account_id).await?;
        let adapter = self.adapter(account.platform)?;
        let comments = adapter.comments()?;
        let auth = adapter.auth()?;
        let cursor = decode_cursor(cursor)?;

        let account_ref = &account;
        let cursor_ref = cursor.as_ref();
        let page = self
            .with_credential(account_ref, auth, |credential| async move {
                comments
                    .comments(account_ref, &credential, platform_post_id, limit, cursor_ref)
                    .await
            })
            .await?;

        debug!(
            account = %account.id,
            platform = %account.platform,
            post = platform_post_id,
            fetched = page.records.len(),
            "synced comment page"
        );
        let post_id = self.local_post_id(&account.id, platform_post_id).await?;
        let rows = self
            .reconciler
            .reconcile_comments(&account.id, post_id.as_deref(), &page.records)
            .await?;
        Ok(SyncPage::new(rows, page.next))
    }

    pub async fn fetch_comment_replies(
        &self,
        account_id: &str,
        platform_comment_id: &str,
        limit: Option<u32>,
        cursor: Option<&str>,
    ) -> Result<SyncPage<CommentRow>> {
        let account = self.account(account_id).await?;
        let adapter = self.adapter(account.platform)?;
        let comments = adapter.comments()?;
        let auth = adapter.auth()?;
        let cursor = decode_cursor(cursor)?;

        let account_ref = &account;
        let cursor_ref = cursor.as_ref();
        let page = self
            .with_credential(account_ref, auth, |credential| async move {
                comments
                    .replies(
                        account_ref,
                        &credential,
                        platform_comment_id,
                        limit,
                        cursor_ref,
                    )
                    .await
            })
            .await?;

        // Replies carry their post id; resolve the local post from the
        // first record when present.
        let post_id = match page.records.first() {
            Some(first) => {
                self.local_post_id(&account.id, &first.platform_post_id)
                    .await?
            }
            None => None,
        };
        let rows = self
            .reconciler
            .reconcile_comments(&account.id, post_id.as_deref(), &page.records)
            .await?;
        Ok(SyncPage::new(rows, page.next))
    }

    pub async fn fetch_account_metrics(
        &self,
        account_id: &str,
        metric_types: &[String],
        period_start: i64,
        period_end: i64,
    ) -> Result<Vec<MetricRow>> {
        let account = self.account(account_id).await?;
        let adapter = self.adapter(account.platform)?;
        let metrics = adapter.metrics()?;
        let auth = adapter.auth()?;

        let account_ref = &account;
        let batch = self
            .with_credential(account_ref, auth, |credential| async move {
                metrics
                    .account_metrics(
                        account_ref,
                        &credential,
                        metric_types,
                        period_start,
                        period_end,
                    )
                    .await
            })
            .await?;

        self.reconciler.reconcile_metrics(&account.id, &batch).await
    }

    pub async fn fetch_post_metrics(
        &self,
        account_id: &str,
        platform_post_id: &str,
    ) -> Result<Vec<MetricRow>> {
        let account = self.account(account_id).await?;
        let adapter = self.adapter(account.platform)?;
        let metrics = adapter.metrics()?;
        let auth = adapter.auth()?;

        let account_ref = &account;
        let batch = self
            .with_credential(account_ref, auth, |credential| async move {
                metrics
                    .post_metrics(account_ref, &credential, platform_post_id)
                    .await
            })
            .await?;

        self.reconciler.reconcile_metrics(&account.id, &batch).await
    }

    pub async fn fetch_audience_demographics(
        &self,
        account_id: &str,
    ) -> Result<Vec<MetricRow>> {
        let account = self.account(account_id).await?;
        let adapter = self.adapter(account.platform)?;
        let metrics = adapter.metrics()?;
        let auth = adapter.auth()?;

        let account_ref = &account;
        let batch = self
            .with_credential(account_ref, auth, |credential| async move {
                metrics.audience_demographics(account_ref, &credential).await
            })
            .await?;

        self.reconciler.reconcile_metrics(&account.id, &batch).await
    }

    pub async fn fetch_historical_metrics(
        &self,
        account_id: &str,
        metric_type: &str,
        period_start: i64,
        period_end: i64,
    ) -> Result<Vec<MetricRow>> {
        let account = self.account(account_id).await?;
        let adapter = self.adapter(account.platform)?;
        let metrics = adapter.metrics()?;
        let auth = adapter.auth()?;

        let account_ref = &account;
        let batch = self
            .with_credential(account_ref, auth, |credential| async move {
                metrics
                    .historical_data(
                        account_ref,
                        &credential,
                        metric_type,
                        period_start,
                        period_end,
                    )
                    .await
            })
            .await?;

        self.reconciler.reconcile_metrics(&account.id, &batch).await
    }
}
