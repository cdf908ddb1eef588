//! Mock platform adapter for testing
//!
//! A configurable adapter that simulates platform behavior without
//! network access: scripted pages, scripted auth failures, scripted
//! publish-processing sequences, and call counters for verification.
//! Used by the integration tests for refresh-and-retry, capability
//! gating, paging, and poll-timeout behavior.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::cursor::Cursor;
use crate::error::AdapterError;
use crate::platforms::{
    AuthCapability, AuthorizeUrl, Capability, CommentCapability, MessagingCapability,
    MetricsCapability, PlatformAdapter, PublishCapability,
};
use crate::poll::{PollOutcome, StatusPoll};
use crate::types::{
    CanonicalComment, CanonicalConversation, CanonicalMessage, CanonicalMetric, CanonicalPost,
    Credential, Identity, Page, Platform, PublishContent, PublishStatus, SocialAccount,
};

pub const ALL_CAPABILITIES: &[Capability] = &[
    Capability::Auth,
    Capability::Messaging,
    Capability::Comments,
    Capability::Publish,
    Capability::Metrics,
];

pub const NO_MESSAGING: &[Capability] = &[
    Capability::Auth,
    Capability::Comments,
    Capability::Publish,
    Capability::Metrics,
];

/// Scripted processing status sequence for video publish, indexed by
/// poll attempt. Attempts past the end of the script stay pending.
pub type PublishScript = Vec<PollOutcome<()>>;

/// Configuration for mock adapter behavior
#[derive(Clone)]
pub struct MockConfig {
    pub platform: Platform,
    pub capability_set: &'static [Capability],

    /// Operations raise `AuthError` this many times before succeeding,
    /// simulating a token the remote side stopped accepting.
    pub auth_failures_before_success: usize,

    /// Whether refresh calls succeed.
    pub refresh_succeeds: bool,

    /// Scripted pages, one entry per fetched page. Every page except
    /// the last advertises a next cursor.
    pub conversation_pages: Vec<Vec<CanonicalConversation>>,
    pub message_pages: Vec<Vec<CanonicalMessage>>,
    pub comment_pages: Vec<Vec<CanonicalComment>>,
    pub metrics: Vec<CanonicalMetric>,

    pub publish_script: PublishScript,
    pub poll_interval: Duration,
    pub poll_max_attempts: u32,

    /// Delay before each remote call completes.
    pub delay: Duration,
}

#[derive(Default)]
struct Counters {
    remote_calls: usize,
    auth_failures_left: usize,
    refresh_calls: usize,
    publish_calls: usize,
    sent_messages: Vec<String>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            platform: Platform::Facebook,
            capability_set: ALL_CAPABILITIES,
            auth_failures_before_success: 0,
            refresh_succeeds: true,
            conversation_pages: Vec::new(),
            message_pages: Vec::new(),
            comment_pages: Vec::new(),
            metrics: Vec::new(),
            publish_script: vec![PollOutcome::Ready(())],
            poll_interval: Duration::from_millis(10),
            poll_max_attempts: 5,
            delay: Duration::ZERO,
        }
    }
}

/// Observation handle onto a mock adapter's counters, usable after the
/// adapter itself has been boxed into a service.
#[derive(Clone)]
pub struct MockHandle {
    counters: Arc<Mutex<Counters>>,
}

impl MockHandle {
    pub fn remote_calls(&self) -> usize {
        self.counters.lock().unwrap().remote_calls
    }

    pub fn refresh_calls(&self) -> usize {
        self.counters.lock().unwrap().refresh_calls
    }

    pub fn publish_calls(&self) -> usize {
        self.counters.lock().unwrap().publish_calls
    }

    pub fn sent_messages(&self) -> Vec<String> {
        self.counters.lock().unwrap().sent_messages.clone()
    }
}

/// Mock adapter for tests
pub struct MockAdapter {
    config: MockConfig,
    counters: Arc<Mutex<Counters>>,
}

impl MockAdapter {
    pub fn new(config: MockConfig) -> Self {
        let counters = Counters {
            auth_failures_left: config.auth_failures_before_success,
            ..Counters::default()
        };
        Self {
            config,
            counters: Arc::new(Mutex::new(counters)),
        }
    }

    pub fn handle(&self) -> MockHandle {
        MockHandle {
            counters: self.counters.clone(),
        }
    }

    /// An adapter where everything succeeds with empty pages.
    pub fn succeeding() -> Self {
        Self::new(MockConfig::default())
    }

    /// An adapter whose operations hit an auth error once, then work.
    pub fn stale_token() -> Self {
        Self::new(MockConfig {
            auth_failures_before_success: 1,
            ..Default::default()
        })
    }

    pub fn without_messaging() -> Self {
        Self::new(MockConfig {
            capability_set: NO_MESSAGING,
            ..Default::default()
        })
    }

    /// Total remote calls made through any capability.
    pub fn remote_calls(&self) -> usize {
        self.counters.lock().unwrap().remote_calls
    }

    pub fn refresh_calls(&self) -> usize {
        self.counters.lock().unwrap().refresh_calls
    }

    pub fn publish_calls(&self) -> usize {
        self.counters.lock().unwrap().publish_calls
    }

    pub fn sent_messages(&self) -> Vec<String> {
        self.counters.lock().unwrap().sent_messages.clone()
    }

    /// Simulates one remote round-trip: counts the call and fails with
    /// an auth error while scripted failures remain.
    async fn remote_call(&self) -> Result<(), AdapterError> {
        if !self.config.delay.is_zero() {
            tokio::time::sleep(self.config.delay).await;
        }
        let mut counters = self.counters.lock().unwrap();
        counters.remote_calls += 1;
        if counters.auth_failures_left > 0 {
            counters.auth_failures_left -= 1;
            return Err(AdapterError::Auth("token rejected by remote".to_string()));
        }
        Ok(())
    }

    fn page_index(&self, cursor: Option<&Cursor>) -> Result<usize, AdapterError> {
        match cursor {
            Some(cursor) => Ok(cursor.as_offset(self.config.platform)? as usize),
            None => Ok(0),
        }
    }

    fn page_of<T: Clone>(
        &self,
        pages: &[Vec<T>],
        cursor: Option<&Cursor>,
    ) -> Result<Page<T>, AdapterError> {
        let index = self.page_index(cursor)?;
        let records = pages.get(index).cloned().unwrap_or_default();
        let next = (index + 1 < pages.len())
            .then(|| Cursor::offset(self.config.platform, index as u64 + 1));
        Ok(Page::new(records, next))
    }
}

impl PlatformAdapter for MockAdapter {
    fn platform(&self) -> Platform {
        self.config.platform
    }

    fn capabilities(&self) -> &'static [Capability] {
        self.config.capability_set
    }

    fn as_auth(&self) -> Option<&dyn AuthCapability> {
        self.supports(Capability::Auth)
            .then_some(self as &dyn AuthCapability)
    }
    fn as_messaging(&self) -> Option<&dyn MessagingCapability> {
        self.supports(Capability::Messaging)
            .then_some(self as &dyn MessagingCapability)
    }
    fn as_comments(&self) -> Option<&dyn CommentCapability> {
        self.supports(Capability::Comments)
            .then_some(self as &dyn CommentCapability)
    }
    fn as_publishing(&self) -> Option<&dyn PublishCapability> {
        self.supports(Capability::Publish)
            .then_some(self as &dyn PublishCapability)
    }
    fn as_metrics(&self) -> Option<&dyn MetricsCapability> {
        self.supports(Capability::Metrics)
            .then_some(self as &dyn MetricsCapability)
    }
}

#[async_trait]
impl AuthCapability for MockAdapter {
    async fn authorize_url(&self) -> Result<AuthorizeUrl, AdapterError> {
        Ok(AuthorizeUrl {
            url: "https://mock.example/authorize".to_string(),
            state: Some("mock-state".to_string()),
        })
    }

    async fn exchange_code(&self, code: &str) -> Result<Credential, AdapterError> {
        self.remote_call().await?;
        Ok(Credential {
            access_token: format!("mock-token-{}", code),
            refresh_token: Some("mock-refresh".to_string()),
            token_secret: None,
            expires_at: Some(chrono::Utc::now().timestamp() + 3600),
        })
    }

    async fn refresh(&self, _account: &SocialAccount) -> Result<Credential, AdapterError> {
        if !self.config.delay.is_zero() {
            tokio::time::sleep(self.config.delay).await;
        }
        let n = {
            let mut counters = self.counters.lock().unwrap();
            counters.refresh_calls += 1;
            // A successful refresh clears the scripted auth failures.
            counters.auth_failures_left = 0;
            counters.refresh_calls
        };
        if !self.config.refresh_succeeds {
            return Err(AdapterError::Auth("refresh token revoked".to_string()));
        }
        Ok(Credential {
            access_token: format!("mock-refreshed-{}", n),
            refresh_token: Some("mock-refresh".to_string()),
            token_secret: None,
            expires_at: Some(chrono::Utc::now().timestamp() + 3600),
        })
    }

    async fn profile(
        &self,
        account: &SocialAccount,
        _credential: &Credential,
    ) -> Result<Identity, AdapterError> {
        self.remote_call().await?;
        Ok(Identity::bare(account.owner_id.clone()))
    }
}

#[async_trait]
impl MessagingCapability for MockAdapter {
    async fn conversations(
        &self,
        _account: &SocialAccount,
        _credential: &Credential,
        _limit: Option<u32>,
        cursor: Option<&Cursor>,
    ) -> Result<Page<CanonicalConversation>, AdapterError> {
        self.remote_call().await?;
        self.page_of(&self.config.conversation_pages, cursor)
    }

    async fn messages(
        &self,
        _account: &SocialAccount,
        _credential: &Credential,
        _platform_conversation_id: &str,
        _limit: Option<u32>,
        cursor: Option<&Cursor>,
    ) -> Result<Page<CanonicalMessage>, AdapterError> {
        self.remote_call().await?;
        self.page_of(&self.config.message_pages, cursor)
    }

    async fn send_message(
        &self,
        account: &SocialAccount,
        _credential: &Credential,
        recipient_id: &str,
        body: &str,
    ) -> Result<CanonicalMessage, AdapterError> {
        self.remote_call().await?;
        let id = {
            let mut counters = self.counters.lock().unwrap();
            counters.sent_messages.push(body.to_string());
            counters.sent_messages.len()
        };
        Ok(CanonicalMessage {
            platform_message_id: format!("mock-msg-{}", id),
            platform_conversation_id: recipient_id.to_string(),
            sender: Identity::bare(account.owner_id.clone()),
            body: body.to_string(),
            attachments: Vec::new(),
            from_me: true,
            read: true,
            sent_at: chrono::Utc::now().timestamp(),
        })
    }

    async fn reply_to_conversation(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        platform_conversation_id: &str,
        body: &str,
    ) -> Result<CanonicalMessage, AdapterError> {
        self.send_message(account, credential, platform_conversation_id, body)
            .await
    }

    async fn mark_read(
        &self,
        _account: &SocialAccount,
        _credential: &Credential,
        _platform_conversation_id: &str,
    ) -> Result<(), AdapterError> {
        self.remote_call().await
    }
}

#[async_trait]
impl CommentCapability for MockAdapter {
    async fn comments(
        &self,
        _account: &SocialAccount,
        _credential: &Credential,
        _platform_post_id: &str,
        _limit: Option<u32>,
        cursor: Option<&Cursor>,
    ) -> Result<Page<CanonicalComment>, AdapterError> {
        self.remote_call().await?;
        self.page_of(&self.config.comment_pages, cursor)
    }

    async fn replies(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        platform_comment_id: &str,
        limit: Option<u32>,
        cursor: Option<&Cursor>,
    ) -> Result<Page<CanonicalComment>, AdapterError> {
        CommentCapability::comments(self, account, credential, platform_comment_id, limit, cursor)
            .await
    }

    async fn post_comment(
        &self,
        _account: &SocialAccount,
        _credential: &Credential,
        platform_post_id: &str,
        body: &str,
    ) -> Result<CanonicalComment, AdapterError> {
        self.remote_call().await?;
        let now = chrono::Utc::now().timestamp();
        Ok(CanonicalComment {
            platform_comment_id: format!("mock-comment-{}", now),
            platform_post_id: platform_post_id.to_string(),
            parent_comment_id: None,
            author: Identity::bare("mock-user"),
            body: body.to_string(),
            is_reply: false,
            like_count: 0,
            reply_count: 0,
            created_at: now,
            observed_at: now,
        })
    }

    async fn reply_to_comment(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        platform_comment_id: &str,
        body: &str,
    ) -> Result<CanonicalComment, AdapterError> {
        let mut comment = self
            .post_comment(account, credential, platform_comment_id, body)
            .await?;
        comment.parent_comment_id = Some(platform_comment_id.to_string());
        comment.is_reply = true;
        Ok(comment)
    }

    async fn react(
        &self,
        _account: &SocialAccount,
        _credential: &Credential,
        _platform_comment_id: &str,
    ) -> Result<(), AdapterError> {
        self.remote_call().await
    }

    async fn unreact(
        &self,
        _account: &SocialAccount,
        _credential: &Credential,
        _platform_comment_id: &str,
    ) -> Result<(), AdapterError> {
        self.remote_call().await
    }

    async fn delete_comment(
        &self,
        _account: &SocialAccount,
        _credential: &Credential,
        _platform_comment_id: &str,
    ) -> Result<(), AdapterError> {
        self.remote_call().await
    }

    async fn hide_comment(
        &self,
        _account: &SocialAccount,
        _credential: &Credential,
        _platform_comment_id: &str,
    ) -> Result<(), AdapterError> {
        self.remote_call().await
    }

    async fn unhide_comment(
        &self,
        _account: &SocialAccount,
        _credential: &Credential,
        _platform_comment_id: &str,
    ) -> Result<(), AdapterError> {
        self.remote_call().await
    }
}

#[async_trait]
impl PublishCapability for MockAdapter {
    async fn publish(
        &self,
        _account: &SocialAccount,
        _credential: &Credential,
        content: &PublishContent,
        deadline: Option<Duration>,
    ) -> Result<CanonicalPost, AdapterError> {
        self.remote_call().await?;
        let n = {
            let mut counters = self.counters.lock().unwrap();
            counters.publish_calls += 1;
            counters.publish_calls
        };

        // Video runs the scripted processing sequence through the real
        // poll primitive; other kinds publish in one step.
        if matches!(content, PublishContent::Video { .. }) {
            let script = &self.config.publish_script;
            let poll = StatusPoll::new(self.config.poll_interval, self.config.poll_max_attempts);
            poll.run(deadline, |attempt| async move {
                Ok(script
                    .get(attempt as usize - 1)
                    .cloned()
                    .unwrap_or(PollOutcome::Pending))
            })
            .await?;
        }

        Ok(CanonicalPost {
            platform_post_id: format!("mock-post-{}", n),
            content: content.body().to_string(),
            media_urls: content.media_urls(),
            status: PublishStatus::Published,
            scheduled_at: None,
            published_at: Some(chrono::Utc::now().timestamp()),
        })
    }

    async fn schedule(
        &self,
        _account: &SocialAccount,
        _credential: &Credential,
        content: &PublishContent,
        publish_at: i64,
    ) -> Result<CanonicalPost, AdapterError> {
        self.remote_call().await?;
        let n = {
            let mut counters = self.counters.lock().unwrap();
            counters.publish_calls += 1;
            counters.publish_calls
        };
        Ok(CanonicalPost {
            platform_post_id: format!("mock-post-{}", n),
            content: content.body().to_string(),
            media_urls: content.media_urls(),
            status: PublishStatus::Scheduled,
            scheduled_at: Some(publish_at),
            published_at: None,
        })
    }

    async fn delete_post(
        &self,
        _account: &SocialAccount,
        _credential: &Credential,
        _platform_post_id: &str,
    ) -> Result<(), AdapterError> {
        self.remote_call().await
    }
}

#[async_trait]
impl MetricsCapability for MockAdapter {
    async fn account_metrics(
        &self,
        _account: &SocialAccount,
        _credential: &Credential,
        _metric_types: &[String],
        _period_start: i64,
        _period_end: i64,
    ) -> Result<Vec<CanonicalMetric>, AdapterError> {
        self.remote_call().await?;
        Ok(self
            .config
            .metrics
            .iter()
            .filter(|m| m.platform_post_id.is_none())
            .cloned()
            .collect())
    }

    async fn post_metrics(
        &self,
        _account: &SocialAccount,
        _credential: &Credential,
        platform_post_id: &str,
    ) -> Result<Vec<CanonicalMetric>, AdapterError> {
        self.remote_call().await?;
        Ok(self
            .config
            .metrics
            .iter()
            .filter(|m| m.platform_post_id.as_deref() == Some(platform_post_id))
            .cloned()
            .collect())
    }

    async fn audience_demographics(
        &self,
        account: &SocialAccount,
        credential: &Credential,
    ) -> Result<Vec<CanonicalMetric>, AdapterError> {
        self.account_metrics(account, credential, &[], 0, 0).await
    }

    async fn historical_data(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        _metric_type: &str,
        period_start: i64,
        period_end: i64,
    ) -> Result<Vec<CanonicalMetric>, AdapterError> {
        self.account_metrics(account, credential, &[], period_start, period_end)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> SocialAccount {
        SocialAccount::new(
            Platform::Facebook,
            "owner".to_string(),
            Credential::new("tok".to_string()),
        )
    }

    fn conversation(id: &str) -> CanonicalConversation {
        CanonicalConversation {
            platform_conversation_id: id.to_string(),
            recipient: Identity::bare("u1"),
            last_message_at: 0,
            read: true,
            unread_count: None,
            snippet: None,
        }
    }

    #[tokio::test]
    async fn test_scripted_pages_chain_cursors() {
        let adapter = MockAdapter::new(MockConfig {
            conversation_pages: vec![
                vec![conversation("a")],
                vec![conversation("b")],
            ],
            ..Default::default()
        });
        let account = account();
        let cred = account.credential.clone();

        let first = adapter
            .conversations(&account, &cred, None, None)
            .await
            .unwrap();
        assert_eq!(first.records[0].platform_conversation_id, "a");
        let next = first.next.unwrap();

        let second = adapter
            .conversations(&account, &cred, None, Some(&next))
            .await
            .unwrap();
        assert_eq!(second.records[0].platform_conversation_id, "b");
        assert!(second.next.is_none());
        assert_eq!(adapter.remote_calls(), 2);
    }

    #[tokio::test]
    async fn test_stale_token_fails_once() {
        let adapter = MockAdapter::stale_token();
        let account = account();
        let cred = account.credential.clone();

        let err = adapter
            .conversations(&account, &cred, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Auth(_)));

        adapter.refresh(&account).await.unwrap();
        assert!(adapter
            .conversations(&account, &cred, None, None)
            .await
            .is_ok());
        assert_eq!(adapter.refresh_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_video_publish_times_out_on_endless_pending() {
        let adapter = MockAdapter::new(MockConfig {
            publish_script: vec![PollOutcome::Pending],
            poll_max_attempts: 3,
            ..Default::default()
        });
        let account = account();
        let content = PublishContent::Video {
            caption: "clip".to_string(),
            video_url: "https://cdn.example/v.mp4".to_string(),
        };
        let err = adapter
            .publish(&account, &account.credential, &content, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Timeout(_)));
    }
}
