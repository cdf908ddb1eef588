//! Service facade
//!
//! [`SocialService`] ties the layers together: the adapter registry,
//! the token manager, and the reconciliation engine over one store.
//! Every operation follows the same shape: load the account, resolve
//! the capability (failing fast with `Unsupported`), obtain a valid
//! credential, call the adapter, and fold the result into the store.
//!
//! Retry policy lives here and only here. Adapters report taxonomy
//! errors; the service asks each error for its
//! [`RetryDecision`](crate::error::RetryDecision) — an auth rejection
//! gets exactly one refresh-and-retry through the token manager,
//! transient failures back off, everything else surfaces.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{
    AdapterError, Result, RetryDecision, SocialError, MAX_TRANSPORT_ATTEMPTS,
};
use crate::http::RestClient;
use crate::platforms::{build_adapter, AuthCapability, AuthorizeUrl, PlatformAdapter};
use crate::reconcile::Reconciler;
use crate::store::{CommentRow, MessageRow, PostRow, Store};
use crate::token::{TokenManager, TokenRefresher, TokenState};
use crate::types::{
    CanonicalPost, Credential, Identity, Platform, PublishContent, PublishStatus, SocialAccount,
};

mod sync;

pub use sync::SyncPage;

/// Bridges an adapter's auth capability into the token manager's
/// refresher seam.
struct AdapterRefresher<'a> {
    auth: &'a dyn AuthCapability,
}

#[async_trait]
impl TokenRefresher for AdapterRefresher<'_> {
    async fn refresh(
        &self,
        account: &SocialAccount,
    ) -> std::result::Result<Credential, AdapterError> {
        self.auth.refresh(account).await
    }
}

/// The facade over adapters, tokens, reconciliation, and the store.
pub struct SocialService {
    store: Arc<dyn Store>,
    tokens: TokenManager,
    reconciler: Reconciler,
    adapters: HashMap<Platform, Box<dyn PlatformAdapter>>,
}

impl SocialService {
    /// Build a service with real adapters for every platform the config
    /// carries app credentials for. Platforms without an `[apps.*]`
    /// section are simply not registered.
    pub fn new(config: &Config, store: Arc<dyn Store>) -> Result<Self> {
        let client = RestClient::new()?;
        let mut adapters: HashMap<Platform, Box<dyn PlatformAdapter>> = HashMap::new();
        for platform in Platform::ALL {
            if config.app(platform).is_ok() {
                adapters.insert(platform, build_adapter(platform, config, client.clone())?);
            }
        }
        info!(platforms = adapters.len(), "social service ready");
        Ok(Self::with_adapters(store, adapters))
    }

    /// Build a service over a caller-supplied adapter set. Tests use
    /// this to register mock adapters.
    pub fn with_adapters(
        store: Arc<dyn Store>,
        adapters: HashMap<Platform, Box<dyn PlatformAdapter>>,
    ) -> Self {
        Self {
            tokens: TokenManager::new(store.clone()),
            reconciler: Reconciler::new(store.clone()),
            store,
            adapters,
        }
    }

    pub fn register_adapter(&mut self, adapter: Box<dyn PlatformAdapter>) {
        self.adapters.insert(adapter.platform(), adapter);
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn token_state(&self, account_id: &str) -> TokenState {
        self.tokens.state(account_id)
    }

    pub(crate) fn adapter(&self, platform: Platform) -> Result<&dyn PlatformAdapter> {
        self.adapters
            .get(&platform)
            .map(Box::as_ref)
            .ok_or_else(|| {
                SocialError::InvalidInput(format!("no adapter registered for {}", platform))
            })
    }

    pub(crate) async fn account(&self, account_id: &str) -> Result<SocialAccount> {
        self.store
            .find_account(account_id)
            .await?
            .ok_or_else(|| SocialError::InvalidInput(format!("unknown account: {}", account_id)))
    }

    /// Run an adapter call under the central retry policy: obtain a
    /// valid credential first, refresh-and-retry exactly once on an
    /// auth rejection, back off on transient failures.
    pub(crate) async fn with_credential<T, F, Fut>(
        &self,
        account: &SocialAccount,
        auth: &dyn AuthCapability,
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut(Credential) -> Fut,
        Fut: Future<Output = std::result::Result<T, AdapterError>>,
    {
        let refresher = AdapterRefresher { auth };
        let mut credential = self
            .tokens
            .valid_credential(&account.id, &refresher)
            .await?;

        let mut attempt = 1u32;
        loop {
            match call(credential.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) => match err.retry_decision(attempt) {
                    RetryDecision::RefreshAndRetry => {
                        info!(
                            account = %account.id,
                            platform = %account.platform,
                            "credential rejected mid-operation, refreshing"
                        );
                        credential = self
                            .tokens
                            .refresh_credential(&account.id, &credential.access_token, &refresher)
                            .await?;
                    }
                    RetryDecision::RetryAfter(delay) if attempt < MAX_TRANSPORT_ATTEMPTS => {
                        warn!(
                            account = %account.id,
                            platform = %account.platform,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "transient failure, backing off"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    _ => return Err(err.into()),
                },
            }
            attempt += 1;
        }
    }

    // ---- auth ----

    pub async fn authorize_url(&self, platform: Platform) -> Result<AuthorizeUrl> {
        let adapter = self.adapter(platform)?;
        Ok(adapter.auth()?.authorize_url().await?)
    }

    /// Exchange an authorization code and persist the resulting account.
    /// A failed exchange leaves the account unsaved and its token state
    /// back at `Unset`.
    pub async fn connect_account(
        &self,
        platform: Platform,
        owner_id: &str,
        code: &str,
    ) -> Result<SocialAccount> {
        let adapter = self.adapter(platform)?;
        let auth = adapter.auth()?;

        let mut account = SocialAccount::new(
            platform,
            owner_id.to_string(),
            Credential::new(String::new()),
        );
        self.tokens.begin_exchange(&account.id);

        let credential = match auth.exchange_code(code).await {
            Ok(credential) => credential,
            Err(err) => {
                self.tokens.fail_exchange(&account.id);
                return Err(err.into());
            }
        };
        self.tokens
            .complete_exchange(&mut account, credential)
            .await?;
        info!(account = %account.id, platform = %platform, "account connected");
        Ok(account)
    }

    pub async fn profile(&self, account_id: &str) -> Result<Identity> {
        let account = self.account(account_id).await?;
        let adapter = self.adapter(account.platform)?;
        let auth = adapter.auth()?;
        let account = &account;
        self.with_credential(account, auth, |credential| async move {
            auth.profile(account, &credential).await
        })
        .await
    }

    // ---- messaging (write path) ----

    pub async fn send_message(
        &self,
        account_id: &str,
        recipient_id: &str,
        body: &str,
    ) -> Result<MessageRow> {
        let account = self.account(account_id).await?;
        let adapter = self.adapter(account.platform)?;
        let messaging = adapter.messaging()?;
        let auth = adapter.auth()?;

        let account_ref = &account;
        let sent = self
            .with_credential(account_ref, auth, |credential| async move {
                messaging
                    .send_message(account_ref, &credential, recipient_id, body)
                    .await
            })
            .await?;

        self.record_outbound_message(&account, sent).await
    }

    pub async fn reply_to_conversation(
        &self,
        account_id: &str,
        platform_conversation_id: &str,
        body: &str,
    ) -> Result<MessageRow> {
        let account = self.account(account_id).await?;
        let adapter = self.adapter(account.platform)?;
        let messaging = adapter.messaging()?;
        let auth = adapter.auth()?;

        let account_ref = &account;
        let sent = self
            .with_credential(account_ref, auth, |credential| async move {
                messaging
                    .reply_to_conversation(
                        account_ref,
                        &credential,
                        platform_conversation_id,
                        body,
                    )
                    .await
            })
            .await?;

        self.record_outbound_message(&account, sent).await
    }

    /// Mark read remotely, then mirror the flag onto the local row.
    pub async fn mark_conversation_read(
        &self,
        account_id: &str,
        platform_conversation_id: &str,
    ) -> Result<()> {
        let account = self.account(account_id).await?;
        let adapter = self.adapter(account.platform)?;
        let messaging = adapter.messaging()?;
        let auth = adapter.auth()?;

        let account_ref = &account;
        self.with_credential(account_ref, auth, |credential| async move {
            messaging
                .mark_read(account_ref, &credential, platform_conversation_id)
                .await
        })
        .await?;

        if let Some(mut row) = self
            .store
            .find_conversation(&account.id, platform_conversation_id)
            .await?
        {
            row.read = true;
            row.unread_count = row.unread_count.map(|_| 0);
            row.updated_at = chrono::Utc::now().timestamp();
            self.store.upsert_conversation(&row).await?;
        }
        Ok(())
    }

    /// Fold a message we just sent into its conversation, when the
    /// conversation is known locally. A send into a never-synced
    /// conversation still succeeds remotely; the message lands locally
    /// on the next sync.
    async fn record_outbound_message(
        &self,
        account: &SocialAccount,
        sent: crate::types::CanonicalMessage,
    ) -> Result<MessageRow> {
        match self
            .store
            .find_conversation(&account.id, &sent.platform_conversation_id)
            .await?
        {
            Some(conversation) => {
                let rows = self
                    .reconciler
                    .reconcile_messages(&conversation.id, std::slice::from_ref(&sent))
                    .await?;
                single(rows)
            }
            None => {
                let now = chrono::Utc::now().timestamp();
                Ok(MessageRow {
                    id: uuid::Uuid::new_v4().to_string(),
                    conversation_id: String::new(),
                    platform_message_id: sent.platform_message_id,
                    sender: sent.sender,
                    body: sent.body,
                    attachments: sent.attachments,
                    from_me: sent.from_me,
                    read: sent.read,
                    sent_at: sent.sent_at,
                    created_at: now,
                    updated_at: now,
                })
            }
        }
    }

    // ---- comments (write path) ----

    pub async fn post_comment(
        &self,
        account_id: &str,
        platform_post_id: &str,
        body: &str,
    ) -> Result<CommentRow> {
        let account = self.account(account_id).await?;
        let adapter = self.adapter(account.platform)?;
        let comments = adapter.comments()?;
        let auth = adapter.auth()?;

        let account_ref = &account;
        let posted = self
            .with_credential(account_ref, auth, |credential| async move {
                comments
                    .post_comment(account_ref, &credential, platform_post_id, body)
                    .await
            })
            .await?;

        let post_id = self.local_post_id(&account.id, platform_post_id).await?;
        let rows = self
            .reconciler
            .reconcile_comments(
                &account.id,
                post_id.as_deref(),
                std::slice::from_ref(&posted),
            )
            .await?;
        single(rows)
    }

    pub async fn reply_to_comment(
        &self,
        account_id: &str,
        platform_comment_id: &str,
        body: &str,
    ) -> Result<CommentRow> {
        let account = self.account(account_id).await?;
        let adapter = self.adapter(account.platform)?;
        let comments = adapter.comments()?;
        let auth = adapter.auth()?;

        let account_ref = &account;
        let posted = self
            .with_credential(account_ref, auth, |credential| async move {
                comments
                    .reply_to_comment(account_ref, &credential, platform_comment_id, body)
                    .await
            })
            .await?;

        let post_id = self
            .local_post_id(&account.id, &posted.platform_post_id)
            .await?;
        let rows = self
            .reconciler
            .reconcile_comments(
                &account.id,
                post_id.as_deref(),
                std::slice::from_ref(&posted),
            )
            .await?;
        single(rows)
    }

    /// React remotely, then apply a `+1` like delta locally — the
    /// platforms give no readback for reactions, so the local counter
    /// carries the optimistic delta until the next counter snapshot
    /// wins it over.
    pub async fn react_to_comment(
        &self,
        account_id: &str,
        platform_comment_id: &str,
    ) -> Result<Option<CommentRow>> {
        let account = self.account(account_id).await?;
        let adapter = self.adapter(account.platform)?;
        let comments = adapter.comments()?;
        let auth = adapter.auth()?;

        let account_ref = &account;
        self.with_credential(account_ref, auth, |credential| async move {
            comments
                .react(account_ref, &credential, platform_comment_id)
                .await
        })
        .await?;

        self.reconciler
            .apply_reaction_delta(&account.id, platform_comment_id, 1)
            .await
    }

    pub async fn remove_comment_reaction(
        &self,
        account_id: &str,
        platform_comment_id: &str,
    ) -> Result<Option<CommentRow>> {
        let account = self.account(account_id).await?;
        let adapter = self.adapter(account.platform)?;
        let comments = adapter.comments()?;
        let auth = adapter.auth()?;

        let account_ref = &account;
        self.with_credential(account_ref, auth, |credential| async move {
            comments
                .unreact(account_ref, &credential, platform_comment_id)
                .await
        })
        .await?;

        self.reconciler
            .apply_reaction_delta(&account.id, platform_comment_id, -1)
            .await
    }

    pub async fn delete_comment(
        &self,
        account_id: &str,
        platform_comment_id: &str,
    ) -> Result<()> {
        let account = self.account(account_id).await?;
        let adapter = self.adapter(account.platform)?;
        let comments = adapter.comments()?;
        let auth = adapter.auth()?;

        let account_ref = &account;
        self.with_credential(account_ref, auth, |credential| async move {
            comments
                .delete_comment(account_ref, &credential, platform_comment_id)
                .await
        })
        .await?;
        Ok(())
    }

    pub async fn hide_comment(&self, account_id: &str, platform_comment_id: &str) -> Result<()> {
        self.moderate_comment(account_id, platform_comment_id, true)
            .await
    }

    pub async fn unhide_comment(
        &self,
        account_id: &str,
        platform_comment_id: &str,
    ) -> Result<()> {
        self.moderate_comment(account_id, platform_comment_id, false)
            .await
    }

    async fn moderate_comment(
        &self,
        account_id: &str,
        platform_comment_id: &str,
        hide: bool,
    ) -> Result<()> {
        let account = self.account(account_id).await?;
        let adapter = self.adapter(account.platform)?;
        let comments = adapter.comments()?;
        let auth = adapter.auth()?;

        let account_ref = &account;
        self.with_credential(account_ref, auth, |credential| async move {
            if hide {
                comments
                    .hide_comment(account_ref, &credential, platform_comment_id)
                    .await
            } else {
                comments
                    .unhide_comment(account_ref, &credential, platform_comment_id)
                    .await
            }
        })
        .await?;
        Ok(())
    }

    // ---- publishing ----

    pub async fn publish_post(
        &self,
        account_id: &str,
        content: &PublishContent,
        deadline: Option<Duration>,
    ) -> Result<PostRow> {
        let account = self.account(account_id).await?;
        let adapter = self.adapter(account.platform)?;
        let publishing = adapter.publishing()?;
        let auth = adapter.auth()?;

        let account_ref = &account;
        let published = self
            .with_credential(account_ref, auth, |credential| async move {
                publishing
                    .publish(account_ref, &credential, content, deadline)
                    .await
            })
            .await?;

        info!(
            account = %account.id,
            platform = %account.platform,
            post = %published.platform_post_id,
            "post published"
        );
        let rows = self
            .reconciler
            .reconcile_posts(&account.id, std::slice::from_ref(&published))
            .await?;
        single(rows)
    }

    pub async fn schedule_post(
        &self,
        account_id: &str,
        content: &PublishContent,
        publish_at: i64,
    ) -> Result<PostRow> {
        let account = self.account(account_id).await?;
        let adapter = self.adapter(account.platform)?;
        let publishing = adapter.publishing()?;
        let auth = adapter.auth()?;

        let account_ref = &account;
        let scheduled = self
            .with_credential(account_ref, auth, |credential| async move {
                publishing
                    .schedule(account_ref, &credential, content, publish_at)
                    .await
            })
            .await?;

        let rows = self
            .reconciler
            .reconcile_posts(&account.id, std::slice::from_ref(&scheduled))
            .await?;
        single(rows)
    }

    /// Delete remotely, then soft-delete the local row. The row stays
    /// with status `Deleted`; later stale pages cannot resurrect it.
    pub async fn delete_post(
        &self,
        account_id: &str,
        platform_post_id: &str,
    ) -> Result<Option<PostRow>> {
        let account = self.account(account_id).await?;
        let adapter = self.adapter(account.platform)?;
        let publishing = adapter.publishing()?;
        let auth = adapter.auth()?;

        let account_ref = &account;
        self.with_credential(account_ref, auth, |credential| async move {
            publishing
                .delete_post(account_ref, &credential, platform_post_id)
                .await
        })
        .await?;

        match self.store.find_post(&account.id, platform_post_id).await? {
            Some(existing) => {
                let tombstone = CanonicalPost {
                    platform_post_id: existing.platform_post_id.clone(),
                    content: existing.content.clone(),
                    media_urls: existing.media_urls.clone(),
                    status: PublishStatus::Deleted,
                    scheduled_at: existing.scheduled_at,
                    published_at: existing.published_at,
                };
                let rows = self
                    .reconciler
                    .reconcile_posts(&account.id, std::slice::from_ref(&tombstone))
                    .await?;
                Ok(rows.into_iter().next())
            }
            None => Ok(None),
        }
    }

    pub(crate) async fn local_post_id(
        &self,
        account_id: &str,
        platform_post_id: &str,
    ) -> Result<Option<String>> {
        Ok(self
            .store
            .find_post(account_id, platform_post_id)
            .await?
            .map(|row| row.id))
    }
}

/// A reconcile of exactly one record yields exactly one row.
fn single<T>(mut rows: Vec<T>) -> Result<T> {
    rows.pop()
        .ok_or_else(|| SocialError::InvalidInput("reconcile yielded no row".to_string()))
}
