//! Token lifecycle management
//!
//! Drives each account's [`Credential`] through
//! `Unset → Exchanging → Valid → Refreshing → Valid | Expired`.
//! Platform peculiarities (whether refresh exists, whether "refresh"
//! re-issues a long-lived token from the access token itself, default
//! expiry when the platform omits one) live in the [`TokenPolicy`]
//! data table — not in branching scattered through adapters.
//!
//! Refresh is single-flight per account: of N concurrent operations
//! discovering an expired token, one performs the refresh while the
//! rest wait on the account lock and then proceed with the refreshed
//! credential.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{AdapterError, Result, SocialError};
use crate::store::Store;
use crate::types::{Credential, Platform, SocialAccount};

/// Refresh proactively when expiry is within this margin.
pub const REFRESH_MARGIN_SECS: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Unset,
    Exchanging,
    Valid,
    Refreshing,
    /// Terminal until a fresh code exchange.
    Expired,
}

/// Per-platform token rules, as data.
#[derive(Debug, Clone, Copy)]
pub struct TokenPolicy {
    /// Whether any refresh path exists at all.
    pub has_refresh: bool,
    /// Whether "refresh" re-issues a long-lived token from the access
    /// token itself rather than consuming a dedicated refresh token.
    pub refresh_uses_access_token: bool,
    /// Expiry to assume when the platform omits one.
    pub default_ttl: Option<Duration>,
}

impl TokenPolicy {
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            // Long-lived token exchange from the current access token.
            Platform::Facebook => Self {
                has_refresh: true,
                refresh_uses_access_token: true,
                default_ttl: Some(Duration::from_secs(60 * 24 * 3600)),
            },
            Platform::Instagram => Self {
                has_refresh: true,
                refresh_uses_access_token: true,
                default_ttl: Some(Duration::from_secs(60 * 24 * 3600)),
            },
            // OAuth 1.0a token pairs do not expire and cannot refresh.
            Platform::Twitter => Self {
                has_refresh: false,
                refresh_uses_access_token: false,
                default_ttl: None,
            },
            // Refresh-token rotation.
            Platform::LinkedIn => Self {
                has_refresh: true,
                refresh_uses_access_token: false,
                default_ttl: Some(Duration::from_secs(60 * 24 * 3600)),
            },
            Platform::YouTube => Self {
                has_refresh: true,
                refresh_uses_access_token: false,
                default_ttl: Some(Duration::from_secs(3600)),
            },
        }
    }
}

/// The refresh side of an adapter's Auth capability, as seen by the
/// token manager.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, account: &SocialAccount) -> std::result::Result<Credential, AdapterError>;
}

struct AccountEntry {
    /// Serializes refresh (and exchange completion) for one account.
    refresh_lock: Mutex<()>,
    state: std::sync::Mutex<TokenState>,
}

impl AccountEntry {
    fn new() -> Self {
        Self {
            refresh_lock: Mutex::new(()),
            state: std::sync::Mutex::new(TokenState::Unset),
        }
    }

    fn set_state(&self, state: TokenState) {
        *self.state.lock().unwrap() = state;
    }

    fn get_state(&self) -> TokenState {
        *self.state.lock().unwrap()
    }
}

pub struct TokenManager {
    store: Arc<dyn Store>,
    entries: std::sync::Mutex<HashMap<String, Arc<AccountEntry>>>,
    margin_secs: i64,
}

impl TokenManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            entries: std::sync::Mutex::new(HashMap::new()),
            margin_secs: REFRESH_MARGIN_SECS,
        }
    }

    pub fn with_margin(store: Arc<dyn Store>, margin_secs: i64) -> Self {
        Self {
            store,
            entries: std::sync::Mutex::new(HashMap::new()),
            margin_secs,
        }
    }

    fn entry(&self, account_id: &str) -> Arc<AccountEntry> {
        let mut entries = self.entries.lock().unwrap();
        entries
            .entry(account_id.to_string())
            .or_insert_with(|| Arc::new(AccountEntry::new()))
            .clone()
    }

    /// Current lifecycle state of an account's token.
    pub fn state(&self, account_id: &str) -> TokenState {
        self.entry(account_id).get_state()
    }

    /// `Unset → Exchanging`: a code exchange is in flight.
    pub fn begin_exchange(&self, account_id: &str) {
        self.entry(account_id).set_state(TokenState::Exchanging);
    }

    /// `Exchanging → Valid`: persist the exchanged credential. Applies
    /// the platform's default TTL when the exchange response carried no
    /// expiry, and replaces the stored credential atomically.
    pub async fn complete_exchange(
        &self,
        account: &mut SocialAccount,
        credential: Credential,
    ) -> Result<()> {
        let entry = self.entry(&account.id);
        let _guard = entry.refresh_lock.lock().await;

        account.credential =
            apply_default_ttl(account.platform, credential, chrono::Utc::now().timestamp());
        self.store.upsert_account(account).await?;
        entry.set_state(TokenState::Valid);
        info!(account = %account.id, platform = %account.platform, "credential exchanged");
        Ok(())
    }

    /// `Exchanging → Unset`: the exchange failed; nothing was stored.
    pub fn fail_exchange(&self, account_id: &str) {
        self.entry(account_id).set_state(TokenState::Unset);
    }

    /// Return a credential fit for use, refreshing proactively when
    /// expiry is within the margin.
    pub async fn valid_credential(
        &self,
        account_id: &str,
        refresher: &dyn TokenRefresher,
    ) -> Result<Credential> {
        let entry = self.entry(account_id);
        if entry.get_state() == TokenState::Expired {
            return Err(AdapterError::Auth(format!(
                "account {} requires re-authentication",
                account_id
            ))
            .into());
        }

        let account = self.load(account_id).await?;
        let now = chrono::Utc::now().timestamp();
        if !account.credential.is_expired(now, self.margin_secs) {
            if entry.get_state() == TokenState::Unset {
                entry.set_state(TokenState::Valid);
            }
            return Ok(account.credential);
        }

        self.refresh_single_flight(&entry, account_id, None, refresher)
            .await
    }

    /// Reactive path: an operation using `stale_token` hit an auth
    /// error. Refresh once; if another flight already replaced the
    /// token, just hand back the replacement.
    pub async fn refresh_credential(
        &self,
        account_id: &str,
        stale_token: &str,
        refresher: &dyn TokenRefresher,
    ) -> Result<Credential> {
        let entry = self.entry(account_id);
        self.refresh_single_flight(&entry, account_id, Some(stale_token), refresher)
            .await
    }

    async fn refresh_single_flight(
        &self,
        entry: &AccountEntry,
        account_id: &str,
        stale_token: Option<&str>,
        refresher: &dyn TokenRefresher,
    ) -> Result<Credential> {
        let _guard = entry.refresh_lock.lock().await;

        // Re-check under the lock: a concurrent caller may have
        // refreshed while we waited.
        let mut account = self.load(account_id).await?;
        let now = chrono::Utc::now().timestamp();
        let already_fresh = match stale_token {
            Some(stale) => account.credential.access_token != stale,
            None => !account.credential.is_expired(now, self.margin_secs),
        };
        if already_fresh {
            debug!(account = account_id, "credential already refreshed by concurrent caller");
            return Ok(account.credential);
        }

        let policy = TokenPolicy::for_platform(account.platform);
        if !policy.has_refresh {
            entry.set_state(TokenState::Expired);
            return Err(AdapterError::Auth(format!(
                "{} issues no refresh path; account {} requires re-authentication",
                account.platform, account_id
            ))
            .into());
        }
        if !policy.refresh_uses_access_token && account.credential.refresh_token.is_none() {
            entry.set_state(TokenState::Expired);
            return Err(AdapterError::Auth(format!(
                "account {} has no refresh token stored",
                account_id
            ))
            .into());
        }

        entry.set_state(TokenState::Refreshing);
        match refresher.refresh(&account).await {
            Ok(credential) => {
                // Whole-credential replacement, persisted before the
                // lock is released: no caller ever observes a
                // half-updated credential.
                account.credential = apply_default_ttl(account.platform, credential, now);
                self.store.upsert_account(&account).await?;
                entry.set_state(TokenState::Valid);
                info!(account = account_id, platform = %account.platform, "credential refreshed");
                Ok(account.credential)
            }
            Err(e) => {
                entry.set_state(TokenState::Expired);
                warn!(account = account_id, error = %e, "credential refresh failed");
                Err(AdapterError::Auth(format!(
                    "refresh failed for account {}: {}",
                    account_id, e
                ))
                .into())
            }
        }
    }

    async fn load(&self, account_id: &str) -> Result<SocialAccount> {
        self.store
            .find_account(account_id)
            .await?
            .ok_or_else(|| {
                SocialError::Adapter(AdapterError::Auth(format!(
                    "unknown account: {}",
                    account_id
                )))
            })
    }
}

fn apply_default_ttl(platform: Platform, mut credential: Credential, now: i64) -> Credential {
    if credential.expires_at.is_none() {
        if let Some(ttl) = TokenPolicy::for_platform(platform).default_ttl {
            credential.expires_at = Some(now + ttl.as_secs() as i64);
        }
    }
    credential
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRefresher {
        calls: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    impl CountingRefresher {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: Duration::from_millis(20),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                fail: true,
            }
        }

        fn count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh(
            &self,
            _account: &SocialAccount,
        ) -> std::result::Result<Credential, AdapterError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(AdapterError::Auth("refresh token revoked".to_string()));
            }
            Ok(Credential {
                access_token: format!("fresh-{}", n),
                refresh_token: Some("rotated".to_string()),
                token_secret: None,
                expires_at: None,
            })
        }
    }

    async fn seed_account(
        store: &Arc<MemoryStore>,
        platform: Platform,
        expires_at: Option<i64>,
    ) -> SocialAccount {
        let mut account = SocialAccount::new(
            platform,
            "owner".to_string(),
            Credential {
                access_token: "stale".to_string(),
                refresh_token: Some("rt".to_string()),
                token_secret: None,
                expires_at,
            },
        );
        if platform == Platform::Twitter {
            account.credential.refresh_token = None;
            account.credential.token_secret = Some("secret".to_string());
        }
        store.upsert_account(&account).await.unwrap();
        account
    }

    #[tokio::test]
    async fn test_fresh_credential_passes_through() {
        let store = Arc::new(MemoryStore::new());
        let future = chrono::Utc::now().timestamp() + 86_400;
        let account = seed_account(&store, Platform::YouTube, Some(future)).await;

        let manager = TokenManager::new(store);
        let refresher = CountingRefresher::new();
        let cred = manager
            .valid_credential(&account.id, &refresher)
            .await
            .unwrap();
        assert_eq!(cred.access_token, "stale");
        assert_eq!(refresher.count(), 0);
        assert_eq!(manager.state(&account.id), TokenState::Valid);
    }

    #[tokio::test]
    async fn test_expired_credential_triggers_refresh_and_persists() {
        let store = Arc::new(MemoryStore::new());
        let account = seed_account(&store, Platform::YouTube, Some(0)).await;

        let manager = TokenManager::new(store.clone());
        let refresher = CountingRefresher::new();
        let cred = manager
            .valid_credential(&account.id, &refresher)
            .await
            .unwrap();
        assert_eq!(cred.access_token, "fresh-0");
        assert_eq!(refresher.count(), 1);
        // Default TTL applied when refresh response omitted expiry.
        assert!(cred.expires_at.is_some());

        let stored = store.find_account(&account.id).await.unwrap().unwrap();
        assert_eq!(stored.credential.access_token, "fresh-0");
    }

    #[tokio::test]
    async fn test_single_flight_many_concurrent_callers() {
        let store = Arc::new(MemoryStore::new());
        let account = seed_account(&store, Platform::YouTube, Some(0)).await;

        let manager = Arc::new(TokenManager::new(store));
        let refresher = Arc::new(CountingRefresher::new());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            let refresher = refresher.clone();
            let id = account.id.clone();
            handles.push(tokio::spawn(async move {
                manager.valid_credential(&id, refresher.as_ref()).await
            }));
        }

        let mut tokens = Vec::new();
        for handle in handles {
            tokens.push(handle.await.unwrap().unwrap().access_token);
        }

        assert_eq!(refresher.count(), 1, "exactly one refresh call");
        assert!(tokens.iter().all(|t| t == "fresh-0"));
    }

    #[tokio::test]
    async fn test_reactive_refresh_skips_when_already_replaced() {
        let store = Arc::new(MemoryStore::new());
        let future = chrono::Utc::now().timestamp() + 86_400;
        let mut account = seed_account(&store, Platform::LinkedIn, Some(future)).await;

        // Another flight already rotated the token.
        account.credential.access_token = "rotated-token".to_string();
        store.upsert_account(&account).await.unwrap();

        let manager = TokenManager::new(store);
        let refresher = CountingRefresher::new();
        let cred = manager
            .refresh_credential(&account.id, "stale", &refresher)
            .await
            .unwrap();
        assert_eq!(cred.access_token, "rotated-token");
        assert_eq!(refresher.count(), 0);
    }

    #[tokio::test]
    async fn test_no_refresh_platform_goes_expired() {
        let store = Arc::new(MemoryStore::new());
        let account = seed_account(&store, Platform::Twitter, Some(0)).await;

        let manager = TokenManager::new(store);
        let refresher = CountingRefresher::new();
        let err = manager
            .valid_credential(&account.id, &refresher)
            .await
            .unwrap_err();
        assert!(matches!(err, SocialError::Adapter(AdapterError::Auth(_))));
        assert_eq!(refresher.count(), 0);
        assert_eq!(manager.state(&account.id), TokenState::Expired);

        // Terminal until a fresh exchange: subsequent calls fail fast.
        let err = manager
            .valid_credential(&account.id, &refresher)
            .await
            .unwrap_err();
        assert!(matches!(err, SocialError::Adapter(AdapterError::Auth(_))));
    }

    #[tokio::test]
    async fn test_failed_refresh_goes_expired() {
        let store = Arc::new(MemoryStore::new());
        let account = seed_account(&store, Platform::YouTube, Some(0)).await;

        let manager = TokenManager::new(store);
        let refresher = CountingRefresher::failing();
        let err = manager
            .valid_credential(&account.id, &refresher)
            .await
            .unwrap_err();
        assert!(matches!(err, SocialError::Adapter(AdapterError::Auth(_))));
        assert_eq!(manager.state(&account.id), TokenState::Expired);
        assert_eq!(refresher.count(), 1, "never auto-retried");
    }

    #[tokio::test]
    async fn test_exchange_lifecycle() {
        let store = Arc::new(MemoryStore::new());
        let manager = TokenManager::new(store.clone());

        let mut account = SocialAccount::new(
            Platform::Facebook,
            "owner".to_string(),
            Credential::new(String::new()),
        );
        assert_eq!(manager.state(&account.id), TokenState::Unset);

        manager.begin_exchange(&account.id);
        assert_eq!(manager.state(&account.id), TokenState::Exchanging);

        manager
            .complete_exchange(&mut account, Credential::new("short-lived".to_string()))
            .await
            .unwrap();
        assert_eq!(manager.state(&account.id), TokenState::Valid);
        // Facebook default TTL applied.
        assert!(account.credential.expires_at.is_some());

        let stored = store.find_account(&account.id).await.unwrap().unwrap();
        assert_eq!(stored.credential.access_token, "short-lived");
    }

    #[tokio::test]
    async fn test_failed_exchange_returns_to_unset() {
        let store = Arc::new(MemoryStore::new());
        let manager = TokenManager::new(store);

        manager.begin_exchange("acct-x");
        manager.fail_exchange("acct-x");
        assert_eq!(manager.state("acct-x"), TokenState::Unset);
    }

    #[tokio::test]
    async fn test_unknown_account_is_auth_error() {
        let store = Arc::new(MemoryStore::new());
        let manager = TokenManager::new(store);
        let refresher = CountingRefresher::new();
        let err = manager
            .valid_credential("ghost", &refresher)
            .await
            .unwrap_err();
        assert!(matches!(err, SocialError::Adapter(AdapterError::Auth(_))));
    }
}
