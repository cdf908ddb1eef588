//! Platform adapters
//!
//! Each platform implements [`PlatformAdapter`] plus whichever
//! capability traits it genuinely supports. Callers go through the
//! checked accessors (`messaging()`, `publishing()`, ...) which fail
//! fast with [`AdapterError::Unsupported`] instead of silently
//! no-opping; sub-operations a platform lacks inside an otherwise
//! supported capability raise the same error from the adapter body.
//!
//! Adapters are stateless beyond their app configuration and HTTP
//! client: persistence belongs to the reconciliation engine and token
//! storage to the token manager.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::{AppConfig, Config};
use crate::cursor::Cursor;
use crate::error::{AdapterError, Result};
use crate::http::RestClient;
use crate::types::{
    CanonicalComment, CanonicalConversation, CanonicalMessage, CanonicalMetric, CanonicalPost,
    Credential, Identity, Page, Platform, PublishContent, SocialAccount,
};

pub mod facebook;
pub mod instagram;
pub mod linkedin;
pub mod mock;
pub mod oauth1;
pub mod twitter;
pub mod youtube;

pub use facebook::FacebookAdapter;
pub use instagram::InstagramAdapter;
pub use linkedin::LinkedInAdapter;
pub use mock::MockAdapter;
pub use twitter::TwitterAdapter;
pub use youtube::YouTubeAdapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Auth,
    Messaging,
    Comments,
    Publish,
    Metrics,
}

/// Authorization URL plus the CSRF state the caller must verify on
/// callback. `state` is `None` for flows with no state echo (OAuth1).
#[derive(Debug, Clone)]
pub struct AuthorizeUrl {
    pub url: String,
    pub state: Option<String>,
}

#[async_trait]
pub trait AuthCapability: Send + Sync {
    /// Build the user-facing authorization URL, generating fresh CSRF
    /// state where the platform's flow echoes one.
    async fn authorize_url(&self) -> std::result::Result<AuthorizeUrl, AdapterError>;

    async fn exchange_code(&self, code: &str) -> std::result::Result<Credential, AdapterError>;

    async fn refresh(
        &self,
        account: &SocialAccount,
    ) -> std::result::Result<Credential, AdapterError>;

    async fn profile(
        &self,
        account: &SocialAccount,
        credential: &Credential,
    ) -> std::result::Result<Identity, AdapterError>;
}

#[async_trait]
pub trait MessagingCapability: Send + Sync {
    async fn conversations(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        limit: Option<u32>,
        cursor: Option<&Cursor>,
    ) -> std::result::Result<Page<CanonicalConversation>, AdapterError>;

    async fn messages(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        platform_conversation_id: &str,
        limit: Option<u32>,
        cursor: Option<&Cursor>,
    ) -> std::result::Result<Page<CanonicalMessage>, AdapterError>;

    async fn send_message(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        recipient_id: &str,
        body: &str,
    ) -> std::result::Result<CanonicalMessage, AdapterError>;

    async fn reply_to_conversation(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        platform_conversation_id: &str,
        body: &str,
    ) -> std::result::Result<CanonicalMessage, AdapterError>;

    async fn mark_read(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        platform_conversation_id: &str,
    ) -> std::result::Result<(), AdapterError>;
}

#[async_trait]
pub trait CommentCapability: Send + Sync {
    async fn comments(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        platform_post_id: &str,
        limit: Option<u32>,
        cursor: Option<&Cursor>,
    ) -> std::result::Result<Page<CanonicalComment>, AdapterError>;

    async fn replies(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        platform_comment_id: &str,
        limit: Option<u32>,
        cursor: Option<&Cursor>,
    ) -> std::result::Result<Page<CanonicalComment>, AdapterError>;

    async fn post_comment(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        platform_post_id: &str,
        body: &str,
    ) -> std::result::Result<CanonicalComment, AdapterError>;

    async fn reply_to_comment(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        platform_comment_id: &str,
        body: &str,
    ) -> std::result::Result<CanonicalComment, AdapterError>;

    async fn react(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        platform_comment_id: &str,
    ) -> std::result::Result<(), AdapterError>;

    async fn unreact(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        platform_comment_id: &str,
    ) -> std::result::Result<(), AdapterError>;

    async fn delete_comment(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        platform_comment_id: &str,
    ) -> std::result::Result<(), AdapterError>;

    async fn hide_comment(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        platform_comment_id: &str,
    ) -> std::result::Result<(), AdapterError>;

    async fn unhide_comment(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        platform_comment_id: &str,
    ) -> std::result::Result<(), AdapterError>;
}

#[async_trait]
pub trait PublishCapability: Send + Sync {
    /// Publish immediately. Multi-step platforms (container create,
    /// processing poll, publish) run the whole sequence inside this one
    /// call; `deadline` bounds the internal status poll and is ignored
    /// by single-step platforms.
    async fn publish(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        content: &PublishContent,
        deadline: Option<Duration>,
    ) -> std::result::Result<CanonicalPost, AdapterError>;

    async fn schedule(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        content: &PublishContent,
        publish_at: i64,
    ) -> std::result::Result<CanonicalPost, AdapterError>;

    async fn delete_post(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        platform_post_id: &str,
    ) -> std::result::Result<(), AdapterError>;
}

#[async_trait]
pub trait MetricsCapability: Send + Sync {
    async fn account_metrics(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        metric_types: &[String],
        period_start: i64,
        period_end: i64,
    ) -> std::result::Result<Vec<CanonicalMetric>, AdapterError>;

    async fn post_metrics(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        platform_post_id: &str,
    ) -> std::result::Result<Vec<CanonicalMetric>, AdapterError>;

    async fn audience_demographics(
        &self,
        account: &SocialAccount,
        credential: &Credential,
    ) -> std::result::Result<Vec<CanonicalMetric>, AdapterError>;

    async fn historical_data(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        metric_type: &str,
        period_start: i64,
        period_end: i64,
    ) -> std::result::Result<Vec<CanonicalMetric>, AdapterError>;
}

/// Base trait every adapter implements. The `as_*` methods return
/// `None` for capabilities the platform lacks; the checked accessors
/// turn that into the uniform error.
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;
    fn capabilities(&self) -> &'static [Capability];

    fn as_auth(&self) -> Option<&dyn AuthCapability> {
        None
    }
    fn as_messaging(&self) -> Option<&dyn MessagingCapability> {
        None
    }
    fn as_comments(&self) -> Option<&dyn CommentCapability> {
        None
    }
    fn as_publishing(&self) -> Option<&dyn PublishCapability> {
        None
    }
    fn as_metrics(&self) -> Option<&dyn MetricsCapability> {
        None
    }

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    fn auth(&self) -> std::result::Result<&dyn AuthCapability, AdapterError> {
        self.as_auth().ok_or(AdapterError::Unsupported {
            platform: self.platform(),
            operation: "auth",
        })
    }

    fn messaging(&self) -> std::result::Result<&dyn MessagingCapability, AdapterError> {
        self.as_messaging().ok_or(AdapterError::Unsupported {
            platform: self.platform(),
            operation: "messaging",
        })
    }

    fn comments(&self) -> std::result::Result<&dyn CommentCapability, AdapterError> {
        self.as_comments().ok_or(AdapterError::Unsupported {
            platform: self.platform(),
            operation: "comments",
        })
    }

    fn publishing(&self) -> std::result::Result<&dyn PublishCapability, AdapterError> {
        self.as_publishing().ok_or(AdapterError::Unsupported {
            platform: self.platform(),
            operation: "publishing",
        })
    }

    fn metrics(&self) -> std::result::Result<&dyn MetricsCapability, AdapterError> {
        self.as_metrics().ok_or(AdapterError::Unsupported {
            platform: self.platform(),
            operation: "metrics",
        })
    }
}

/// Pull a required string field out of a platform response.
pub(crate) fn field_str(
    platform: Platform,
    value: &serde_json::Value,
    key: &str,
) -> std::result::Result<String, AdapterError> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| AdapterError::Remote {
            status: None,
            message: format!("{} response missing field: {}", platform, key),
        })
}

pub(crate) fn opt_str(value: &serde_json::Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

pub(crate) fn opt_i64(value: &serde_json::Value, key: &str) -> Option<i64> {
    value.get(key).and_then(|v| v.as_i64())
}

/// Timestamps arrive either RFC 3339 proper or in the Graph API's
/// `+0000` offset spelling.
pub(crate) fn parse_remote_time(raw: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .or_else(|_| chrono::DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z"))
        .map(|dt| dt.timestamp())
        .ok()
}

/// Construct the adapter for a configured platform.
pub fn build_adapter(
    platform: Platform,
    config: &Config,
    client: RestClient,
) -> Result<Box<dyn PlatformAdapter>> {
    let app: AppConfig = config.app(platform)?.clone();
    let adapter: Box<dyn PlatformAdapter> = match platform {
        Platform::Facebook => Box::new(FacebookAdapter::new(app, client)),
        Platform::Instagram => Box::new(InstagramAdapter::new(app, client)),
        Platform::Twitter => Box::new(TwitterAdapter::new(app, client)),
        Platform::LinkedIn => Box::new(LinkedInAdapter::new(app, client)),
        Platform::YouTube => Box::new(YouTubeAdapter::new(app, client)),
    };
    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare;

    impl PlatformAdapter for Bare {
        fn platform(&self) -> Platform {
            Platform::YouTube
        }
        fn capabilities(&self) -> &'static [Capability] {
            &[Capability::Auth]
        }
    }

    #[test]
    fn test_missing_capability_fails_fast() {
        let adapter = Bare;
        assert!(adapter.supports(Capability::Auth));
        assert!(!adapter.supports(Capability::Messaging));

        let err = adapter.messaging().err().unwrap();
        match err {
            AdapterError::Unsupported { platform, operation } => {
                assert_eq!(platform, Platform::YouTube);
                assert_eq!(operation, "messaging");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
