//! Core types for Socialhub
//!
//! Canonical records are the platform-agnostic shapes adapters decode
//! raw platform responses into. The reconciliation engine only ever
//! sees canonical records; platform field lists stay inside adapters.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cursor::Cursor;
use crate::error::AdapterError;

/// The five integrated platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Facebook,
    Instagram,
    Twitter,
    LinkedIn,
    YouTube,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
            Platform::Twitter => "twitter",
            Platform::LinkedIn => "linkedin",
            Platform::YouTube => "youtube",
        }
    }

    pub const ALL: [Platform; 5] = [
        Platform::Facebook,
        Platform::Instagram,
        Platform::Twitter,
        Platform::LinkedIn,
        Platform::YouTube,
    ];
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "facebook" => Ok(Platform::Facebook),
            "instagram" => Ok(Platform::Instagram),
            "twitter" | "x" => Ok(Platform::Twitter),
            "linkedin" => Ok(Platform::LinkedIn),
            "youtube" => Ok(Platform::YouTube),
            _ => Err(format!(
                "Unknown platform: '{}'. Valid options: facebook, instagram, twitter, linkedin, youtube",
                s
            )),
        }
    }
}

/// Token material backing one account's authenticated calls.
///
/// `token_secret` is only set for OAuth 1.0a platforms (Twitter).
/// `expires_at` is a Unix timestamp; `None` means the platform issued
/// the token with unknown or implicit expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_secret: Option<String>,
    pub expires_at: Option<i64>,
}

impl Credential {
    pub fn new(access_token: String) -> Self {
        Self {
            access_token,
            refresh_token: None,
            token_secret: None,
            expires_at: None,
        }
    }

    /// Whether the token is expired (or expires within `margin_secs`)
    /// at the given instant. Tokens without a recorded expiry are never
    /// considered expired here; reactive refresh on a 401 covers them.
    pub fn is_expired(&self, now: i64, margin_secs: i64) -> bool {
        match self.expires_at {
            Some(at) => at - margin_secs <= now,
            None => false,
        }
    }
}

/// A connected platform account.
///
/// `metadata` holds platform-defined keys (business-account id, channel
/// id, organization URN, …). Operations that need a key fail with
/// [`AdapterError::MissingMetadata`] when it is absent — a missing key
/// is a distinct error, not a null-handled fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialAccount {
    pub id: String,
    pub platform: Platform,
    pub owner_id: String,
    pub credential: Credential,
    pub metadata: HashMap<String, String>,
}

impl SocialAccount {
    pub fn new(platform: Platform, owner_id: String, credential: Credential) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            platform,
            owner_id,
            credential,
            metadata: HashMap::new(),
        }
    }

    /// Fetch a required metadata key.
    pub fn metadata_value(&self, key: &'static str) -> Result<&str, AdapterError> {
        self.metadata
            .get(key)
            .map(String::as_str)
            .ok_or(AdapterError::MissingMetadata {
                platform: self.platform,
                key,
            })
    }
}

/// A remote party: message recipient, message sender, comment author.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

impl Identity {
    pub fn bare(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            avatar_url: None,
        }
    }
}

/// One page of canonical records plus the cursor for the next page.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub records: Vec<T>,
    pub next: Option<Cursor>,
}

impl<T> Page<T> {
    pub fn new(records: Vec<T>, next: Option<Cursor>) -> Self {
        Self { records, next }
    }

    pub fn end(records: Vec<T>) -> Self {
        Self {
            records,
            next: None,
        }
    }
}

/// Canonical conversation record. Natural key: (account, platform
/// conversation id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalConversation {
    pub platform_conversation_id: String,
    pub recipient: Identity,
    pub last_message_at: i64,
    pub read: bool,
    /// Present when the platform exposes it directly; inferred from the
    /// page window otherwise (adapters document which).
    pub unread_count: Option<u32>,
    pub snippet: Option<String>,
}

/// Canonical message record. Natural key: (conversation, platform
/// message id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalMessage {
    pub platform_message_id: String,
    pub platform_conversation_id: String,
    pub sender: Identity,
    pub body: String,
    pub attachments: Vec<String>,
    pub from_me: bool,
    pub read: bool,
    pub sent_at: i64,
}

/// Canonical comment record. Natural key: (account, platform comment id).
///
/// `observed_at` is when the adapter took this snapshot; the
/// reconciliation engine uses it for the last-writer-wins counter merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalComment {
    pub platform_comment_id: String,
    pub platform_post_id: String,
    pub parent_comment_id: Option<String>,
    pub author: Identity,
    pub body: String,
    pub is_reply: bool,
    pub like_count: i64,
    pub reply_count: i64,
    pub created_at: i64,
    pub observed_at: i64,
}

/// Publish lifecycle of a post. `delete` is a soft transition to
/// `Deleted`; rows are never removed by this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    Scheduled,
    Published,
    Deleted,
}

impl PublishStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishStatus::Scheduled => "scheduled",
            PublishStatus::Published => "published",
            PublishStatus::Deleted => "deleted",
        }
    }
}

impl FromStr for PublishStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(PublishStatus::Scheduled),
            "published" => Ok(PublishStatus::Published),
            "deleted" => Ok(PublishStatus::Deleted),
            _ => Err(format!("Unknown publish status: '{}'", s)),
        }
    }
}

/// Canonical post record. Natural key: (account, platform post id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalPost {
    pub platform_post_id: String,
    pub content: String,
    pub media_urls: Vec<String>,
    pub status: PublishStatus,
    pub scheduled_at: Option<i64>,
    pub published_at: Option<i64>,
}

/// What to publish. Platforms requiring a multi-step container flow
/// (Instagram/YouTube video) still expose it as one adapter call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PublishContent {
    Text {
        body: String,
    },
    Image {
        caption: String,
        image_url: String,
    },
    Video {
        caption: String,
        video_url: String,
    },
    Link {
        message: String,
        link_url: String,
    },
}

impl PublishContent {
    /// The human-visible text of the content, used for the local row.
    pub fn body(&self) -> &str {
        match self {
            PublishContent::Text { body } => body,
            PublishContent::Image { caption, .. } => caption,
            PublishContent::Video { caption, .. } => caption,
            PublishContent::Link { message, .. } => message,
        }
    }

    pub fn media_urls(&self) -> Vec<String> {
        match self {
            PublishContent::Text { .. } => Vec::new(),
            PublishContent::Image { image_url, .. } => vec![image_url.clone()],
            PublishContent::Video { video_url, .. } => vec![video_url.clone()],
            PublishContent::Link { link_url, .. } => vec![link_url.clone()],
        }
    }
}

/// Canonical metric snapshot.
///
/// `value` is structured, not scalar — platforms return time series or
/// faceted breakdowns. Account-scope metrics key on (account, metric
/// type, period); post metrics key on (account, post, metric type) and
/// are a rolling "latest" snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalMetric {
    pub metric_type: String,
    pub platform_post_id: Option<String>,
    pub value: serde_json::Value,
    pub period_start: Option<i64>,
    pub period_end: Option<i64>,
}

/// Static metric display catalog: metric type → (title, description).
///
/// Per-install lookup data, not part of the adapter contract.
pub fn metrics_catalog() -> &'static [(&'static str, &'static str, &'static str)] {
    &[
        ("impressions", "Impressions", "Times content was shown"),
        ("reach", "Reach", "Unique accounts that saw content"),
        ("engagement", "Engagement", "Likes, comments, and shares"),
        ("followers", "Followers", "Total follower count"),
        ("profile_views", "Profile views", "Visits to the profile"),
        ("video_views", "Video views", "Views across video content"),
        (
            "audience_demographics",
            "Audience demographics",
            "Follower breakdown by age, gender, and region",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_display_roundtrip() {
        for platform in Platform::ALL {
            let parsed: Platform = platform.as_str().parse().unwrap();
            assert_eq!(parsed, platform);
        }
    }

    #[test]
    fn test_platform_from_str_aliases() {
        assert_eq!("x".parse::<Platform>().unwrap(), Platform::Twitter);
        assert_eq!("FACEBOOK".parse::<Platform>().unwrap(), Platform::Facebook);
        assert!("myspace".parse::<Platform>().is_err());
    }

    #[test]
    fn test_credential_expiry() {
        let mut cred = Credential::new("tok".to_string());
        assert!(!cred.is_expired(1_700_000_000, 300));

        cred.expires_at = Some(1_700_000_100);
        assert!(cred.is_expired(1_700_000_000, 300));
        assert!(!cred.is_expired(1_699_999_000, 300));
        assert!(cred.is_expired(1_700_000_200, 0));
    }

    #[test]
    fn test_account_metadata_value() {
        let mut account = SocialAccount::new(
            Platform::Instagram,
            "owner-1".to_string(),
            Credential::new("tok".to_string()),
        );

        let err = account.metadata_value("business_account_id").unwrap_err();
        assert!(matches!(
            err,
            AdapterError::MissingMetadata {
                platform: Platform::Instagram,
                key: "business_account_id"
            }
        ));

        account
            .metadata
            .insert("business_account_id".to_string(), "178414".to_string());
        assert_eq!(
            account.metadata_value("business_account_id").unwrap(),
            "178414"
        );
    }

    #[test]
    fn test_account_ids_unique() {
        let a = SocialAccount::new(
            Platform::Facebook,
            "o".to_string(),
            Credential::new("t".to_string()),
        );
        let b = SocialAccount::new(
            Platform::Facebook,
            "o".to_string(),
            Credential::new("t".to_string()),
        );
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_publish_status_roundtrip() {
        for status in [
            PublishStatus::Scheduled,
            PublishStatus::Published,
            PublishStatus::Deleted,
        ] {
            assert_eq!(status.as_str().parse::<PublishStatus>().unwrap(), status);
        }
        assert!("draft".parse::<PublishStatus>().is_err());
    }

    #[test]
    fn test_publish_content_body_and_media() {
        let content = PublishContent::Image {
            caption: "sunset".to_string(),
            image_url: "https://cdn.example/1.jpg".to_string(),
        };
        assert_eq!(content.body(), "sunset");
        assert_eq!(content.media_urls(), vec!["https://cdn.example/1.jpg"]);

        let text = PublishContent::Text {
            body: "hello".to_string(),
        };
        assert!(text.media_urls().is_empty());
    }

    #[test]
    fn test_metric_value_is_structured() {
        let metric = CanonicalMetric {
            metric_type: "impressions".to_string(),
            platform_post_id: None,
            value: serde_json::json!({ "series": [{ "t": 1700000000, "v": 42 }] }),
            period_start: Some(1_700_000_000),
            period_end: Some(1_700_086_400),
        };
        let json = serde_json::to_string(&metric).unwrap();
        let back: CanonicalMetric = serde_json::from_str(&json).unwrap();
        assert_eq!(back.value["series"][0]["v"], 42);
    }

    #[test]
    fn test_metrics_catalog_has_titles() {
        let catalog = metrics_catalog();
        assert!(catalog.iter().any(|(name, _, _)| *name == "impressions"));
        for (_, title, description) in catalog {
            assert!(!title.is_empty());
            assert!(!description.is_empty());
        }
    }
}
