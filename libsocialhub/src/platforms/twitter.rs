//! Twitter platform implementation
//!
//! v1.1 REST integration signed per-request with OAuth 1.0a. Token
//! pairs never expire and there is no refresh; the three-legged dance
//! runs request-token → authorize → access-token, with no CSRF state
//! echo (the verifier plays that role).
//!
//! Tweet collections page with a numeric `max_id` watermark. The DM
//! event list has no thread objects; conversations are synthesized by
//! grouping events per counterpart within the fetched window.
//!
//! Accounts must carry a `screen_name` metadata key.

use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::cursor::Cursor;
use crate::error::{classify_transport, AdapterError};
use crate::http::RestClient;
use crate::platforms::oauth1::OAuth1Signer;
use crate::platforms::{
    field_str, opt_i64, opt_str, AuthCapability, AuthorizeUrl, Capability, CommentCapability,
    MessagingCapability, MetricsCapability, PlatformAdapter, PublishCapability,
};
use crate::types::{
    CanonicalComment, CanonicalConversation, CanonicalMessage, CanonicalMetric, CanonicalPost,
    Credential, Identity, Page, Platform, PublishContent, PublishStatus, SocialAccount,
};

const API_URL: &str = "https://api.twitter.com/1.1";
const OAUTH_URL: &str = "https://api.twitter.com/oauth";
const DEFAULT_LIMIT: u32 = 25;

const CAPABILITIES: &[Capability] = &[
    Capability::Auth,
    Capability::Messaging,
    Capability::Comments,
    Capability::Publish,
    Capability::Metrics,
];

pub struct TwitterAdapter {
    client: RestClient,
    signer: OAuth1Signer,
}

impl TwitterAdapter {
    pub fn new(app: AppConfig, client: RestClient) -> Self {
        let signer = OAuth1Signer::new(app.client_id.clone(), app.client_secret.clone());
        Self { client, signer }
    }

    fn token_pair(credential: &Credential) -> Result<(&str, &str), AdapterError> {
        let secret = credential.token_secret.as_deref().ok_or_else(|| {
            AdapterError::Auth("twitter credential is missing the token secret".to_string())
        })?;
        Ok((credential.access_token.as_str(), secret))
    }

    async fn signed_get(
        &self,
        credential: &Credential,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<Value, AdapterError> {
        let token = Self::token_pair(credential)?;
        let header = self
            .signer
            .authorization_header("GET", url, Some(token), params);
        let rb = self
            .client
            .inner()
            .get(url)
            .query(params)
            .header(reqwest::header::AUTHORIZATION, header);
        self.client.send(Platform::Twitter, rb).await
    }

    async fn signed_post_form(
        &self,
        credential: &Credential,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<Value, AdapterError> {
        let token = Self::token_pair(credential)?;
        let header = self
            .signer
            .authorization_header("POST", url, Some(token), params);
        let rb = self
            .client
            .inner()
            .post(url)
            .form(params)
            .header(reqwest::header::AUTHORIZATION, header);
        self.client.send(Platform::Twitter, rb).await
    }

    /// JSON bodies stay out of the OAuth1 signature base string.
    async fn signed_post_json(
        &self,
        credential: &Credential,
        url: &str,
        body: &Value,
    ) -> Result<Value, AdapterError> {
        let token = Self::token_pair(credential)?;
        let header = self.signer.authorization_header("POST", url, Some(token), &[]);
        let rb = self
            .client
            .inner()
            .post(url)
            .json(body)
            .header(reqwest::header::AUTHORIZATION, header);
        self.client.send(Platform::Twitter, rb).await
    }

    /// The token legs answer form-encoded bodies, not JSON.
    async fn oauth_leg(
        &self,
        url: &str,
        token: Option<(&str, &str)>,
        params: &[(&str, &str)],
    ) -> Result<Value, AdapterError> {
        let header = self.signer.authorization_header("POST", url, token, params);
        let response = self
            .client
            .inner()
            .post(url)
            .form(params)
            .header(reqwest::header::AUTHORIZATION, header)
            .send()
            .await
            .map_err(|e| classify_transport(Platform::Twitter, &e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify_transport(Platform::Twitter, &e))?;
        if !status.is_success() {
            return Err(AdapterError::Auth(format!(
                "oauth leg failed with status {}: {}",
                status.as_u16(),
                body
            )));
        }
        Ok(parse_form_body(&body))
    }
}

fn parse_form_body(body: &str) -> Value {
    let mut map = serde_json::Map::new();
    for pair in body.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            let decoded = percent_decode_str(value).decode_utf8_lossy().to_string();
            map.insert(key.to_string(), Value::String(decoded));
        }
    }
    Value::Object(map)
}

/// "Wed Oct 10 20:19:24 +0000 2018"
fn parse_twitter_time(raw: &str) -> Option<i64> {
    chrono::DateTime::parse_from_str(raw, "%a %b %d %H:%M:%S %z %Y")
        .map(|dt| dt.timestamp())
        .ok()
}

fn parse_user(value: &Value) -> Identity {
    Identity {
        id: opt_str(value, "id_str").unwrap_or_default(),
        name: opt_str(value, "screen_name").or_else(|| opt_str(value, "name")),
        avatar_url: opt_str(value, "profile_image_url_https"),
    }
}

fn parse_tweet_as_comment(
    value: &Value,
    platform_post_id: &str,
    observed_at: i64,
) -> Result<CanonicalComment, AdapterError> {
    let parent = opt_str(value, "in_reply_to_status_id_str");
    Ok(CanonicalComment {
        platform_comment_id: field_str(Platform::Twitter, value, "id_str")?,
        platform_post_id: platform_post_id.to_string(),
        is_reply: parent.as_deref() != Some(platform_post_id) && parent.is_some(),
        parent_comment_id: parent.filter(|p| p != platform_post_id),
        author: value
            .get("user")
            .map(parse_user)
            .unwrap_or_else(|| Identity::bare("unknown")),
        body: opt_str(value, "text")
            .or_else(|| opt_str(value, "full_text"))
            .unwrap_or_default(),
        like_count: opt_i64(value, "favorite_count").unwrap_or(0),
        reply_count: opt_i64(value, "reply_count").unwrap_or(0),
        created_at: opt_str(value, "created_at")
            .as_deref()
            .and_then(parse_twitter_time)
            .unwrap_or(0),
        observed_at,
    })
}

/// One DM event. Timestamps arrive as epoch-millis strings.
struct DmEvent {
    id: String,
    sender_id: String,
    recipient_id: String,
    text: String,
    sent_at: i64,
}

fn parse_dm_event(value: &Value) -> Option<DmEvent> {
    let create = value.get("message_create")?;
    Some(DmEvent {
        id: opt_str(value, "id")?,
        sender_id: opt_str(create, "sender_id")?,
        recipient_id: create
            .pointer("/target/recipient_id")
            .and_then(Value::as_str)?
            .to_string(),
        text: create
            .pointer("/message_data/text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        sent_at: opt_str(value, "created_timestamp")
            .and_then(|ts| ts.parse::<i64>().ok())
            .map(|ms| ms / 1000)
            .unwrap_or(0),
    })
}

/// Group a window of DM events into per-counterpart conversations,
/// newest event first. Read state is inferred from the latest event in
/// the window; the platform exposes no unread counter.
fn conversations_from_events(events: &[DmEvent], own_id: &str) -> Vec<CanonicalConversation> {
    let mut by_counterpart: Vec<CanonicalConversation> = Vec::new();
    for event in events {
        let counterpart = if event.sender_id == own_id {
            &event.recipient_id
        } else {
            &event.sender_id
        };
        if let Some(existing) = by_counterpart
            .iter_mut()
            .find(|c| &c.platform_conversation_id == counterpart)
        {
            // Events arrive newest-first; later entries are older.
            if event.sent_at > existing.last_message_at {
                existing.last_message_at = event.sent_at;
                existing.read = event.sender_id == own_id;
                existing.snippet = Some(event.text.clone());
            }
        } else {
            by_counterpart.push(CanonicalConversation {
                platform_conversation_id: counterpart.clone(),
                recipient: Identity::bare(counterpart.clone()),
                last_message_at: event.sent_at,
                read: event.sender_id == own_id,
                unread_count: None,
                snippet: Some(event.text.clone()),
            });
        }
    }
    by_counterpart.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
    by_counterpart
}

impl PlatformAdapter for TwitterAdapter {
    fn platform(&self) -> Platform {
        Platform::Twitter
    }

    fn capabilities(&self) -> &'static [Capability] {
        CAPABILITIES
    }

    fn as_auth(&self) -> Option<&dyn AuthCapability> {
        Some(self)
    }
    fn as_messaging(&self) -> Option<&dyn MessagingCapability> {
        Some(self)
    }
    fn as_comments(&self) -> Option<&dyn CommentCapability> {
        Some(self)
    }
    fn as_publishing(&self) -> Option<&dyn PublishCapability> {
        Some(self)
    }
    fn as_metrics(&self) -> Option<&dyn MetricsCapability> {
        Some(self)
    }
}

#[async_trait]
impl AuthCapability for TwitterAdapter {
    /// Runs the request-token leg, then hands back the authorize URL.
    /// No `state`: the flow's verifier serves that purpose.
    async fn authorize_url(&self) -> Result<AuthorizeUrl, AdapterError> {
        let response = self
            .oauth_leg(
                &format!("{}/request_token", OAUTH_URL),
                None,
                &[("oauth_callback", "oob")],
            )
            .await?;
        let request_token = field_str(Platform::Twitter, &response, "oauth_token")?;
        Ok(AuthorizeUrl {
            url: format!("{}/authorize?oauth_token={}", OAUTH_URL, request_token),
            state: None,
        })
    }

    /// `code` carries `<oauth_token>:<oauth_verifier>` from the
    /// callback.
    async fn exchange_code(&self, code: &str) -> Result<Credential, AdapterError> {
        let (request_token, verifier) = code.split_once(':').ok_or_else(|| {
            AdapterError::Auth("expected callback code as oauth_token:oauth_verifier".to_string())
        })?;
        let response = self
            .oauth_leg(
                &format!("{}/access_token", OAUTH_URL),
                None,
                &[
                    ("oauth_token", request_token),
                    ("oauth_verifier", verifier),
                ],
            )
            .await?;
        Ok(Credential {
            access_token: field_str(Platform::Twitter, &response, "oauth_token")?,
            refresh_token: None,
            token_secret: Some(field_str(Platform::Twitter, &response, "oauth_token_secret")?),
            expires_at: None,
        })
    }

    async fn refresh(&self, _account: &SocialAccount) -> Result<Credential, AdapterError> {
        Err(AdapterError::Unsupported {
            platform: Platform::Twitter,
            operation: "token refresh",
        })
    }

    async fn profile(
        &self,
        _account: &SocialAccount,
        credential: &Credential,
    ) -> Result<Identity, AdapterError> {
        let response = self
            .signed_get(
                credential,
                &format!("{}/account/verify_credentials.json", API_URL),
                &[],
            )
            .await?;
        Ok(parse_user(&response))
    }
}

#[async_trait]
impl MessagingCapability for TwitterAdapter {
    async fn conversations(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        limit: Option<u32>,
        cursor: Option<&Cursor>,
    ) -> Result<Page<CanonicalConversation>, AdapterError> {
        let count = limit.unwrap_or(DEFAULT_LIMIT).to_string();
        let mut params: Vec<(&str, &str)> = vec![("count", count.as_str())];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor.as_page_token(Platform::Twitter)?));
        }
        let response = self
            .signed_get(
                credential,
                &format!("{}/direct_messages/events/list.json", API_URL),
                &params,
            )
            .await?;

        let events: Vec<DmEvent> = response
            .get("events")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(parse_dm_event).collect())
            .unwrap_or_default();
        let records = conversations_from_events(&events, &account.owner_id);
        let next = opt_str(&response, "next_cursor")
            .map(|token| Cursor::page_token(Platform::Twitter, token));
        Ok(Page::new(records, next))
    }

    async fn messages(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        platform_conversation_id: &str,
        limit: Option<u32>,
        cursor: Option<&Cursor>,
    ) -> Result<Page<CanonicalMessage>, AdapterError> {
        let count = limit.unwrap_or(DEFAULT_LIMIT).to_string();
        let mut params: Vec<(&str, &str)> = vec![("count", count.as_str())];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor.as_page_token(Platform::Twitter)?));
        }
        let response = self
            .signed_get(
                credential,
                &format!("{}/direct_messages/events/list.json", API_URL),
                &params,
            )
            .await?;

        let own_id = &account.owner_id;
        let records = response
            .get("events")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(parse_dm_event)
                    .filter(|e| {
                        e.sender_id == *platform_conversation_id
                            || e.recipient_id == *platform_conversation_id
                    })
                    .map(|e| CanonicalMessage {
                        platform_message_id: e.id,
                        platform_conversation_id: platform_conversation_id.to_string(),
                        from_me: e.sender_id == *own_id,
                        read: e.sender_id == *own_id,
                        sender: Identity::bare(e.sender_id),
                        body: e.text,
                        attachments: Vec::new(),
                        sent_at: e.sent_at,
                    })
                    .collect()
            })
            .unwrap_or_default();
        let next = opt_str(&response, "next_cursor")
            .map(|token| Cursor::page_token(Platform::Twitter, token));
        Ok(Page::new(records, next))
    }

    async fn send_message(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        recipient_id: &str,
        body: &str,
    ) -> Result<CanonicalMessage, AdapterError> {
        let payload = json!({
            "event": {
                "type": "message_create",
                "message_create": {
                    "target": { "recipient_id": recipient_id },
                    "message_data": { "text": body },
                },
            },
        });
        let response = self
            .signed_post_json(
                credential,
                &format!("{}/direct_messages/events/new.json", API_URL),
                &payload,
            )
            .await?;
        info!(recipient = recipient_id, "twitter dm sent");
        let event_id = response
            .pointer("/event/id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AdapterError::Remote {
                status: None,
                message: "dm response missing event id".to_string(),
            })?;
        Ok(CanonicalMessage {
            platform_message_id: event_id,
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
        // Conversations are keyed by counterpart user id.
        self.send_message(account, credential, platform_conversation_id, body)
            .await
    }

    async fn mark_read(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        platform_conversation_id: &str,
    ) -> Result<(), AdapterError> {
        let page = self
            .messages(account, credential, platform_conversation_id, Some(1), None)
            .await?;
        let Some(latest) = page.records.first() else {
            return Ok(());
        };
        self.signed_post_form(
            credential,
            &format!("{}/direct_messages/mark_read.json", API_URL),
            &[
                ("last_read_event_id", latest.platform_message_id.as_str()),
                ("recipient_id", platform_conversation_id),
            ],
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CommentCapability for TwitterAdapter {
    /// Replies to a tweet, found via recent search scoped to the
    /// account's mentions and filtered to the target tweet.
    async fn comments(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        platform_post_id: &str,
        limit: Option<u32>,
        cursor: Option<&Cursor>,
    ) -> Result<Page<CanonicalComment>, AdapterError> {
        let screen_name = account.metadata_value("screen_name")?;
        let query = format!("to:{}", screen_name);
        let count = limit.unwrap_or(DEFAULT_LIMIT).to_string();
        let mut params: Vec<(&str, &str)> = vec![
            ("q", query.as_str()),
            ("count", count.as_str()),
            ("since_id", platform_post_id),
            ("tweet_mode", "extended"),
        ];
        let max_id;
        if let Some(cursor) = cursor {
            max_id = cursor.as_watermark(Platform::Twitter)?.to_string();
            params.push(("max_id", max_id.as_str()));
        }
        let response = self
            .signed_get(
                credential,
                &format!("{}/search/tweets.json", API_URL),
                &params,
            )
            .await?;

        let observed_at = chrono::Utc::now().timestamp();
        let statuses = response
            .get("statuses")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let records: Vec<CanonicalComment> = statuses
            .iter()
            .filter(|s| {
                opt_str(s, "in_reply_to_status_id_str").as_deref() == Some(platform_post_id)
            })
            .map(|s| parse_tweet_as_comment(s, platform_post_id, observed_at))
            .collect::<Result<_, _>>()?;

        // Watermark paging: next page is everything older than the
        // oldest id seen, which only exists on a full window.
        let next = if statuses.len() as u32 >= limit.unwrap_or(DEFAULT_LIMIT) {
            statuses
                .iter()
                .filter_map(|s| opt_str(s, "id_str").and_then(|id| id.parse::<i64>().ok()))
                .min()
                .map(|oldest| Cursor::watermark(Platform::Twitter, oldest - 1))
        } else {
            None
        };
        Ok(Page::new(records, next))
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
        account: &SocialAccount,
        credential: &Credential,
        platform_post_id: &str,
        body: &str,
    ) -> Result<CanonicalComment, AdapterError> {
        self.reply_to_comment(account, credential, platform_post_id, body)
            .await
    }

    async fn reply_to_comment(
        &self,
        _account: &SocialAccount,
        credential: &Credential,
        platform_comment_id: &str,
        body: &str,
    ) -> Result<CanonicalComment, AdapterError> {
        let response = self
            .signed_post_form(
                credential,
                &format!("{}/statuses/update.json", API_URL),
                &[
                    ("status", body),
                    ("in_reply_to_status_id", platform_comment_id),
                    ("auto_populate_reply_metadata", "true"),
                ],
            )
            .await?;
        let now = chrono::Utc::now().timestamp();
        Ok(CanonicalComment {
            platform_comment_id: field_str(Platform::Twitter, &response, "id_str")?,
            platform_post_id: platform_comment_id.to_string(),
            parent_comment_id: Some(platform_comment_id.to_string()),
            author: response
                .get("user")
                .map(parse_user)
                .unwrap_or_else(|| Identity::bare("me")),
            body: body.to_string(),
            is_reply: true,
            like_count: 0,
            reply_count: 0,
            created_at: now,
            observed_at: now,
        })
    }

    async fn react(
        &self,
        _account: &SocialAccount,
        credential: &Credential,
        platform_comment_id: &str,
    ) -> Result<(), AdapterError> {
        self.signed_post_form(
            credential,
            &format!("{}/favorites/create.json", API_URL),
            &[("id", platform_comment_id)],
        )
        .await?;
        Ok(())
    }

    async fn unreact(
        &self,
        _account: &SocialAccount,
        credential: &Credential,
        platform_comment_id: &str,
    ) -> Result<(), AdapterError> {
        self.signed_post_form(
            credential,
            &format!("{}/favorites/destroy.json", API_URL),
            &[("id", platform_comment_id)],
        )
        .await?;
        Ok(())
    }

    async fn delete_comment(
        &self,
        _account: &SocialAccount,
        credential: &Credential,
        platform_comment_id: &str,
    ) -> Result<(), AdapterError> {
        self.signed_post_form(
            credential,
            &format!("{}/statuses/destroy/{}.json", API_URL, platform_comment_id),
            &[],
        )
        .await?;
        Ok(())
    }

    async fn hide_comment(
        &self,
        _account: &SocialAccount,
        _credential: &Credential,
        _platform_comment_id: &str,
    ) -> Result<(), AdapterError> {
        Err(AdapterError::Unsupported {
            platform: Platform::Twitter,
            operation: "hide comment",
        })
    }

    async fn unhide_comment(
        &self,
        _account: &SocialAccount,
        _credential: &Credential,
        _platform_comment_id: &str,
    ) -> Result<(), AdapterError> {
        Err(AdapterError::Unsupported {
            platform: Platform::Twitter,
            operation: "unhide comment",
        })
    }
}

#[async_trait]
impl PublishCapability for TwitterAdapter {
    async fn publish(
        &self,
        _account: &SocialAccount,
        credential: &Credential,
        content: &PublishContent,
        _deadline: Option<std::time::Duration>,
    ) -> Result<CanonicalPost, AdapterError> {
        let status = match content {
            PublishContent::Text { body } => body.clone(),
            PublishContent::Link { message, link_url } => format!("{} {}", message, link_url),
            PublishContent::Image { .. } | PublishContent::Video { .. } => {
                return Err(AdapterError::Unsupported {
                    platform: Platform::Twitter,
                    operation: "publish media",
                })
            }
        };
        let response = self
            .signed_post_form(
                credential,
                &format!("{}/statuses/update.json", API_URL),
                &[("status", status.as_str())],
            )
            .await?;
        let id = field_str(Platform::Twitter, &response, "id_str")?;
        info!(tweet = %id, "tweet published");
        Ok(CanonicalPost {
            platform_post_id: id,
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
        _content: &PublishContent,
        _publish_at: i64,
    ) -> Result<CanonicalPost, AdapterError> {
        Err(AdapterError::Unsupported {
            platform: Platform::Twitter,
            operation: "schedule post",
        })
    }

    async fn delete_post(
        &self,
        _account: &SocialAccount,
        credential: &Credential,
        platform_post_id: &str,
    ) -> Result<(), AdapterError> {
        self.signed_post_form(
            credential,
            &format!("{}/statuses/destroy/{}.json", API_URL, platform_post_id),
            &[],
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MetricsCapability for TwitterAdapter {
    async fn account_metrics(
        &self,
        _account: &SocialAccount,
        credential: &Credential,
        metric_types: &[String],
        _period_start: i64,
        _period_end: i64,
    ) -> Result<Vec<CanonicalMetric>, AdapterError> {
        let response = self
            .signed_get(
                credential,
                &format!("{}/account/verify_credentials.json", API_URL),
                &[],
            )
            .await?;
        let available = [
            ("followers", "followers_count"),
            ("following", "friends_count"),
            ("posts", "statuses_count"),
        ];
        let metrics = available
            .iter()
            .filter(|(name, _)| {
                metric_types.is_empty() || metric_types.iter().any(|m| m == name)
            })
            .filter_map(|(name, key)| {
                opt_i64(&response, key).map(|v| CanonicalMetric {
                    metric_type: name.to_string(),
                    platform_post_id: None,
                    value: json!(v),
                    period_start: None,
                    period_end: None,
                })
            })
            .collect();
        Ok(metrics)
    }

    async fn post_metrics(
        &self,
        _account: &SocialAccount,
        credential: &Credential,
        platform_post_id: &str,
    ) -> Result<Vec<CanonicalMetric>, AdapterError> {
        let response = self
            .signed_get(
                credential,
                &format!("{}/statuses/show.json", API_URL),
                &[("id", platform_post_id)],
            )
            .await?;
        debug!(tweet = platform_post_id, "fetched tweet metrics");
        let mut metrics = Vec::new();
        for (name, key) in [("likes", "favorite_count"), ("reposts", "retweet_count")] {
            if let Some(v) = opt_i64(&response, key) {
                metrics.push(CanonicalMetric {
                    metric_type: name.to_string(),
                    platform_post_id: Some(platform_post_id.to_string()),
                    value: json!(v),
                    period_start: None,
                    period_end: None,
                });
            }
        }
        Ok(metrics)
    }

    async fn audience_demographics(
        &self,
        _account: &SocialAccount,
        _credential: &Credential,
    ) -> Result<Vec<CanonicalMetric>, AdapterError> {
        Err(AdapterError::Unsupported {
            platform: Platform::Twitter,
            operation: "audience demographics",
        })
    }

    async fn historical_data(
        &self,
        _account: &SocialAccount,
        _credential: &Credential,
        _metric_type: &str,
        _period_start: i64,
        _period_end: i64,
    ) -> Result<Vec<CanonicalMetric>, AdapterError> {
        Err(AdapterError::Unsupported {
            platform: Platform::Twitter,
            operation: "historical metrics",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(id: &str, sender: &str, recipient: &str, ts_millis: i64, text: &str) -> Value {
        json!({
            "id": id,
            "created_timestamp": ts_millis.to_string(),
            "message_create": {
                "sender_id": sender,
                "target": { "recipient_id": recipient },
                "message_data": { "text": text },
            },
        })
    }

    #[test]
    fn test_conversations_group_by_counterpart() {
        let events: Vec<DmEvent> = [
            event("3", "them", "me", 3_000_000, "newest"),
            event("2", "me", "them", 2_000_000, "mine"),
            event("1", "other", "me", 1_000_000, "old thread"),
        ]
        .iter()
        .filter_map(parse_dm_event)
        .collect();

        let convs = conversations_from_events(&events, "me");
        assert_eq!(convs.len(), 2);
        assert_eq!(convs[0].platform_conversation_id, "them");
        assert_eq!(convs[0].snippet.as_deref(), Some("newest"));
        assert!(!convs[0].read, "counterpart spoke last");
        assert_eq!(convs[1].platform_conversation_id, "other");
    }

    #[test]
    fn test_parse_form_body_decodes_tokens() {
        let body = "oauth_token=abc%2Bdef&oauth_token_secret=s1&user_id=42";
        let parsed = parse_form_body(body);
        assert_eq!(parsed["oauth_token"], "abc+def");
        assert_eq!(parsed["oauth_token_secret"], "s1");
    }

    #[test]
    fn test_parse_twitter_time() {
        let ts = parse_twitter_time("Wed Oct 10 20:19:24 +0000 2018").unwrap();
        assert_eq!(ts, 1_539_202_764);
    }

    #[test]
    fn test_reply_filter_keeps_direct_replies_only() {
        let status = json!({
            "id_str": "900",
            "in_reply_to_status_id_str": "100",
            "text": "reply",
            "favorite_count": 1,
            "created_at": "Wed Oct 10 20:19:24 +0000 2018",
            "user": { "id_str": "u1", "screen_name": "ada" },
        });
        let comment = parse_tweet_as_comment(&status, "100", 50).unwrap();
        assert!(!comment.is_reply, "direct reply to the post is top-level");
        assert!(comment.parent_comment_id.is_none());
        assert_eq!(comment.like_count, 1);
    }
}
