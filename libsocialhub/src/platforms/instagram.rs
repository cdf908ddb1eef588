//! Instagram platform implementation
//!
//! Graph API integration for professional Instagram accounts:
//! messaging, comment moderation, media publishing through the
//! container flow, and insights. Publishing a video is one adapter
//! call: create the container, poll its processing status, then
//! publish — a failed or timed-out poll surfaces an error and never
//! reports the container as published.
//!
//! Platform gaps surface as `Unsupported`: no text-only posts, no
//! scheduling, no post deletion.
//!
//! Accounts must carry an `ig_user_id` metadata key.

use std::time::Duration;

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::cursor::Cursor;
use crate::error::AdapterError;
use crate::http::RestClient;
use crate::platforms::{
    field_str, opt_i64, opt_str, parse_remote_time, AuthCapability, AuthorizeUrl, Capability,
    CommentCapability, MessagingCapability, MetricsCapability, PlatformAdapter, PublishCapability,
};
use crate::poll::{PollOutcome, StatusPoll};
use crate::types::{
    CanonicalComment, CanonicalConversation, CanonicalMessage, CanonicalMetric, CanonicalPost,
    Credential, Identity, Page, Platform, PublishContent, PublishStatus, SocialAccount,
};

const GRAPH_URL: &str = "https://graph.facebook.com/v19.0";
const OAUTH_URL: &str = "https://api.instagram.com/oauth";
const REFRESH_URL: &str = "https://graph.instagram.com/refresh_access_token";
const DEFAULT_LIMIT: u32 = 25;

/// Container processing rarely exceeds a few minutes; 5s × 60 bounds
/// the wait at five minutes before `Timeout`.
const PUBLISH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const PUBLISH_POLL_ATTEMPTS: u32 = 60;

const CAPABILITIES: &[Capability] = &[
    Capability::Auth,
    Capability::Messaging,
    Capability::Comments,
    Capability::Publish,
    Capability::Metrics,
];

pub struct InstagramAdapter {
    app: AppConfig,
    client: RestClient,
    poll: StatusPoll,
}

impl InstagramAdapter {
    pub fn new(app: AppConfig, client: RestClient) -> Self {
        Self {
            app,
            client,
            poll: StatusPoll::new(PUBLISH_POLL_INTERVAL, PUBLISH_POLL_ATTEMPTS),
        }
    }

    fn next_cursor(response: &Value) -> Option<Cursor> {
        let paging = response.get("paging")?;
        paging.get("next")?;
        let after = paging.get("cursors")?.get("after")?.as_str()?;
        Some(Cursor::page_token(Platform::Instagram, after))
    }

    fn paging_query<'a>(
        limit: Option<u32>,
        cursor: Option<&'a Cursor>,
        limit_buf: &'a mut String,
    ) -> Result<Vec<(&'a str, &'a str)>, AdapterError> {
        *limit_buf = limit.unwrap_or(DEFAULT_LIMIT).to_string();
        let mut query: Vec<(&str, &str)> = vec![("limit", limit_buf.as_str())];
        if let Some(cursor) = cursor {
            query.push(("after", cursor.as_page_token(Platform::Instagram)?));
        }
        Ok(query)
    }

    async fn create_container(
        &self,
        ig_user_id: &str,
        token: &str,
        content: &PublishContent,
    ) -> Result<String, AdapterError> {
        let form: Vec<(&str, &str)> = match content {
            PublishContent::Image { caption, image_url } => vec![
                ("image_url", image_url.as_str()),
                ("caption", caption.as_str()),
            ],
            PublishContent::Video { caption, video_url } => vec![
                ("media_type", "REELS"),
                ("video_url", video_url.as_str()),
                ("caption", caption.as_str()),
            ],
            PublishContent::Text { .. } | PublishContent::Link { .. } => {
                return Err(AdapterError::Unsupported {
                    platform: Platform::Instagram,
                    operation: "publish without media",
                })
            }
        };
        let response = self
            .client
            .post_form(
                Platform::Instagram,
                &format!("{}/{}/media", GRAPH_URL, ig_user_id),
                &form,
                Some(token),
            )
            .await?;
        field_str(Platform::Instagram, &response, "id")
    }

    /// Poll the container until FINISHED, then publish it. Timeout or
    /// processing failure propagates without a publish call, so the
    /// local side never records the container as published.
    async fn publish_container(
        &self,
        ig_user_id: &str,
        token: &str,
        container_id: &str,
        deadline: Option<Duration>,
    ) -> Result<String, AdapterError> {
        self.poll
            .run(deadline, |attempt| async move {
                let status = self
                    .client
                    .get_json(
                        Platform::Instagram,
                        &format!("{}/{}", GRAPH_URL, container_id),
                        &[("fields", "status_code")],
                        Some(token),
                    )
                    .await?;
                let code = opt_str(&status, "status_code").unwrap_or_default();
                debug!(container = container_id, attempt, status = %code, "container status");
                Ok(match code.as_str() {
                    "FINISHED" => PollOutcome::Ready(()),
                    "ERROR" => PollOutcome::Failed(code),
                    "EXPIRED" => PollOutcome::Expired,
                    _ => PollOutcome::Pending,
                })
            })
            .await?;

        let response = self
            .client
            .post_form(
                Platform::Instagram,
                &format!("{}/{}/media_publish", GRAPH_URL, ig_user_id),
                &[("creation_id", container_id)],
                Some(token),
            )
            .await?;
        field_str(Platform::Instagram, &response, "id")
    }
}

fn parse_identity(value: &Value) -> Identity {
    Identity {
        id: opt_str(value, "id").unwrap_or_default(),
        name: opt_str(value, "username").or_else(|| opt_str(value, "name")),
        avatar_url: opt_str(value, "profile_pic"),
    }
}

/// The inbox carries no unread counter; read state is inferred from
/// the latest message in the fetched window (unread when the other
/// party spoke last), and `unread_count` stays `None`.
fn parse_conversation(value: &Value, own_id: &str) -> Result<CanonicalConversation, AdapterError> {
    let id = field_str(Platform::Instagram, value, "id")?;
    let recipient = value
        .pointer("/participants/data")
        .and_then(Value::as_array)
        .and_then(|parts| {
            parts
                .iter()
                .find(|p| opt_str(p, "id").as_deref() != Some(own_id))
                .or_else(|| parts.first())
        })
        .map(parse_identity)
        .unwrap_or_else(|| Identity::bare("unknown"));
    let latest = value.pointer("/messages/data/0");
    let read = latest
        .and_then(|m| m.pointer("/from/id"))
        .and_then(Value::as_str)
        .map(|sender| sender == own_id)
        .unwrap_or(true);
    Ok(CanonicalConversation {
        platform_conversation_id: id,
        recipient,
        last_message_at: opt_str(value, "updated_time")
            .as_deref()
            .and_then(parse_remote_time)
            .unwrap_or(0),
        read,
        unread_count: None,
        snippet: latest.and_then(|m| opt_str(m, "message")),
    })
}

fn parse_message(
    value: &Value,
    conversation_id: &str,
    own_id: &str,
) -> Result<CanonicalMessage, AdapterError> {
    let sender = value
        .get("from")
        .map(parse_identity)
        .unwrap_or_else(|| Identity::bare("unknown"));
    let from_me = sender.id == own_id;
    Ok(CanonicalMessage {
        platform_message_id: field_str(Platform::Instagram, value, "id")?,
        platform_conversation_id: conversation_id.to_string(),
        sender,
        body: opt_str(value, "message").unwrap_or_default(),
        attachments: value
            .pointer("/attachments/data")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|a| {
                        a.pointer("/image_data/url")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                    })
                    .collect()
            })
            .unwrap_or_default(),
        from_me,
        read: from_me,
        sent_at: opt_str(value, "created_time")
            .as_deref()
            .and_then(parse_remote_time)
            .unwrap_or(0),
    })
}

fn parse_comment(
    value: &Value,
    platform_post_id: &str,
    parent: Option<&str>,
    observed_at: i64,
) -> Result<CanonicalComment, AdapterError> {
    Ok(CanonicalComment {
        platform_comment_id: field_str(Platform::Instagram, value, "id")?,
        platform_post_id: platform_post_id.to_string(),
        parent_comment_id: parent.map(str::to_string),
        author: value
            .get("from")
            .map(parse_identity)
            .unwrap_or_else(|| Identity::bare("unknown")),
        body: opt_str(value, "text").unwrap_or_default(),
        is_reply: parent.is_some(),
        like_count: opt_i64(value, "like_count").unwrap_or(0),
        reply_count: value
            .pointer("/replies/data")
            .and_then(Value::as_array)
            .map(|r| r.len() as i64)
            .unwrap_or(0),
        created_at: opt_str(value, "timestamp")
            .as_deref()
            .and_then(parse_remote_time)
            .unwrap_or(0),
        observed_at,
    })
}

fn parse_insights(response: &Value, platform_post_id: Option<&str>) -> Vec<CanonicalMetric> {
    response
        .get("data")
        .and_then(Value::as_array)
        .map(|series| {
            series
                .iter()
                .filter_map(|entry| {
                    let name = opt_str(entry, "name")?;
                    let ends: Vec<i64> = entry
                        .get("values")
                        .and_then(Value::as_array)
                        .map(|vs| {
                            vs.iter()
                                .filter_map(|v| {
                                    opt_str(v, "end_time").as_deref().and_then(parse_remote_time)
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    Some(CanonicalMetric {
                        metric_type: name,
                        platform_post_id: platform_post_id.map(str::to_string),
                        value: entry.get("values").cloned().unwrap_or(Value::Null),
                        period_start: platform_post_id
                            .is_none()
                            .then(|| ends.iter().min().copied())
                            .flatten(),
                        period_end: platform_post_id
                            .is_none()
                            .then(|| ends.iter().max().copied())
                            .flatten(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

impl PlatformAdapter for InstagramAdapter {
    fn platform(&self) -> Platform {
        Platform::Instagram
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
impl AuthCapability for InstagramAdapter {
    async fn authorize_url(&self) -> Result<AuthorizeUrl, AdapterError> {
        let state: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let url = format!(
            "{}/authorize?client_id={}&redirect_uri={}&scope=instagram_business_basic,instagram_business_manage_messages,instagram_business_manage_comments,instagram_business_content_publish&response_type=code&state={}",
            OAUTH_URL, self.app.client_id, self.app.redirect_uri, state
        );
        Ok(AuthorizeUrl {
            url,
            state: Some(state),
        })
    }

    async fn exchange_code(&self, code: &str) -> Result<Credential, AdapterError> {
        let response = self
            .client
            .post_form(
                Platform::Instagram,
                &format!("{}/access_token", OAUTH_URL),
                &[
                    ("client_id", self.app.client_id.as_str()),
                    ("client_secret", self.app.client_secret.as_str()),
                    ("grant_type", "authorization_code"),
                    ("redirect_uri", self.app.redirect_uri.as_str()),
                    ("code", code),
                ],
                None,
            )
            .await?;
        Ok(Credential {
            access_token: field_str(Platform::Instagram, &response, "access_token")?,
            refresh_token: None,
            token_secret: None,
            expires_at: opt_i64(&response, "expires_in")
                .map(|ttl| chrono::Utc::now().timestamp() + ttl),
        })
    }

    /// Long-lived tokens refresh from themselves.
    async fn refresh(&self, account: &SocialAccount) -> Result<Credential, AdapterError> {
        let response = self
            .client
            .get_json(
                Platform::Instagram,
                REFRESH_URL,
                &[
                    ("grant_type", "ig_refresh_token"),
                    ("access_token", account.credential.access_token.as_str()),
                ],
                None,
            )
            .await?;
        Ok(Credential {
            access_token: field_str(Platform::Instagram, &response, "access_token")?,
            refresh_token: None,
            token_secret: None,
            expires_at: opt_i64(&response, "expires_in")
                .map(|ttl| chrono::Utc::now().timestamp() + ttl),
        })
    }

    async fn profile(
        &self,
        account: &SocialAccount,
        credential: &Credential,
    ) -> Result<Identity, AdapterError> {
        let ig_user_id = account.metadata_value("ig_user_id")?;
        let response = self
            .client
            .get_json(
                Platform::Instagram,
                &format!("{}/{}", GRAPH_URL, ig_user_id),
                &[("fields", "id,username,profile_picture_url")],
                Some(&credential.access_token),
            )
            .await?;
        Ok(Identity {
            id: field_str(Platform::Instagram, &response, "id")?,
            name: opt_str(&response, "username"),
            avatar_url: opt_str(&response, "profile_picture_url"),
        })
    }
}

#[async_trait]
impl MessagingCapability for InstagramAdapter {
    async fn conversations(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        limit: Option<u32>,
        cursor: Option<&Cursor>,
    ) -> Result<Page<CanonicalConversation>, AdapterError> {
        let ig_user_id = account.metadata_value("ig_user_id")?;
        let mut limit_buf = String::new();
        let mut query = Self::paging_query(limit, cursor, &mut limit_buf)?;
        query.push(("platform", "instagram"));
        query.push((
            "fields",
            "id,participants,updated_time,messages.limit(1){from,message}",
        ));
        let response = self
            .client
            .get_json(
                Platform::Instagram,
                &format!("{}/{}/conversations", GRAPH_URL, ig_user_id),
                &query,
                Some(&credential.access_token),
            )
            .await?;

        let records = response
            .get("data")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| parse_conversation(item, ig_user_id))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();
        Ok(Page::new(records, Self::next_cursor(&response)))
    }

    async fn messages(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        platform_conversation_id: &str,
        limit: Option<u32>,
        cursor: Option<&Cursor>,
    ) -> Result<Page<CanonicalMessage>, AdapterError> {
        let ig_user_id = account.metadata_value("ig_user_id")?;
        let mut limit_buf = String::new();
        let mut query = Self::paging_query(limit, cursor, &mut limit_buf)?;
        query.push(("fields", "id,from,message,created_time,attachments"));
        let response = self
            .client
            .get_json(
                Platform::Instagram,
                &format!("{}/{}/messages", GRAPH_URL, platform_conversation_id),
                &query,
                Some(&credential.access_token),
            )
            .await?;

        let records = response
            .get("data")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| parse_message(item, platform_conversation_id, ig_user_id))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();
        Ok(Page::new(records, Self::next_cursor(&response)))
    }

    async fn send_message(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        recipient_id: &str,
        body: &str,
    ) -> Result<CanonicalMessage, AdapterError> {
        let ig_user_id = account.metadata_value("ig_user_id")?;
        let payload = json!({
            "recipient": { "id": recipient_id },
            "message": { "text": body },
        });
        let response = self
            .client
            .post_json(
                Platform::Instagram,
                &format!("{}/{}/messages", GRAPH_URL, ig_user_id),
                &[],
                Some(&credential.access_token),
                &payload,
            )
            .await?;
        info!(recipient = recipient_id, "instagram message sent");
        Ok(CanonicalMessage {
            platform_message_id: field_str(Platform::Instagram, &response, "message_id")?,
            platform_conversation_id: recipient_id.to_string(),
            sender: Identity::bare(ig_user_id),
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
        // DM replies address the participant, not the thread.
        let response = self
            .client
            .get_json(
                Platform::Instagram,
                &format!("{}/{}", GRAPH_URL, platform_conversation_id),
                &[("fields", "participants")],
                Some(&credential.access_token),
            )
            .await?;
        let ig_user_id = account.metadata_value("ig_user_id")?;
        let recipient = response
            .pointer("/participants/data")
            .and_then(Value::as_array)
            .and_then(|parts| {
                parts
                    .iter()
                    .filter_map(|p| opt_str(p, "id"))
                    .find(|id| id != ig_user_id)
            })
            .ok_or_else(|| AdapterError::Remote {
                status: None,
                message: "conversation has no counterpart participant".to_string(),
            })?;
        self.send_message(account, credential, &recipient, body).await
    }

    async fn mark_read(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        platform_conversation_id: &str,
    ) -> Result<(), AdapterError> {
        let ig_user_id = account.metadata_value("ig_user_id")?;
        let payload = json!({
            "recipient": { "id": platform_conversation_id },
            "sender_action": "mark_seen",
        });
        self.client
            .post_json(
                Platform::Instagram,
                &format!("{}/{}/messages", GRAPH_URL, ig_user_id),
                &[],
                Some(&credential.access_token),
                &payload,
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CommentCapability for InstagramAdapter {
    async fn comments(
        &self,
        _account: &SocialAccount,
        credential: &Credential,
        platform_post_id: &str,
        limit: Option<u32>,
        cursor: Option<&Cursor>,
    ) -> Result<Page<CanonicalComment>, AdapterError> {
        let mut limit_buf = String::new();
        let mut query = Self::paging_query(limit, cursor, &mut limit_buf)?;
        query.push(("fields", "id,from,text,like_count,timestamp,replies"));
        let response = self
            .client
            .get_json(
                Platform::Instagram,
                &format!("{}/{}/comments", GRAPH_URL, platform_post_id),
                &query,
                Some(&credential.access_token),
            )
            .await?;

        let observed_at = chrono::Utc::now().timestamp();
        let records = response
            .get("data")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| parse_comment(item, platform_post_id, None, observed_at))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();
        Ok(Page::new(records, Self::next_cursor(&response)))
    }

    async fn replies(
        &self,
        _account: &SocialAccount,
        credential: &Credential,
        platform_comment_id: &str,
        limit: Option<u32>,
        cursor: Option<&Cursor>,
    ) -> Result<Page<CanonicalComment>, AdapterError> {
        let mut limit_buf = String::new();
        let mut query = Self::paging_query(limit, cursor, &mut limit_buf)?;
        query.push(("fields", "id,from,text,like_count,timestamp"));
        let response = self
            .client
            .get_json(
                Platform::Instagram,
                &format!("{}/{}/replies", GRAPH_URL, platform_comment_id),
                &query,
                Some(&credential.access_token),
            )
            .await?;

        let observed_at = chrono::Utc::now().timestamp();
        let records = response
            .get("data")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| {
                        parse_comment(item, platform_comment_id, Some(platform_comment_id), observed_at)
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();
        Ok(Page::new(records, Self::next_cursor(&response)))
    }

    async fn post_comment(
        &self,
        _account: &SocialAccount,
        credential: &Credential,
        platform_post_id: &str,
        body: &str,
    ) -> Result<CanonicalComment, AdapterError> {
        let response = self
            .client
            .post_form(
                Platform::Instagram,
                &format!("{}/{}/comments", GRAPH_URL, platform_post_id),
                &[("message", body)],
                Some(&credential.access_token),
            )
            .await?;
        let now = chrono::Utc::now().timestamp();
        Ok(CanonicalComment {
            platform_comment_id: field_str(Platform::Instagram, &response, "id")?,
            platform_post_id: platform_post_id.to_string(),
            parent_comment_id: None,
            author: Identity::bare("me"),
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
        _account: &SocialAccount,
        credential: &Credential,
        platform_comment_id: &str,
        body: &str,
    ) -> Result<CanonicalComment, AdapterError> {
        let response = self
            .client
            .post_form(
                Platform::Instagram,
                &format!("{}/{}/replies", GRAPH_URL, platform_comment_id),
                &[("message", body)],
                Some(&credential.access_token),
            )
            .await?;
        let now = chrono::Utc::now().timestamp();
        Ok(CanonicalComment {
            platform_comment_id: field_str(Platform::Instagram, &response, "id")?,
            platform_post_id: platform_comment_id.to_string(),
            parent_comment_id: Some(platform_comment_id.to_string()),
            author: Identity::bare("me"),
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
        _credential: &Credential,
        _platform_comment_id: &str,
    ) -> Result<(), AdapterError> {
        Err(AdapterError::Unsupported {
            platform: Platform::Instagram,
            operation: "react to comment",
        })
    }

    async fn unreact(
        &self,
        _account: &SocialAccount,
        _credential: &Credential,
        _platform_comment_id: &str,
    ) -> Result<(), AdapterError> {
        Err(AdapterError::Unsupported {
            platform: Platform::Instagram,
            operation: "remove comment reaction",
        })
    }

    async fn delete_comment(
        &self,
        _account: &SocialAccount,
        credential: &Credential,
        platform_comment_id: &str,
    ) -> Result<(), AdapterError> {
        self.client
            .delete_json(
                Platform::Instagram,
                &format!("{}/{}", GRAPH_URL, platform_comment_id),
                &[],
                Some(&credential.access_token),
            )
            .await?;
        Ok(())
    }

    async fn hide_comment(
        &self,
        _account: &SocialAccount,
        credential: &Credential,
        platform_comment_id: &str,
    ) -> Result<(), AdapterError> {
        self.client
            .post_form(
                Platform::Instagram,
                &format!("{}/{}", GRAPH_URL, platform_comment_id),
                &[("hide", "true")],
                Some(&credential.access_token),
            )
            .await?;
        Ok(())
    }

    async fn unhide_comment(
        &self,
        _account: &SocialAccount,
        credential: &Credential,
        platform_comment_id: &str,
    ) -> Result<(), AdapterError> {
        self.client
            .post_form(
                Platform::Instagram,
                &format!("{}/{}", GRAPH_URL, platform_comment_id),
                &[("hide", "false")],
                Some(&credential.access_token),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PublishCapability for InstagramAdapter {
    async fn publish(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        content: &PublishContent,
        deadline: Option<Duration>,
    ) -> Result<CanonicalPost, AdapterError> {
        let ig_user_id = account.metadata_value("ig_user_id")?;
        let token = credential.access_token.as_str();
        let container_id = self.create_container(ig_user_id, token, content).await?;
        debug!(container = %container_id, "instagram container created");

        let media_id = self
            .publish_container(ig_user_id, token, &container_id, deadline)
            .await?;
        info!(media = %media_id, "instagram media published");
        Ok(CanonicalPost {
            platform_post_id: media_id,
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
            platform: Platform::Instagram,
            operation: "schedule post",
        })
    }

    async fn delete_post(
        &self,
        _account: &SocialAccount,
        _credential: &Credential,
        _platform_post_id: &str,
    ) -> Result<(), AdapterError> {
        Err(AdapterError::Unsupported {
            platform: Platform::Instagram,
            operation: "delete post",
        })
    }
}

#[async_trait]
impl MetricsCapability for InstagramAdapter {
    async fn account_metrics(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        metric_types: &[String],
        period_start: i64,
        period_end: i64,
    ) -> Result<Vec<CanonicalMetric>, AdapterError> {
        let ig_user_id = account.metadata_value("ig_user_id")?;
        let metrics = metric_types.join(",");
        let since = period_start.to_string();
        let until = period_end.to_string();
        let response = self
            .client
            .get_json(
                Platform::Instagram,
                &format!("{}/{}/insights", GRAPH_URL, ig_user_id),
                &[
                    ("metric", metrics.as_str()),
                    ("period", "day"),
                    ("since", since.as_str()),
                    ("until", until.as_str()),
                ],
                Some(&credential.access_token),
            )
            .await?;
        Ok(parse_insights(&response, None))
    }

    async fn post_metrics(
        &self,
        _account: &SocialAccount,
        credential: &Credential,
        platform_post_id: &str,
    ) -> Result<Vec<CanonicalMetric>, AdapterError> {
        let response = self
            .client
            .get_json(
                Platform::Instagram,
                &format!("{}/{}/insights", GRAPH_URL, platform_post_id),
                &[("metric", "impressions,reach,likes,comments,saved")],
                Some(&credential.access_token),
            )
            .await?;
        Ok(parse_insights(&response, Some(platform_post_id)))
    }

    async fn audience_demographics(
        &self,
        account: &SocialAccount,
        credential: &Credential,
    ) -> Result<Vec<CanonicalMetric>, AdapterError> {
        let ig_user_id = account.metadata_value("ig_user_id")?;
        let response = self
            .client
            .get_json(
                Platform::Instagram,
                &format!("{}/{}/insights", GRAPH_URL, ig_user_id),
                &[
                    ("metric", "audience_gender_age,audience_country"),
                    ("period", "lifetime"),
                ],
                Some(&credential.access_token),
            )
            .await?;
        Ok(parse_insights(&response, None))
    }

    async fn historical_data(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        metric_type: &str,
        period_start: i64,
        period_end: i64,
    ) -> Result<Vec<CanonicalMetric>, AdapterError> {
        self.account_metrics(
            account,
            credential,
            &[metric_type.to_string()],
            period_start,
            period_end,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_read_inferred_from_last_sender_in_window() {
        let theirs = json!({
            "id": "t_1",
            "participants": { "data": [
                { "id": "me", "username": "page" },
                { "id": "them", "username": "ada" },
            ]},
            "updated_time": "2024-03-01T10:00:00+0000",
            "messages": { "data": [ { "from": { "id": "them" }, "message": "ping" } ] },
        });
        let conv = parse_conversation(&theirs, "me").unwrap();
        assert!(!conv.read);
        assert_eq!(conv.unread_count, None);
        assert_eq!(conv.snippet.as_deref(), Some("ping"));

        let mine = json!({
            "id": "t_2",
            "participants": { "data": [ { "id": "me" }, { "id": "them" } ] },
            "messages": { "data": [ { "from": { "id": "me" }, "message": "pong" } ] },
        });
        assert!(parse_conversation(&mine, "me").unwrap().read);
    }

    #[test]
    fn test_parse_comment_counts_reply_window() {
        let raw = json!({
            "id": "c_1",
            "from": { "id": "u1", "username": "ada" },
            "text": "nice",
            "like_count": 2,
            "timestamp": "2024-03-01T10:00:00+0000",
            "replies": { "data": [ {}, {} ] },
        });
        let comment = parse_comment(&raw, "p1", None, 500).unwrap();
        assert_eq!(comment.reply_count, 2);
        assert!(!comment.is_reply);
    }

    #[tokio::test]
    async fn test_text_publish_is_unsupported() {
        let adapter = InstagramAdapter::new(
            AppConfig {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
                redirect_uri: "https://cb".to_string(),
                extra: Default::default(),
            },
            RestClient::new().unwrap(),
        );
        let err = adapter
            .create_container("ig", "tok", &PublishContent::Text { body: "hi".to_string() })
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Unsupported { .. }));
    }
}
