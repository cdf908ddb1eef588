//! Facebook platform implementation
//!
//! Integration with the Facebook Graph API for pages: OAuth with
//! long-lived token exchange, page inbox messaging, comment
//! moderation, feed publishing (including scheduled posts), and page
//! insights. Collections page with Graph cursor tokens carried in the
//! opaque [`Cursor`].
//!
//! Accounts must carry a `page_id` metadata key naming the managed
//! page.

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value};
use tracing::info;

use crate::config::AppConfig;
use crate::cursor::Cursor;
use crate::error::AdapterError;
use crate::http::RestClient;
use crate::platforms::{
    field_str, opt_i64, opt_str, parse_remote_time, AuthCapability, AuthorizeUrl, Capability,
    CommentCapability, MessagingCapability, MetricsCapability, PlatformAdapter, PublishCapability,
};
use crate::types::{
    CanonicalComment, CanonicalConversation, CanonicalMessage, CanonicalMetric, CanonicalPost,
    Credential, Identity, Page, Platform, PublishContent, PublishStatus, SocialAccount,
};

const GRAPH_URL: &str = "https://graph.facebook.com/v19.0";
const DIALOG_URL: &str = "https://www.facebook.com/v19.0/dialog/oauth";
const DEFAULT_SCOPES: &str =
    "pages_show_list,pages_messaging,pages_read_engagement,pages_manage_posts,pages_manage_engagement,read_insights";
const DEFAULT_LIMIT: u32 = 25;

const CAPABILITIES: &[Capability] = &[
    Capability::Auth,
    Capability::Messaging,
    Capability::Comments,
    Capability::Publish,
    Capability::Metrics,
];

pub struct FacebookAdapter {
    app: AppConfig,
    client: RestClient,
}

impl FacebookAdapter {
    pub fn new(app: AppConfig, client: RestClient) -> Self {
        Self { app, client }
    }

    fn scopes(&self) -> &str {
        self.app
            .extra
            .get("scopes")
            .map(String::as_str)
            .unwrap_or(DEFAULT_SCOPES)
    }

    /// Graph paging: a page carries `paging.cursors.after`, and an
    /// actual next page exists only when `paging.next` is present.
    fn next_cursor(response: &Value) -> Option<Cursor> {
        let paging = response.get("paging")?;
        paging.get("next")?;
        let after = paging.get("cursors")?.get("after")?.as_str()?;
        Some(Cursor::page_token(Platform::Facebook, after))
    }

    fn paging_query<'a>(
        limit: Option<u32>,
        cursor: Option<&'a Cursor>,
        limit_buf: &'a mut String,
    ) -> Result<Vec<(&'a str, &'a str)>, AdapterError> {
        *limit_buf = limit.unwrap_or(DEFAULT_LIMIT).to_string();
        let mut query: Vec<(&str, &str)> = vec![("limit", limit_buf.as_str())];
        if let Some(cursor) = cursor {
            query.push(("after", cursor.as_page_token(Platform::Facebook)?));
        }
        Ok(query)
    }
}

fn parse_identity(value: &Value) -> Identity {
    Identity {
        id: opt_str(value, "id").unwrap_or_default(),
        name: opt_str(value, "name"),
        avatar_url: value
            .pointer("/picture/data/url")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

/// Conversation list entry → canonical. `unread_count` is first-class
/// on the Graph inbox; no inference needed.
fn parse_conversation(value: &Value, own_id: &str) -> Result<CanonicalConversation, AdapterError> {
    let id = field_str(Platform::Facebook, value, "id")?;
    let recipient = value
        .pointer("/senders/data")
        .and_then(Value::as_array)
        .and_then(|senders| {
            senders
                .iter()
                .find(|s| opt_str(s, "id").as_deref() != Some(own_id))
                .or_else(|| senders.first())
        })
        .map(parse_identity)
        .unwrap_or_else(|| Identity::bare("unknown"));
    let unread = opt_i64(value, "unread_count").unwrap_or(0).max(0) as u32;
    Ok(CanonicalConversation {
        platform_conversation_id: id,
        recipient,
        last_message_at: opt_str(value, "updated_time")
            .as_deref()
            .and_then(parse_remote_time)
            .unwrap_or(0),
        read: unread == 0,
        unread_count: Some(unread),
        snippet: opt_str(value, "snippet"),
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
    let attachments = value
        .pointer("/attachments/data")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|a| {
                    a.pointer("/image_data/url")
                        .or_else(|| a.pointer("/file_url"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(CanonicalMessage {
        platform_message_id: field_str(Platform::Facebook, value, "id")?,
        platform_conversation_id: conversation_id.to_string(),
        sender,
        body: opt_str(value, "message").unwrap_or_default(),
        attachments,
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
    observed_at: i64,
) -> Result<CanonicalComment, AdapterError> {
    let parent = value
        .pointer("/parent/id")
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(CanonicalComment {
        platform_comment_id: field_str(Platform::Facebook, value, "id")?,
        platform_post_id: platform_post_id.to_string(),
        is_reply: parent.is_some(),
        parent_comment_id: parent,
        author: value
            .get("from")
            .map(parse_identity)
            .unwrap_or_else(|| Identity::bare("unknown")),
        body: opt_str(value, "message").unwrap_or_default(),
        like_count: opt_i64(value, "like_count").unwrap_or(0),
        reply_count: opt_i64(value, "comment_count").unwrap_or(0),
        created_at: opt_str(value, "created_time")
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
                    let values = entry.get("values").cloned().unwrap_or(Value::Null);
                    let (period_start, period_end) = match platform_post_id {
                        Some(_) => (None, None),
                        None => {
                            let ends: Vec<i64> = entry
                                .get("values")
                                .and_then(Value::as_array)
                                .map(|vs| {
                                    vs.iter()
                                        .filter_map(|v| {
                                            opt_str(v, "end_time")
                                                .as_deref()
                                                .and_then(parse_remote_time)
                                        })
                                        .collect()
                                })
                                .unwrap_or_default();
                            (ends.iter().min().copied(), ends.iter().max().copied())
                        }
                    };
                    Some(CanonicalMetric {
                        metric_type: name,
                        platform_post_id: platform_post_id.map(str::to_string),
                        value: values,
                        period_start,
                        period_end,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

impl PlatformAdapter for FacebookAdapter {
    fn platform(&self) -> Platform {
        Platform::Facebook
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
impl AuthCapability for FacebookAdapter {
    async fn authorize_url(&self) -> Result<AuthorizeUrl, AdapterError> {
        let state: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let url = format!(
            "{}?client_id={}&redirect_uri={}&state={}&scope={}&response_type=code",
            DIALOG_URL, self.app.client_id, self.app.redirect_uri, state, self.scopes()
        );
        Ok(AuthorizeUrl {
            url,
            state: Some(state),
        })
    }

    async fn exchange_code(&self, code: &str) -> Result<Credential, AdapterError> {
        let response = self
            .client
            .get_json(
                Platform::Facebook,
                &format!("{}/oauth/access_token", GRAPH_URL),
                &[
                    ("client_id", self.app.client_id.as_str()),
                    ("client_secret", self.app.client_secret.as_str()),
                    ("redirect_uri", self.app.redirect_uri.as_str()),
                    ("code", code),
                ],
                None,
            )
            .await?;
        credential_from_token_response(&response)
    }

    /// "Refresh" on this platform is the long-lived exchange: the
    /// current access token itself is traded for a fresh 60-day one.
    async fn refresh(&self, account: &SocialAccount) -> Result<Credential, AdapterError> {
        let response = self
            .client
            .get_json(
                Platform::Facebook,
                &format!("{}/oauth/access_token", GRAPH_URL),
                &[
                    ("grant_type", "fb_exchange_token"),
                    ("client_id", self.app.client_id.as_str()),
                    ("client_secret", self.app.client_secret.as_str()),
                    ("fb_exchange_token", account.credential.access_token.as_str()),
                ],
                None,
            )
            .await?;
        credential_from_token_response(&response)
    }

    async fn profile(
        &self,
        _account: &SocialAccount,
        credential: &Credential,
    ) -> Result<Identity, AdapterError> {
        let response = self
            .client
            .get_json(
                Platform::Facebook,
                &format!("{}/me", GRAPH_URL),
                &[("fields", "id,name,picture")],
                Some(&credential.access_token),
            )
            .await?;
        Ok(parse_identity(&response))
    }
}

#[async_trait]
impl MessagingCapability for FacebookAdapter {
    async fn conversations(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        limit: Option<u32>,
        cursor: Option<&Cursor>,
    ) -> Result<Page<CanonicalConversation>, AdapterError> {
        let page_id = account.metadata_value("page_id")?;
        let mut limit_buf = String::new();
        let mut query = Self::paging_query(limit, cursor, &mut limit_buf)?;
        query.push((
            "fields",
            "id,senders,updated_time,snippet,unread_count",
        ));
        let response = self
            .client
            .get_json(
                Platform::Facebook,
                &format!("{}/{}/conversations", GRAPH_URL, page_id),
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
                    .map(|item| parse_conversation(item, page_id))
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
        let page_id = account.metadata_value("page_id")?;
        let mut limit_buf = String::new();
        let mut query = Self::paging_query(limit, cursor, &mut limit_buf)?;
        query.push(("fields", "id,from,message,created_time,attachments"));
        let response = self
            .client
            .get_json(
                Platform::Facebook,
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
                    .map(|item| parse_message(item, platform_conversation_id, page_id))
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
        let page_id = account.metadata_value("page_id")?;
        let payload = json!({
            "recipient": { "id": recipient_id },
            "message": { "text": body },
            "messaging_type": "RESPONSE",
        });
        let response = self
            .client
            .post_json(
                Platform::Facebook,
                &format!("{}/{}/messages", GRAPH_URL, page_id),
                &[],
                Some(&credential.access_token),
                &payload,
            )
            .await?;
        info!(recipient = recipient_id, "facebook message sent");
        Ok(CanonicalMessage {
            platform_message_id: field_str(Platform::Facebook, &response, "message_id")?,
            platform_conversation_id: recipient_id.to_string(),
            sender: Identity::bare(page_id),
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
        let page_id = account.metadata_value("page_id")?;
        let response = self
            .client
            .post_form(
                Platform::Facebook,
                &format!("{}/{}/messages", GRAPH_URL, platform_conversation_id),
                &[("message", body)],
                Some(&credential.access_token),
            )
            .await?;
        Ok(CanonicalMessage {
            platform_message_id: field_str(Platform::Facebook, &response, "id")?,
            platform_conversation_id: platform_conversation_id.to_string(),
            sender: Identity::bare(page_id),
            body: body.to_string(),
            attachments: Vec::new(),
            from_me: true,
            read: true,
            sent_at: chrono::Utc::now().timestamp(),
        })
    }

    async fn mark_read(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        platform_conversation_id: &str,
    ) -> Result<(), AdapterError> {
        let page_id = account.metadata_value("page_id")?;
        let payload = json!({
            "recipient": { "id": platform_conversation_id },
            "sender_action": "mark_seen",
        });
        self.client
            .post_json(
                Platform::Facebook,
                &format!("{}/{}/messages", GRAPH_URL, page_id),
                &[],
                Some(&credential.access_token),
                &payload,
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CommentCapability for FacebookAdapter {
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
        query.push((
            "fields",
            "id,from,message,like_count,comment_count,created_time,parent",
        ));
        query.push(("filter", "toplevel"));
        let response = self
            .client
            .get_json(
                Platform::Facebook,
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
                    .map(|item| parse_comment(item, platform_post_id, observed_at))
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
        query.push((
            "fields",
            "id,from,message,like_count,comment_count,created_time,parent",
        ));
        let response = self
            .client
            .get_json(
                Platform::Facebook,
                &format!("{}/{}/comments", GRAPH_URL, platform_comment_id),
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
                    .map(|item| parse_comment(item, platform_comment_id, observed_at))
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
                Platform::Facebook,
                &format!("{}/{}/comments", GRAPH_URL, platform_post_id),
                &[("message", body)],
                Some(&credential.access_token),
            )
            .await?;
        let now = chrono::Utc::now().timestamp();
        Ok(CanonicalComment {
            platform_comment_id: field_str(Platform::Facebook, &response, "id")?,
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
                Platform::Facebook,
                &format!("{}/{}/comments", GRAPH_URL, platform_comment_id),
                &[("message", body)],
                Some(&credential.access_token),
            )
            .await?;
        let now = chrono::Utc::now().timestamp();
        Ok(CanonicalComment {
            platform_comment_id: field_str(Platform::Facebook, &response, "id")?,
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
        credential: &Credential,
        platform_comment_id: &str,
    ) -> Result<(), AdapterError> {
        self.client
            .post_form(
                Platform::Facebook,
                &format!("{}/{}/likes", GRAPH_URL, platform_comment_id),
                &[],
                Some(&credential.access_token),
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
        self.client
            .delete_json(
                Platform::Facebook,
                &format!("{}/{}/likes", GRAPH_URL, platform_comment_id),
                &[],
                Some(&credential.access_token),
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
        self.client
            .delete_json(
                Platform::Facebook,
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
                Platform::Facebook,
                &format!("{}/{}", GRAPH_URL, platform_comment_id),
                &[("is_hidden", "true")],
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
                Platform::Facebook,
                &format!("{}/{}", GRAPH_URL, platform_comment_id),
                &[("is_hidden", "false")],
                Some(&credential.access_token),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PublishCapability for FacebookAdapter {
    async fn publish(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        content: &PublishContent,
        _deadline: Option<std::time::Duration>,
    ) -> Result<CanonicalPost, AdapterError> {
        let page_id = account.metadata_value("page_id")?;
        let token = credential.access_token.as_str();
        let response = match content {
            PublishContent::Text { body } => {
                self.client
                    .post_form(
                        Platform::Facebook,
                        &format!("{}/{}/feed", GRAPH_URL, page_id),
                        &[("message", body.as_str())],
                        Some(token),
                    )
                    .await?
            }
            PublishContent::Link { message, link_url } => {
                self.client
                    .post_form(
                        Platform::Facebook,
                        &format!("{}/{}/feed", GRAPH_URL, page_id),
                        &[("message", message.as_str()), ("link", link_url.as_str())],
                        Some(token),
                    )
                    .await?
            }
            PublishContent::Image { caption, image_url } => {
                self.client
                    .post_form(
                        Platform::Facebook,
                        &format!("{}/{}/photos", GRAPH_URL, page_id),
                        &[("url", image_url.as_str()), ("caption", caption.as_str())],
                        Some(token),
                    )
                    .await?
            }
            PublishContent::Video { caption, video_url } => {
                self.client
                    .post_form(
                        Platform::Facebook,
                        &format!("{}/{}/videos", GRAPH_URL, page_id),
                        &[
                            ("file_url", video_url.as_str()),
                            ("description", caption.as_str()),
                        ],
                        Some(token),
                    )
                    .await?
            }
        };
        // Photo/video responses carry `post_id` alongside the media id.
        let post_id = opt_str(&response, "post_id")
            .map(Ok)
            .unwrap_or_else(|| field_str(Platform::Facebook, &response, "id"))?;
        info!(post = %post_id, "facebook post published");
        Ok(CanonicalPost {
            platform_post_id: post_id,
            content: content.body().to_string(),
            media_urls: content.media_urls(),
            status: PublishStatus::Published,
            scheduled_at: None,
            published_at: Some(chrono::Utc::now().timestamp()),
        })
    }

    async fn schedule(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        content: &PublishContent,
        publish_at: i64,
    ) -> Result<CanonicalPost, AdapterError> {
        let page_id = account.metadata_value("page_id")?;
        let when = publish_at.to_string();
        let mut form: Vec<(&str, &str)> = vec![
            ("message", content.body()),
            ("published", "false"),
            ("scheduled_publish_time", when.as_str()),
        ];
        let link;
        if let PublishContent::Link { link_url, .. } = content {
            link = link_url.clone();
            form.push(("link", link.as_str()));
        }
        let response = self
            .client
            .post_form(
                Platform::Facebook,
                &format!("{}/{}/feed", GRAPH_URL, page_id),
                &form,
                Some(&credential.access_token),
            )
            .await?;
        Ok(CanonicalPost {
            platform_post_id: field_str(Platform::Facebook, &response, "id")?,
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
        credential: &Credential,
        platform_post_id: &str,
    ) -> Result<(), AdapterError> {
        self.client
            .delete_json(
                Platform::Facebook,
                &format!("{}/{}", GRAPH_URL, platform_post_id),
                &[],
                Some(&credential.access_token),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MetricsCapability for FacebookAdapter {
    async fn account_metrics(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        metric_types: &[String],
        period_start: i64,
        period_end: i64,
    ) -> Result<Vec<CanonicalMetric>, AdapterError> {
        let page_id = account.metadata_value("page_id")?;
        let metrics = metric_types.join(",");
        let since = period_start.to_string();
        let until = period_end.to_string();
        let response = self
            .client
            .get_json(
                Platform::Facebook,
                &format!("{}/{}/insights", GRAPH_URL, page_id),
                &[
                    ("metric", metrics.as_str()),
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
                Platform::Facebook,
                &format!("{}/{}/insights", GRAPH_URL, platform_post_id),
                &[(
                    "metric",
                    "post_impressions,post_engaged_users,post_reactions_by_type_total",
                )],
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
        let page_id = account.metadata_value("page_id")?;
        let response = self
            .client
            .get_json(
                Platform::Facebook,
                &format!("{}/{}/insights", GRAPH_URL, page_id),
                &[
                    ("metric", "page_fans_gender_age,page_fans_country"),
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

fn credential_from_token_response(response: &Value) -> Result<Credential, AdapterError> {
    let access_token = field_str(Platform::Facebook, response, "access_token")?;
    let expires_at = opt_i64(response, "expires_in")
        .map(|ttl| chrono::Utc::now().timestamp() + ttl);
    Ok(Credential {
        access_token,
        refresh_token: None,
        token_secret: None,
        expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_conversation_picks_the_other_party() {
        let raw = json!({
            "id": "t_1",
            "senders": { "data": [
                { "id": "page-9", "name": "My Page" },
                { "id": "user-1", "name": "Ada" },
            ]},
            "updated_time": "2024-03-01T10:00:00+0000",
            "snippet": "see you then",
            "unread_count": 3,
        });
        let conv = parse_conversation(&raw, "page-9").unwrap();
        assert_eq!(conv.platform_conversation_id, "t_1");
        assert_eq!(conv.recipient.id, "user-1");
        assert_eq!(conv.unread_count, Some(3));
        assert!(!conv.read);
        assert!(conv.last_message_at > 0);
    }

    #[test]
    fn test_parse_message_marks_own_sender() {
        let raw = json!({
            "id": "m_1",
            "from": { "id": "page-9", "name": "My Page" },
            "message": "hello",
            "created_time": "2024-03-01T10:00:00+0000",
        });
        let msg = parse_message(&raw, "t_1", "page-9").unwrap();
        assert!(msg.from_me);
        assert_eq!(msg.body, "hello");
    }

    #[test]
    fn test_parse_comment_reply_linkage() {
        let raw = json!({
            "id": "c_2",
            "from": { "id": "user-1", "name": "Ada" },
            "message": "agreed",
            "like_count": 4,
            "comment_count": 0,
            "created_time": "2024-03-01T10:00:00+0000",
            "parent": { "id": "c_1" },
        });
        let comment = parse_comment(&raw, "post-1", 1_000).unwrap();
        assert!(comment.is_reply);
        assert_eq!(comment.parent_comment_id.as_deref(), Some("c_1"));
        assert_eq!(comment.like_count, 4);
        assert_eq!(comment.observed_at, 1_000);
    }

    #[test]
    fn test_next_cursor_requires_a_next_page() {
        let with_next = json!({
            "data": [],
            "paging": { "cursors": { "after": "abc" }, "next": "https://..." },
        });
        assert!(FacebookAdapter::next_cursor(&with_next).is_some());

        let last_page = json!({
            "data": [],
            "paging": { "cursors": { "after": "abc" } },
        });
        assert!(FacebookAdapter::next_cursor(&last_page).is_none());
    }

    #[test]
    fn test_insights_parse_account_scope_periods() {
        let raw = json!({ "data": [{
            "name": "page_impressions",
            "values": [
                { "value": 10, "end_time": "2024-03-01T08:00:00+0000" },
                { "value": 12, "end_time": "2024-03-02T08:00:00+0000" },
            ],
        }]});
        let metrics = parse_insights(&raw, None);
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].metric_type, "page_impressions");
        assert!(metrics[0].period_start.unwrap() < metrics[0].period_end.unwrap());

        let post_metrics = parse_insights(&raw, Some("p1"));
        assert_eq!(post_metrics[0].platform_post_id.as_deref(), Some("p1"));
        assert!(post_metrics[0].period_start.is_none());
    }

    #[test]
    fn test_missing_field_is_remote_error() {
        let err = parse_conversation(&json!({}), "page-9").unwrap_err();
        assert!(matches!(err, AdapterError::Remote { .. }));
    }
}
