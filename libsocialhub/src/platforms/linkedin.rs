//! LinkedIn platform implementation
//!
//! OAuth2 with refresh-token rotation, social actions (comments and
//! reactions), UGC publishing, and organization share statistics.
//! There is no member inbox API, so the messaging capability is absent
//! entirely. Collections page with a numeric `start` offset.
//!
//! Accounts carry an `author_urn` metadata key (person or organization
//! URN used as the acting entity) and, for metrics, an
//! `organization_urn`.

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
    field_str, opt_i64, opt_str, AuthCapability, AuthorizeUrl, Capability, CommentCapability,
    MetricsCapability, PlatformAdapter, PublishCapability,
};
use crate::types::{
    CanonicalComment, CanonicalMetric, CanonicalPost, Credential, Identity, Page, Platform,
    PublishContent, PublishStatus, SocialAccount,
};

const API_URL: &str = "https://api.linkedin.com/v2";
const OAUTH_URL: &str = "https://www.linkedin.com/oauth/v2";
const DEFAULT_SCOPES: &str = "openid profile w_member_social r_organization_social";
const DEFAULT_LIMIT: u32 = 25;

const CAPABILITIES: &[Capability] = &[
    Capability::Auth,
    Capability::Comments,
    Capability::Publish,
    Capability::Metrics,
];

pub struct LinkedInAdapter {
    app: AppConfig,
    client: RestClient,
}

impl LinkedInAdapter {
    pub fn new(app: AppConfig, client: RestClient) -> Self {
        Self { app, client }
    }

    fn scopes(&self) -> String {
        self.app
            .extra
            .get("scopes")
            .cloned()
            .unwrap_or_else(|| DEFAULT_SCOPES.to_string())
            .replace(' ', "%20")
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<Credential, AdapterError> {
        let response = self
            .client
            .post_form(
                Platform::LinkedIn,
                &format!("{}/accessToken", OAUTH_URL),
                form,
                None,
            )
            .await?;
        Ok(Credential {
            access_token: field_str(Platform::LinkedIn, &response, "access_token")?,
            refresh_token: opt_str(&response, "refresh_token"),
            token_secret: None,
            expires_at: opt_i64(&response, "expires_in")
                .map(|ttl| chrono::Utc::now().timestamp() + ttl),
        })
    }
}

/// `start` offset paging: a next page exists while the window came back
/// full and the reported total reaches past it.
fn next_offset_cursor(response: &Value, start: u64, returned: usize) -> Option<Cursor> {
    let total = response.pointer("/paging/total").and_then(Value::as_i64);
    let consumed = start + returned as u64;
    let more = match total {
        Some(total) => (consumed as i64) < total,
        None => returned as u32 >= DEFAULT_LIMIT,
    };
    more.then(|| Cursor::offset(Platform::LinkedIn, consumed))
}

fn parse_comment(
    value: &Value,
    platform_post_id: &str,
    observed_at: i64,
) -> Result<CanonicalComment, AdapterError> {
    let id = opt_str(value, "id")
        .or_else(|| opt_str(value, "commentUrn"))
        .ok_or_else(|| AdapterError::Remote {
            status: None,
            message: "linkedin comment missing id".to_string(),
        })?;
    let parent = value
        .pointer("/parentComment")
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(CanonicalComment {
        platform_comment_id: id,
        platform_post_id: platform_post_id.to_string(),
        is_reply: parent.is_some(),
        parent_comment_id: parent,
        author: Identity::bare(opt_str(value, "actor").unwrap_or_default()),
        body: value
            .pointer("/message/text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        like_count: value
            .pointer("/likesSummary/totalLikes")
            .and_then(Value::as_i64)
            .unwrap_or(0),
        reply_count: value
            .pointer("/commentsSummary/totalFirstLevelComments")
            .and_then(Value::as_i64)
            .unwrap_or(0),
        created_at: value
            .pointer("/created/time")
            .and_then(Value::as_i64)
            .map(|ms| ms / 1000)
            .unwrap_or(0),
        observed_at,
    })
}

fn parse_share_statistics(response: &Value, platform_post_id: Option<&str>) -> Vec<CanonicalMetric> {
    response
        .get("elements")
        .and_then(Value::as_array)
        .and_then(|elements| elements.first())
        .and_then(|element| element.get("totalShareStatistics"))
        .and_then(Value::as_object)
        .map(|stats| {
            stats
                .iter()
                .map(|(name, value)| CanonicalMetric {
                    metric_type: name.clone(),
                    platform_post_id: platform_post_id.map(str::to_string),
                    value: value.clone(),
                    period_start: None,
                    period_end: None,
                })
                .collect()
        })
        .unwrap_or_default()
}

impl PlatformAdapter for LinkedInAdapter {
    fn platform(&self) -> Platform {
        Platform::LinkedIn
    }

    fn capabilities(&self) -> &'static [Capability] {
        CAPABILITIES
    }

    fn as_auth(&self) -> Option<&dyn AuthCapability> {
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
impl AuthCapability for LinkedInAdapter {
    async fn authorize_url(&self) -> Result<AuthorizeUrl, AdapterError> {
        let state: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let url = format!(
            "{}/authorization?response_type=code&client_id={}&redirect_uri={}&state={}&scope={}",
            OAUTH_URL, self.app.client_id, self.app.redirect_uri, state, self.scopes()
        );
        Ok(AuthorizeUrl {
            url,
            state: Some(state),
        })
    }

    async fn exchange_code(&self, code: &str) -> Result<Credential, AdapterError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.app.client_id.as_str()),
            ("client_secret", self.app.client_secret.as_str()),
            ("redirect_uri", self.app.redirect_uri.as_str()),
        ])
        .await
    }

    /// Rotation: the response may carry a replacement refresh token;
    /// when it does not, keep the one we already hold.
    async fn refresh(&self, account: &SocialAccount) -> Result<Credential, AdapterError> {
        let refresh_token = account.credential.refresh_token.as_deref().ok_or_else(|| {
            AdapterError::Auth("linkedin credential has no refresh token".to_string())
        })?;
        let mut credential = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.app.client_id.as_str()),
                ("client_secret", self.app.client_secret.as_str()),
            ])
            .await?;
        if credential.refresh_token.is_none() {
            credential.refresh_token = account.credential.refresh_token.clone();
        }
        Ok(credential)
    }

    async fn profile(
        &self,
        _account: &SocialAccount,
        credential: &Credential,
    ) -> Result<Identity, AdapterError> {
        let response = self
            .client
            .get_json(
                Platform::LinkedIn,
                &format!("{}/userinfo", API_URL),
                &[],
                Some(&credential.access_token),
            )
            .await?;
        Ok(Identity {
            id: field_str(Platform::LinkedIn, &response, "sub")?,
            name: opt_str(&response, "name"),
            avatar_url: opt_str(&response, "picture"),
        })
    }
}

#[async_trait]
impl CommentCapability for LinkedInAdapter {
    async fn comments(
        &self,
        _account: &SocialAccount,
        credential: &Credential,
        platform_post_id: &str,
        limit: Option<u32>,
        cursor: Option<&Cursor>,
    ) -> Result<Page<CanonicalComment>, AdapterError> {
        let start = match cursor {
            Some(cursor) => cursor.as_offset(Platform::LinkedIn)?,
            None => 0,
        };
        let start_s = start.to_string();
        let count_s = limit.unwrap_or(DEFAULT_LIMIT).to_string();
        let response = self
            .client
            .get_json(
                Platform::LinkedIn,
                &format!("{}/socialActions/{}/comments", API_URL, platform_post_id),
                &[("start", start_s.as_str()), ("count", count_s.as_str())],
                Some(&credential.access_token),
            )
            .await?;

        let observed_at = chrono::Utc::now().timestamp();
        let records: Vec<CanonicalComment> = response
            .get("elements")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| parse_comment(item, platform_post_id, observed_at))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();
        let next = next_offset_cursor(&response, start, records.len());
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
        // Replies hang off the comment URN through the same endpoint.
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
        let actor = account.metadata_value("author_urn")?;
        let payload = json!({
            "actor": actor,
            "object": platform_post_id,
            "message": { "text": body },
        });
        let response = self
            .client
            .post_json(
                Platform::LinkedIn,
                &format!("{}/socialActions/{}/comments", API_URL, platform_post_id),
                &[],
                Some(&credential.access_token),
                &payload,
            )
            .await?;
        let now = chrono::Utc::now().timestamp();
        Ok(CanonicalComment {
            platform_comment_id: field_str(Platform::LinkedIn, &response, "id")?,
            platform_post_id: platform_post_id.to_string(),
            parent_comment_id: None,
            author: Identity::bare(actor),
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
        account: &SocialAccount,
        credential: &Credential,
        platform_comment_id: &str,
    ) -> Result<(), AdapterError> {
        let actor = account.metadata_value("author_urn")?;
        let payload = json!({
            "root": platform_comment_id,
            "reactionType": "LIKE",
        });
        self.client
            .post_json(
                Platform::LinkedIn,
                &format!("{}/reactions", API_URL),
                &[("actor", actor)],
                Some(&credential.access_token),
                &payload,
            )
            .await?;
        Ok(())
    }

    async fn unreact(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        platform_comment_id: &str,
    ) -> Result<(), AdapterError> {
        let actor = account.metadata_value("author_urn")?;
        self.client
            .delete_json(
                Platform::LinkedIn,
                &format!(
                    "{}/reactions/(actor:{},entity:{})",
                    API_URL, actor, platform_comment_id
                ),
                &[],
                Some(&credential.access_token),
            )
            .await?;
        Ok(())
    }

    async fn delete_comment(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        platform_comment_id: &str,
    ) -> Result<(), AdapterError> {
        let actor = account.metadata_value("author_urn")?;
        // Comment URNs embed the parent activity.
        self.client
            .delete_json(
                Platform::LinkedIn,
                &format!("{}/socialActions/{}", API_URL, platform_comment_id),
                &[("actor", actor)],
                Some(&credential.access_token),
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
            platform: Platform::LinkedIn,
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
            platform: Platform::LinkedIn,
            operation: "unhide comment",
        })
    }
}

#[async_trait]
impl PublishCapability for LinkedInAdapter {
    async fn publish(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        content: &PublishContent,
        _deadline: Option<std::time::Duration>,
    ) -> Result<CanonicalPost, AdapterError> {
        let author = account.metadata_value("author_urn")?;
        let share_content = match content {
            PublishContent::Text { body } => json!({
                "shareCommentary": { "text": body },
                "shareMediaCategory": "NONE",
            }),
            PublishContent::Link { message, link_url } => json!({
                "shareCommentary": { "text": message },
                "shareMediaCategory": "ARTICLE",
                "media": [{ "status": "READY", "originalUrl": link_url }],
            }),
            PublishContent::Image { caption, image_url } => json!({
                "shareCommentary": { "text": caption },
                "shareMediaCategory": "IMAGE",
                "media": [{ "status": "READY", "originalUrl": image_url }],
            }),
            PublishContent::Video { .. } => {
                return Err(AdapterError::Unsupported {
                    platform: Platform::LinkedIn,
                    operation: "publish video",
                })
            }
        };
        let payload = json!({
            "author": author,
            "lifecycleState": "PUBLISHED",
            "specificContent": { "com.linkedin.ugc.ShareContent": share_content },
            "visibility": { "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC" },
        });
        let response = self
            .client
            .post_json(
                Platform::LinkedIn,
                &format!("{}/ugcPosts", API_URL),
                &[],
                Some(&credential.access_token),
                &payload,
            )
            .await?;
        let id = field_str(Platform::LinkedIn, &response, "id")?;
        info!(post = %id, "linkedin post published");
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
            platform: Platform::LinkedIn,
            operation: "schedule post",
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
                Platform::LinkedIn,
                &format!("{}/ugcPosts/{}", API_URL, platform_post_id),
                &[],
                Some(&credential.access_token),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MetricsCapability for LinkedInAdapter {
    async fn account_metrics(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        _metric_types: &[String],
        period_start: i64,
        period_end: i64,
    ) -> Result<Vec<CanonicalMetric>, AdapterError> {
        let organization = account.metadata_value("organization_urn")?;
        let start_ms = (period_start * 1000).to_string();
        let end_ms = (period_end * 1000).to_string();
        let response = self
            .client
            .get_json(
                Platform::LinkedIn,
                &format!("{}/organizationalEntityShareStatistics", API_URL),
                &[
                    ("q", "organizationalEntity"),
                    ("organizationalEntity", organization),
                    ("timeIntervals.timeGranularityType", "DAY"),
                    ("timeIntervals.timeRange.start", start_ms.as_str()),
                    ("timeIntervals.timeRange.end", end_ms.as_str()),
                ],
                Some(&credential.access_token),
            )
            .await?;
        let mut metrics = parse_share_statistics(&response, None);
        for metric in &mut metrics {
            metric.period_start = Some(period_start);
            metric.period_end = Some(period_end);
        }
        Ok(metrics)
    }

    async fn post_metrics(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        platform_post_id: &str,
    ) -> Result<Vec<CanonicalMetric>, AdapterError> {
        let organization = account.metadata_value("organization_urn")?;
        let response = self
            .client
            .get_json(
                Platform::LinkedIn,
                &format!("{}/organizationalEntityShareStatistics", API_URL),
                &[
                    ("q", "organizationalEntity"),
                    ("organizationalEntity", organization),
                    ("shares[0]", platform_post_id),
                ],
                Some(&credential.access_token),
            )
            .await?;
        Ok(parse_share_statistics(&response, Some(platform_post_id)))
    }

    async fn audience_demographics(
        &self,
        account: &SocialAccount,
        credential: &Credential,
    ) -> Result<Vec<CanonicalMetric>, AdapterError> {
        let organization = account.metadata_value("organization_urn")?;
        let response = self
            .client
            .get_json(
                Platform::LinkedIn,
                &format!("{}/organizationalEntityFollowerStatistics", API_URL),
                &[
                    ("q", "organizationalEntity"),
                    ("organizationalEntity", organization),
                ],
                Some(&credential.access_token),
            )
            .await?;
        let metrics = response
            .get("elements")
            .and_then(Value::as_array)
            .and_then(|elements| elements.first())
            .and_then(Value::as_object)
            .map(|element| {
                element
                    .iter()
                    .filter(|(name, _)| name.starts_with("followerCountsBy"))
                    .map(|(name, value)| CanonicalMetric {
                        metric_type: name.clone(),
                        platform_post_id: None,
                        value: value.clone(),
                        period_start: None,
                        period_end: None,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(metrics)
    }

    async fn historical_data(
        &self,
        account: &SocialAccount,
        credential: &Credential,
        metric_type: &str,
        period_start: i64,
        period_end: i64,
    ) -> Result<Vec<CanonicalMetric>, AdapterError> {
        let all = self
            .account_metrics(account, credential, &[], period_start, period_end)
            .await?;
        Ok(all
            .into_iter()
            .filter(|m| m.metric_type == metric_type)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_offset_paging_uses_reported_total() {
        let response = json!({ "paging": { "start": 0, "count": 10, "total": 25 } });
        let next = next_offset_cursor(&response, 0, 10).unwrap();
        assert_eq!(next.as_offset(Platform::LinkedIn).unwrap(), 10);

        let last = json!({ "paging": { "start": 20, "count": 10, "total": 25 } });
        assert!(next_offset_cursor(&last, 20, 5).is_none());
    }

    #[test]
    fn test_parse_comment_epoch_millis() {
        let raw = json!({
            "id": "urn:li:comment:1",
            "actor": "urn:li:person:abc",
            "message": { "text": "insightful" },
            "created": { "time": 1_709_290_800_000_i64 },
            "likesSummary": { "totalLikes": 7 },
        });
        let comment = parse_comment(&raw, "urn:li:share:9", 100).unwrap();
        assert_eq!(comment.created_at, 1_709_290_800);
        assert_eq!(comment.like_count, 7);
        assert!(!comment.is_reply);
    }

    #[test]
    fn test_share_statistics_flatten() {
        let raw = json!({ "elements": [{
            "totalShareStatistics": {
                "impressionCount": 100,
                "clickCount": 7,
            },
        }]});
        let metrics = parse_share_statistics(&raw, Some("urn:li:share:9"));
        assert_eq!(metrics.len(), 2);
        assert!(metrics.iter().all(|m| m.platform_post_id.is_some()));
    }
}
