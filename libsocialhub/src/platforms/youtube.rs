//! YouTube platform implementation
//!
//! Google OAuth2 (offline refresh token, hour-long access tokens),
//! comment threads with moderation, video publishing through the
//! resumable upload endpoint, and channel analytics. There is no
//! direct-message inbox, so no messaging capability. Collections page
//! with `pageToken` strings.
//!
//! Publishing a video is one adapter call: initiate the resumable
//! session, stream the source, then poll processing until the video is
//! live. A timed-out poll surfaces `Timeout` without marking the video
//! published locally.

use std::time::Duration;

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::cursor::Cursor;
use crate::error::{classify_transport, AdapterError};
use crate::http::RestClient;
use crate::platforms::{
    field_str, opt_str, parse_remote_time, AuthCapability, AuthorizeUrl, Capability,
    CommentCapability, MetricsCapability, PlatformAdapter, PublishCapability,
};
use crate::poll::{PollOutcome, StatusPoll};
use crate::types::{
    CanonicalComment, CanonicalMetric, CanonicalPost, Credential, Identity, Page, Platform,
    PublishContent, PublishStatus, SocialAccount,
};

const API_URL: &str = "https://www.googleapis.com/youtube/v3";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/youtube/v3/videos";
const ANALYTICS_URL: &str = "https://youtubeanalytics.googleapis.com/v2/reports";
const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const SCOPES: &str = "https://www.googleapis.com/auth/youtube https://www.googleapis.com/auth/yt-analytics.readonly";
const DEFAULT_LIMIT: u32 = 25;

/// Processing can take minutes for long uploads; 10s × 90 bounds the
/// wait at fifteen minutes.
const PROCESSING_POLL_INTERVAL: Duration = Duration::from_secs(10);
const PROCESSING_POLL_ATTEMPTS: u32 = 90;

const CAPABILITIES: &[Capability] = &[
    Capability::Auth,
    Capability::Comments,
    Capability::Publish,
    Capability::Metrics,
];

pub struct YouTubeAdapter {
    app: AppConfig,
    client: RestClient,
    poll: StatusPoll,
}

impl YouTubeAdapter {
    pub fn new(app: AppConfig, client: RestClient) -> Self {
        Self {
            app,
            client,
            poll: StatusPoll::new(PROCESSING_POLL_INTERVAL, PROCESSING_POLL_ATTEMPTS),
        }
    }

    fn page_query<'a>(
        limit: Option<u32>,
        cursor: Option<&'a Cursor>,
        limit_buf: &'a mut String,
    ) -> Result<Vec<(&'a str, &'a str)>, AdapterError> {
        *limit_buf = limit.unwrap_or(DEFAULT_LIMIT).to_string();
        let mut query: Vec<(&str, &str)> = vec![("maxResults", limit_buf.as_str())];
        if let Some(cursor) = cursor {
            query.push(("pageToken", cursor.as_page_token(Platform::YouTube)?));
        }
        Ok(query)
    }

    fn next_cursor(response: &Value) -> Option<Cursor> {
        opt_str(response, "nextPageToken").map(|token| Cursor::page_token(Platform::YouTube, token))
    }

    /// Initiate a resumable session, stream the source video into it,
    /// and return the new video id.
    async fn upload_video(
        &self,
        token: &str,
        caption: &str,
        video_url: &str,
        publish_at: Option<i64>,
    ) -> Result<String, AdapterError> {
        let mut status = json!({ "privacyStatus": "public" });
        if let Some(at) = publish_at {
            let when = chrono::DateTime::from_timestamp(at, 0)
                .ok_or_else(|| AdapterError::Remote {
                    status: None,
                    message: format!("invalid publish timestamp: {}", at),
                })?
                .to_rfc3339();
            status = json!({ "privacyStatus": "private", "publishAt": when });
        }
        let metadata = json!({
            "snippet": { "title": caption, "description": caption },
            "status": status,
        });

        let initiate = self
            .client
            .inner()
            .post(UPLOAD_URL)
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .bearer_auth(token)
            .json(&metadata)
            .send()
            .await
            .map_err(|e| classify_transport(Platform::YouTube, &e))?;
        if !initiate.status().is_success() {
            return Err(AdapterError::Remote {
                status: Some(initiate.status().as_u16()),
                message: "resumable upload initiation failed".to_string(),
            });
        }
        let session_url = initiate
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| AdapterError::Remote {
                status: None,
                message: "upload initiation returned no session url".to_string(),
            })?;

        let source = self
            .client
            .inner()
            .get(video_url)
            .send()
            .await
            .map_err(|e| classify_transport(Platform::YouTube, &e))?;
        let bytes = source
            .bytes()
            .await
            .map_err(|e| classify_transport(Platform::YouTube, &e))?;
        debug!(bytes = bytes.len(), "streaming video into upload session");

        let response = self
            .client
            .send(
                Platform::YouTube,
                self.client
                    .inner()
                    .put(&session_url)
                    .bearer_auth(token)
                    .body(bytes),
            )
            .await?;
        field_str(Platform::YouTube, &response, "id")
    }

    /// Poll `videos.list` processing details until the upload is live.
    async fn wait_for_processing(
        &self,
        token: &str,
        video_id: &str,
        deadline: Option<Duration>,
    ) -> Result<(), AdapterError> {
        self.poll
            .run(deadline, |attempt| async move {
                let response = self
                    .client
                    .get_json(
                        Platform::YouTube,
                        &format!("{}/videos", API_URL),
                        &[("part", "processingDetails"), ("id", video_id)],
                        Some(token),
                    )
                    .await?;
                let status = response
                    .pointer("/items/0/processingDetails/processingStatus")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                debug!(video = video_id, attempt, status, "processing status");
                Ok(match status {
                    "succeeded" => PollOutcome::Ready(()),
                    "failed" => PollOutcome::Failed(status.to_string()),
                    "terminated" => PollOutcome::Expired,
                    _ => PollOutcome::Pending,
                })
            })
            .await
    }
}

fn parse_thread(value: &Value, video_id: &str, observed_at: i64) -> Option<CanonicalComment> {
    let top = value.pointer("/snippet/topLevelComment")?;
    let mut comment = parse_comment_resource(top, video_id, None, observed_at)?;
    comment.reply_count = value
        .pointer("/snippet/totalReplyCount")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    Some(comment)
}

fn parse_comment_resource(
    value: &Value,
    video_id: &str,
    parent: Option<&str>,
    observed_at: i64,
) -> Option<CanonicalComment> {
    let snippet = value.get("snippet")?;
    Some(CanonicalComment {
        platform_comment_id: opt_str(value, "id")?,
        platform_post_id: video_id.to_string(),
        parent_comment_id: parent.map(str::to_string),
        author: Identity {
            id: snippet
                .pointer("/authorChannelId/value")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            name: opt_str(snippet, "authorDisplayName"),
            avatar_url: opt_str(snippet, "authorProfileImageUrl"),
        },
        body: opt_str(snippet, "textDisplay").unwrap_or_default(),
        is_reply: parent.is_some(),
        like_count: snippet.get("likeCount").and_then(Value::as_i64).unwrap_or(0),
        reply_count: 0,
        created_at: opt_str(snippet, "publishedAt")
            .as_deref()
            .and_then(parse_remote_time)
            .unwrap_or(0),
        observed_at,
    })
}

/// Analytics rows arrive as a column-header / row-matrix pair; flatten
/// each metric column into one time-series metric.
fn parse_analytics(response: &Value, period_start: i64, period_end: i64) -> Vec<CanonicalMetric> {
    let headers: Vec<String> = response
        .get("columnHeaders")
        .and_then(Value::as_array)
        .map(|hs| hs.iter().filter_map(|h| opt_str(h, "name")).collect())
        .unwrap_or_default();
    let rows = response.get("rows").cloned().unwrap_or(Value::Null);

    headers
        .iter()
        .enumerate()
        .skip_while(|(_, name)| name.as_str() == "day")
        .map(|(index, name)| {
            let series: Vec<Value> = rows
                .as_array()
                .map(|rs| {
                    rs.iter()
                        .filter_map(|row| row.get(index).cloned())
                        .collect()
                })
                .unwrap_or_default();
            CanonicalMetric {
                metric_type: name.clone(),
                platform_post_id: None,
                value: Value::Array(series),
                period_start: Some(period_start),
                period_end: Some(period_end),
            }
        })
        .collect()
}

fn date_string(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "1970-01-01".to_string())
}

impl PlatformAdapter for YouTubeAdapter {
    fn platform(&self) -> Platform {
        Platform::YouTube
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
impl AuthCapability for YouTubeAdapter {
    async fn authorize_url(&self) -> Result<AuthorizeUrl, AdapterError> {
        let state: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let url = format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&access_type=offline&prompt=consent&state={}&scope={}",
            AUTH_URL,
            self.app.client_id,
            self.app.redirect_uri,
            state,
            SCOPES.replace(' ', "%20"),
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
                Platform::YouTube,
                TOKEN_URL,
                &[
                    ("code", code),
                    ("client_id", self.app.client_id.as_str()),
                    ("client_secret", self.app.client_secret.as_str()),
                    ("redirect_uri", self.app.redirect_uri.as_str()),
                    ("grant_type", "authorization_code"),
                ],
                None,
            )
            .await?;
        Ok(Credential {
            access_token: field_str(Platform::YouTube, &response, "access_token")?,
            refresh_token: opt_str(&response, "refresh_token"),
            token_secret: None,
            expires_at: response
                .get("expires_in")
                .and_then(Value::as_i64)
                .map(|ttl| chrono::Utc::now().timestamp() + ttl),
        })
    }

    /// The refresh token is long-lived and not rotated; carry it over.
    async fn refresh(&self, account: &SocialAccount) -> Result<Credential, AdapterError> {
        let refresh_token = account.credential.refresh_token.as_deref().ok_or_else(|| {
            AdapterError::Auth("youtube credential has no refresh token".to_string())
        })?;
        let response = self
            .client
            .post_form(
                Platform::YouTube,
                TOKEN_URL,
                &[
                    ("refresh_token", refresh_token),
                    ("client_id", self.app.client_id.as_str()),
                    ("client_secret", self.app.client_secret.as_str()),
                    ("grant_type", "refresh_token"),
                ],
                None,
            )
            .await?;
        Ok(Credential {
            access_token: field_str(Platform::YouTube, &response, "access_token")?,
            refresh_token: Some(refresh_token.to_string()),
            token_secret: None,
            expires_at: response
                .get("expires_in")
                .and_then(Value::as_i64)
                .map(|ttl| chrono::Utc::now().timestamp() + ttl),
        })
    }

    async fn profile(
        &self,
        _account: &SocialAccount,
        credential: &Credential,
    ) -> Result<Identity, AdapterError> {
        let response = self
            .client
            .get_json(
                Platform::YouTube,
                &format!("{}/channels", API_URL),
                &[("part", "snippet"), ("mine", "true")],
                Some(&credential.access_token),
            )
            .await?;
        let channel = response
            .pointer("/items/0")
            .ok_or_else(|| AdapterError::Remote {
                status: None,
                message: "no channel for the authenticated user".to_string(),
            })?;
        Ok(Identity {
            id: field_str(Platform::YouTube, channel, "id")?,
            name: channel
                .pointer("/snippet/title")
                .and_then(Value::as_str)
                .map(str::to_string),
            avatar_url: channel
                .pointer("/snippet/thumbnails/default/url")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

#[async_trait]
impl CommentCapability for YouTubeAdapter {
    async fn comments(
        &self,
        _account: &SocialAccount,
        credential: &Credential,
        platform_post_id: &str,
        limit: Option<u32>,
        cursor: Option<&Cursor>,
    ) -> Result<Page<CanonicalComment>, AdapterError> {
        let mut limit_buf = String::new();
        let mut query = Self::page_query(limit, cursor, &mut limit_buf)?;
        query.push(("part", "snippet"));
        query.push(("videoId", platform_post_id));
        query.push(("order", "time"));
        let response = self
            .client
            .get_json(
                Platform::YouTube,
                &format!("{}/commentThreads", API_URL),
                &query,
                Some(&credential.access_token),
            )
            .await?;

        let observed_at = chrono::Utc::now().timestamp();
        let records = response
            .get("items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| parse_thread(item, platform_post_id, observed_at))
                    .collect()
            })
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
        let mut query = Self::page_query(limit, cursor, &mut limit_buf)?;
        query.push(("part", "snippet"));
        query.push(("parentId", platform_comment_id));
        let response = self
            .client
            .get_json(
                Platform::YouTube,
                &format!("{}/comments", API_URL),
                &query,
                Some(&credential.access_token),
            )
            .await?;

        let observed_at = chrono::Utc::now().timestamp();
        let records = response
            .get("items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        parse_comment_resource(
                            item,
                            platform_comment_id,
                            Some(platform_comment_id),
                            observed_at,
                        )
                    })
                    .collect()
            })
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
        let payload = json!({
            "snippet": {
                "videoId": platform_post_id,
                "topLevelComment": { "snippet": { "textOriginal": body } },
            },
        });
        let response = self
            .client
            .post_json(
                Platform::YouTube,
                &format!("{}/commentThreads", API_URL),
                &[("part", "snippet")],
                Some(&credential.access_token),
                &payload,
            )
            .await?;
        let observed_at = chrono::Utc::now().timestamp();
        parse_thread(&response, platform_post_id, observed_at).ok_or_else(|| {
            AdapterError::Remote {
                status: None,
                message: "comment thread response missing snippet".to_string(),
            }
        })
    }

    async fn reply_to_comment(
        &self,
        _account: &SocialAccount,
        credential: &Credential,
        platform_comment_id: &str,
        body: &str,
    ) -> Result<CanonicalComment, AdapterError> {
        let payload = json!({
            "snippet": { "parentId": platform_comment_id, "textOriginal": body },
        });
        let response = self
            .client
            .post_json(
                Platform::YouTube,
                &format!("{}/comments", API_URL),
                &[("part", "snippet")],
                Some(&credential.access_token),
                &payload,
            )
            .await?;
        let observed_at = chrono::Utc::now().timestamp();
        parse_comment_resource(
            &response,
            platform_comment_id,
            Some(platform_comment_id),
            observed_at,
        )
        .ok_or_else(|| AdapterError::Remote {
            status: None,
            message: "comment response missing snippet".to_string(),
        })
    }

    async fn react(
        &self,
        _account: &SocialAccount,
        _credential: &Credential,
        _platform_comment_id: &str,
    ) -> Result<(), AdapterError> {
        Err(AdapterError::Unsupported {
            platform: Platform::YouTube,
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
            platform: Platform::YouTube,
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
                Platform::YouTube,
                &format!("{}/comments", API_URL),
                &[("id", platform_comment_id)],
                Some(&credential.access_token),
            )
            .await?;
        Ok(())
    }

    /// Moderation: hide maps to `rejected`, unhide back to `published`.
    async fn hide_comment(
        &self,
        _account: &SocialAccount,
        credential: &Credential,
        platform_comment_id: &str,
    ) -> Result<(), AdapterError> {
        self.client
            .post_form(
                Platform::YouTube,
                &format!("{}/comments/setModerationStatus", API_URL),
                &[
                    ("id", platform_comment_id),
                    ("moderationStatus", "rejected"),
                ],
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
                Platform::YouTube,
                &format!("{}/comments/setModerationStatus", API_URL),
                &[
                    ("id", platform_comment_id),
                    ("moderationStatus", "published"),
                ],
                Some(&credential.access_token),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PublishCapability for YouTubeAdapter {
    async fn publish(
        &self,
        _account: &SocialAccount,
        credential: &Credential,
        content: &PublishContent,
        deadline: Option<Duration>,
    ) -> Result<CanonicalPost, AdapterError> {
        let PublishContent::Video { caption, video_url } = content else {
            return Err(AdapterError::Unsupported {
                platform: Platform::YouTube,
                operation: "publish non-video content",
            });
        };
        let token = credential.access_token.as_str();
        let video_id = self.upload_video(token, caption, video_url, None).await?;
        self.wait_for_processing(token, &video_id, deadline).await?;
        info!(video = %video_id, "youtube video published");
        Ok(CanonicalPost {
            platform_post_id: video_id,
            content: caption.clone(),
            media_urls: vec![video_url.clone()],
            status: PublishStatus::Published,
            scheduled_at: None,
            published_at: Some(chrono::Utc::now().timestamp()),
        })
    }

    /// Scheduled videos upload as private with a `publishAt`; the
    /// platform flips them public itself, so no processing poll here.
    async fn schedule(
        &self,
        _account: &SocialAccount,
        credential: &Credential,
        content: &PublishContent,
        publish_at: i64,
    ) -> Result<CanonicalPost, AdapterError> {
        let PublishContent::Video { caption, video_url } = content else {
            return Err(AdapterError::Unsupported {
                platform: Platform::YouTube,
                operation: "schedule non-video content",
            });
        };
        let video_id = self
            .upload_video(
                credential.access_token.as_str(),
                caption,
                video_url,
                Some(publish_at),
            )
            .await?;
        Ok(CanonicalPost {
            platform_post_id: video_id,
            content: caption.clone(),
            media_urls: vec![video_url.clone()],
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
                Platform::YouTube,
                &format!("{}/videos", API_URL),
                &[("id", platform_post_id)],
                Some(&credential.access_token),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MetricsCapability for YouTubeAdapter {
    async fn account_metrics(
        &self,
        _account: &SocialAccount,
        credential: &Credential,
        metric_types: &[String],
        period_start: i64,
        period_end: i64,
    ) -> Result<Vec<CanonicalMetric>, AdapterError> {
        let metrics = if metric_types.is_empty() {
            "views,likes,comments,subscribersGained".to_string()
        } else {
            metric_types.join(",")
        };
        let start = date_string(period_start);
        let end = date_string(period_end);
        let response = self
            .client
            .get_json(
                Platform::YouTube,
                ANALYTICS_URL,
                &[
                    ("ids", "channel==MINE"),
                    ("startDate", start.as_str()),
                    ("endDate", end.as_str()),
                    ("metrics", metrics.as_str()),
                    ("dimensions", "day"),
                ],
                Some(&credential.access_token),
            )
            .await?;
        Ok(parse_analytics(&response, period_start, period_end))
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
                Platform::YouTube,
                &format!("{}/videos", API_URL),
                &[("part", "statistics"), ("id", platform_post_id)],
                Some(&credential.access_token),
            )
            .await?;
        let stats = response
            .pointer("/items/0/statistics")
            .and_then(Value::as_object)
            .ok_or_else(|| AdapterError::Remote {
                status: None,
                message: format!("no statistics for video {}", platform_post_id),
            })?;
        Ok(stats
            .iter()
            .map(|(name, value)| CanonicalMetric {
                metric_type: name.clone(),
                platform_post_id: Some(platform_post_id.to_string()),
                value: value.clone(),
                period_start: None,
                period_end: None,
            })
            .collect())
    }

    async fn audience_demographics(
        &self,
        _account: &SocialAccount,
        credential: &Credential,
    ) -> Result<Vec<CanonicalMetric>, AdapterError> {
        let end = chrono::Utc::now().timestamp();
        let start = end - 90 * 24 * 3600;
        let response = self
            .client
            .get_json(
                Platform::YouTube,
                ANALYTICS_URL,
                &[
                    ("ids", "channel==MINE"),
                    ("startDate", date_string(start).as_str()),
                    ("endDate", date_string(end).as_str()),
                    ("metrics", "viewerPercentage"),
                    ("dimensions", "ageGroup,gender"),
                ],
                Some(&credential.access_token),
            )
            .await?;
        Ok(vec![CanonicalMetric {
            metric_type: "audience_demographics".to_string(),
            platform_post_id: None,
            value: response.get("rows").cloned().unwrap_or(Value::Null),
            period_start: Some(start),
            period_end: Some(end),
        }])
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
    fn test_parse_thread_carries_reply_count() {
        let raw = json!({
            "snippet": {
                "totalReplyCount": 4,
                "topLevelComment": {
                    "id": "cm1",
                    "snippet": {
                        "textDisplay": "great video",
                        "authorDisplayName": "Ada",
                        "authorChannelId": { "value": "ch-1" },
                        "likeCount": 9,
                        "publishedAt": "2024-03-01T10:00:00Z",
                    },
                },
            },
        });
        let comment = parse_thread(&raw, "vid-1", 77).unwrap();
        assert_eq!(comment.platform_comment_id, "cm1");
        assert_eq!(comment.reply_count, 4);
        assert_eq!(comment.like_count, 9);
        assert!(!comment.is_reply);
        assert_eq!(comment.observed_at, 77);
    }

    #[test]
    fn test_parse_analytics_skips_day_column() {
        let raw = json!({
            "columnHeaders": [
                { "name": "day" },
                { "name": "views" },
                { "name": "likes" },
            ],
            "rows": [
                ["2024-03-01", 100, 5],
                ["2024-03-02", 120, 8],
            ],
        });
        let metrics = parse_analytics(&raw, 1_000, 2_000);
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].metric_type, "views");
        assert_eq!(metrics[0].value, json!([100, 120]));
        assert_eq!(metrics[1].metric_type, "likes");
    }

    #[test]
    fn test_date_string() {
        assert_eq!(date_string(0), "1970-01-01");
        assert_eq!(date_string(1_709_251_200), "2024-03-01");
    }
}
