//! Service-level integration tests
//!
//! These run the full facade over a mock adapter and an in-memory
//! store: credential handling, capability gating, page sync and
//! replay, reaction deltas, and publish flows.

use std::collections::HashMap;
use std::sync::Arc;

use libsocialhub::error::{AdapterError, SocialError};
use libsocialhub::platforms::mock::{MockAdapter, MockConfig, MockHandle};
use libsocialhub::platforms::PlatformAdapter;
use libsocialhub::poll::PollOutcome;
use libsocialhub::store::{MemoryStore, Store};
use libsocialhub::token::TokenState;
use libsocialhub::types::{
    CanonicalComment, CanonicalConversation, CanonicalMetric, Credential, Identity, Platform,
    PublishContent, PublishStatus, SocialAccount,
};
use libsocialhub::SocialService;

fn fresh_credential() -> Credential {
    Credential {
        access_token: "valid-token".to_string(),
        refresh_token: Some("refresh-token".to_string()),
        token_secret: None,
        expires_at: Some(chrono::Utc::now().timestamp() + 86_400),
    }
}

fn expired_credential() -> Credential {
    Credential {
        access_token: "stale-token".to_string(),
        refresh_token: Some("refresh-token".to_string()),
        token_secret: None,
        expires_at: Some(chrono::Utc::now().timestamp() - 60),
    }
}

fn conversation(id: &str) -> CanonicalConversation {
    CanonicalConversation {
        platform_conversation_id: id.to_string(),
        recipient: Identity::bare(format!("user-{}", id)),
        last_message_at: 1_700_000_000,
        read: false,
        unread_count: Some(1),
        snippet: Some("hello".to_string()),
    }
}

fn comment(id: &str, likes: i64) -> CanonicalComment {
    let now = chrono::Utc::now().timestamp();
    CanonicalComment {
        platform_comment_id: id.to_string(),
        platform_post_id: "post-1".to_string(),
        parent_comment_id: None,
        author: Identity::bare("commenter"),
        body: "nice".to_string(),
        is_reply: false,
        like_count: likes,
        reply_count: 0,
        created_at: now,
        observed_at: now,
    }
}

/// Service over one mock adapter and a memory store, with one account
/// already connected and holding `credential`.
async fn service_with(
    config: MockConfig,
    credential: Credential,
) -> (SocialService, MockHandle, Arc<MemoryStore>, String) {
    let store = Arc::new(MemoryStore::new());
    let adapter = MockAdapter::new(config);
    let handle = adapter.handle();

    let mut adapters: HashMap<Platform, Box<dyn PlatformAdapter>> = HashMap::new();
    adapters.insert(Platform::Facebook, Box::new(adapter));
    let service = SocialService::with_adapters(store.clone(), adapters);

    let account = SocialAccount::new(Platform::Facebook, "owner-1".to_string(), credential);
    store.upsert_account(&account).await.unwrap();
    (service, handle, store, account.id)
}

#[tokio::test]
async fn test_two_page_sync_no_overlap() {
    let config = MockConfig {
        conversation_pages: vec![vec![conversation("c1")], vec![conversation("c2")]],
        ..Default::default()
    };
    let (service, _, store, account_id) = service_with(config, fresh_credential()).await;

    let first = service
        .fetch_conversations(&account_id, Some(25), None)
        .await
        .unwrap();
    assert_eq!(first.records.len(), 1);
    assert_eq!(first.records[0].platform_conversation_id, "c1");
    let next = first.next_cursor.expect("first page advertises a cursor");

    let second = service
        .fetch_conversations(&account_id, Some(25), Some(&next))
        .await
        .unwrap();
    assert_eq!(second.records[0].platform_conversation_id, "c2");
    assert!(second.next_cursor.is_none());
    assert_ne!(first.records[0].id, second.records[0].id);

    let all = store.list_conversations(&account_id).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn test_replaying_a_page_is_idempotent() {
    let config = MockConfig {
        conversation_pages: vec![vec![conversation("c1"), conversation("c2")]],
        ..Default::default()
    };
    let (service, _, store, account_id) = service_with(config, fresh_credential()).await;

    let first = service
        .fetch_conversations(&account_id, None, None)
        .await
        .unwrap();
    let replay = service
        .fetch_conversations(&account_id, None, None)
        .await
        .unwrap();

    // Local ids are stable across replays and no duplicates appear.
    for (a, b) in first.records.iter().zip(replay.records.iter()) {
        assert_eq!(a.id, b.id);
    }
    assert_eq!(store.list_conversations(&account_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_auth_rejection_gets_exactly_one_refresh_and_retry() {
    let config = MockConfig {
        auth_failures_before_success: 1,
        conversation_pages: vec![vec![conversation("c1")]],
        ..Default::default()
    };
    let (service, handle, _, account_id) = service_with(config, fresh_credential()).await;

    let page = service
        .fetch_conversations(&account_id, None, None)
        .await
        .unwrap();
    assert_eq!(page.records.len(), 1);
    assert_eq!(handle.refresh_calls(), 1);
    // Failed first call plus the retried one.
    assert_eq!(handle.remote_calls(), 2);
    assert_eq!(service.token_state(&account_id), TokenState::Valid);
}

#[tokio::test]
async fn test_failed_refresh_marks_account_expired() {
    let config = MockConfig {
        refresh_succeeds: false,
        ..Default::default()
    };
    let (service, handle, _, account_id) = service_with(config, expired_credential()).await;

    let err = service
        .fetch_conversations(&account_id, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SocialError::Adapter(AdapterError::Auth(_))));
    assert_eq!(service.token_state(&account_id), TokenState::Expired);
    // The proactive refresh failed before any page call went out.
    assert_eq!(handle.remote_calls(), 0);

    // Expired is terminal: the next call fails without touching the
    // refresher again.
    let refreshes = handle.refresh_calls();
    let err = service
        .fetch_conversations(&account_id, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SocialError::Adapter(AdapterError::Auth(_))));
    assert_eq!(handle.refresh_calls(), refreshes);
}

#[tokio::test]
async fn test_unsupported_capability_fails_without_remote_calls() {
    let config = MockConfig {
        capability_set: libsocialhub::platforms::mock::NO_MESSAGING,
        ..Default::default()
    };
    let (service, handle, _, account_id) = service_with(config, fresh_credential()).await;

    let err = service
        .fetch_conversations(&account_id, None, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SocialError::Adapter(AdapterError::Unsupported { .. })
    ));

    let err = service
        .send_message(&account_id, "u1", "hi")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SocialError::Adapter(AdapterError::Unsupported { .. })
    ));

    assert_eq!(handle.remote_calls(), 0);
}

#[tokio::test]
async fn test_video_publish_timeout_leaves_no_local_row() {
    let config = MockConfig {
        publish_script: vec![PollOutcome::Pending],
        poll_max_attempts: 2,
        ..Default::default()
    };
    let (service, _, store, account_id) = service_with(config, fresh_credential()).await;

    let content = PublishContent::Video {
        caption: "clip".to_string(),
        video_url: "https://cdn.example/v.mp4".to_string(),
    };
    let err = service
        .publish_post(&account_id, &content, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SocialError::Adapter(AdapterError::Timeout(_))
    ));
    assert!(store.list_posts(&account_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_publish_then_soft_delete() {
    let (service, _, store, account_id) =
        service_with(MockConfig::default(), fresh_credential()).await;

    let content = PublishContent::Text {
        body: "hello world".to_string(),
    };
    let row = service
        .publish_post(&account_id, &content, None)
        .await
        .unwrap();
    assert_eq!(row.status, PublishStatus::Published);

    let deleted = service
        .delete_post(&account_id, &row.platform_post_id)
        .await
        .unwrap()
        .expect("post was known locally");
    assert_eq!(deleted.id, row.id);
    assert_eq!(deleted.status, PublishStatus::Deleted);

    let stored = store
        .find_post(&account_id, &row.platform_post_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, PublishStatus::Deleted);
}

#[tokio::test]
async fn test_reaction_delta_applies_and_clamps() {
    let config = MockConfig {
        comment_pages: vec![vec![comment("cm1", 0)]],
        ..Default::default()
    };
    let (service, _, _, account_id) = service_with(config, fresh_credential()).await;

    service
        .fetch_comments(&account_id, "post-1", None, None)
        .await
        .unwrap();

    let row = service
        .react_to_comment(&account_id, "cm1")
        .await
        .unwrap()
        .expect("comment known locally");
    assert_eq!(row.like_count, 1);

    // Removing twice cannot push the counter below zero.
    let row = service
        .remove_comment_reaction(&account_id, "cm1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.like_count, 0);
    let row = service
        .remove_comment_reaction(&account_id, "cm1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.like_count, 0);
}

#[tokio::test]
async fn test_send_message_lands_in_synced_conversation() {
    let config = MockConfig {
        conversation_pages: vec![vec![conversation("conv-1")]],
        ..Default::default()
    };
    let (service, handle, store, account_id) = service_with(config, fresh_credential()).await;

    let page = service
        .fetch_conversations(&account_id, None, None)
        .await
        .unwrap();
    let local_conversation = &page.records[0];

    let sent = service
        .send_message(&account_id, "conv-1", "on my way")
        .await
        .unwrap();
    assert_eq!(sent.conversation_id, local_conversation.id);
    assert!(sent.from_me);
    assert_eq!(handle.sent_messages(), vec!["on my way".to_string()]);

    let messages = store.list_messages(&local_conversation.id).await.unwrap();
    assert_eq!(messages.len(), 1);
}

#[tokio::test]
async fn test_mark_read_mirrors_local_row() {
    let config = MockConfig {
        conversation_pages: vec![vec![conversation("conv-1")]],
        ..Default::default()
    };
    let (service, _, store, account_id) = service_with(config, fresh_credential()).await;

    service
        .fetch_conversations(&account_id, None, None)
        .await
        .unwrap();
    service
        .mark_conversation_read(&account_id, "conv-1")
        .await
        .unwrap();

    let row = store
        .find_conversation(&account_id, "conv-1")
        .await
        .unwrap()
        .unwrap();
    assert!(row.read);
    assert_eq!(row.unread_count, Some(0));
}

#[tokio::test]
async fn test_account_metrics_roll_forward() {
    let metric = CanonicalMetric {
        metric_type: "impressions".to_string(),
        platform_post_id: None,
        value: serde_json::json!({ "total": 10 }),
        period_start: Some(1_700_000_000),
        period_end: Some(1_700_086_400),
    };
    let config = MockConfig {
        metrics: vec![metric],
        ..Default::default()
    };
    let (service, _, store, account_id) = service_with(config, fresh_credential()).await;

    let types = vec!["impressions".to_string()];
    service
        .fetch_account_metrics(&account_id, &types, 1_700_000_000, 1_700_086_400)
        .await
        .unwrap();
    let again = service
        .fetch_account_metrics(&account_id, &types, 1_700_000_000, 1_700_086_400)
        .await
        .unwrap();

    // Same period snapshot rolls forward instead of duplicating.
    assert_eq!(store.list_metrics(&account_id).await.unwrap().len(), 1);
    assert_eq!(again[0].value["total"], 10);
}

#[tokio::test]
async fn test_connect_account_lifecycle() {
    let store = Arc::new(MemoryStore::new());
    let adapter = MockAdapter::succeeding();
    let mut adapters: HashMap<Platform, Box<dyn PlatformAdapter>> = HashMap::new();
    adapters.insert(Platform::Facebook, Box::new(adapter));
    let service = SocialService::with_adapters(store.clone(), adapters);

    let account = service
        .connect_account(Platform::Facebook, "owner-1", "auth-code")
        .await
        .unwrap();
    assert_eq!(service.token_state(&account.id), TokenState::Valid);

    let stored = store.find_account(&account.id).await.unwrap().unwrap();
    assert_eq!(stored.credential.access_token, "mock-token-auth-code");
    assert!(stored.credential.expires_at.is_some());
}

#[tokio::test]
async fn test_unknown_account_is_invalid_input() {
    let (service, _, _, _) = service_with(MockConfig::default(), fresh_credential()).await;
    let err = service
        .fetch_conversations("no-such-account", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SocialError::InvalidInput(_)));
}

#[tokio::test]
async fn test_success_path_makes_single_remote_call() {
    let config = MockConfig {
        conversation_pages: vec![vec![conversation("c1")]],
        ..Default::default()
    };
    let (service, handle, _, account_id) = service_with(config, fresh_credential()).await;

    service
        .fetch_conversations(&account_id, None, None)
        .await
        .unwrap();
    assert_eq!(handle.remote_calls(), 1);
    assert_eq!(handle.refresh_calls(), 0);
}
