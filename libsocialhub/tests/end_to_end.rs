//! End-to-end tests over the sqlite store
//!
//! Same facade paths as the service integration tests, but persisted:
//! the store is a real sqlite file in a temp dir, so these also cover
//! row serialization and the natural-key upserts under the service.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tempfile::TempDir;

use libsocialhub::platforms::mock::{MockAdapter, MockConfig, MockHandle};
use libsocialhub::platforms::PlatformAdapter;
use libsocialhub::store::{SqliteStore, Store};
use libsocialhub::types::{
    CanonicalComment, CanonicalConversation, Credential, Identity, Platform, SocialAccount,
};
use libsocialhub::SocialService;

fn credential() -> Credential {
    Credential {
        access_token: "valid-token".to_string(),
        refresh_token: Some("refresh-token".to_string()),
        token_secret: None,
        expires_at: Some(chrono::Utc::now().timestamp() + 86_400),
    }
}

fn comment(id: &str, parent: Option<&str>, likes: i64, observed_at: i64) -> CanonicalComment {
    CanonicalComment {
        platform_comment_id: id.to_string(),
        platform_post_id: "post-1".to_string(),
        parent_comment_id: parent.map(str::to_string),
        author: Identity::bare("commenter"),
        body: "text".to_string(),
        is_reply: parent.is_some(),
        like_count: likes,
        reply_count: 0,
        created_at: 1_700_000_000,
        observed_at,
    }
}

fn conversation(id: &str, unread: Option<u32>) -> CanonicalConversation {
    CanonicalConversation {
        platform_conversation_id: id.to_string(),
        recipient: Identity::bare("peer"),
        last_message_at: 1_700_000_000,
        read: unread.is_none(),
        unread_count: unread,
        snippet: Some("hello".to_string()),
    }
}

async fn setup(
    config: MockConfig,
) -> Result<(TempDir, SocialService, MockHandle, Arc<SqliteStore>, String)> {
    let temp = TempDir::new()?;
    let path = temp.path().join("socialhub.db");
    let store = Arc::new(SqliteStore::new(&path.to_string_lossy()).await?);

    let adapter = MockAdapter::new(config);
    let handle = adapter.handle();
    let mut adapters: HashMap<Platform, Box<dyn PlatformAdapter>> = HashMap::new();
    adapters.insert(Platform::Facebook, Box::new(adapter));
    let service = SocialService::with_adapters(store.clone(), adapters);

    let account = SocialAccount::new(Platform::Facebook, "owner-1".to_string(), credential());
    store.upsert_account(&account).await?;
    Ok((temp, service, handle, store, account.id))
}

#[tokio::test]
async fn test_comment_pages_resolve_parents_and_keep_fresh_counters() -> Result<()> {
    // Page two carries both a reply to a page-one comment and a stale
    // re-observation of that comment with lower counters.
    let config = MockConfig {
        comment_pages: vec![
            vec![comment("cm1", None, 5, 2_000)],
            vec![
                comment("cm2", Some("cm1"), 0, 2_100),
                comment("cm1", None, 1, 1_000),
            ],
        ],
        ..Default::default()
    };
    let (_temp, service, _, store, account_id) = setup(config).await?;

    let first = service
        .fetch_comments(&account_id, "post-1", None, None)
        .await?;
    let parent_local_id = first.records[0].id.clone();
    let next = first.next_cursor.expect("first page advertises a cursor");

    service
        .fetch_comments(&account_id, "post-1", None, Some(&next))
        .await?;

    let reply = store
        .find_comment(&account_id, "cm2")
        .await?
        .expect("reply was reconciled");
    assert_eq!(
        reply.parent_comment_id.as_deref(),
        Some(parent_local_id.as_str())
    );
    assert!(reply.is_reply);

    // The stale snapshot did not roll counters back.
    let parent = store
        .find_comment(&account_id, "cm1")
        .await?
        .expect("parent was reconciled");
    assert_eq!(parent.id, parent_local_id);
    assert_eq!(parent.like_count, 5);
    Ok(())
}

#[tokio::test]
async fn test_refreshed_credential_is_persisted() -> Result<()> {
    let config = MockConfig {
        auth_failures_before_success: 1,
        conversation_pages: vec![vec![conversation("conv-1", None)]],
        ..Default::default()
    };
    let (_temp, service, handle, store, account_id) = setup(config).await?;

    service.fetch_conversations(&account_id, None, None).await?;
    assert_eq!(handle.refresh_calls(), 1);

    // The single-flight refresh wrote the new token through the store
    // before any retry ran.
    let account = store
        .find_account(&account_id)
        .await?
        .expect("account persisted");
    assert_eq!(account.credential.access_token, "mock-refreshed-1");
    Ok(())
}

#[tokio::test]
async fn test_conversation_rows_survive_reopen() -> Result<()> {
    let config = MockConfig {
        conversation_pages: vec![vec![conversation("conv-1", Some(3))]],
        ..Default::default()
    };
    let (temp, service, _, store, account_id) = setup(config).await?;
    service.fetch_conversations(&account_id, None, None).await?;
    drop(service);
    drop(store);

    let path = temp.path().join("socialhub.db");
    let reopened = SqliteStore::new(&path.to_string_lossy()).await?;
    let rows = reopened.list_conversations(&account_id).await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].unread_count, Some(3));
    assert_eq!(rows[0].snippet.as_deref(), Some("hello"));
    Ok(())
}
