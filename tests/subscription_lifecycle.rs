//! Subscription attach/detach discipline.

use livefeed::{
    CollectionPath, CommentStore, Credential, FeedClient, FeedConfig, FeedError, FeedSubscription,
    Identity, MemoryBackend, Timestamp,
};
use serde_json::json;
use std::sync::Arc;

fn test_client() -> (Arc<MemoryBackend>, FeedClient) {
    let backend = Arc::new(MemoryBackend::new());
    let client = FeedClient::new(
        backend.clone(),
        FeedConfig {
            tenant_id: "test-tenant".to_string(),
        },
    );
    (backend, client)
}

fn comments_path() -> CollectionPath {
    CollectionPath::comments("test-tenant")
}

fn identity(id: &str) -> Identity {
    Identity {
        id: id.to_string(),
        is_anonymous: true,
        established_at: Timestamp::now(),
    }
}

fn standalone_feed(backend: &Arc<MemoryBackend>) -> (Arc<CommentStore>, FeedSubscription) {
    let store = Arc::new(CommentStore::new());
    let feed = FeedSubscription::new(backend.clone(), Arc::clone(&store), comments_path());
    (store, feed)
}

#[test]
fn test_unsubscribe_stops_all_delivery() {
    let backend = Arc::new(MemoryBackend::new());
    let (store, feed) = standalone_feed(&backend);

    feed.subscribe(&identity("u1")).unwrap();
    backend.inject(
        &comments_path(),
        json!({"authorId": "u1", "text": "seen", "createdAt": {"seconds": 1}}),
    );
    assert_eq!(store.len(), 1);

    feed.unsubscribe();
    backend.inject(
        &comments_path(),
        json!({"authorId": "u1", "text": "unseen", "createdAt": {"seconds": 2}}),
    );

    assert_eq!(store.len(), 1);
    assert_eq!(backend.subscription_count(), 0);
}

#[test]
fn test_unsubscribe_is_idempotent() {
    let backend = Arc::new(MemoryBackend::new());
    let (_store, feed) = standalone_feed(&backend);

    feed.subscribe(&identity("u1")).unwrap();
    feed.unsubscribe();
    feed.unsubscribe();
    assert!(!feed.is_attached());
}

#[test]
fn test_duplicate_subscribe_for_same_identity_fails() {
    let backend = Arc::new(MemoryBackend::new());
    let (_store, feed) = standalone_feed(&backend);

    let id = identity("u1");
    feed.subscribe(&id).unwrap();
    let second = feed.subscribe(&id);
    assert!(matches!(second, Err(FeedError::Subscription(_))));

    // The original attachment is untouched.
    assert!(feed.is_attached());
    assert_eq!(backend.subscription_count(), 1);
}

#[test]
fn test_identity_switch_never_overlaps_subscriptions() {
    let backend = Arc::new(MemoryBackend::new());
    let (_store, feed) = standalone_feed(&backend);

    feed.subscribe(&identity("u1")).unwrap();
    feed.subscribe(&identity("u2")).unwrap();
    feed.subscribe(&identity("u3")).unwrap();

    // Each switch tore the prior attachment down before attaching.
    assert_eq!(backend.subscription_count(), 1);
    assert_eq!(backend.max_concurrent_subscriptions(), 1);
}

#[test]
fn test_session_switch_through_client() {
    let (backend, client) = test_client();

    client.sign_in(None).unwrap();
    client.sign_out();
    client
        .sign_in(Some(Credential("named-user".to_string())))
        .unwrap();

    assert_eq!(backend.subscription_count(), 1);
    assert_eq!(backend.max_concurrent_subscriptions(), 1);
}

#[test]
fn test_dispose_detaches_both_listeners() {
    let (backend, client) = test_client();
    client.sign_in(None).unwrap();
    assert_eq!(backend.subscription_count(), 1);

    client.shutdown();
    assert_eq!(backend.subscription_count(), 0);

    // The identity watcher is gone too: a new session no longer attaches.
    client.sign_out();
    client.sign_in(None).unwrap();
    assert_eq!(backend.subscription_count(), 0);
    assert!(!client.feed().is_attached());
}

#[test]
fn test_store_is_read_only_for_consumers() {
    let (backend, client) = test_client();
    client.sign_in(None).unwrap();

    backend.inject(
        &comments_path(),
        json!({"authorId": "u1", "text": "hello", "createdAt": {"seconds": 1}}),
    );

    // Consumers get an immutable snapshot; mutating it does not touch the
    // live view.
    let held = client.comments();
    let mut copy = (*held).clone();
    copy.clear();
    assert_eq!(client.comments().len(), 1);
}
