//! Two users registering, finding each other and chatting over the in-memory
//! backends.

use bytes::Bytes;
use chat_core::media::message_photo_path;
use chat_core::memory::{MemoryAuthService, MemoryBlobStore, MemoryDocumentStore};
use chat_core::{
    ConversationResolver, ConversationTarget, DirectoryError, Location, MediaUploader, Message,
    MessageKind, SessionContext, UserDirectory, UserProfile,
};
use std::sync::Arc;

struct World {
    store: Arc<MemoryDocumentStore>,
    blobs: Arc<MemoryBlobStore>,
    resolver: ConversationResolver,
    users: UserDirectory,
    media: MediaUploader,
    alice: SessionContext,
    bob: SessionContext,
}

async fn world() -> World {
    let store = Arc::new(MemoryDocumentStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let users = UserDirectory::new(store.clone());

    let alice_auth = MemoryAuthService::new();
    let bob_auth = MemoryAuthService::new();
    let alice = users
        .register(&alice_auth, "Alice", "alice@x.com", "secret1")
        .await
        .unwrap();
    let bob = users
        .register(&bob_auth, "Bob", "bob@y.com", "secret2")
        .await
        .unwrap();

    World {
        resolver: ConversationResolver::new(store.clone()),
        media: MediaUploader::new(blobs.clone()),
        blobs,
        users,
        store,
        alice,
        bob,
    }
}

#[tokio::test]
async fn test_alice_finds_bob_and_they_chat() {
    let w = world().await;

    let hits = w.users.search_users(&w.alice, "bo").await.unwrap();
    assert_eq!(hits, vec![UserProfile::new("Bob", "bob@y.com")]);
    let bob = w.bob.participant();

    let target = w.resolver.open_conversation(&w.alice, &bob.id).await.unwrap();
    assert_eq!(target, ConversationTarget::New);

    let (id, hi) = w
        .resolver
        .send_message(&w.alice, &target, &bob, MessageKind::Text("hi".into()))
        .await
        .unwrap();

    // Bob sees the same conversation from his side.
    let target = w
        .resolver
        .open_conversation(&w.bob, w.alice.id())
        .await
        .unwrap();
    assert_eq!(target, ConversationTarget::Existing(id.clone()));

    let photo_id = w.resolver.next_message_id(&w.bob, w.alice.id());
    let media = w
        .media
        .upload_message_photo(&photo_id, Bytes::from_static(b"\x89PNG"))
        .await
        .unwrap();
    let photo = Message::new(photo_id.clone(), w.bob.participant(), MessageKind::Photo(media));
    let same = w
        .resolver
        .send_composed(&w.bob, &target, &w.alice.participant(), &photo)
        .await
        .unwrap();
    assert_eq!(same, id);

    let (_, location) = w
        .resolver
        .send_to(
            &w.alice,
            &bob,
            MessageKind::Location(Location {
                latitude: 41.0,
                longitude: 29.0,
            }),
        )
        .await
        .unwrap();

    let mut feed = w.resolver.subscribe_to_messages(&id).await.unwrap();
    let messages = feed.next().await.unwrap();
    assert_eq!(messages, vec![hi, photo, location]);

    // The photo message and its blob share one id.
    let stored_photo = &messages[1];
    assert_eq!(stored_photo.id, photo_id);
    let blob_path = message_photo_path(&stored_photo.id);
    assert_eq!(w.blobs.get(&blob_path), Some(Bytes::from_static(b"\x89PNG")));
    match &stored_photo.kind {
        MessageKind::Photo(media) => assert!(media.url.path().ends_with(&blob_path)),
        other => panic!("expected photo, got {:?}", other),
    }

    let alice_index = w.resolver.conversations(&w.alice).await.unwrap();
    let bob_index = w.resolver.conversations(&w.bob).await.unwrap();
    assert_eq!(alice_index.len(), 1);
    assert_eq!(bob_index.len(), 1);
    assert_eq!(alice_index[0].latest_message.message, "[Location]");
    assert_eq!(bob_index[0].latest_message.message, "[Location]");
    assert!(alice_index[0].latest_message.is_read);
    assert!(!bob_index[0].latest_message.is_read);

    let view = bob_index[0].to_conversation(w.bob.id());
    assert_eq!(view.counterpart(), w.alice.id());
    assert_eq!(view.counterpart_name, "Alice");
}

#[tokio::test]
async fn test_partial_create_then_recovery() {
    let w = world().await;
    w.store.fail_writes_under("/bob-y-com/conversations").unwrap();

    let err = w
        .resolver
        .send_to(&w.alice, &w.bob.participant(), MessageKind::Text("hi".into()))
        .await
        .unwrap_err();
    let id = match err {
        DirectoryError::PartialWrite {
            conversation_id,
            missing,
            ..
        } => {
            assert_eq!(&missing, w.bob.id());
            conversation_id
        }
        other => panic!("expected partial write, got {:?}", other),
    };
    assert_eq!(w.resolver.conversations(&w.alice).await.unwrap().len(), 1);
    assert!(w.resolver.conversations(&w.bob).await.unwrap().is_empty());

    // The next message from Alice reuses the conversation and repairs Bob's index.
    w.store.clear_faults();
    let (again, _) = w
        .resolver
        .send_to(&w.alice, &w.bob.participant(), MessageKind::Text("you there?".into()))
        .await
        .unwrap();
    assert_eq!(again, id);

    let bob_index = w.resolver.conversations(&w.bob).await.unwrap();
    assert_eq!(bob_index.len(), 1);
    assert_eq!(bob_index[0].id, id);
    assert_eq!(bob_index[0].latest_message.message, "you there?");
}

#[tokio::test]
async fn test_soft_leave_keeps_log_for_counterpart() {
    let w = world().await;
    let (id, _) = w
        .resolver
        .send_to(&w.alice, &w.bob.participant(), MessageKind::Text("hi".into()))
        .await
        .unwrap();

    let mut bob_list = w.resolver.subscribe_to_conversations(&w.bob).await.unwrap();
    assert_eq!(bob_list.next().await.unwrap().len(), 1);

    w.resolver.remove_conversation(&w.bob, &id).await.unwrap();
    assert!(bob_list.next().await.unwrap().is_empty());

    // Removing twice is harmless.
    w.resolver.remove_conversation(&w.bob, &id).await.unwrap();
    assert!(w
        .resolver
        .conversation_exists(&w.bob, w.alice.id())
        .await
        .unwrap_err()
        .is_not_found());

    let mut messages = w.resolver.subscribe_to_messages(&id).await.unwrap();
    assert_eq!(messages.next().await.unwrap().len(), 1);
    assert_eq!(
        w.resolver.conversation_exists(&w.alice, w.bob.id()).await.unwrap(),
        id
    );

    bob_list.cancel().await;
    messages.cancel().await;
    assert_eq!(w.store.subscriber_count(), 0);
}
