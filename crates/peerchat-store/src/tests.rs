//! Storage layer tests for the message store.
#![allow(clippy::unwrap_used)]

use chrono::{TimeZone, Utc};

use super::db::{MessageStore, SCHEMA_VERSION};
use super::models::{Direction, Message, MessageKind, PeerRecord};
use peerchat_core::db::StoreError;

async fn test_store() -> MessageStore {
    MessageStore::open_in_memory().await.unwrap()
}

fn text(content: &str) -> Message {
    Message::outbound("peer-b", MessageKind::Text, content)
}

// === Message tests ===

#[tokio::test]
async fn add_message_returns_strictly_increasing_ids() {
    let store = test_store().await;

    let mut last = 0;
    for i in 0..10 {
        let id = store.add_message(&text(&format!("m{i}"))).await.unwrap();
        assert!(id > last, "id {id} not greater than {last}");
        last = id;
    }
}

#[tokio::test]
async fn ids_are_never_reused_after_delete_or_clear() {
    let store = test_store().await;

    let a = store.add_message(&text("a")).await.unwrap();
    let b = store.add_message(&text("b")).await.unwrap();
    assert!(store.delete_message(b).await.unwrap());

    let c = store.add_message(&text("c")).await.unwrap();
    assert!(c > b);

    store.clear_messages().await.unwrap();
    let d = store.add_message(&text("d")).await.unwrap();
    assert!(d > c);
    assert!(a < b);
}

#[tokio::test]
async fn list_messages_preserves_insertion_order_and_fields() {
    let store = test_store().await;
    let ts = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();

    let sent = text("hello");
    let received = Message::inbound("peer-b", MessageKind::from("image"), ts, "data:...");
    let id1 = store.add_message(&sent).await.unwrap();
    let id2 = store.add_message(&received).await.unwrap();

    let all = store.list_messages().await.unwrap();
    assert_eq!(all.len(), 2);

    assert_eq!(all[0].id, Some(id1));
    assert_eq!(all[0].direction, Direction::Outbound);
    assert_eq!(all[0].content, "hello");
    assert_eq!(all[0].kind, MessageKind::Text);

    assert_eq!(all[1].id, Some(id2));
    assert_eq!(all[1].direction, Direction::Inbound);
    assert_eq!(all[1].peer_id, "peer-b");
    assert_eq!(all[1].kind, MessageKind::Other("image".into()));
    assert_eq!(all[1].timestamp, ts);
}

#[tokio::test]
async fn delete_message_removes_only_that_record() {
    let store = test_store().await;
    let keep = store.add_message(&text("keep")).await.unwrap();
    let doomed = store.add_message(&text("drop")).await.unwrap();

    assert!(store.delete_message(doomed).await.unwrap());
    assert!(!store.delete_message(doomed).await.unwrap());

    let all = store.list_messages().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, Some(keep));
}

#[tokio::test]
async fn clear_messages_empties_the_collection() {
    let store = test_store().await;
    for i in 0..3 {
        store.add_message(&text(&i.to_string())).await.unwrap();
    }

    assert_eq!(store.clear_messages().await.unwrap(), 3);
    assert!(store.list_messages().await.unwrap().is_empty());
}

#[tokio::test]
async fn clearing_messages_leaves_peers_alone() {
    let store = test_store().await;
    store.add_message(&text("x")).await.unwrap();
    store.add_peer(&PeerRecord::new("peer-b")).await.unwrap();

    store.clear_messages().await.unwrap();
    assert_eq!(store.list_peers().await.unwrap().len(), 1);
}

// === Peer tests ===

#[tokio::test]
async fn add_and_get_peer() {
    let store = test_store().await;
    let peer = PeerRecord {
        id: "peer-b".into(),
        alias: "bob".into(),
        nickname: "Bobby".into(),
    };
    store.add_peer(&peer).await.unwrap();

    assert_eq!(store.get_peer("peer-b").await.unwrap(), peer);
    assert!(matches!(
        store.get_peer("nobody").await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn duplicate_peer_is_rejected_without_overwrite() {
    let store = test_store().await;
    let original = PeerRecord {
        id: "peer-b".into(),
        alias: "bob".into(),
        nickname: String::new(),
    };
    store.add_peer(&original).await.unwrap();

    let impostor = PeerRecord {
        id: "peer-b".into(),
        alias: "mallory".into(),
        nickname: "M".into(),
    };
    let err = store.add_peer(&impostor).await.unwrap_err();
    assert!(matches!(err, StoreError::DuplicateKey(_)), "got {err:?}");

    assert_eq!(store.get_peer("peer-b").await.unwrap(), original);
}

#[tokio::test]
async fn update_peer_edits_existing_only() {
    let store = test_store().await;
    store.add_peer(&PeerRecord::new("peer-b")).await.unwrap();

    let edited = PeerRecord {
        id: "peer-b".into(),
        alias: "bob".into(),
        nickname: "Bobby".into(),
    };
    store.update_peer(&edited).await.unwrap();
    assert_eq!(store.get_peer("peer-b").await.unwrap(), edited);

    let missing = PeerRecord::new("ghost");
    assert!(matches!(
        store.update_peer(&missing).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn list_delete_and_clear_peers() {
    let store = test_store().await;
    for id in ["c", "a", "b"] {
        store.add_peer(&PeerRecord::new(id)).await.unwrap();
    }

    let ids: Vec<_> = store
        .list_peers()
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(ids, ["c", "a", "b"]);

    assert!(store.delete_peer("a").await.unwrap());
    assert!(!store.delete_peer("a").await.unwrap());
    assert_eq!(store.list_peers().await.unwrap().len(), 2);

    assert_eq!(store.clear_peers().await.unwrap(), 2);
    assert!(store.list_peers().await.unwrap().is_empty());
}

// === Open / schema tests ===

#[tokio::test]
async fn reopening_file_store_reuses_schema_and_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("webchat.db");

    {
        let store = MessageStore::open(&path, "webchat.db", 1).await.unwrap();
        store.add_message(&text("persisted")).await.unwrap();
        store.add_peer(&PeerRecord::new("peer-b")).await.unwrap();
        store.close().await;
    }

    let store = MessageStore::open(&path, "webchat.db", 1).await.unwrap();
    let messages = store.list_messages().await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "persisted");
    assert_eq!(store.list_peers().await.unwrap().len(), 1);
}

#[tokio::test]
async fn newer_schema_version_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("webchat.db");

    MessageStore::open(&path, "webchat.db", 1)
        .await
        .unwrap()
        .close()
        .await;
    let upgraded = MessageStore::open(&path, "webchat.db", 2).await.unwrap();
    assert_eq!(upgraded.version(), 2);
    upgraded.close().await;

    let err = MessageStore::open(&path, "webchat.db", 1).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::VersionMismatch {
            found: 2,
            expected: 1
        }
    ));
}

#[tokio::test]
async fn in_memory_store_uses_current_schema_version() {
    let store = test_store().await;
    assert_eq!(store.version(), SCHEMA_VERSION);
    assert_eq!(store.name(), "memory");
}

#[tokio::test]
async fn closed_store_is_unavailable() {
    let store = test_store().await;
    store.close().await;

    let err = store.add_message(&text("late")).await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)), "got {err:?}");
}

#[tokio::test]
async fn concurrent_writers_get_distinct_ids() {
    let dir = tempfile::tempdir().unwrap();
    let store = MessageStore::open(&dir.path().join("c.db"), "c", 1)
        .await
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move { store.add_message(&text(&format!("m{i}"))).await })
        })
        .collect();

    let mut ids = Vec::new();
    for h in handles {
        ids.push(h.await.unwrap().unwrap());
    }
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    assert_eq!(store.list_messages().await.unwrap().len(), 8);
}
