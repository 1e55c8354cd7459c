//! Two sessions sharing one store.

use std::sync::Arc;
use std::time::Duration;

use partyq_core::position::Direction;
use partyq_core::{
    sync, ConflictKind, EngineConfig, ItemContent, ItemId, QueueSession, SessionIdentity,
    SqliteQueueStore,
};
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;

type Session = Arc<QueueSession<SqliteQueueStore>>;

async fn party_of_two(store: &Arc<SqliteQueueStore>) -> (Session, Session) {
    let config = EngineConfig::default();
    let host = SessionIdentity::new("alice");
    let guest = SessionIdentity::new("bob");
    let party = store.create_party("Game night", &host, "Alice").await.unwrap();
    store.join_party(&party.id, &guest, "Bob").await.unwrap();

    let alice = Arc::new(QueueSession::new(
        Arc::clone(store),
        party.id.clone(),
        host,
        config.clone(),
    ));
    let bob = Arc::new(QueueSession::new(
        Arc::clone(store),
        party.id,
        guest,
        config,
    ));
    alice.load().await.unwrap();
    bob.load().await.unwrap();
    (alice, bob)
}

fn note(text: &str) -> ItemContent {
    ItemContent::Note {
        content: text.to_string(),
    }
}

async fn live_ids(session: &Session) -> Vec<ItemId> {
    session
        .live_queue()
        .await
        .into_iter()
        .map(|item| item.id)
        .collect()
}

/// Poll until both sessions show the same live queue.
async fn converged(a: &Session, b: &Session) -> bool {
    for _ in 0..100 {
        if live_ids(a).await == live_ids(b).await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Space writes out so millisecond server timestamps order them.
async fn tick() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

#[tokio::test]
async fn sessions_converge_through_change_feed() {
    let store = Arc::new(SqliteQueueStore::open_in_memory(&EngineConfig::default()).unwrap());
    let (alice, bob) = party_of_two(&store).await;
    let (alice_tx, _alice_conflicts) = mpsc::unbounded_channel();
    let (bob_tx, _bob_conflicts) = mpsc::unbounded_channel();
    let alice_follow = sync::spawn(Arc::clone(&alice), alice_tx);
    let bob_follow = sync::spawn(Arc::clone(&bob), bob_tx);

    let first = alice.add_item(note("pizza")).await.unwrap();
    let second = alice.add_item(note("drinks")).await.unwrap();
    assert!(converged(&alice, &bob).await);
    let third = bob.add_item(note("dice")).await.unwrap();
    assert!(converged(&alice, &bob).await);
    assert_eq!(
        live_ids(&alice).await,
        vec![first.id.clone(), second.id.clone(), third.id.clone()]
    );

    bob.move_item(&third.id, Direction::Up).await.unwrap();
    alice.advance().await.unwrap();
    assert!(converged(&alice, &bob).await);
    assert_eq!(
        live_ids(&bob).await,
        vec![first.id.clone(), third.id.clone(), second.id.clone()]
    );

    let mut showing = None;
    for _ in 0..100 {
        showing = bob.now_showing().await.map(|item| item.id);
        if showing.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(showing, Some(first.id));

    alice_follow.abort();
    bob_follow.abort();
}

#[tokio::test]
async fn overwritten_move_is_reported_once() {
    let store = Arc::new(SqliteQueueStore::open_in_memory(&EngineConfig::default()).unwrap());
    let (alice, bob) = party_of_two(&store).await;
    let a = alice.add_item(note("a")).await.unwrap();
    let b = alice.add_item(note("b")).await.unwrap();
    let c = alice.add_item(note("c")).await.unwrap();
    bob.refresh().await.unwrap();

    // Alice moves `a` down; her change stays pending until she refreshes.
    alice.move_item(&a.id, Direction::Down).await.unwrap();
    tick().await;
    bob.refresh().await.unwrap();
    bob.move_item(&a.id, Direction::Down).await.unwrap();

    let conflicts = alice.refresh().await.unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].kind, ConflictKind::Position);
    assert_eq!(conflicts[0].item_id, a.id);
    assert_eq!(conflicts[0].description, "Item was moved by another user.");
    assert!(!alice.has_pending_changes().await);
    assert_eq!(live_ids(&alice).await, vec![b.id, c.id, a.id]);

    // The same snapshot again reports nothing.
    assert!(alice.refresh().await.unwrap().is_empty());
}

#[tokio::test]
async fn overwritten_completion_is_reported() {
    let store = Arc::new(SqliteQueueStore::open_in_memory(&EngineConfig::default()).unwrap());
    let (alice, bob) = party_of_two(&store).await;
    let chore = alice.add_item(note("clean up")).await.unwrap();
    bob.refresh().await.unwrap();

    assert!(alice.toggle_complete(&chore.id).await.unwrap());
    tick().await;
    bob.refresh().await.unwrap();
    assert!(!bob.toggle_complete(&chore.id).await.unwrap());

    let conflicts = alice.refresh().await.unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].kind, ConflictKind::Content);
    assert_eq!(
        conflicts[0].description,
        "Item was marked incomplete by another user"
    );
    let item = alice.items().await.remove(0);
    assert!(!item.is_completed);
}

#[tokio::test]
async fn on_disk_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partyq.db");
    let config = EngineConfig::default();
    let host = SessionIdentity::new("alice");

    let party_id = {
        let store = Arc::new(SqliteQueueStore::open_path(&path, &config).unwrap());
        let party = store.create_party("Persisted", &host, "Alice").await.unwrap();
        let session = QueueSession::new(
            Arc::clone(&store),
            party.id.clone(),
            host.clone(),
            config.clone(),
        );
        session.load().await.unwrap();
        session.add_item(note("still here")).await.unwrap();
        party.id
    };

    let store = Arc::new(SqliteQueueStore::open_path(&path, &config).unwrap());
    let session = QueueSession::new(store, party_id, host, config);
    session.load().await.unwrap();
    let items = session.live_queue().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].note_content(), Some("still here"));
}
