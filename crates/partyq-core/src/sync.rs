//! Keeping a session in step with the store's change feed.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::models::ConflictInfo;
use crate::session::QueueSession;
use crate::store::{ChangeNotice, QueueStore};

/// Refetch and merge whenever the store reports a change for the session's party.
///
/// Non-empty conflict lists are forwarded to `conflicts`. A lagging receiver
/// triggers a single catch-up refresh. Returns when the feed closes or the
/// conflict receiver is dropped.
pub async fn follow_changes<S: QueueStore>(
    session: Arc<QueueSession<S>>,
    mut notices: broadcast::Receiver<ChangeNotice>,
    conflicts: mpsc::UnboundedSender<Vec<ConflictInfo>>,
) {
    loop {
        let notice = match notices.recv().await {
            Ok(notice) => Some(notice),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::debug!("Change feed lagged by {missed} notices, refreshing");
                None
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        if let Some(notice) = &notice {
            if &notice.party_id != session.party_id() {
                continue;
            }
            if session
                .applied_revision()
                .await
                .is_some_and(|applied| notice.revision <= applied)
            {
                continue;
            }
        }

        match session.refresh().await {
            Ok(found) if found.is_empty() => {}
            Ok(found) => {
                if conflicts.send(found).is_err() {
                    break;
                }
            }
            Err(error) => tracing::warn!(party_id = %session.party_id(), "Refresh failed: {error}"),
        }
    }
    tracing::debug!(party_id = %session.party_id(), "Stopped following changes");
}

/// Spawn [`follow_changes`] on the current runtime.
pub fn spawn<S: QueueStore + 'static>(
    session: Arc<QueueSession<S>>,
    conflicts: mpsc::UnboundedSender<Vec<ConflictInfo>>,
) -> JoinHandle<()> {
    let notices = session.subscribe_changes();
    tokio::spawn(follow_changes(session, notices, conflicts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::models::{ConflictKind, ItemContent, SessionIdentity};
    use crate::services::SqliteQueueStore;
    use crate::store::QueueWriter;
    use std::time::Duration;

    fn note(text: &str) -> ItemContent {
        ItemContent::Note {
            content: text.to_string(),
        }
    }

    #[tokio::test]
    async fn follower_picks_up_remote_writes() {
        let config = EngineConfig::default();
        let store = Arc::new(SqliteQueueStore::open_in_memory(&config).unwrap());
        let host = SessionIdentity::new("host");
        let party = store.create_party("Sync", &host, "Host").await.unwrap();

        let alice = Arc::new(QueueSession::new(
            Arc::clone(&store),
            party.id.clone(),
            host,
            config.clone(),
        ));
        let bob = Arc::new(QueueSession::new(
            Arc::clone(&store),
            party.id.clone(),
            SessionIdentity::new("guest"),
            config,
        ));

        let (tx, _rx) = mpsc::unbounded_channel();
        let handle = spawn(Arc::clone(&bob), tx);

        let item = alice.add_item(note("popcorn")).await.unwrap();

        let mut seen = false;
        for _ in 0..50 {
            if bob.items().await.iter().any(|i| i.id == item.id) {
                seen = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(seen, "follower never saw the remote insert");
        handle.abort();
    }

    #[tokio::test]
    async fn follower_forwards_conflicts() {
        let config = EngineConfig::default();
        let store = Arc::new(SqliteQueueStore::open_in_memory(&config).unwrap());
        let host = SessionIdentity::new("host");
        let party = store.create_party("Sync", &host, "Host").await.unwrap();
        let session = Arc::new(QueueSession::new(
            Arc::clone(&store),
            party.id.clone(),
            host,
            config,
        ));

        let item = session.add_item(note("snacks")).await.unwrap();
        session.refresh().await.unwrap();

        // Drive the follower from a private feed so the toggle stays unconfirmed
        // until the remote delete has landed.
        let (feed, notices) = broadcast::channel(8);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let follower = tokio::spawn(follow_changes(Arc::clone(&session), notices, tx));

        session.toggle_complete(&item.id).await.unwrap();
        store.delete_item(&item.id).await.unwrap();
        feed.send(ChangeNotice {
            party_id: party.id.clone(),
            revision: 3,
        })
        .unwrap();

        let conflicts = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::Deleted);
        follower.abort();
    }
}
