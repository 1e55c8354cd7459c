//! `SQLite`-backed queue store shared by every session of a process.
//!
//! Plays the server's role: assigns ids and `updated_at`, bumps the party
//! revision on every write, enforces the server-side caps and publishes a
//! [`ChangeNotice`] after each committed change. Rate limit attempts live in
//! the database, so the caps hold across processes sharing one file.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex};

use crate::config::EngineConfig;
use crate::db::{Database, QueueRepository, SqliteQueueRepository};
use crate::error::{Error, Result};
use crate::models::{
    ItemContent, ItemId, ItemStatus, Member, Party, PartyId, QueueItem, SessionIdentity,
};
use crate::position;
use crate::rate_limit::{ActionClass, RateLimitPolicy, RateLimits};
use crate::store::{
    ChangeFeed, ChangeNotice, CompletionUpdate, QueueWriter, QuotaLimits, QuotaOracle, Snapshot,
    SnapshotSource,
};

const NOTICE_CHANNEL_CAPACITY: usize = 256;

/// Thread-safe store over one `SQLite` database.
#[derive(Clone)]
pub struct SqliteQueueStore {
    db: Arc<Mutex<Database>>,
    rate_limits: RateLimits,
    limits: QuotaLimits,
    notices: broadcast::Sender<ChangeNotice>,
}

impl SqliteQueueStore {
    /// Open a store at the given filesystem path.
    pub fn open_path(path: impl AsRef<Path>, config: &EngineConfig) -> Result<Self> {
        Ok(Self::from_database(Database::open(path)?, config))
    }

    /// Open an in-memory store (primarily for tests).
    pub fn open_in_memory(config: &EngineConfig) -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory()?, config))
    }

    fn from_database(db: Database, config: &EngineConfig) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        Self {
            db: Arc::new(Mutex::new(db)),
            rate_limits: config.rate_limits,
            limits: config.quota_limits(),
            notices,
        }
    }

    /// Create a party and make its creator the first member.
    pub async fn create_party(
        &self,
        name: &str,
        creator: &SessionIdentity,
        display_name: &str,
    ) -> Result<Party> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("Party name cannot be empty".to_string()));
        }

        let now = Utc::now();
        let party = Party {
            id: PartyId::new(),
            name: name.to_string(),
            created_by_session_id: creator.session_id.clone(),
            created_at: now,
        };
        let member = Member {
            party_id: party.id.clone(),
            session_id: creator.session_id.clone(),
            display_name: display_name.to_string(),
            user_id: creator.user_id.clone(),
            joined_at: now,
        };

        {
            let mut db = self.db.lock().await;
            let tx = db.connection_mut().transaction()?;
            let repo = SqliteQueueRepository::new(&tx);
            let key = creator.rate_limit_key();
            check_rate_limit(
                &repo,
                self.rate_limits.party_create,
                ActionClass::PartyCreate,
                key,
                now,
            )?;
            repo.create_party(&party)?;
            repo.upsert_member(&member)?;
            repo.record_attempt(ActionClass::PartyCreate, key, now)?;
            tx.commit()?;
        }

        tracing::info!("Created party {} ({})", party.id, party.name);
        Ok(party)
    }

    /// Join a party, or refresh the display name of an existing member.
    pub async fn join_party(
        &self,
        party_id: &PartyId,
        identity: &SessionIdentity,
        display_name: &str,
    ) -> Result<Member> {
        let (member, revision) = {
            let db = self.db.lock().await;
            let repo = SqliteQueueRepository::new(db.connection());
            if repo.get_party(party_id)?.is_none() {
                return Err(Error::NotFound(format!("party {party_id}")));
            }

            let existing = repo.get_member(party_id, &identity.session_id)?;
            if existing.is_none() {
                let count = repo.list_members(party_id)?.len();
                if count >= self.limits.max_party_members {
                    return Err(Error::QuotaExceeded(format!(
                        "party already has {count} members (limit {})",
                        self.limits.max_party_members
                    )));
                }
            }

            let member = Member {
                party_id: party_id.clone(),
                session_id: identity.session_id.clone(),
                display_name: display_name.to_string(),
                user_id: identity.user_id.clone(),
                joined_at: existing.map_or_else(Utc::now, |member| member.joined_at),
            };
            repo.upsert_member(&member)?;
            (member, repo.bump_revision(party_id)?)
        };
        self.publish(party_id, revision);
        Ok(member)
    }

    pub async fn get_party(&self, party_id: &PartyId) -> Result<Option<Party>> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).get_party(party_id)
    }

    /// Reassign integer positions in display order.
    ///
    /// Maintenance pass for parties whose positions have been squeezed by
    /// repeated show-next promotions. Returns how many items moved.
    pub async fn renormalize_positions(&self, party_id: &PartyId) -> Result<usize> {
        let (moved, revision) = {
            let mut db = self.db.lock().await;
            let tx = db.connection_mut().transaction()?;
            let repo = SqliteQueueRepository::new(&tx);
            let items = repo.list_items(party_id)?;
            let updates = position::renormalize(&items);
            if updates.is_empty() {
                return Ok(0);
            }
            let now = Utc::now();
            for (item_id, position) in &updates {
                repo.update_position(item_id, *position, now)?;
            }
            let revision = repo.bump_revision(party_id)?;
            tx.commit()?;
            (updates.len(), revision)
        };
        tracing::info!("Renormalized {moved} positions in party {party_id}");
        self.publish(party_id, revision);
        Ok(moved)
    }

    fn publish(&self, party_id: &PartyId, revision: u64) {
        // No subscribers is not an error.
        let _ = self.notices.send(ChangeNotice {
            party_id: party_id.clone(),
            revision,
        });
    }

    /// Run one item update under the db lock and bump the owning party's revision.
    async fn write_item(
        &self,
        update: impl FnOnce(&SqliteQueueRepository<'_>) -> Result<Option<PartyId>>,
    ) -> Result<()> {
        let changed = {
            let db = self.db.lock().await;
            let repo = SqliteQueueRepository::new(db.connection());
            match update(&repo)? {
                Some(party_id) => {
                    let revision = repo.bump_revision(&party_id)?;
                    Some((party_id, revision))
                }
                None => None,
            }
        };
        if let Some((party_id, revision)) = changed {
            self.publish(&party_id, revision);
        }
        Ok(())
    }
}

/// Reject the attempt when `identity` has used up its window.
fn check_rate_limit(
    repo: &SqliteQueueRepository<'_>,
    policy: RateLimitPolicy,
    action: ActionClass,
    identity: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    repo.prune_attempts(action, policy.cutoff(now))?;
    let decision = policy.decide(&repo.list_attempts(action, identity)?, now);
    if decision.allowed {
        Ok(())
    } else {
        tracing::debug!(%action, identity, "Store rejected attempt over rate limit");
        Err(Error::RateLimitExceeded {
            action,
            retry_after: decision.retry_after,
        })
    }
}

impl SnapshotSource for SqliteQueueStore {
    async fn fetch_snapshot(&self, party_id: &PartyId) -> Result<Snapshot> {
        let db = self.db.lock().await;
        let repo = SqliteQueueRepository::new(db.connection());
        let revision = repo.revision(party_id)?;
        Ok(Snapshot {
            party_id: party_id.clone(),
            revision,
            items: repo.list_items(party_id)?,
            members: repo.list_members(party_id)?,
        })
    }
}

impl QueueWriter for SqliteQueueStore {
    async fn insert_item(&self, item: &QueueItem) -> Result<QueueItem> {
        let key = item.added_by_session_id.as_str();
        let (stored, revision) = {
            let mut db = self.db.lock().await;
            let now = Utc::now();
            let tx = db.connection_mut().transaction()?;
            let repo = SqliteQueueRepository::new(&tx);
            check_rate_limit(
                &repo,
                self.rate_limits.queue_item,
                ActionClass::QueueItem,
                key,
                now,
            )?;
            if repo.get_party(&item.party_id)?.is_none() {
                return Err(Error::NotFound(format!("party {}", item.party_id)));
            }
            let live = repo.count_live_items(&item.party_id)?;
            if live >= self.limits.max_queue_items {
                return Err(Error::QuotaExceeded(format!(
                    "the queue already holds {live} items (limit {})",
                    self.limits.max_queue_items
                )));
            }

            let stored = QueueItem {
                id: ItemId::new(),
                status: ItemStatus::Pending,
                updated_at: Some(now),
                ..item.clone()
            };
            repo.insert_item(&stored)?;
            // Read back so timestamps carry the stored precision.
            let stored = repo
                .get_item(&stored.id)?
                .ok_or_else(|| Error::Database(format!("item {} vanished", stored.id)))?;
            let revision = repo.bump_revision(&item.party_id)?;
            repo.record_attempt(ActionClass::QueueItem, key, now)?;
            tx.commit()?;
            (stored, revision)
        };

        tracing::debug!("Inserted item {} into party {}", stored.id, stored.party_id);
        self.publish(&stored.party_id, revision);
        Ok(stored)
    }

    async fn update_position(&self, item_id: &ItemId, position: f64) -> Result<()> {
        if !position.is_finite() {
            return Err(Error::InvalidInput(format!(
                "position must be finite, got {position}"
            )));
        }
        self.write_item(|repo| {
            repo.update_position(item_id, position, Utc::now())
                .map(Some)
        })
        .await
    }

    async fn update_status(&self, item_id: &ItemId, status: ItemStatus) -> Result<()> {
        self.write_item(|repo| {
            let current = repo
                .get_item(item_id)?
                .ok_or_else(|| Error::NotFound(format!("item {item_id}")))?;
            if current.status == status {
                return Ok(None);
            }
            if !current.status.can_become(status) {
                return Err(Error::InvalidInput(format!(
                    "item {item_id} cannot go from {} to {status}",
                    current.status
                )));
            }
            repo.update_status(item_id, status, Utc::now()).map(Some)
        })
        .await
    }

    async fn update_note_content(&self, item_id: &ItemId, content: &str) -> Result<()> {
        self.write_item(|repo| {
            let current = repo
                .get_item(item_id)?
                .ok_or_else(|| Error::NotFound(format!("item {item_id}")))?;
            if !current.content.is_note() {
                return Err(Error::InvalidInput(format!("item {item_id} is not a note")));
            }
            let content = ItemContent::Note {
                content: content.to_string(),
            };
            repo.update_content(item_id, &content, Utc::now()).map(Some)
        })
        .await
    }

    async fn update_completion(
        &self,
        item_id: &ItemId,
        completion: &CompletionUpdate,
    ) -> Result<()> {
        self.write_item(|repo| {
            repo.update_completion(item_id, completion, Utc::now())
                .map(Some)
        })
        .await
    }

    async fn delete_item(&self, item_id: &ItemId) -> Result<()> {
        self.write_item(|repo| repo.delete_item(item_id).map(Some))
            .await
    }
}

impl QuotaOracle for SqliteQueueStore {
    async fn live_item_count(&self, party_id: &PartyId) -> Result<usize> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).count_live_items(party_id)
    }

    fn limits(&self) -> QuotaLimits {
        self.limits
    }
}

impl ChangeFeed for SqliteQueueStore {
    /// The store has one channel for all parties; receivers filter by party id.
    fn subscribe(&self, _party_id: &PartyId) -> broadcast::Receiver<ChangeNotice> {
        self.notices.subscribe()
    }
}
