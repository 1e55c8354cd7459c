//! Per-party client session: optimistic queue mutations and snapshot merges.
//!
//! Every mutation follows the same shape: validate, consult the rate limiter,
//! mutate the local queue, register pending changes, then await the store
//! write outside the lock. A failed or timed-out write restores the fields
//! captured before the mutation and drops the pending change, so the caller
//! sees consistent local state by the time the error arrives.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::merge::merge_snapshot;
use crate::models::{
    sort_items, ChangeField, ConflictInfo, FieldValue, ItemContent, ItemId, ItemStatus, Member,
    PartyId, PendingChange, QueueItem, SessionId, SessionIdentity,
};
use crate::pending::PendingChangeTracker;
use crate::position::{self, Direction};
use crate::rate_limit::{ActionClass, RateLimitDecision, RateLimiter};
use crate::store::{ChangeNotice, CompletionUpdate, QueueStore, Snapshot};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Outbound notification for other collaborators (e.g. a push notifier).
///
/// Emitted after the store accepted the write; delivery is best-effort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    ItemAdded {
        party_id: PartyId,
        item_id: ItemId,
        title: String,
        added_by: SessionId,
    },
}

/// What [`QueueSession::advance`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvanceOutcome {
    /// Item that moved from `showing` to `shown`
    pub shown: Option<ItemId>,
    /// Item that moved from `pending` to `showing`
    pub showing: Option<ItemId>,
}

impl AdvanceOutcome {
    pub const fn is_noop(&self) -> bool {
        self.shown.is_none() && self.showing.is_none()
    }
}

#[derive(Debug, Default)]
struct SessionState {
    items: Vec<QueueItem>,
    members: Vec<Member>,
    tracker: PendingChangeTracker,
    limiter: RateLimiter,
    applied_revision: Option<u64>,
}

impl SessionState {
    fn item(&self, item_id: &ItemId) -> Result<&QueueItem> {
        self.items
            .iter()
            .find(|item| &item.id == item_id)
            .ok_or_else(|| Error::NotFound(format!("item {item_id}")))
    }

    fn item_mut(&mut self, item_id: &ItemId) -> Option<&mut QueueItem> {
        self.items.iter_mut().find(|item| &item.id == item_id)
    }

    /// Apply a field value and register it as pending, returning the old value.
    fn change_field(&mut self, item_id: &ItemId, value: FieldValue) -> Option<FieldValue> {
        let item = self.item_mut(item_id)?;
        let old = FieldValue::read(item, value.field());
        value.write_to(item);
        self.tracker
            .add_change(PendingChange::new(item_id.clone(), old.clone(), value));
        Some(old)
    }

    /// Undo [`Self::change_field`]. Items removed by a snapshot meanwhile are left alone.
    fn restore_field(&mut self, item_id: &ItemId, old: &FieldValue) {
        if let Some(item) = self.item_mut(item_id) {
            old.write_to(item);
        }
        self.tracker.clear_change(item_id, old.field());
    }

    fn showing(&self) -> Option<&QueueItem> {
        self.items
            .iter()
            .find(|item| item.status == ItemStatus::Showing)
    }

    fn sort(&mut self) {
        sort_items(&mut self.items);
    }
}

/// One client's view of a party queue.
///
/// All state sits behind a single mutex; store calls are awaited with the
/// lock released.
pub struct QueueSession<S> {
    store: Arc<S>,
    party_id: PartyId,
    identity: SessionIdentity,
    config: EngineConfig,
    state: Mutex<SessionState>,
    events: broadcast::Sender<QueueEvent>,
}

impl<S: QueueStore> QueueSession<S> {
    pub fn new(
        store: Arc<S>,
        party_id: PartyId,
        identity: SessionIdentity,
        config: EngineConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let state = SessionState {
            limiter: RateLimiter::new(config.rate_limits),
            ..SessionState::default()
        };
        Self {
            store,
            party_id,
            identity,
            config,
            state: Mutex::new(state),
            events,
        }
    }

    pub const fn party_id(&self) -> &PartyId {
        &self.party_id
    }

    pub const fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Receive [`QueueEvent`]s emitted after successful writes.
    pub fn subscribe_events(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Receive the store's change notices for this party.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<ChangeNotice> {
        self.store.subscribe(&self.party_id)
    }

    // ----- reads -----

    /// Every item including `shown` ones, in display order.
    pub async fn items(&self) -> Vec<QueueItem> {
        self.state.lock().await.items.clone()
    }

    /// Items not yet shown, in display order.
    pub async fn live_queue(&self) -> Vec<QueueItem> {
        let state = self.state.lock().await;
        state
            .items
            .iter()
            .filter(|item| item.is_live())
            .cloned()
            .collect()
    }

    pub async fn now_showing(&self) -> Option<QueueItem> {
        self.state.lock().await.showing().cloned()
    }

    pub async fn members(&self) -> Vec<Member> {
        self.state.lock().await.members.clone()
    }

    pub async fn pending_item_ids(&self) -> Vec<ItemId> {
        self.state.lock().await.tracker.get_pending_item_ids()
    }

    pub async fn pending_changes(&self, item_id: &ItemId) -> Vec<PendingChange> {
        self.state.lock().await.tracker.get_changes(item_id).to_vec()
    }

    pub async fn has_pending_changes(&self) -> bool {
        self.state.lock().await.tracker.has_pending_changes()
    }

    pub async fn applied_revision(&self) -> Option<u64> {
        self.state.lock().await.applied_revision
    }

    /// Whether an action would currently pass the rate limiter, without
    /// recording an attempt.
    pub async fn rate_limit_status(&self, action: ActionClass) -> RateLimitDecision {
        let mut state = self.state.lock().await;
        state.limiter.check(action, self.identity.rate_limit_key())
    }

    // ----- snapshots -----

    /// Initial fetch for a fresh session.
    pub async fn load(&self) -> Result<()> {
        self.refresh().await?;
        tracing::debug!(
            party_id = %self.party_id,
            items = self.state.lock().await.items.len(),
            "Loaded party queue"
        );
        Ok(())
    }

    /// Fetch the current snapshot and merge it.
    pub async fn refresh(&self) -> Result<Vec<ConflictInfo>> {
        let snapshot = self.store.fetch_snapshot(&self.party_id).await?;
        Ok(self.apply_snapshot(snapshot).await)
    }

    /// Merge a snapshot and return the conflicts to surface.
    ///
    /// Snapshots older than the last applied revision are dropped and logged.
    pub async fn apply_snapshot(&self, snapshot: Snapshot) -> Vec<ConflictInfo> {
        if snapshot.party_id != self.party_id {
            tracing::warn!(
                "Ignoring snapshot for party {} in session for {}",
                snapshot.party_id,
                self.party_id
            );
            return Vec::new();
        }

        let mut state = self.state.lock().await;
        if let Err(error) = check_revision(state.applied_revision, snapshot.revision) {
            tracing::debug!("Dropping snapshot: {error}");
            return Vec::new();
        }

        let local = std::mem::take(&mut state.items);
        let outcome = merge_snapshot(&mut state.tracker, &local, snapshot.items);
        state.items = outcome.merged;
        state.sort();
        state.members = snapshot.members;
        state.applied_revision = Some(snapshot.revision);

        if outcome.conflicts.is_empty() {
            tracing::debug!(
                revision = snapshot.revision,
                confirmed = outcome.confirmed,
                "Applied snapshot"
            );
        } else {
            tracing::info!(
                revision = snapshot.revision,
                conflicts = outcome.conflicts.len(),
                "Applied snapshot with conflicts"
            );
        }
        outcome.conflicts
    }

    // ----- mutations -----

    /// Append a new item to the end of the queue.
    ///
    /// The item shows up locally under a temporary id right away and takes the
    /// store's id once the insert succeeds.
    pub async fn add_item(&self, content: ItemContent) -> Result<QueueItem> {
        validate_content(&content)?;

        let key = self.identity.rate_limit_key();
        let mut actions = vec![ActionClass::QueueItem];
        if content.is_image() {
            actions.push(ActionClass::ImageUpload);
        }

        {
            let mut state = self.state.lock().await;
            for action in &actions {
                let decision = state.limiter.check(*action, key);
                if !decision.allowed {
                    return Err(Error::RateLimitExceeded {
                        action: *action,
                        retry_after: decision.retry_after,
                    });
                }
            }
        }

        let limits = self.store.limits();
        let live = self
            .timed("live item count", self.store.live_item_count(&self.party_id))
            .await?;
        if live >= limits.max_queue_items {
            return Err(Error::QuotaExceeded(format!(
                "the queue already holds {live} items (limit {})",
                limits.max_queue_items
            )));
        }

        let draft = {
            let mut state = self.state.lock().await;
            for action in &actions {
                state.limiter.record(*action, key);
            }
            let position = position::next_position(&state.items);
            let draft = QueueItem::new(
                self.party_id.clone(),
                content,
                position,
                self.identity.session_id.clone(),
            );
            state.items.push(draft.clone());
            state.sort();
            tracing::debug!(temp_id = %draft.id, position, "Optimistically added item");
            draft
        };

        let result = self.write("insert item", self.store.insert_item(&draft)).await;

        let mut state = self.state.lock().await;
        state.items.retain(|item| item.id != draft.id);
        match result {
            Ok(stored) => {
                if !state.items.iter().any(|item| item.id == stored.id) {
                    state.items.push(stored.clone());
                }
                state.sort();
                drop(state);

                // Nobody listening is fine.
                let _ = self.events.send(QueueEvent::ItemAdded {
                    party_id: self.party_id.clone(),
                    item_id: stored.id.clone(),
                    title: stored.title(),
                    added_by: stored.added_by_session_id.clone(),
                });
                Ok(stored)
            }
            Err(error) => {
                tracing::warn!(temp_id = %draft.id, "Rolled back add: {error}");
                Err(error)
            }
        }
    }

    /// Swap an item with its nearest pending neighbour.
    ///
    /// Returns `false` without writing when there is no neighbour in that direction.
    pub async fn move_item(&self, item_id: &ItemId, direction: Direction) -> Result<bool> {
        let (neighbor_id, old_self, old_neighbor, new_self, new_neighbor) = {
            let mut state = self.state.lock().await;
            let item = state.item(item_id)?;
            ensure_saved(item)?;
            let Some(neighbor) = position::pending_neighbor(&state.items, item_id, direction)
            else {
                return Ok(false);
            };
            let neighbor_id = neighbor.id.clone();
            let (new_self, new_neighbor) = position::swap(item.position, neighbor.position);

            let old_self = state
                .change_field(item_id, FieldValue::Position(new_self))
                .ok_or_else(|| Error::NotFound(format!("item {item_id}")))?;
            let old_neighbor = state
                .change_field(&neighbor_id, FieldValue::Position(new_neighbor))
                .ok_or_else(|| Error::NotFound(format!("item {neighbor_id}")))?;
            state.sort();
            (neighbor_id, old_self, old_neighbor, new_self, new_neighbor)
        };

        let result = async {
            self.write(
                "update position",
                self.store.update_position(item_id, new_self),
            )
            .await?;
            let second = self
                .write(
                    "update position",
                    self.store.update_position(&neighbor_id, new_neighbor),
                )
                .await;
            if second.is_err() {
                // The first write landed; put it back so the pair never shares a position.
                if let Err(error) = self
                    .write(
                        "restore position",
                        self.store.update_position(item_id, new_neighbor),
                    )
                    .await
                {
                    tracing::warn!(item_id = %item_id, "Could not undo half a move: {error}");
                }
            }
            second
        }
        .await;

        if let Err(error) = result {
            let mut state = self.state.lock().await;
            state.restore_field(item_id, &old_self);
            state.restore_field(&neighbor_id, &old_neighbor);
            state.sort();
            tracing::warn!(item_id = %item_id, "Rolled back move: {error}");
            return Err(error);
        }
        Ok(true)
    }

    /// Remove an item; it is re-inserted at its old position if the store refuses.
    pub async fn delete_item(&self, item_id: &ItemId) -> Result<()> {
        let removed = {
            let mut state = self.state.lock().await;
            ensure_saved(state.item(item_id)?)?;
            let index = state
                .items
                .iter()
                .position(|item| &item.id == item_id)
                .ok_or_else(|| Error::NotFound(format!("item {item_id}")))?;
            state.items.remove(index)
        };

        match self.write("delete item", self.store.delete_item(item_id)).await {
            Ok(()) => {
                self.state.lock().await.tracker.clear_changes(item_id);
                Ok(())
            }
            Err(error) => {
                let mut state = self.state.lock().await;
                if !state.items.iter().any(|item| &item.id == item_id) {
                    state.items.push(removed);
                    state.sort();
                }
                tracing::warn!(item_id = %item_id, "Rolled back delete: {error}");
                Err(error)
            }
        }
    }

    /// Mark the showing item `shown` and the earliest pending item `showing`.
    ///
    /// Both transitions land locally together. If the first write fails both
    /// are rolled back. If the first write lands and the second fails, the
    /// local view is left as is and the next snapshot settles it.
    pub async fn advance(&self) -> Result<AdvanceOutcome> {
        let (outcome, old_shown, old_showing) = {
            let mut state = self.state.lock().await;
            let current = state.showing().map(|item| item.id.clone());
            let next = state
                .items
                .iter()
                .filter(|item| item.status == ItemStatus::Pending && !item.id.is_temporary())
                .min_by(|a, b| a.display_cmp(b))
                .map(|item| item.id.clone());

            let old_shown = current.as_ref().and_then(|id| {
                state
                    .change_field(id, FieldValue::Status(ItemStatus::Shown))
                    .map(|old| (id.clone(), old))
            });
            let old_showing = next.as_ref().and_then(|id| {
                state
                    .change_field(id, FieldValue::Status(ItemStatus::Showing))
                    .map(|old| (id.clone(), old))
            });
            (
                AdvanceOutcome {
                    shown: current,
                    showing: next,
                },
                old_shown,
                old_showing,
            )
        };

        if outcome.is_noop() {
            return Ok(outcome);
        }

        if let Some((id, old)) = &old_shown {
            if let Err(error) = self
                .write(
                    "update status",
                    self.store.update_status(id, ItemStatus::Shown),
                )
                .await
            {
                let mut state = self.state.lock().await;
                state.restore_field(id, old);
                if let Some((next_id, old)) = &old_showing {
                    state.restore_field(next_id, old);
                }
                tracing::warn!("Rolled back advance: {error}");
                return Err(error);
            }
        }

        if let Some((id, old)) = &old_showing {
            if let Err(error) = self
                .write(
                    "update status",
                    self.store.update_status(id, ItemStatus::Showing),
                )
                .await
            {
                let mut state = self.state.lock().await;
                if old_shown.is_some() {
                    // The first transition already landed; keep the local view
                    // and let the next snapshot settle the failed half.
                    state.tracker.clear_change(id, ChangeField::Status);
                    tracing::warn!(item_id = %id, "Advance partially applied: {error}");
                } else {
                    state.restore_field(id, old);
                    tracing::warn!("Rolled back advance: {error}");
                }
                return Err(error);
            }
        }

        Ok(outcome)
    }

    /// Move a pending item to play right after the showing item.
    ///
    /// Returns `false` when nothing is showing.
    pub async fn show_next(&self, item_id: &ItemId) -> Result<bool> {
        let (old, new_position) = {
            let mut state = self.state.lock().await;
            let item = state.item(item_id)?;
            ensure_saved(item)?;
            if item.status != ItemStatus::Pending {
                return Err(Error::InvalidInput(format!(
                    "only pending items can be shown next, {item_id} is {}",
                    item.status
                )));
            }
            let Some(showing) = state.showing() else {
                return Ok(false);
            };
            let lower = showing.position;
            let others: Vec<QueueItem> = state
                .items
                .iter()
                .filter(|other| &other.id != item_id)
                .cloned()
                .collect();
            let upper = position::first_pending_after(&others, lower).map(|item| item.position);
            let new_position = position::between(lower, upper);

            let old = state
                .change_field(item_id, FieldValue::Position(new_position))
                .ok_or_else(|| Error::NotFound(format!("item {item_id}")))?;
            state.sort();

            if let Some(gap) = position::min_gap(&state.items) {
                if gap < self.config.position_gap_warning {
                    tracing::warn!(
                        party_id = %self.party_id,
                        gap,
                        "Queue positions are nearly exhausted; renormalize the party"
                    );
                }
            }
            (old, new_position)
        };

        if let Err(error) = self
            .write(
                "update position",
                self.store.update_position(item_id, new_position),
            )
            .await
        {
            let mut state = self.state.lock().await;
            state.restore_field(item_id, &old);
            state.sort();
            tracing::warn!(item_id = %item_id, "Rolled back show-next: {error}");
            return Err(error);
        }
        Ok(true)
    }

    /// Replace a note's text. Only the session that added the note may edit it.
    pub async fn edit_note(&self, item_id: &ItemId, content: &str) -> Result<()> {
        let content = content.trim();
        let old = {
            let mut state = self.state.lock().await;
            let item = state.item(item_id)?;
            if !item.content.is_note() {
                return Err(Error::InvalidInput(format!("item {item_id} is not a note")));
            }
            if item.added_by_session_id != self.identity.session_id {
                return Err(Error::OwnershipViolation {
                    item_id: item_id.clone(),
                    session_id: self.identity.session_id.clone(),
                });
            }
            if content.is_empty() {
                return Err(Error::InvalidInput(
                    "Note content cannot be empty".to_string(),
                ));
            }
            ensure_saved(item)?;
            state
                .change_field(
                    item_id,
                    FieldValue::NoteContent(Some(content.to_string())),
                )
                .ok_or_else(|| Error::NotFound(format!("item {item_id}")))?
        };

        if let Err(error) = self
            .write(
                "update note content",
                self.store.update_note_content(item_id, content),
            )
            .await
        {
            self.state.lock().await.restore_field(item_id, &old);
            tracing::warn!(item_id = %item_id, "Rolled back note edit: {error}");
            return Err(error);
        }
        Ok(())
    }

    /// Flip a note's completion flag. Returns the new value.
    pub async fn toggle_complete(&self, item_id: &ItemId) -> Result<bool> {
        let (old, previous, update) = {
            let mut state = self.state.lock().await;
            let item = state.item(item_id)?;
            if !item.content.is_note() {
                return Err(Error::InvalidInput(format!("item {item_id} is not a note")));
            }
            ensure_saved(item)?;
            let previous = CompletionUpdate {
                is_completed: item.is_completed,
                completed_at: item.completed_at,
                completed_by_user_id: item.completed_by_user_id.clone(),
            };
            let update = if item.is_completed {
                CompletionUpdate {
                    is_completed: false,
                    completed_at: None,
                    completed_by_user_id: None,
                }
            } else {
                CompletionUpdate {
                    is_completed: true,
                    completed_at: Some(Utc::now()),
                    completed_by_user_id: Some(
                        self.identity
                            .user_id
                            .clone()
                            .unwrap_or_else(|| self.identity.session_id.to_string()),
                    ),
                }
            };

            let old = state
                .change_field(item_id, FieldValue::IsCompleted(update.is_completed))
                .ok_or_else(|| Error::NotFound(format!("item {item_id}")))?;
            if let Some(item) = state.item_mut(item_id) {
                apply_completion(item, &update);
            }
            (old, previous, update)
        };

        if let Err(error) = self
            .write(
                "update completion",
                self.store.update_completion(item_id, &update),
            )
            .await
        {
            let mut state = self.state.lock().await;
            state.restore_field(item_id, &old);
            if let Some(item) = state.item_mut(item_id) {
                apply_completion(item, &previous);
            }
            tracing::warn!(item_id = %item_id, "Rolled back completion toggle: {error}");
            return Err(error);
        }
        Ok(update.is_completed)
    }

    // ----- helpers -----

    /// Await a store call under the write timeout, mapping failures to `WriteFailed`.
    async fn write<T>(&self, op: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        self.timed(op, call).await.map_err(into_write_error)
    }

    async fn timed<T>(&self, op: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        let timeout = self.config.write_timeout();
        tokio::time::timeout(timeout, call)
            .await
            .unwrap_or_else(|_| {
                Err(Error::WriteFailed {
                    cause: format!("{op} timed out after {}ms", timeout.as_millis()),
                })
            })
    }
}

fn apply_completion(item: &mut QueueItem, completion: &CompletionUpdate) {
    item.is_completed = completion.is_completed;
    item.completed_at = completion.completed_at;
    item.completed_by_user_id
        .clone_from(&completion.completed_by_user_id);
}

fn check_revision(applied: Option<u64>, received: u64) -> Result<()> {
    match applied {
        Some(applied) if received < applied => Err(Error::SnapshotStale { received, applied }),
        _ => Ok(()),
    }
}

fn ensure_saved(item: &QueueItem) -> Result<()> {
    if item.id.is_temporary() {
        return Err(Error::InvalidInput(format!(
            "item {} has not been saved yet",
            item.id
        )));
    }
    Ok(())
}

/// Store rejections keep their type; everything else becomes `WriteFailed`.
fn into_write_error(error: Error) -> Error {
    match error {
        error @ (Error::RateLimitExceeded { .. }
        | Error::QuotaExceeded(_)
        | Error::WriteFailed { .. }) => error,
        other => Error::WriteFailed {
            cause: other.to_string(),
        },
    }
}

fn validate_content(content: &ItemContent) -> Result<()> {
    let url = match content {
        ItemContent::LinkVideo { url, .. }
        | ItemContent::ShortTextPost { url, .. }
        | ItemContent::ForumPost { url, .. }
        | ItemContent::Image { url, .. } => url,
        ItemContent::Note { content } => {
            if content.trim().is_empty() {
                return Err(Error::InvalidInput(
                    "Note content cannot be empty".to_string(),
                ));
            }
            return Ok(());
        }
    };
    let url = url.trim();
    if url.is_empty() {
        return Err(Error::InvalidInput("URL cannot be empty".to_string()));
    }
    if content.is_image() || url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "URL must start with http:// or https://: {url}"
        )))
    }
}
