//! Contracts for the collaborators a session talks to.
//!
//! The engine never assumes a transport: anything that can fetch a snapshot,
//! apply the six writes, answer quota questions and publish change notices
//! can back a [`QueueSession`](crate::session::QueueSession).

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::Result;
use crate::models::{ItemId, ItemStatus, Member, PartyId, QueueItem};

/// Authoritative state of one party at a store revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub party_id: PartyId,
    /// Monotonically increasing per party; used to drop stale snapshots
    pub revision: u64,
    pub items: Vec<QueueItem>,
    pub members: Vec<Member>,
}

/// "Something changed in this party, refetch."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotice {
    pub party_id: PartyId,
    pub revision: u64,
}

/// Caps published by the quota oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimits {
    pub max_queue_items: usize,
    pub max_party_members: usize,
}

/// New completion sub-state for a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionUpdate {
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by_user_id: Option<String>,
}

pub trait SnapshotSource {
    fn fetch_snapshot(&self, party_id: &PartyId) -> impl Future<Output = Result<Snapshot>> + Send;
}

/// Writes against the authoritative store. Each call is the unit of
/// optimistic rollback.
pub trait QueueWriter {
    /// Insert a new item. The store assigns the id and `updated_at`.
    fn insert_item(&self, item: &QueueItem) -> impl Future<Output = Result<QueueItem>> + Send;

    fn update_position(
        &self,
        item_id: &ItemId,
        position: f64,
    ) -> impl Future<Output = Result<()>> + Send;

    fn update_status(
        &self,
        item_id: &ItemId,
        status: ItemStatus,
    ) -> impl Future<Output = Result<()>> + Send;

    fn update_note_content(
        &self,
        item_id: &ItemId,
        content: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    fn update_completion(
        &self,
        item_id: &ItemId,
        completion: &CompletionUpdate,
    ) -> impl Future<Output = Result<()>> + Send;

    fn delete_item(&self, item_id: &ItemId) -> impl Future<Output = Result<()>> + Send;
}

pub trait QuotaOracle {
    /// Items in the party that are not yet `shown`.
    fn live_item_count(&self, party_id: &PartyId) -> impl Future<Output = Result<usize>> + Send;

    fn limits(&self) -> QuotaLimits;
}

pub trait ChangeFeed {
    fn subscribe(&self, party_id: &PartyId) -> broadcast::Receiver<ChangeNotice>;
}

/// Everything a session needs from its backend.
pub trait QueueStore: SnapshotSource + QueueWriter + QuotaOracle + ChangeFeed + Send + Sync {}

impl<T> QueueStore for T where T: SnapshotSource + QueueWriter + QuotaOracle + ChangeFeed + Send + Sync
{}
