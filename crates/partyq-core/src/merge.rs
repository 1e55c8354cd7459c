//! Server-authoritative snapshot merge.
//!
//! The merged queue is always the server snapshot verbatim. Pending changes
//! only decide which conflicts get reported:
//!
//! 1. Local items missing from the snapshot that still have pending changes
//!    become `deleted` conflicts. Items with temporary ids are skipped.
//! 2. For items present on both sides, changes the snapshot already reflects
//!    are dropped as confirmed.
//! 3. The remaining changes run through [`conflict::detect`]. Any hit clears
//!    all of that item's pending changes.

use std::collections::HashMap;

use crate::conflict;
use crate::models::{ConflictInfo, ConflictKind, ItemId, QueueItem};
use crate::pending::PendingChangeTracker;

/// Result of one merge pass.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// Exactly the server snapshot
    pub merged: Vec<QueueItem>,
    /// Deletions first, then field conflicts, in detection order
    pub conflicts: Vec<ConflictInfo>,
    /// Pending changes the snapshot confirmed
    pub confirmed: usize,
}

/// Reconcile `local` against `server`, updating `tracker` in place.
pub fn merge_snapshot(
    tracker: &mut PendingChangeTracker,
    local: &[QueueItem],
    server: Vec<QueueItem>,
) -> MergeOutcome {
    let server_by_id: HashMap<&ItemId, &QueueItem> =
        server.iter().map(|item| (&item.id, item)).collect();
    let local_by_id: HashMap<&ItemId, &QueueItem> =
        local.iter().map(|item| (&item.id, item)).collect();

    let mut conflicts = Vec::new();

    for item in local {
        if item.id.is_temporary() || server_by_id.contains_key(&item.id) {
            continue;
        }
        if tracker.get_changes(&item.id).is_empty() {
            continue;
        }
        tracing::debug!(item_id = %item.id, "Pending item deleted on server");
        conflicts.push(ConflictInfo::new(
            ConflictKind::Deleted,
            item.id.clone(),
            item.title(),
            "Item was deleted by another user",
        ));
        tracker.clear_changes(&item.id);
    }

    let mut confirmed = 0;
    for item_id in tracker.get_pending_item_ids() {
        let (Some(local_item), Some(server_item)) =
            (local_by_id.get(&item_id), server_by_id.get(&item_id))
        else {
            continue;
        };

        let reflected: Vec<_> = tracker
            .get_changes(&item_id)
            .iter()
            .filter(|change| change.is_reflected_in(server_item))
            .map(|change| change.field)
            .collect();
        confirmed += reflected.len();
        for field in reflected {
            tracker.clear_change(&item_id, field);
        }

        let found: Vec<ConflictInfo> = tracker
            .get_changes(&item_id)
            .iter()
            .filter_map(|change| conflict::detect(local_item, server_item, change))
            .collect();
        if !found.is_empty() {
            tracing::debug!(
                item_id = %item_id,
                count = found.len(),
                "Server overwrote pending changes"
            );
            conflicts.extend(found);
            tracker.clear_changes(&item_id);
        }
    }

    MergeOutcome {
        merged: server,
        conflicts,
        confirmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ChangeField, FieldValue, ItemContent, ItemStatus, PartyId, PendingChange, SessionId,
    };
    use chrono::{DateTime, Duration, Utc};
    use pretty_assertions::assert_eq;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn item(id: &str, position: f64) -> QueueItem {
        let mut item = QueueItem::new(
            PartyId::from("party"),
            ItemContent::LinkVideo {
                url: format!("https://video.example/{id}"),
                title: Some(format!("Video {id}")),
                channel: None,
                thumbnail_url: None,
            },
            position,
            SessionId::from("s1"),
        );
        item.id = ItemId::from(id);
        item.updated_at = Some(t0() - Duration::minutes(1));
        item
    }

    fn moved(id: &str, old: f64, new: f64) -> PendingChange {
        PendingChange::at(
            ItemId::from(id),
            FieldValue::Position(old),
            FieldValue::Position(new),
            t0(),
        )
    }

    #[test]
    fn reports_deleted_item_with_pending_change() {
        let local = vec![item("x", 0.0), item("y", 1.0)];
        let server = vec![item("x", 0.0)];
        let mut tracker = PendingChangeTracker::new();
        tracker.add_change(moved("y", 0.0, 1.0));

        let outcome = merge_snapshot(&mut tracker, &local, server.clone());
        assert_eq!(outcome.merged, server);
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].kind, ConflictKind::Deleted);
        assert_eq!(outcome.conflicts[0].item_id, ItemId::from("y"));
        assert_eq!(
            outcome.conflicts[0].description,
            "Item was deleted by another user"
        );
        assert!(!tracker.has_pending_changes());
    }

    #[test]
    fn temporary_items_are_not_deletions() {
        let mut pending_add = item("x", 0.0);
        pending_add.id = ItemId::temporary();
        let local = vec![pending_add.clone()];
        let mut tracker = PendingChangeTracker::new();
        tracker.add_change(moved(pending_add.id.as_str(), 0.0, 1.0));

        let outcome = merge_snapshot(&mut tracker, &local, Vec::new());
        assert!(outcome.conflicts.is_empty());
        assert!(outcome.merged.is_empty());
    }

    #[test]
    fn unpending_items_never_conflict() {
        let local = vec![item("x", 0.0), item("y", 1.0)];
        let mut changed = item("x", 7.0);
        changed.status = ItemStatus::Shown;
        changed.updated_at = Some(t0() + Duration::hours(1));
        let server = vec![changed];
        let mut tracker = PendingChangeTracker::new();

        let outcome = merge_snapshot(&mut tracker, &local, server.clone());
        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.merged, server);
    }

    #[test]
    fn one_conflict_clears_all_changes_for_item() {
        let mut local_x = item("x", 3.0);
        local_x.status = ItemStatus::Showing;
        let mut server_x = item("x", 2.0);
        server_x.status = ItemStatus::Showing;
        server_x.updated_at = Some(t0() + Duration::seconds(1));

        let mut tracker = PendingChangeTracker::new();
        tracker.add_change(moved("x", 1.0, 3.0));
        tracker.add_change(PendingChange::at(
            ItemId::from("x"),
            FieldValue::Status(ItemStatus::Pending),
            FieldValue::Status(ItemStatus::Showing),
            t0(),
        ));

        let outcome = merge_snapshot(&mut tracker, &[local_x], vec![server_x]);
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].kind, ConflictKind::Position);
        assert!(!tracker.has_pending_changes());
    }

    #[test]
    fn deletions_come_before_field_conflicts() {
        let local = vec![item("a", 5.0), item("b", 1.0)];
        let mut server_a = item("a", 9.0);
        server_a.updated_at = Some(t0() + Duration::seconds(1));

        let mut tracker = PendingChangeTracker::new();
        tracker.add_change(moved("a", 4.0, 5.0));
        tracker.add_change(moved("b", 0.0, 1.0));

        let outcome = merge_snapshot(&mut tracker, &local, vec![server_a]);
        let kinds: Vec<_> = outcome.conflicts.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![ConflictKind::Deleted, ConflictKind::Position]);
    }

    #[test]
    fn confirmed_changes_are_cleared() {
        let local = vec![item("x", 3.0)];
        let mut server_x = item("x", 3.0);
        server_x.updated_at = Some(t0() + Duration::seconds(1));

        let mut tracker = PendingChangeTracker::new();
        tracker.add_change(moved("x", 1.0, 3.0));

        let outcome = merge_snapshot(&mut tracker, &local, vec![server_x]);
        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.confirmed, 1);
        assert!(!tracker.has_pending_changes());
    }

    #[test]
    fn unconfirmed_changes_survive_older_snapshot() {
        let local = vec![item("x", 3.0)];
        let server = vec![item("x", 1.0)];
        let mut tracker = PendingChangeTracker::new();
        tracker.add_change(moved("x", 1.0, 3.0));

        let outcome = merge_snapshot(&mut tracker, &local, server);
        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.confirmed, 0);
        assert_eq!(tracker.get_changes(&ItemId::from("x"))[0].field, ChangeField::Position);
    }

    #[test]
    fn merge_is_idempotent() {
        let local = vec![item("x", 1.0), item("y", 2.0)];
        let mut server_x = item("x", 2.0);
        server_x.updated_at = Some(t0() + Duration::seconds(1));
        let server = vec![server_x];

        let mut tracker = PendingChangeTracker::new();
        tracker.add_change(moved("x", 1.0, 3.0));
        tracker.add_change(moved("y", 1.0, 2.0));

        let first = merge_snapshot(&mut tracker, &local, server.clone());
        assert_eq!(first.merged, server);
        assert_eq!(first.conflicts.len(), 2);

        let second = merge_snapshot(&mut tracker, &first.merged, server.clone());
        assert_eq!(second.merged, server);
        assert!(second.conflicts.is_empty());
    }
}
