//! Outstanding local field mutations awaiting server confirmation.

use std::collections::BTreeMap;

use crate::models::{ChangeField, ItemId, PendingChange};

/// At most one [`PendingChange`] per `(item, field)`; a newer change for the
/// same pair replaces the older one.
///
/// Not synchronized: the owning session serializes access.
#[derive(Debug, Clone, Default)]
pub struct PendingChangeTracker {
    changes: BTreeMap<ItemId, Vec<PendingChange>>,
}

impl PendingChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change, replacing any earlier one for the same field.
    pub fn add_change(&mut self, change: PendingChange) {
        let entry = self.changes.entry(change.item_id.clone()).or_default();
        if let Some(existing) = entry.iter_mut().find(|c| c.field == change.field) {
            *existing = change;
        } else {
            entry.push(change);
        }
    }

    /// Changes for one item, in the order their fields were first touched.
    pub fn get_changes(&self, item_id: &ItemId) -> &[PendingChange] {
        self.changes.get(item_id).map_or(&[], Vec::as_slice)
    }

    pub fn clear_changes(&mut self, item_id: &ItemId) {
        self.changes.remove(item_id);
    }

    /// Drop a single field's change, e.g. after a rolled-back write.
    pub fn clear_change(&mut self, item_id: &ItemId, field: ChangeField) {
        if let Some(entry) = self.changes.get_mut(item_id) {
            entry.retain(|change| change.field != field);
            if entry.is_empty() {
                self.changes.remove(item_id);
            }
        }
    }

    pub fn clear_all(&mut self) {
        self.changes.clear();
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn get_pending_item_ids(&self) -> Vec<ItemId> {
        self.changes.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldValue, ItemStatus};

    fn position_change(id: &str, old: f64, new: f64) -> PendingChange {
        PendingChange::new(
            ItemId::from(id),
            FieldValue::Position(old),
            FieldValue::Position(new),
        )
    }

    #[test]
    fn coalesces_changes_per_field() {
        let mut tracker = PendingChangeTracker::new();
        tracker.add_change(position_change("x", 1.0, 2.0));
        tracker.add_change(position_change("x", 2.0, 3.0));

        let changes = tracker.get_changes(&ItemId::from("x"));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].old_value, FieldValue::Position(2.0));
        assert_eq!(changes[0].new_value, FieldValue::Position(3.0));
    }

    #[test]
    fn keeps_one_change_per_distinct_field() {
        let mut tracker = PendingChangeTracker::new();
        tracker.add_change(position_change("x", 1.0, 2.0));
        tracker.add_change(PendingChange::new(
            ItemId::from("x"),
            FieldValue::Status(ItemStatus::Pending),
            FieldValue::Status(ItemStatus::Showing),
        ));
        assert_eq!(tracker.get_changes(&ItemId::from("x")).len(), 2);

        tracker.clear_change(&ItemId::from("x"), ChangeField::Position);
        let changes = tracker.get_changes(&ItemId::from("x"));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, ChangeField::Status);

        tracker.clear_change(&ItemId::from("x"), ChangeField::Status);
        assert!(!tracker.has_pending_changes());
    }

    #[test]
    fn clear_and_list() {
        let mut tracker = PendingChangeTracker::new();
        assert!(!tracker.has_pending_changes());
        tracker.add_change(position_change("b", 1.0, 2.0));
        tracker.add_change(position_change("a", 2.0, 1.0));
        assert_eq!(
            tracker.get_pending_item_ids(),
            vec![ItemId::from("a"), ItemId::from("b")]
        );

        tracker.clear_changes(&ItemId::from("a"));
        assert_eq!(tracker.get_pending_item_ids(), vec![ItemId::from("b")]);
        assert!(tracker.get_changes(&ItemId::from("a")).is_empty());

        tracker.clear_all();
        assert!(!tracker.has_pending_changes());
    }
}
