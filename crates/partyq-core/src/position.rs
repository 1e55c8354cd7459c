//! Ordering keys for queue items.
//!
//! Positions are real numbers. Appends and swaps keep them at integer
//! granularity; show-next inserts at `showing + 0.5`, so repeated promotions
//! can shrink gaps until float precision runs out. [`min_gap`] detects that
//! and [`renormalize`] is the maintenance pass that restores integer spacing.
//! Nothing calls [`renormalize`] implicitly.

use crate::models::{ItemId, ItemStatus, QueueItem};

/// Which way to move an item within the pending subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Position for an item appended to the end of the queue.
pub fn next_position(items: &[QueueItem]) -> f64 {
    items
        .iter()
        .map(|item| item.position)
        .max_by(f64::total_cmp)
        .map_or(0.0, |max| max + 1.0)
}

/// Exchange two positions.
pub const fn swap(a: f64, b: f64) -> (f64, f64) {
    (b, a)
}

/// Position that slots an item directly after the showing item.
///
/// `upper` is the position of the first pending item after `lower`, if any;
/// the result is strictly between the two as long as they are at least 0.5
/// apart. When the gap is narrower the midpoint is used instead.
pub fn between(lower: f64, upper: Option<f64>) -> f64 {
    let candidate = lower + 0.5;
    match upper {
        Some(upper) if candidate >= upper => lower + (upper - lower) / 2.0,
        _ => candidate,
    }
}

/// Nearest `pending` neighbour of `item_id` in `direction`, skipping
/// `showing` and `shown` items. `None` when the item is first/last or is not
/// pending itself.
pub fn pending_neighbor<'a>(
    items: &'a [QueueItem],
    item_id: &ItemId,
    direction: Direction,
) -> Option<&'a QueueItem> {
    let mut pending: Vec<&QueueItem> = items
        .iter()
        .filter(|item| item.status == ItemStatus::Pending)
        .collect();
    pending.sort_by(|a, b| a.display_cmp(b));

    let index = pending.iter().position(|item| &item.id == item_id)?;
    match direction {
        Direction::Up => index.checked_sub(1).map(|i| pending[i]),
        Direction::Down => pending.get(index + 1).copied(),
    }
}

/// First pending item strictly after `position` in display order.
pub fn first_pending_after(items: &[QueueItem], position: f64) -> Option<&QueueItem> {
    items
        .iter()
        .filter(|item| item.status == ItemStatus::Pending && item.position > position)
        .min_by(|a, b| a.display_cmp(b))
}

/// Smallest distance between adjacent live positions, if there are at least two.
pub fn min_gap(items: &[QueueItem]) -> Option<f64> {
    let mut positions: Vec<f64> = items
        .iter()
        .filter(|item| item.is_live())
        .map(|item| item.position)
        .collect();
    positions.sort_by(f64::total_cmp);
    positions
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .min_by(f64::total_cmp)
}

/// Integer positions `0, 1, 2, ...` in current display order.
///
/// Returns only the `(id, new_position)` pairs that actually change.
pub fn renormalize(items: &[QueueItem]) -> Vec<(ItemId, f64)> {
    let mut ordered: Vec<&QueueItem> = items.iter().collect();
    ordered.sort_by(|a, b| a.display_cmp(b));
    ordered
        .into_iter()
        .zip(0u32..)
        .filter_map(|(item, index)| {
            let position = f64::from(index);
            #[allow(clippy::float_cmp)]
            let unchanged = item.position == position;
            (!unchanged).then(|| (item.id.clone(), position))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemContent, PartyId, SessionId};

    fn item(id: &str, position: f64, status: ItemStatus) -> QueueItem {
        let mut item = QueueItem::new(
            PartyId::from("party"),
            ItemContent::Note {
                content: id.to_string(),
            },
            position,
            SessionId::from("s1"),
        );
        item.id = ItemId::from(id);
        item.status = status;
        item
    }

    #[test]
    fn next_position_appends() {
        assert!((next_position(&[]) - 0.0).abs() < f64::EPSILON);
        let items = vec![
            item("a", 0.0, ItemStatus::Shown),
            item("b", 4.0, ItemStatus::Pending),
            item("c", 2.5, ItemStatus::Pending),
        ];
        assert!((next_position(&items) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn between_sits_after_showing_item() {
        assert!((between(2.0, Some(3.0)) - 2.5).abs() < f64::EPSILON);
        assert!((between(2.0, None) - 2.5).abs() < f64::EPSILON);
        let narrow = between(2.0, Some(2.25));
        assert!(narrow > 2.0 && narrow < 2.25);
    }

    #[test]
    fn neighbor_skips_non_pending_items() {
        let items = vec![
            item("a", 0.0, ItemStatus::Pending),
            item("b", 1.0, ItemStatus::Showing),
            item("c", 2.0, ItemStatus::Pending),
            item("d", 3.0, ItemStatus::Pending),
        ];
        let up = pending_neighbor(&items, &ItemId::from("c"), Direction::Up).unwrap();
        assert_eq!(up.id.as_str(), "a");
        let down = pending_neighbor(&items, &ItemId::from("c"), Direction::Down).unwrap();
        assert_eq!(down.id.as_str(), "d");
    }

    #[test]
    fn neighbor_at_edges_is_none() {
        let items = vec![
            item("a", 0.0, ItemStatus::Pending),
            item("b", 1.0, ItemStatus::Pending),
        ];
        assert!(pending_neighbor(&items, &ItemId::from("a"), Direction::Up).is_none());
        assert!(pending_neighbor(&items, &ItemId::from("b"), Direction::Down).is_none());
        assert!(pending_neighbor(&items, &ItemId::from("zz"), Direction::Down).is_none());
    }

    #[test]
    fn min_gap_and_renormalize() {
        let items = vec![
            item("a", 2.0, ItemStatus::Showing),
            item("b", 2.5, ItemStatus::Pending),
            item("c", 2.75, ItemStatus::Pending),
            item("d", 3.0, ItemStatus::Pending),
        ];
        assert!((min_gap(&items).unwrap() - 0.25).abs() < f64::EPSILON);

        let updates = renormalize(&items);
        let expected: Vec<(ItemId, f64)> = vec![
            (ItemId::from("a"), 0.0),
            (ItemId::from("b"), 1.0),
            (ItemId::from("c"), 2.0),
        ];
        assert_eq!(updates, expected);
    }
}
