//! Conflict detection for a single pending change.
//!
//! The store always wins. Detection only decides whether the user should be
//! told that their edit was overwritten.

use crate::models::{ChangeField, ConflictInfo, ConflictKind, PendingChange, QueueItem};

/// Compare one pending change against the server's copy of the item.
///
/// Returns `None` when the server row has no `updated_at`, when the server's
/// last write is not newer than the local mutation, or when the compared
/// field agrees.
pub fn detect(
    local: &QueueItem,
    server: &QueueItem,
    change: &PendingChange,
) -> Option<ConflictInfo> {
    let server_updated_at = server.updated_at?;
    if server_updated_at <= change.timestamp {
        return None;
    }

    let (kind, description) = match change.field {
        ChangeField::Position => {
            if local.position.total_cmp(&server.position).is_eq() {
                return None;
            }
            (
                ConflictKind::Position,
                "Item was moved by another user.".to_string(),
            )
        }
        ChangeField::Status => {
            if local.status == server.status {
                return None;
            }
            (
                ConflictKind::Status,
                format!("Item status changed to \"{}\" by another user", server.status),
            )
        }
        ChangeField::NoteContent => {
            if local.note_content() == server.note_content() {
                return None;
            }
            (
                ConflictKind::Content,
                "Note was edited by another user.".to_string(),
            )
        }
        ChangeField::IsCompleted => {
            if local.is_completed == server.is_completed {
                return None;
            }
            let state = if server.is_completed {
                "complete"
            } else {
                "incomplete"
            };
            (
                ConflictKind::Content,
                format!("Item was marked {state} by another user"),
            )
        }
    };

    Some(ConflictInfo::new(
        kind,
        server.id.clone(),
        server.title(),
        description,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldValue, ItemContent, ItemId, ItemStatus, PartyId, SessionId};
    use chrono::{DateTime, Duration, Utc};
    use pretty_assertions::assert_eq;

    fn note(id: &str, position: f64) -> QueueItem {
        let mut item = QueueItem::new(
            PartyId::from("party"),
            ItemContent::Note {
                content: "Groceries".to_string(),
            },
            position,
            SessionId::from("s1"),
        );
        item.id = ItemId::from(id);
        item
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn moved_change() -> PendingChange {
        PendingChange::at(
            ItemId::from("x"),
            FieldValue::Position(1.0),
            FieldValue::Position(3.0),
            t0(),
        )
    }

    #[test]
    fn position_conflict_when_server_is_newer() {
        let local = note("x", 1.0);
        let mut server = note("x", 2.0);
        server.updated_at = Some(t0() + Duration::seconds(1));

        let conflict = detect(&local, &server, &moved_change()).unwrap();
        assert_eq!(conflict.kind, ConflictKind::Position);
        assert_eq!(conflict.description, "Item was moved by another user.");
        assert_eq!(conflict.item_title, "Groceries");
    }

    #[test]
    fn no_conflict_when_server_is_older() {
        let local = note("x", 1.0);
        let mut server = note("x", 2.0);
        server.updated_at = Some(t0() - Duration::seconds(1));
        assert_eq!(detect(&local, &server, &moved_change()), None);
    }

    #[test]
    fn no_conflict_at_equal_timestamps() {
        let local = note("x", 1.0);
        let mut server = note("x", 2.0);
        server.updated_at = Some(t0());
        assert_eq!(detect(&local, &server, &moved_change()), None);
    }

    #[test]
    fn no_conflict_without_server_timestamp() {
        let local = note("x", 1.0);
        let server = note("x", 2.0);
        assert_eq!(detect(&local, &server, &moved_change()), None);
    }

    #[test]
    fn no_conflict_when_values_agree() {
        let local = note("x", 3.0);
        let mut server = note("x", 3.0);
        server.updated_at = Some(t0() + Duration::seconds(5));
        assert_eq!(detect(&local, &server, &moved_change()), None);
    }

    #[test]
    fn status_conflict_names_server_status() {
        let mut local = note("x", 1.0);
        local.status = ItemStatus::Showing;
        let mut server = note("x", 1.0);
        server.status = ItemStatus::Shown;
        server.updated_at = Some(t0() + Duration::seconds(1));
        let change = PendingChange::at(
            ItemId::from("x"),
            FieldValue::Status(ItemStatus::Pending),
            FieldValue::Status(ItemStatus::Showing),
            t0(),
        );

        let conflict = detect(&local, &server, &change).unwrap();
        assert_eq!(conflict.kind, ConflictKind::Status);
        assert_eq!(
            conflict.description,
            "Item status changed to \"shown\" by another user"
        );
    }

    #[test]
    fn note_and_completion_conflicts_are_content() {
        let local = note("x", 1.0);
        let mut server = note("x", 1.0);
        server.content = ItemContent::Note {
            content: "Groceries and milk".to_string(),
        };
        server.is_completed = true;
        server.updated_at = Some(t0() + Duration::seconds(1));

        let edit = PendingChange::at(
            ItemId::from("x"),
            FieldValue::NoteContent(Some("Groceries list".to_string())),
            FieldValue::NoteContent(Some("Groceries".to_string())),
            t0(),
        );
        let conflict = detect(&local, &server, &edit).unwrap();
        assert_eq!(conflict.kind, ConflictKind::Content);
        assert_eq!(conflict.description, "Note was edited by another user.");

        let toggle = PendingChange::at(
            ItemId::from("x"),
            FieldValue::IsCompleted(true),
            FieldValue::IsCompleted(false),
            t0(),
        );
        let conflict = detect(&local, &server, &toggle).unwrap();
        assert_eq!(conflict.kind, ConflictKind::Content);
        assert_eq!(
            conflict.description,
            "Item was marked complete by another user"
        );

        let mut local_done = local;
        local_done.is_completed = true;
        server.is_completed = false;
        let conflict = detect(&local_done, &server, &toggle).unwrap();
        assert_eq!(
            conflict.description,
            "Item was marked incomplete by another user"
        );
    }
}
