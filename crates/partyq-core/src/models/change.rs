//! Pending local change model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::ItemId;
use super::item::{ItemContent, ItemStatus, QueueItem};

/// Item field that can be mutated optimistically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeField {
    Position,
    Status,
    NoteContent,
    IsCompleted,
}

impl fmt::Display for ChangeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Position => "position",
            Self::Status => "status",
            Self::NoteContent => "noteContent",
            Self::IsCompleted => "isCompleted",
        })
    }
}

/// Value of one tracked field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum FieldValue {
    Position(f64),
    Status(ItemStatus),
    NoteContent(Option<String>),
    IsCompleted(bool),
}

impl FieldValue {
    pub const fn field(&self) -> ChangeField {
        match self {
            Self::Position(_) => ChangeField::Position,
            Self::Status(_) => ChangeField::Status,
            Self::NoteContent(_) => ChangeField::NoteContent,
            Self::IsCompleted(_) => ChangeField::IsCompleted,
        }
    }

    /// Read `field` off an item.
    pub fn read(item: &QueueItem, field: ChangeField) -> Self {
        match field {
            ChangeField::Position => Self::Position(item.position),
            ChangeField::Status => Self::Status(item.status),
            ChangeField::NoteContent => Self::NoteContent(item.note_content().map(str::to_string)),
            ChangeField::IsCompleted => Self::IsCompleted(item.is_completed),
        }
    }

    /// Write this value back onto an item. Note content is only written to notes.
    pub fn write_to(&self, item: &mut QueueItem) {
        match self {
            Self::Position(position) => item.position = *position,
            Self::Status(status) => item.status = *status,
            Self::NoteContent(content) => {
                if let (ItemContent::Note { content: current }, Some(content)) =
                    (&mut item.content, content)
                {
                    current.clone_from(content);
                }
            }
            Self::IsCompleted(done) => item.is_completed = *done,
        }
    }
}

/// A local mutation the store has not confirmed yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingChange {
    pub item_id: ItemId,
    pub field: ChangeField,
    pub old_value: FieldValue,
    pub new_value: FieldValue,
    /// Client clock at the time of the mutation
    pub timestamp: DateTime<Utc>,
}

impl PendingChange {
    /// Record a change stamped with the current time.
    ///
    /// The field is taken from `new_value`; `old_value` must describe the same field.
    pub fn new(item_id: ItemId, old_value: FieldValue, new_value: FieldValue) -> Self {
        Self::at(item_id, old_value, new_value, Utc::now())
    }

    pub fn at(
        item_id: ItemId,
        old_value: FieldValue,
        new_value: FieldValue,
        timestamp: DateTime<Utc>,
    ) -> Self {
        debug_assert_eq!(old_value.field(), new_value.field());
        Self {
            item_id,
            field: new_value.field(),
            old_value,
            new_value,
            timestamp,
        }
    }

    /// Whether `item` already carries this change's new value.
    pub fn is_reflected_in(&self, item: &QueueItem) -> bool {
        FieldValue::read(item, self.field) == self.new_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PartyId, SessionId};

    #[test]
    fn test_field_taken_from_new_value() {
        let change = PendingChange::new(
            ItemId::from("x"),
            FieldValue::Position(1.0),
            FieldValue::Position(3.0),
        );
        assert_eq!(change.field, ChangeField::Position);
    }

    #[test]
    fn test_is_reflected_in() {
        let mut item = QueueItem::new(
            PartyId::from("p"),
            ItemContent::Note {
                content: "a".to_string(),
            },
            3.0,
            SessionId::from("s"),
        );
        let change = PendingChange::new(
            item.id.clone(),
            FieldValue::NoteContent(Some("old".to_string())),
            FieldValue::NoteContent(Some("a".to_string())),
        );
        assert!(change.is_reflected_in(&item));
        item.content = ItemContent::Note {
            content: "b".to_string(),
        };
        assert!(!change.is_reflected_in(&item));
    }
}
