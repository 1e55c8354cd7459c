//! Conflict report model

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::ItemId;

/// What kind of divergence was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictKind {
    Position,
    Status,
    Content,
    Deleted,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Position => "position",
            Self::Status => "status",
            Self::Content => "content",
            Self::Deleted => "deleted",
        })
    }
}

/// A user-facing report that another client overwrote a local edit.
///
/// Produced by a merge pass, shown once, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictInfo {
    #[serde(rename = "type")]
    pub kind: ConflictKind,
    pub item_id: ItemId,
    pub item_title: String,
    pub description: String,
}

impl ConflictInfo {
    pub fn new(
        kind: ConflictKind,
        item_id: ItemId,
        item_title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            item_id,
            item_title: item_title.into(),
            description: description.into(),
        }
    }
}

impl fmt::Display for ConflictInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.item_title, self.description)
    }
}
