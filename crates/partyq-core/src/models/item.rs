//! Queue item model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::ids::{ItemId, PartyId, SessionId};
use crate::error::Error;

/// Where an item is in its show lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Waiting in the queue
    #[default]
    Pending,
    /// Currently on screen (at most one per party)
    Showing,
    /// Already shown, hidden from the live queue
    Shown,
}

impl ItemStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Showing => "showing",
            Self::Shown => "shown",
        }
    }

    /// Only `pending -> showing` and `showing -> shown` are legal.
    pub const fn can_become(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Showing) | (Self::Showing, Self::Shown)
        )
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "showing" => Ok(Self::Showing),
            "shown" => Ok(Self::Shown),
            other => Err(Error::InvalidInput(format!("unknown item status '{other}'"))),
        }
    }
}

/// Kind-specific payload of a queue item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ItemContent {
    LinkVideo {
        url: String,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        channel: Option<String>,
        #[serde(default)]
        thumbnail_url: Option<String>,
    },
    ShortTextPost {
        url: String,
        #[serde(default)]
        author: Option<String>,
        #[serde(default)]
        body: Option<String>,
    },
    ForumPost {
        url: String,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        community: Option<String>,
        #[serde(default)]
        body: Option<String>,
    },
    Note {
        content: String,
    },
    Image {
        url: String,
        #[serde(default)]
        caption: Option<String>,
    },
}

impl ItemContent {
    /// Stable kind name, matching the serde tag
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::LinkVideo { .. } => "link-video",
            Self::ShortTextPost { .. } => "short-text-post",
            Self::ForumPost { .. } => "forum-post",
            Self::Note { .. } => "note",
            Self::Image { .. } => "image",
        }
    }

    pub const fn is_note(&self) -> bool {
        matches!(self, Self::Note { .. })
    }

    pub const fn is_image(&self) -> bool {
        matches!(self, Self::Image { .. })
    }

    /// Note body, if this is a note
    pub fn note_content(&self) -> Option<&str> {
        match self {
            Self::Note { content } => Some(content),
            _ => None,
        }
    }
}

/// One entry in a party's shared queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: ItemId,
    pub party_id: PartyId,
    #[serde(flatten)]
    pub content: ItemContent,
    pub status: ItemStatus,
    /// Real-valued sort key; ties broken by id
    pub position: f64,
    pub added_by_session_id: SessionId,
    pub added_at: DateTime<Utc>,
    /// Server-assigned; `None` until the store has written the item
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_by_user_id: Option<String>,
}

impl QueueItem {
    /// Create a pending item that has not reached the store yet.
    pub fn new(
        party_id: PartyId,
        content: ItemContent,
        position: f64,
        added_by: SessionId,
    ) -> Self {
        Self {
            id: ItemId::temporary(),
            party_id,
            content,
            status: ItemStatus::Pending,
            position,
            added_by_session_id: added_by,
            added_at: Utc::now(),
            updated_at: None,
            is_completed: false,
            completed_at: None,
            completed_by_user_id: None,
        }
    }

    /// Display label used in conflict reports and listings
    pub fn title(&self) -> String {
        match &self.content {
            ItemContent::LinkVideo { url, title, .. } => {
                title.clone().unwrap_or_else(|| url.clone())
            }
            ItemContent::ShortTextPost { url, author, .. } => author
                .as_ref()
                .map_or_else(|| url.clone(), |author| format!("Post by @{author}")),
            ItemContent::ForumPost { url, title, .. } => {
                title.clone().unwrap_or_else(|| url.clone())
            }
            ItemContent::Note { content } => {
                let preview = title_preview(content, 50);
                if preview.is_empty() {
                    "Note".to_string()
                } else {
                    preview
                }
            }
            ItemContent::Image { caption, .. } => {
                caption.clone().unwrap_or_else(|| "Image".to_string())
            }
        }
    }

    pub fn note_content(&self) -> Option<&str> {
        self.content.note_content()
    }

    /// Whether this item is part of the live (not yet shown) queue
    pub fn is_live(&self) -> bool {
        self.status != ItemStatus::Shown
    }

    /// Total display order: position, then id.
    pub fn display_cmp(&self, other: &Self) -> Ordering {
        self.position
            .total_cmp(&other.position)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Sort items in display order (position, then id).
pub fn sort_items(items: &mut [QueueItem]) {
    items.sort_by(QueueItem::display_cmp);
}

/// First line of `text`, truncated to `max_len` characters.
fn title_preview(text: &str, max_len: usize) -> String {
    text.lines()
        .next()
        .unwrap_or("")
        .trim()
        .chars()
        .take(max_len)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, position: f64) -> QueueItem {
        let mut item = QueueItem::new(
            PartyId::from("party"),
            ItemContent::Note {
                content: "hello".to_string(),
            },
            position,
            SessionId::from("s1"),
        );
        item.id = ItemId::from(id);
        item
    }

    #[test]
    fn test_status_transitions() {
        assert!(ItemStatus::Pending.can_become(ItemStatus::Showing));
        assert!(ItemStatus::Showing.can_become(ItemStatus::Shown));
        assert!(!ItemStatus::Pending.can_become(ItemStatus::Shown));
        assert!(!ItemStatus::Shown.can_become(ItemStatus::Showing));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("showing".parse::<ItemStatus>().unwrap(), ItemStatus::Showing);
        assert!("paused".parse::<ItemStatus>().is_err());
    }

    #[test]
    fn test_new_item_is_pending_and_temporary() {
        let item = item("x", 0.0);
        assert_eq!(item.status, ItemStatus::Pending);
        assert!(item.updated_at.is_none());
        assert!(QueueItem::new(
            PartyId::from("p"),
            ItemContent::Note {
                content: String::new()
            },
            0.0,
            SessionId::from("s")
        )
        .id
        .is_temporary());
    }

    #[test]
    fn test_sort_breaks_ties_by_id() {
        let mut items = vec![item("b", 1.0), item("a", 1.0), item("c", 0.5)];
        sort_items(&mut items);
        let ids: Vec<_> = items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_titles_per_kind() {
        let mut video = item("v", 0.0);
        video.content = ItemContent::LinkVideo {
            url: "https://video.example/1".to_string(),
            title: None,
            channel: None,
            thumbnail_url: None,
        };
        assert_eq!(video.title(), "https://video.example/1");

        let mut post = item("p", 0.0);
        post.content = ItemContent::ShortTextPost {
            url: "https://posts.example/1".to_string(),
            author: Some("ferris".to_string()),
            body: None,
        };
        assert_eq!(post.title(), "Post by @ferris");

        let mut note = item("n", 0.0);
        note.content = ItemContent::Note {
            content: "First line\nSecond".to_string(),
        };
        assert_eq!(note.title(), "First line");
    }

    #[test]
    fn test_content_serializes_with_type_tag() {
        let item = item("x", 2.0);
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "note");
        assert_eq!(json["content"], "hello");
        let back: QueueItem = serde_json::from_value(json).unwrap();
        assert_eq!(back, item);
    }
}
