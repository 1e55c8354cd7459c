//! Data models for partyq

mod change;
mod conflict;
mod ids;
mod item;
mod member;

pub use change::{ChangeField, FieldValue, PendingChange};
pub use conflict::{ConflictInfo, ConflictKind};
pub use ids::{ItemId, PartyId, SessionId, SessionIdentity};
pub use item::{sort_items, ItemContent, ItemStatus, QueueItem};
pub use member::{Member, Party};
