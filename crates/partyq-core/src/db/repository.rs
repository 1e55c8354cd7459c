//! Party and queue repository implementation

#![allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)] // SQLite integers are i64

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{Error, Result};
use crate::models::{
    ItemContent, ItemId, ItemStatus, Member, Party, PartyId, QueueItem, SessionId,
};
use crate::rate_limit::ActionClass;
use crate::store::CompletionUpdate;

/// Trait for party/queue storage operations
pub trait QueueRepository {
    /// Insert a party row
    fn create_party(&self, party: &Party) -> Result<()>;

    /// Get a party by ID
    fn get_party(&self, id: &PartyId) -> Result<Option<Party>>;

    /// Insert or refresh a member row
    fn upsert_member(&self, member: &Member) -> Result<()>;

    /// Get one member of a party
    fn get_member(&self, party_id: &PartyId, session_id: &SessionId) -> Result<Option<Member>>;

    /// List members in join order
    fn list_members(&self, party_id: &PartyId) -> Result<Vec<Member>>;

    /// Insert a fully formed item (id and `updated_at` already assigned)
    fn insert_item(&self, item: &QueueItem) -> Result<()>;

    /// Get an item by ID
    fn get_item(&self, id: &ItemId) -> Result<Option<QueueItem>>;

    /// List all items of a party in display order
    fn list_items(&self, party_id: &PartyId) -> Result<Vec<QueueItem>>;

    /// Count items that are not `shown`
    fn count_live_items(&self, party_id: &PartyId) -> Result<usize>;

    /// Set an item's position, returning its party
    fn update_position(&self, id: &ItemId, position: f64, now: DateTime<Utc>) -> Result<PartyId>;

    /// Set an item's status, returning its party
    fn update_status(&self, id: &ItemId, status: ItemStatus, now: DateTime<Utc>)
        -> Result<PartyId>;

    /// Replace the payload of a note item, returning its party
    fn update_content(&self, id: &ItemId, content: &ItemContent, now: DateTime<Utc>)
        -> Result<PartyId>;

    /// Set the completion sub-state, returning its party
    fn update_completion(
        &self,
        id: &ItemId,
        completion: &CompletionUpdate,
        now: DateTime<Utc>,
    ) -> Result<PartyId>;

    /// Hard-delete an item, returning its party
    fn delete_item(&self, id: &ItemId) -> Result<PartyId>;

    /// Current revision of a party
    fn revision(&self, party_id: &PartyId) -> Result<u64>;

    /// Increment and return a party's revision
    fn bump_revision(&self, party_id: &PartyId) -> Result<u64>;

    /// Drop attempts of one action class at or before `cutoff`
    fn prune_attempts(&self, action: ActionClass, cutoff: DateTime<Utc>) -> Result<usize>;

    /// Attempts by one identity, oldest first
    fn list_attempts(&self, action: ActionClass, identity: &str) -> Result<Vec<DateTime<Utc>>>;

    /// Record one attempt
    fn record_attempt(&self, action: ActionClass, identity: &str, at: DateTime<Utc>)
        -> Result<()>;
}

/// `SQLite` implementation of `QueueRepository`
pub struct SqliteQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn party_of(&self, id: &ItemId) -> Result<PartyId> {
        self.conn
            .query_row(
                "SELECT party_id FROM queue_items WHERE id = ?",
                params![id.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .map(PartyId::from)
            .ok_or_else(|| Error::NotFound(format!("item {id}")))
    }
}

const ITEM_COLUMNS: &str = "id, party_id, payload, status, position, added_by_session_id, \
     added_at, updated_at, is_completed, completed_at, completed_by_user_id";

impl QueueRepository for SqliteQueueRepository<'_> {
    fn create_party(&self, party: &Party) -> Result<()> {
        self.conn.execute(
            "INSERT INTO parties (id, name, created_by_session_id, created_at) VALUES (?, ?, ?, ?)",
            params![
                party.id.as_str(),
                party.name,
                party.created_by_session_id.as_str(),
                party.created_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    fn get_party(&self, id: &PartyId) -> Result<Option<Party>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, created_by_session_id, created_at FROM parties WHERE id = ?",
                params![id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(id, name, created_by, created_at)| {
            Ok(Party {
                id: PartyId::from(id),
                name,
                created_by_session_id: SessionId::from(created_by),
                created_at: from_millis(created_at)?,
            })
        })
        .transpose()
    }

    fn upsert_member(&self, member: &Member) -> Result<()> {
        self.conn.execute(
            "INSERT INTO members (party_id, session_id, display_name, user_id, joined_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(party_id, session_id)
             DO UPDATE SET display_name = excluded.display_name, user_id = excluded.user_id",
            params![
                member.party_id.as_str(),
                member.session_id.as_str(),
                member.display_name,
                member.user_id,
                member.joined_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    fn get_member(&self, party_id: &PartyId, session_id: &SessionId) -> Result<Option<Member>> {
        let row = self
            .conn
            .query_row(
                "SELECT party_id, session_id, display_name, user_id, joined_at
                 FROM members WHERE party_id = ? AND session_id = ?",
                params![party_id.as_str(), session_id.as_str()],
                MemberRow::from_row,
            )
            .optional()?;
        row.map(MemberRow::into_member).transpose()
    }

    fn list_members(&self, party_id: &PartyId) -> Result<Vec<Member>> {
        let mut stmt = self.conn.prepare(
            "SELECT party_id, session_id, display_name, user_id, joined_at
             FROM members WHERE party_id = ? ORDER BY joined_at, session_id",
        )?;
        let rows = stmt
            .query_map(params![party_id.as_str()], MemberRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(MemberRow::into_member).collect()
    }

    fn insert_item(&self, item: &QueueItem) -> Result<()> {
        let payload = serde_json::to_string(&item.content)?;
        let updated_at = item.updated_at.unwrap_or_else(Utc::now);
        self.conn.execute(
            "INSERT INTO queue_items (id, party_id, kind, payload, status, position,
                 added_by_session_id, added_at, updated_at, is_completed, completed_at,
                 completed_by_user_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                item.id.as_str(),
                item.party_id.as_str(),
                item.content.kind(),
                payload,
                item.status.as_str(),
                item.position,
                item.added_by_session_id.as_str(),
                item.added_at.timestamp_millis(),
                updated_at.timestamp_millis(),
                item.is_completed,
                item.completed_at.map(|at| at.timestamp_millis()),
                item.completed_by_user_id,
            ],
        )?;
        Ok(())
    }

    fn get_item(&self, id: &ItemId) -> Result<Option<QueueItem>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM queue_items WHERE id = ?"),
                params![id.as_str()],
                ItemRow::from_row,
            )
            .optional()?;
        row.map(ItemRow::into_item).transpose()
    }

    fn list_items(&self, party_id: &PartyId) -> Result<Vec<QueueItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM queue_items WHERE party_id = ? ORDER BY position, id"
        ))?;
        let rows = stmt
            .query_map(params![party_id.as_str()], ItemRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(ItemRow::into_item).collect()
    }

    fn count_live_items(&self, party_id: &PartyId) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM queue_items WHERE party_id = ? AND status != 'shown'",
            params![party_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn update_position(&self, id: &ItemId, position: f64, now: DateTime<Utc>) -> Result<PartyId> {
        let party_id = self.party_of(id)?;
        self.conn.execute(
            "UPDATE queue_items SET position = ?, updated_at = ? WHERE id = ?",
            params![position, now.timestamp_millis(), id.as_str()],
        )?;
        Ok(party_id)
    }

    fn update_status(
        &self,
        id: &ItemId,
        status: ItemStatus,
        now: DateTime<Utc>,
    ) -> Result<PartyId> {
        let party_id = self.party_of(id)?;
        self.conn.execute(
            "UPDATE queue_items SET status = ?, updated_at = ? WHERE id = ?",
            params![status.as_str(), now.timestamp_millis(), id.as_str()],
        )?;
        Ok(party_id)
    }

    fn update_content(
        &self,
        id: &ItemId,
        content: &ItemContent,
        now: DateTime<Utc>,
    ) -> Result<PartyId> {
        let party_id = self.party_of(id)?;
        let payload = serde_json::to_string(content)?;
        self.conn.execute(
            "UPDATE queue_items SET kind = ?, payload = ?, updated_at = ? WHERE id = ?",
            params![content.kind(), payload, now.timestamp_millis(), id.as_str()],
        )?;
        Ok(party_id)
    }

    fn update_completion(
        &self,
        id: &ItemId,
        completion: &CompletionUpdate,
        now: DateTime<Utc>,
    ) -> Result<PartyId> {
        let party_id = self.party_of(id)?;
        self.conn.execute(
            "UPDATE queue_items
             SET is_completed = ?, completed_at = ?, completed_by_user_id = ?, updated_at = ?
             WHERE id = ?",
            params![
                completion.is_completed,
                completion.completed_at.map(|at| at.timestamp_millis()),
                completion.completed_by_user_id,
                now.timestamp_millis(),
                id.as_str(),
            ],
        )?;
        Ok(party_id)
    }

    fn delete_item(&self, id: &ItemId) -> Result<PartyId> {
        let party_id = self.party_of(id)?;
        self.conn
            .execute("DELETE FROM queue_items WHERE id = ?", params![id.as_str()])?;
        Ok(party_id)
    }

    fn revision(&self, party_id: &PartyId) -> Result<u64> {
        let revision: Option<i64> = self
            .conn
            .query_row(
                "SELECT revision FROM parties WHERE id = ?",
                params![party_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        revision
            .map(|revision| revision as u64)
            .ok_or_else(|| Error::NotFound(format!("party {party_id}")))
    }

    fn bump_revision(&self, party_id: &PartyId) -> Result<u64> {
        let updated = self.conn.execute(
            "UPDATE parties SET revision = revision + 1 WHERE id = ?",
            params![party_id.as_str()],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("party {party_id}")));
        }
        self.revision(party_id)
    }

    fn prune_attempts(&self, action: ActionClass, cutoff: DateTime<Utc>) -> Result<usize> {
        Ok(self.conn.execute(
            "DELETE FROM rate_limit_attempts WHERE action = ? AND at <= ?",
            params![action.as_str(), cutoff.timestamp_millis()],
        )?)
    }

    fn list_attempts(&self, action: ActionClass, identity: &str) -> Result<Vec<DateTime<Utc>>> {
        let mut stmt = self.conn.prepare(
            "SELECT at FROM rate_limit_attempts WHERE action = ? AND identity = ? ORDER BY at",
        )?;
        let rows = stmt
            .query_map(params![action.as_str(), identity], |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(from_millis).collect()
    }

    fn record_attempt(
        &self,
        action: ActionClass,
        identity: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO rate_limit_attempts (action, identity, at) VALUES (?, ?, ?)",
            params![action.as_str(), identity, at.timestamp_millis()],
        )?;
        Ok(())
    }
}

struct ItemRow {
    id: String,
    party_id: String,
    payload: String,
    status: String,
    position: f64,
    added_by_session_id: String,
    added_at: i64,
    updated_at: i64,
    is_completed: bool,
    completed_at: Option<i64>,
    completed_by_user_id: Option<String>,
}

impl ItemRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            party_id: row.get(1)?,
            payload: row.get(2)?,
            status: row.get(3)?,
            position: row.get(4)?,
            added_by_session_id: row.get(5)?,
            added_at: row.get(6)?,
            updated_at: row.get(7)?,
            is_completed: row.get(8)?,
            completed_at: row.get(9)?,
            completed_by_user_id: row.get(10)?,
        })
    }

    fn into_item(self) -> Result<QueueItem> {
        Ok(QueueItem {
            id: ItemId::from(self.id),
            party_id: PartyId::from(self.party_id),
            content: serde_json::from_str(&self.payload)?,
            status: self.status.parse()?,
            position: self.position,
            added_by_session_id: SessionId::from(self.added_by_session_id),
            added_at: from_millis(self.added_at)?,
            updated_at: Some(from_millis(self.updated_at)?),
            is_completed: self.is_completed,
            completed_at: self.completed_at.map(from_millis).transpose()?,
            completed_by_user_id: self.completed_by_user_id,
        })
    }
}

struct MemberRow {
    party_id: String,
    session_id: String,
    display_name: String,
    user_id: Option<String>,
    joined_at: i64,
}

impl MemberRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            party_id: row.get(0)?,
            session_id: row.get(1)?,
            display_name: row.get(2)?,
            user_id: row.get(3)?,
            joined_at: row.get(4)?,
        })
    }

    fn into_member(self) -> Result<Member> {
        Ok(Member {
            party_id: PartyId::from(self.party_id),
            session_id: SessionId::from(self.session_id),
            display_name: self.display_name,
            user_id: self.user_id,
            joined_at: from_millis(self.joined_at)?,
        })
    }
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| Error::Database(format!("timestamp out of range: {millis}")))
}
