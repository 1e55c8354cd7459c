//! Party membership model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{PartyId, SessionId};

/// A party as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub id: PartyId,
    pub name: String,
    pub created_by_session_id: SessionId,
    pub created_at: DateTime<Utc>,
}

/// A session that joined a party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub party_id: PartyId,
    pub session_id: SessionId,
    pub display_name: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub joined_at: DateTime<Utc>,
}
