//! Identifier newtypes

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

const TEMP_PREFIX: &str = "temp-";

/// Identifier of a queue item.
///
/// Server-assigned ids are UUID v7 strings. Items created locally carry a
/// `temp-` id until the store returns the real one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Create a new server-style item ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Create a placeholder ID for an item that has not round-tripped yet
    #[must_use]
    pub fn temporary() -> Self {
        Self(format!("{TEMP_PREFIX}{}", Uuid::now_v7()))
    }

    /// Whether this ID was minted locally and not yet confirmed by the store
    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMP_PREFIX)
    }

    /// Get the string representation of this ID
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifier of a party (one shared queue).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(String);

impl PartyId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PartyId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifier of a contributor's session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! string_id_conversions {
    ($($ty:ty),+) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }

            impl From<&str> for $ty {
                fn from(value: &str) -> Self {
                    Self(value.to_string())
                }
            }

            impl From<String> for $ty {
                fn from(value: String) -> Self {
                    Self(value)
                }
            }
        )+
    };
}

string_id_conversions!(ItemId, PartyId, SessionId);

/// Who is acting: the session id plus an optional authenticated user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub session_id: SessionId,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl SessionIdentity {
    pub fn new(session_id: impl Into<SessionId>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: None,
        }
    }

    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Key used for per-identity rate limiting.
    pub fn rate_limit_key(&self) -> &str {
        self.user_id
            .as_deref()
            .unwrap_or_else(|| self.session_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_id_unique() {
        let id1 = ItemId::new();
        let id2 = ItemId::new();
        assert_ne!(id1, id2);
        assert!(!id1.is_temporary());
    }

    #[test]
    fn test_temporary_item_id() {
        let id = ItemId::temporary();
        assert!(id.is_temporary());
        assert!(id.as_str().starts_with("temp-"));
    }

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let id = ItemId::from("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
        let party: PartyId = serde_json::from_str("\"p1\"").unwrap();
        assert_eq!(party.as_str(), "p1");
    }

    #[test]
    fn test_rate_limit_key_prefers_user_id() {
        let anonymous = SessionIdentity::new("s1");
        assert_eq!(anonymous.rate_limit_key(), "s1");
        let signed_in = SessionIdentity::new("s1").with_user_id("u1");
        assert_eq!(signed_in.rate_limit_key(), "u1");
    }
}
