//! Error types for partyq-core

use std::time::Duration;

use thiserror::Error;

use crate::models::{ItemId, SessionId};
use crate::rate_limit::ActionClass;

/// Result type alias using partyq-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in partyq-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Too many attempts of one action class inside its window
    #[error("Too many {action} attempts, try again in {}", format_wait(*retry_after))]
    RateLimitExceeded {
        action: ActionClass,
        retry_after: Duration,
    },

    /// Party or queue size cap reached
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Note edit attempted by someone other than the contributor
    #[error("Session {session_id} does not own item {item_id}")]
    OwnershipViolation {
        item_id: ItemId,
        session_id: SessionId,
    },

    /// External write rejected or timed out (local state already rolled back)
    #[error("Write failed: {cause}")]
    WriteFailed { cause: String },

    /// Snapshot older than the last applied one
    #[error("Stale snapshot: revision {received} is older than applied revision {applied}")]
    SnapshotStale { received: u64, applied: u64 },

    /// Item, party or member not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the caller may reasonably retry the same action by hand.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::WriteFailed { .. })
    }
}

/// Human-readable wait time, rounded up to whole seconds or minutes.
pub fn format_wait(wait: Duration) -> String {
    let millis = wait.as_millis();
    let secs = millis.div_ceil(1000).max(1);
    if secs < 60 {
        format!("{secs}s")
    } else {
        let minutes = secs.div_ceil(60);
        if minutes == 1 {
            "1 minute".to_string()
        } else {
            format!("{minutes} minutes")
        }
    }
}
