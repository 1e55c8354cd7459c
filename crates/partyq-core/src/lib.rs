//! partyq-core - Queue engine for partyq
//!
//! This crate contains the queue models, the optimistic session that applies
//! local edits ahead of the store, the snapshot merge with conflict detection,
//! and a `SQLite` reference store used by the CLI and the tests.

pub mod config;
pub mod conflict;
pub mod db;
pub mod error;
pub mod merge;
pub mod models;
pub mod pending;
pub mod position;
pub mod rate_limit;
pub mod services;
pub mod session;
pub mod store;
pub mod sync;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use models::{
    ConflictInfo, ConflictKind, ItemContent, ItemId, ItemStatus, PartyId, QueueItem, SessionId,
    SessionIdentity,
};
pub use services::SqliteQueueStore;
pub use session::{AdvanceOutcome, QueueEvent, QueueSession};
