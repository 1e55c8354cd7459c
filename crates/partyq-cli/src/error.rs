use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] partyq_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No note content provided")]
    EmptyContent,
    #[error("Item ID cannot be empty")]
    EmptyItemId,
    #[error("Item not found for id/prefix: {0}")]
    ItemNotFound(String),
    #[error("{0}")]
    AmbiguousItemId(String),
    #[error("Party not found: {0}")]
    PartyNotFound(String),
    #[error("Configuration error: {0}")]
    Config(String),
}
