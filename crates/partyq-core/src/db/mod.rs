//! Database layer for the reference queue store

mod connection;
mod migrations;
mod repository;

pub use connection::Database;
pub use repository::{QueueRepository, SqliteQueueRepository};
