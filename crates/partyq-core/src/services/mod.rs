//! Store implementations backing a session

mod queue_store;

pub use queue_store::SqliteQueueStore;
