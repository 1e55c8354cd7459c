//! Database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 3;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;
    if version >= CURRENT_VERSION {
        return Ok(());
    }

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }
    if version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Migration to version 1: parties, members and queue items
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "BEGIN;
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );
        CREATE TABLE IF NOT EXISTS parties (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_by_session_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            revision INTEGER NOT NULL DEFAULT 0
        );
        CREATE TABLE IF NOT EXISTS members (
            party_id TEXT NOT NULL REFERENCES parties(id) ON DELETE CASCADE,
            session_id TEXT NOT NULL,
            display_name TEXT NOT NULL,
            user_id TEXT,
            joined_at INTEGER NOT NULL,
            PRIMARY KEY (party_id, session_id)
        );
        CREATE TABLE IF NOT EXISTS queue_items (
            id TEXT PRIMARY KEY,
            party_id TEXT NOT NULL REFERENCES parties(id) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            payload TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            position REAL NOT NULL,
            added_by_session_id TEXT NOT NULL,
            added_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            is_completed INTEGER NOT NULL DEFAULT 0,
            completed_at INTEGER,
            completed_by_user_id TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_queue_items_party_status ON queue_items(party_id, status);
        CREATE INDEX IF NOT EXISTS idx_queue_items_party_position ON queue_items(party_id, position);
        INSERT INTO schema_version (version) VALUES (1);
        COMMIT;",
    )?;
    Ok(())
}

/// Migration to version 2: at most one showing item per party
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "BEGIN;
        CREATE UNIQUE INDEX IF NOT EXISTS idx_queue_items_one_showing
            ON queue_items(party_id) WHERE status = 'showing';
        INSERT INTO schema_version (version) VALUES (2);
        COMMIT;",
    )?;
    Ok(())
}

/// Migration to version 3: server-side rate limit attempts
fn migrate_v3(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "BEGIN;
        CREATE TABLE IF NOT EXISTS rate_limit_attempts (
            action TEXT NOT NULL,
            identity TEXT NOT NULL,
            at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_rate_limit_attempts_lookup
            ON rate_limit_attempts(action, identity, at);
        INSERT INTO schema_version (version) VALUES (3);
        COMMIT;",
    )?;
    Ok(())
}
