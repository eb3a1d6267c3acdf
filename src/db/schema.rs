//! Database schema definitions

use rusqlite::Connection;
use tracing::info;

use crate::types::TrackerError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), TrackerError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        migrate_schema(conn, current_version)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, TrackerError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )
    .map_err(|e| TrackerError::Database(format!("Failed to create schema_version table: {}", e)))?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .unwrap_or(0);

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), TrackerError> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| TrackerError::Database(format!("Failed to clear schema_version: {}", e)))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .map_err(|e| TrackerError::Database(format!("Failed to set schema_version: {}", e)))?;
    Ok(())
}

fn create_tables(conn: &Connection) -> Result<(), TrackerError> {
    conn.execute_batch(USERS_SCHEMA)
        .map_err(|e| TrackerError::Database(format!("Failed to create user tables: {}", e)))?;

    conn.execute_batch(TREE_SCHEMA)
        .map_err(|e| TrackerError::Database(format!("Failed to create tree tables: {}", e)))?;

    conn.execute_batch(PROGRESS_SCHEMA)
        .map_err(|e| TrackerError::Database(format!("Failed to create progress tables: {}", e)))?;

    conn.execute_batch(INDEXES_SCHEMA)
        .map_err(|e| TrackerError::Database(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

fn migrate_schema(conn: &Connection, from_version: i32) -> Result<(), TrackerError> {
    info!("No migration steps registered from v{}", from_version);
    set_schema_version(conn, SCHEMA_VERSION)
}

const USERS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY NOT NULL,
    email TEXT NOT NULL UNIQUE COLLATE NOCASE,
    name TEXT NOT NULL,
    is_admin INTEGER NOT NULL DEFAULT 0,
    -- Only administrators sign in with a password
    password_hash TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS symptoms (
    id TEXT PRIMARY KEY NOT NULL,
    key TEXT NOT NULL UNIQUE,
    label TEXT NOT NULL,
    description TEXT,
    created_at TEXT NOT NULL
);
"#;

const TREE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS nodes (
    id TEXT PRIMARY KEY NOT NULL,
    key TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    summary TEXT,
    video_url TEXT,
    is_root INTEGER NOT NULL DEFAULT 0,
    order_index INTEGER NOT NULL DEFAULT 0,
    -- Editor canvas position
    pos_x REAL,
    pos_y REAL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS node_categories (
    node_id TEXT NOT NULL,
    category TEXT NOT NULL,
    PRIMARY KEY (node_id, category),
    FOREIGN KEY (node_id) REFERENCES nodes(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS edges (
    id TEXT PRIMARY KEY NOT NULL,
    parent_id TEXT NOT NULL,
    child_id TEXT NOT NULL,
    unlock_type TEXT NOT NULL CHECK (unlock_type IN ('always', 'manual', 'symptom_match')),
    -- JSON rule payload, e.g. {"any": ["pain"], "all": []}
    unlock_value TEXT,
    description TEXT,
    weight INTEGER,
    CHECK (parent_id <> child_id),
    FOREIGN KEY (parent_id) REFERENCES nodes(id) ON DELETE CASCADE,
    FOREIGN KEY (child_id) REFERENCES nodes(id) ON DELETE CASCADE
);
"#;

const PROGRESS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS user_unlocked_nodes (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    node_id TEXT NOT NULL,
    unlocked_at TEXT NOT NULL,
    unlocked_by TEXT NOT NULL CHECK (unlocked_by IN ('system', 'user', 'admin')),
    source TEXT,
    UNIQUE (user_id, node_id),
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (node_id) REFERENCES nodes(id) ON DELETE CASCADE
);
"#;

const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_edges_parent ON edges(parent_id);
CREATE INDEX IF NOT EXISTS idx_edges_child ON edges(child_id);
CREATE INDEX IF NOT EXISTS idx_unlocks_user ON user_unlocked_nodes(user_id);
CREATE INDEX IF NOT EXISTS idx_unlocks_time ON user_unlocked_nodes(unlocked_at);
CREATE INDEX IF NOT EXISTS idx_users_created ON users(created_at);
"#;
