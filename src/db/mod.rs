//! SQLite storage for the treatment tree and patient progress
//!
//! ## Tables
//!
//! - `users` - Patients and administrators (email is unique, stored lower-cased)
//! - `nodes` - Treatment steps of the decision tree
//! - `node_categories` - Category labels per node
//! - `edges` - Parent → child unlock relations with their rule payload
//! - `symptoms` - Reportable symptom keys
//! - `user_unlocked_nodes` - One record per (user, node) the patient can see

pub mod schema;
pub mod edges;
pub mod nodes;
pub mod symptoms;
pub mod unlocks;
pub mod users;

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info};

use crate::types::TrackerError;

pub use edges::EdgeRow;
pub use nodes::NodeRow;
pub use symptoms::SymptomRow;
pub use unlocks::{RecentUnlock, UnlockWithNode, UnlockedStep};
pub use users::UserRow;

/// SQLite database shared by all services
pub struct TrackerDb {
    conn: Mutex<Connection>,
}

impl TrackerDb {
    /// Open or create the database file
    pub fn open(db_path: &Path) -> Result<Self, TrackerError> {
        info!("Opening SQLite database at {:?}", db_path);

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)
            .map_err(|e| TrackerError::Database(format!("Failed to open SQLite: {}", e)))?;

        // WAL keeps readers unblocked while a propagation batch commits
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| TrackerError::Database(format!("Failed to set PRAGMA: {}", e)))?;

        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, TrackerError> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory().map_err(|e| {
            TrackerError::Database(format!("Failed to open in-memory SQLite: {}", e))
        })?;

        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, TrackerError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| TrackerError::Database(format!("Failed to enable foreign keys: {}", e)))?;

        schema::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run a read operation against the connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, TrackerError>
    where
        F: FnOnce(&Connection) -> Result<T, TrackerError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| TrackerError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Execute a write operation with exclusive access (transactions)
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, TrackerError>
    where
        F: FnOnce(&mut Connection) -> Result<T, TrackerError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| TrackerError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Cheap round trip used by the readiness probe
    pub fn ping(&self) -> Result<(), TrackerError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, TrackerError> {
        self.with_conn(|conn| {
            let count = |table: &str| -> Result<u64, TrackerError> {
                let n: i64 = conn
                    .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
                    .map_err(|e| TrackerError::Database(format!("Query failed: {}", e)))?;
                Ok(n as u64)
            };

            Ok(DbStats {
                user_count: count("users")?,
                node_count: count("nodes")?,
                edge_count: count("edges")?,
                symptom_count: count("symptoms")?,
                unlock_count: count("user_unlocked_nodes")?,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, Serialize)]
pub struct DbStats {
    pub user_count: u64,
    pub node_count: u64,
    pub edge_count: u64,
    pub symptom_count: u64,
    pub unlock_count: u64,
}

/// Format a timestamp the way every table stores it (RFC 3339, UTC, millis).
///
/// The fixed width keeps lexicographic order equal to time order, so range
/// filters compare the strings directly.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current time in storage format
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// True when the insert was rejected by a UNIQUE or PRIMARY KEY constraint
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        }
        _ => false,
    }
}
