//! Unlock records: which nodes each patient can see

use std::collections::HashSet;

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::{is_unique_violation, now_timestamp};
use crate::engine::Attribution;
use crate::types::TrackerError;

/// Key and title of the unlocked node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSummary {
    pub key: String,
    pub title: String,
}

/// Unlock record joined with its node (admin patient view)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockWithNode {
    pub node_id: String,
    pub unlocked_at: String,
    pub unlocked_by: String,
    pub source: Option<String>,
    pub node: NodeSummary,
}

impl UnlockWithNode {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            node_id: row.get("node_id")?,
            unlocked_at: row.get("unlocked_at")?,
            unlocked_by: row.get("unlocked_by")?,
            source: row.get("source")?,
            node: NodeSummary {
                key: row.get("key")?,
                title: row.get("title")?,
            },
        })
    }
}

/// A step on the patient's own path, oldest unlock first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockedStep {
    pub id: String,
    pub key: String,
    pub title: String,
    pub summary: Option<String>,
    pub video_url: Option<String>,
    pub unlocked_at: String,
}

impl UnlockedStep {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            key: row.get("key")?,
            title: row.get("title")?,
            summary: row.get("summary")?,
            video_url: row.get("video_url")?,
            unlocked_at: row.get("unlocked_at")?,
        })
    }
}

/// Recent unlock across all patients (dashboard feed)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentUnlock {
    pub user_id: String,
    pub email: String,
    pub node_id: String,
    pub node_title: String,
    pub unlocked_at: String,
    pub unlocked_by: String,
    pub source: Option<String>,
}

impl RecentUnlock {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            user_id: row.get("user_id")?,
            email: row.get("email")?,
            node_id: row.get("node_id")?,
            node_title: row.get("title")?,
            unlocked_at: row.get("unlocked_at")?,
            unlocked_by: row.get("unlocked_by")?,
            source: row.get("source")?,
        })
    }
}

/// Node ids the user has unlocked
pub fn unlocked_node_ids(conn: &Connection, user_id: &str) -> Result<HashSet<String>, TrackerError> {
    let mut stmt = conn
        .prepare("SELECT node_id FROM user_unlocked_nodes WHERE user_id = ?")
        .map_err(|e| TrackerError::Database(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map(params![user_id], |row| row.get::<_, String>(0))
        .map_err(|e| TrackerError::Database(format!("Query failed: {}", e)))?;

    rows.collect::<Result<HashSet<_>, _>>()
        .map_err(|e| TrackerError::Database(format!("Row parse failed: {}", e)))
}

/// Insert one batch of unlock records in a single transaction.
///
/// A (user, node) pair that already exists is skipped, so concurrent
/// propagation for the same user never fails on a duplicate. Returns the
/// node ids that were actually inserted.
pub fn insert_unlock_batch(
    conn: &mut Connection,
    user_id: &str,
    node_ids: &[String],
    attribution: &Attribution,
) -> Result<Vec<String>, TrackerError> {
    let tx = conn
        .transaction()
        .map_err(|e| TrackerError::Database(format!("Transaction failed: {}", e)))?;

    let unlocked_at = now_timestamp();
    let mut inserted = Vec::with_capacity(node_ids.len());

    for node_id in node_ids {
        let result = tx.execute(
            r#"
            INSERT INTO user_unlocked_nodes (id, user_id, node_id, unlocked_at, unlocked_by, source)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                Uuid::new_v4().to_string(),
                user_id,
                node_id,
                unlocked_at,
                attribution.actor.as_str(),
                attribution.source,
            ],
        );

        match result {
            Ok(_) => inserted.push(node_id.clone()),
            Err(e) if is_unique_violation(&e) => {
                debug!(user_id, node_id = %node_id, "Unlock already recorded, skipping");
            }
            Err(e) => {
                return Err(TrackerError::Database(format!("Unlock insert failed: {}", e)));
            }
        }
    }

    tx.commit()
        .map_err(|e| TrackerError::Database(format!("Commit failed: {}", e)))?;

    Ok(inserted)
}

/// Ids of every node the user has not unlocked yet, in editor order
pub fn locked_node_ids(conn: &Connection, user_id: &str) -> Result<Vec<String>, TrackerError> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT n.id FROM nodes n
            WHERE NOT EXISTS (
                SELECT 1 FROM user_unlocked_nodes u WHERE u.user_id = ? AND u.node_id = n.id
            )
            ORDER BY n.order_index, n.title
            "#,
        )
        .map_err(|e| TrackerError::Database(format!("Prepare failed: {}", e)))?;

    let rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| TrackerError::Database(format!("Row parse failed: {}", e)))
}

/// The user's unlock records with node key and title, newest first
pub fn list_unlocks_with_nodes(conn: &Connection, user_id: &str) -> Result<Vec<UnlockWithNode>, TrackerError> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT u.node_id, u.unlocked_at, u.unlocked_by, u.source, n.key, n.title
            FROM user_unlocked_nodes u
            JOIN nodes n ON n.id = u.node_id
            WHERE u.user_id = ?
            ORDER BY u.unlocked_at DESC, u.rowid DESC
            "#,
        )
        .map_err(|e| TrackerError::Database(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map(params![user_id], |row| UnlockWithNode::from_row(row))
        .map_err(|e| TrackerError::Database(format!("Query failed: {}", e)))?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| TrackerError::Database(format!("Row parse failed: {}", e)))
}

/// The user's unlocked nodes in the order they were unlocked
pub fn unlocked_steps(conn: &Connection, user_id: &str) -> Result<Vec<UnlockedStep>, TrackerError> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT n.id, n.key, n.title, n.summary, n.video_url, u.unlocked_at
            FROM user_unlocked_nodes u
            JOIN nodes n ON n.id = u.node_id
            WHERE u.user_id = ?
            ORDER BY u.unlocked_at ASC, u.rowid ASC
            "#,
        )
        .map_err(|e| TrackerError::Database(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map(params![user_id], |row| UnlockedStep::from_row(row))
        .map_err(|e| TrackerError::Database(format!("Query failed: {}", e)))?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| TrackerError::Database(format!("Row parse failed: {}", e)))
}

/// Delete all of one user's records
pub fn delete_user_unlocks(conn: &Connection, user_id: &str) -> Result<usize, TrackerError> {
    conn.execute("DELETE FROM user_unlocked_nodes WHERE user_id = ?", params![user_id])
        .map_err(|e| TrackerError::Database(format!("Delete failed: {}", e)))
}

/// Delete every unlock record
pub fn delete_all_unlocks(conn: &Connection) -> Result<usize, TrackerError> {
    conn.execute("DELETE FROM user_unlocked_nodes", [])
        .map_err(|e| TrackerError::Database(format!("Delete failed: {}", e)))
}

/// Total number of unlock records
pub fn count_unlocks(conn: &Connection) -> Result<u64, TrackerError> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM user_unlocked_nodes", [], |row| row.get(0))?;
    Ok(n as u64)
}

/// Unlock records created at or after `since` (storage timestamp format)
pub fn count_unlocks_since(conn: &Connection, since: &str) -> Result<u64, TrackerError> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM user_unlocked_nodes WHERE unlocked_at >= ?",
        params![since],
        |row| row.get(0),
    )?;
    Ok(n as u64)
}

/// Distinct users with an unlock at or after `since`
pub fn count_active_users_since(conn: &Connection, since: &str) -> Result<u64, TrackerError> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT user_id) FROM user_unlocked_nodes WHERE unlocked_at >= ?",
        params![since],
        |row| row.get(0),
    )?;
    Ok(n as u64)
}

/// Latest unlocks across all users
pub fn recent_unlocks(conn: &Connection, limit: u32) -> Result<Vec<RecentUnlock>, TrackerError> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT u.user_id, us.email, u.node_id, n.title, u.unlocked_at, u.unlocked_by, u.source
            FROM user_unlocked_nodes u
            JOIN users us ON us.id = u.user_id
            JOIN nodes n ON n.id = u.node_id
            ORDER BY u.unlocked_at DESC, u.rowid DESC
            LIMIT ?
            "#,
        )
        .map_err(|e| TrackerError::Database(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map(params![limit as i64], |row| RecentUnlock::from_row(row))
        .map_err(|e| TrackerError::Database(format!("Query failed: {}", e)))?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| TrackerError::Database(format!("Row parse failed: {}", e)))
}
