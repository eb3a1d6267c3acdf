//! Edge CRUD operations

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::types::TrackerError;

/// Edge row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRow {
    pub id: String,
    pub parent_id: String,
    pub child_id: String,
    pub unlock_type: String,
    /// Raw rule payload; decoded into an `UnlockRule` by the engine
    pub unlock_value: Option<serde_json::Value>,
    pub description: Option<String>,
    pub weight: Option<i64>,
}

impl EdgeRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            parent_id: row.get("parent_id")?,
            child_id: row.get("child_id")?,
            unlock_type: row.get("unlock_type")?,
            unlock_value: row.get("unlock_value")?,
            description: row.get("description")?,
            weight: row.get("weight")?,
        })
    }
}

/// Input for inserting an edge (tree editor save)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeInput {
    #[serde(default)]
    pub id: Option<String>,
    pub parent_id: String,
    pub child_id: String,
    pub unlock_type: String,
    #[serde(default)]
    pub unlock_value: Option<serde_json::Value>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub weight: Option<i64>,
}

/// All edges, heaviest first
pub fn list_edges(conn: &Connection) -> Result<Vec<EdgeRow>, TrackerError> {
    let mut stmt = conn
        .prepare("SELECT * FROM edges ORDER BY COALESCE(weight, 0) DESC, id")
        .map_err(|e| TrackerError::Database(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map([], |row| EdgeRow::from_row(row))
        .map_err(|e| TrackerError::Database(format!("Query failed: {}", e)))?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| TrackerError::Database(format!("Row parse failed: {}", e)))
}

/// Get edge by ID
pub fn get_edge(conn: &Connection, id: &str) -> Result<Option<EdgeRow>, TrackerError> {
    conn.query_row("SELECT * FROM edges WHERE id = ?", params![id], |row| {
        EdgeRow::from_row(row)
    })
    .optional()
    .map_err(|e| TrackerError::Database(format!("Edge lookup failed: {}", e)))
}

/// Insert an edge. Caller supplies the resolved ids.
pub fn insert_edge(
    conn: &Connection,
    id: &str,
    parent_id: &str,
    child_id: &str,
    input: &EdgeInput,
) -> Result<(), TrackerError> {
    conn.execute(
        r#"
        INSERT INTO edges (id, parent_id, child_id, unlock_type, unlock_value, description, weight)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            id,
            parent_id,
            child_id,
            input.unlock_type,
            input.unlock_value,
            input.description,
            input.weight,
        ],
    )
    .map_err(|e| TrackerError::Database(format!("Edge insert failed: {}", e)))?;
    Ok(())
}

/// Set or clear an edge's description. Returns false for an unknown edge.
pub fn update_edge_description(
    conn: &Connection,
    id: &str,
    description: Option<&str>,
) -> Result<bool, TrackerError> {
    let changes = conn
        .execute(
            "UPDATE edges SET description = ? WHERE id = ?",
            params![description, id],
        )
        .map_err(|e| TrackerError::Database(format!("Edge update failed: {}", e)))?;
    Ok(changes > 0)
}
