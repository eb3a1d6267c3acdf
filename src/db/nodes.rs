//! Node and category CRUD operations

use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::now_timestamp;
use crate::types::TrackerError;

/// Node row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRow {
    pub id: String,
    pub key: String,
    pub title: String,
    pub summary: Option<String>,
    pub video_url: Option<String>,
    pub is_root: bool,
    pub order_index: i64,
    pub pos_x: Option<f64>,
    pub pos_y: Option<f64>,
    /// Explicit category labels (may be empty)
    #[serde(default)]
    pub categories: Vec<String>,
}

impl NodeRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            key: row.get("key")?,
            title: row.get("title")?,
            summary: row.get("summary")?,
            video_url: row.get("video_url")?,
            is_root: row.get("is_root")?,
            order_index: row.get("order_index")?,
            pos_x: row.get("pos_x")?,
            pos_y: row.get("pos_y")?,
            categories: vec![],
        })
    }
}

/// Input for inserting a node (tree editor save)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInput {
    #[serde(default)]
    pub id: Option<String>,
    pub key: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub is_root: bool,
    #[serde(default)]
    pub order_index: i64,
    #[serde(default)]
    pub pos_x: Option<f64>,
    #[serde(default)]
    pub pos_y: Option<f64>,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// All nodes with their category labels, in editor order
pub fn list_nodes(conn: &Connection) -> Result<Vec<NodeRow>, TrackerError> {
    let mut stmt = conn
        .prepare("SELECT * FROM nodes ORDER BY order_index, title")
        .map_err(|e| TrackerError::Database(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map([], |row| NodeRow::from_row(row))
        .map_err(|e| TrackerError::Database(format!("Query failed: {}", e)))?;

    let mut categories = list_categories(conn)?;
    let mut nodes = vec![];
    for row_result in rows {
        let mut node =
            row_result.map_err(|e| TrackerError::Database(format!("Row parse failed: {}", e)))?;
        node.categories = categories.remove(&node.id).unwrap_or_default();
        nodes.push(node);
    }

    Ok(nodes)
}

/// Get node by ID
pub fn get_node(conn: &Connection, id: &str) -> Result<Option<NodeRow>, TrackerError> {
    let node = conn
        .query_row("SELECT * FROM nodes WHERE id = ?", params![id], |row| {
            NodeRow::from_row(row)
        })
        .optional()
        .map_err(|e| TrackerError::Database(format!("Node lookup failed: {}", e)))?;

    match node {
        Some(mut node) => {
            node.categories = get_node_categories(conn, &node.id)?;
            Ok(Some(node))
        }
        None => Ok(None),
    }
}

/// Get node by its stable key
pub fn get_node_by_key(conn: &Connection, key: &str) -> Result<Option<NodeRow>, TrackerError> {
    let id: Option<String> = conn
        .query_row("SELECT id FROM nodes WHERE key = ?", params![key], |row| row.get(0))
        .optional()?;

    match id {
        Some(id) => get_node(conn, &id),
        None => Ok(None),
    }
}

/// Category labels keyed by node id
pub fn list_categories(conn: &Connection) -> Result<HashMap<String, Vec<String>>, TrackerError> {
    let mut stmt = conn
        .prepare("SELECT node_id, category FROM node_categories ORDER BY node_id, category")
        .map_err(|e| TrackerError::Database(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .map_err(|e| TrackerError::Database(format!("Query failed: {}", e)))?;

    let mut by_node: HashMap<String, Vec<String>> = HashMap::new();
    for row in rows {
        let (node_id, category) = row?;
        by_node.entry(node_id).or_default().push(category);
    }
    Ok(by_node)
}

fn get_node_categories(conn: &Connection, node_id: &str) -> Result<Vec<String>, TrackerError> {
    let mut stmt = conn
        .prepare("SELECT category FROM node_categories WHERE node_id = ? ORDER BY category")
        .map_err(|e| TrackerError::Database(format!("Prepare failed: {}", e)))?;

    let rows = stmt.query_map(params![node_id], |row| row.get(0))?;
    rows.collect::<Result<Vec<String>, _>>()
        .map_err(|e| TrackerError::Database(format!("Row parse failed: {}", e)))
}

/// Insert a node with its categories. Caller supplies the id.
pub fn insert_node(conn: &Connection, id: &str, input: &NodeInput) -> Result<(), TrackerError> {
    conn.execute(
        r#"
        INSERT INTO nodes (
            id, key, title, summary, video_url, is_root, order_index, pos_x, pos_y, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            id,
            input.key,
            input.title,
            input.summary,
            input.video_url,
            input.is_root,
            input.order_index,
            input.pos_x,
            input.pos_y,
            now_timestamp(),
        ],
    )
    .map_err(|e| TrackerError::Database(format!("Node insert failed ({}): {}", input.key, e)))?;

    for category in &input.categories {
        conn.execute(
            "INSERT OR IGNORE INTO node_categories (node_id, category) VALUES (?, ?)",
            params![id, category],
        )
        .map_err(|e| TrackerError::Database(format!("Category insert failed: {}", e)))?;
    }

    Ok(())
}

/// Delete every node; categories, edges and unlock records cascade
pub fn delete_all_nodes(conn: &Connection) -> Result<usize, TrackerError> {
    conn.execute("DELETE FROM nodes", [])
        .map_err(|e| TrackerError::Database(format!("Delete failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TrackerDb;

    fn node_input(key: &str, title: &str) -> NodeInput {
        NodeInput {
            id: None,
            key: key.to_string(),
            title: title.to_string(),
            summary: None,
            video_url: None,
            is_root: key == "root",
            order_index: 0,
            pos_x: None,
            pos_y: None,
            categories: vec![],
        }
    }

    #[test]
    fn test_insert_and_get_with_categories() {
        let db = TrackerDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let mut input = node_input("calendula", "Apply calendula");
            input.categories = vec!["skincare".into(), "pain".into()];
            insert_node(conn, "n1", &input)?;

            let node = get_node(conn, "n1")?.unwrap();
            assert_eq!(node.key, "calendula");
            assert_eq!(node.categories, vec!["pain".to_string(), "skincare".to_string()]);

            let by_key = get_node_by_key(conn, "calendula")?.unwrap();
            assert_eq!(by_key.id, "n1");
            assert!(get_node_by_key(conn, "missing")?.is_none());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_list_nodes_attaches_categories() {
        let db = TrackerDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            insert_node(conn, "root", &node_input("root", "Start"))?;
            let mut skin = node_input("skin_care", "Skin");
            skin.categories = vec!["skincare".into()];
            insert_node(conn, "skin", &skin)?;

            let nodes = list_nodes(conn)?;
            assert_eq!(nodes.len(), 2);
            let skin = nodes.iter().find(|n| n.id == "skin").unwrap();
            assert_eq!(skin.categories, vec!["skincare".to_string()]);
            let root = nodes.iter().find(|n| n.id == "root").unwrap();
            assert!(root.is_root);
            assert!(root.categories.is_empty());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let db = TrackerDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            insert_node(conn, "a", &node_input("root", "Start"))?;
            assert!(insert_node(conn, "b", &node_input("root", "Again")).is_err());
            assert_eq!(delete_all_nodes(conn)?, 1);
            Ok(())
        })
        .unwrap();
    }
}
