//! Symptom catalogue

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{is_unique_violation, now_timestamp};
use crate::types::TrackerError;

/// Symptom row from database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymptomRow {
    pub id: String,
    pub key: String,
    pub label: String,
    pub description: Option<String>,
}

impl SymptomRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            key: row.get("key")?,
            label: row.get("label")?,
            description: row.get("description")?,
        })
    }
}

/// Input for creating a symptom
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSymptomInput {
    pub key: String,
    pub label: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// All symptoms ordered by label
pub fn list_symptoms(conn: &Connection) -> Result<Vec<SymptomRow>, TrackerError> {
    let mut stmt = conn
        .prepare("SELECT id, key, label, description FROM symptoms ORDER BY label, key")
        .map_err(|e| TrackerError::Database(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map([], |row| SymptomRow::from_row(row))
        .map_err(|e| TrackerError::Database(format!("Query failed: {}", e)))?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| TrackerError::Database(format!("Row parse failed: {}", e)))
}

/// Create a symptom; keys are unique
pub fn create_symptom(conn: &Connection, input: CreateSymptomInput) -> Result<SymptomRow, TrackerError> {
    let row = SymptomRow {
        id: Uuid::new_v4().to_string(),
        key: input.key.trim().to_string(),
        label: input.label.trim().to_string(),
        description: input.description.filter(|d| !d.trim().is_empty()),
    };

    conn.execute(
        "INSERT INTO symptoms (id, key, label, description, created_at) VALUES (?, ?, ?, ?, ?)",
        params![row.id, row.key, row.label, row.description, now_timestamp()],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            TrackerError::Conflict(format!("Symptom {} already exists", row.key))
        } else {
            TrackerError::Database(format!("Symptom insert failed: {}", e))
        }
    })?;

    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TrackerDb;

    fn input(key: &str, label: &str) -> CreateSymptomInput {
        CreateSymptomInput {
            key: key.to_string(),
            label: label.to_string(),
            description: Some("  ".to_string()),
        }
    }

    #[test]
    fn test_create_and_list_ordered_by_label() {
        let db = TrackerDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            create_symptom(conn, input("sore_mouth", "Sore mouth"))?;
            let itch = create_symptom(conn, input("itch", "Itching"))?;
            assert!(itch.description.is_none());

            let all = list_symptoms(conn)?;
            let labels: Vec<_> = all.iter().map(|s| s.label.as_str()).collect();
            assert_eq!(labels, vec!["Itching", "Sore mouth"]);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_duplicate_key_is_conflict() {
        let db = TrackerDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            create_symptom(conn, input("itch", "Itching"))?;
            let dup = create_symptom(conn, input("itch", "Itchy"));
            assert!(matches!(dup, Err(TrackerError::Conflict(_))));
            Ok(())
        })
        .unwrap();
    }
}
