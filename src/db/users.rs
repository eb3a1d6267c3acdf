//! User CRUD operations

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::{is_unique_violation, now_timestamp};
use crate::types::TrackerError;

/// User row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub name: String,
    pub is_admin: bool,
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    pub created_at: String,
}

impl UserRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            email: row.get("email")?,
            name: row.get("name")?,
            is_admin: row.get("is_admin")?,
            password_hash: row.get("password_hash")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Input for creating a user
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserInput {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub password_hash: Option<String>,
}

/// Get user by ID
pub fn get_user(conn: &Connection, id: &str) -> Result<Option<UserRow>, TrackerError> {
    conn.query_row("SELECT * FROM users WHERE id = ?", params![id], |row| {
        UserRow::from_row(row)
    })
    .optional()
    .map_err(|e| TrackerError::Database(format!("User lookup failed: {}", e)))
}

/// Get user by email (case-insensitive)
pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<UserRow>, TrackerError> {
    conn.query_row(
        "SELECT * FROM users WHERE email = ?",
        params![email.trim().to_lowercase()],
        |row| UserRow::from_row(row),
    )
    .optional()
    .map_err(|e| TrackerError::Database(format!("User lookup failed: {}", e)))
}

/// Create a user; the email is stored lower-cased
pub fn create_user(conn: &Connection, input: CreateUserInput) -> Result<UserRow, TrackerError> {
    let id = Uuid::new_v4().to_string();
    let email = input.email.trim().to_lowercase();

    conn.execute(
        r#"
        INSERT INTO users (id, email, name, is_admin, password_hash, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
        params![
            id,
            email,
            input.name.trim(),
            input.is_admin,
            input.password_hash,
            now_timestamp(),
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            TrackerError::Conflict(format!("A user with email {} already exists", email))
        } else {
            TrackerError::Database(format!("User insert failed: {}", e))
        }
    })?;

    debug!(user_id = %id, "Created user");

    get_user(conn, &id)?
        .ok_or_else(|| TrackerError::Internal("User not found after insert".to_string()))
}

/// Create the admin account or promote and re-key an existing one
pub fn upsert_admin(
    conn: &Connection,
    email: &str,
    name: &str,
    password_hash: &str,
) -> Result<UserRow, TrackerError> {
    match get_user_by_email(conn, email)? {
        Some(existing) => {
            conn.execute(
                "UPDATE users SET is_admin = 1, password_hash = ? WHERE id = ?",
                params![password_hash, existing.id],
            )
            .map_err(|e| TrackerError::Database(format!("Admin update failed: {}", e)))?;
            get_user(conn, &existing.id)?
                .ok_or_else(|| TrackerError::Internal("Admin vanished during update".to_string()))
        }
        None => create_user(
            conn,
            CreateUserInput {
                email: email.to_string(),
                name: name.to_string(),
                is_admin: true,
                password_hash: Some(password_hash.to_string()),
            },
        ),
    }
}

/// Case-insensitive substring search over name and email, newest first
pub fn search_users(conn: &Connection, term: &str, limit: u32) -> Result<Vec<UserRow>, TrackerError> {
    let pattern = format!("%{}%", escape_like(term.trim()));

    let mut stmt = conn
        .prepare(
            r#"
            SELECT * FROM users
            WHERE name LIKE ?1 ESCAPE '\' OR email LIKE ?1 ESCAPE '\'
            ORDER BY created_at DESC
            LIMIT ?2
            "#,
        )
        .map_err(|e| TrackerError::Database(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map(params![pattern, limit as i64], |row| UserRow::from_row(row))
        .map_err(|e| TrackerError::Database(format!("Query failed: {}", e)))?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| TrackerError::Database(format!("Row parse failed: {}", e)))
}

/// Total number of users (patients and admins)
pub fn count_users(conn: &Connection) -> Result<u64, TrackerError> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    Ok(n as u64)
}

/// Delete every non-admin user; their unlock records cascade
pub fn delete_non_admin_users(conn: &Connection) -> Result<usize, TrackerError> {
    conn.execute("DELETE FROM users WHERE is_admin = 0", [])
        .map_err(|e| TrackerError::Database(format!("Delete failed: {}", e)))
}

// LIKE treats % and _ as wildcards; a search term is literal text
fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
