//! Patient service - accounts, login lookups and data clearing

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::{hash_password, verify_stored_password};
use crate::db::users::{self, CreateUserInput};
use crate::db::{unlocks, TrackerDb, UserRow};
use crate::types::TrackerError;

/// Maximum rows returned by a patient search
pub const SEARCH_LIMIT: u32 = 20;

/// Input for adding a patient from the admin dashboard
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePatientInput {
    pub email: String,
    pub name: String,
}

/// What the admin "clear data" action removes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClearAction {
    /// Non-admin users and, through them, their records
    Users,
    /// Every unlock record
    Unlocks,
    All,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearDataResult {
    pub success: bool,
    pub users_deleted: usize,
    pub unlocks_deleted: usize,
}

/// Patient service for business logic
pub struct PatientService {
    db: Arc<TrackerDb>,
}

impl PatientService {
    pub fn new(db: Arc<TrackerDb>) -> Self {
        Self { db }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub fn get(&self, user_id: &str) -> Result<Option<UserRow>, TrackerError> {
        self.db.with_conn(|conn| users::get_user(conn, user_id))
    }

    /// Patient login lookup
    pub fn find_by_email(&self, email: &str) -> Result<UserRow, TrackerError> {
        let email = normalize_email(email)?;
        self.db
            .with_conn(|conn| users::get_user_by_email(conn, &email))?
            .ok_or_else(|| TrackerError::NotFound("Email not found".to_string()))
    }

    /// Admin login. Every failure reads the same to the caller.
    pub fn authenticate_admin(&self, email: &str, password: &str) -> Result<UserRow, TrackerError> {
        let invalid = || TrackerError::Unauthorized("Invalid credentials".to_string());

        let email = normalize_email(email).map_err(|_| invalid())?;
        let user = self
            .db
            .with_conn(|conn| users::get_user_by_email(conn, &email))?
            .ok_or_else(invalid)?;

        if !user.is_admin || !verify_stored_password(password, user.password_hash.as_deref()) {
            warn!(user_id = %user.id, "Admin login rejected");
            return Err(invalid());
        }
        Ok(user)
    }

    /// Whether the user exists and is an administrator
    pub fn is_admin(&self, user_id: &str) -> Result<bool, TrackerError> {
        Ok(self.get(user_id)?.map(|u| u.is_admin).unwrap_or(false))
    }

    /// Name or email search, newest first
    pub fn search(&self, term: &str) -> Result<Vec<UserRow>, TrackerError> {
        if term.trim().is_empty() {
            return Err(TrackerError::BadRequest("Search term is required".to_string()));
        }
        self.db.with_conn(|conn| users::search_users(conn, term, SEARCH_LIMIT))
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    pub fn create_patient(&self, input: CreatePatientInput) -> Result<UserRow, TrackerError> {
        let email = normalize_email(&input.email)?;
        let name = input.name.trim();
        if name.is_empty() {
            return Err(TrackerError::BadRequest("Name is required".to_string()));
        }

        let user = self.db.with_conn(|conn| {
            users::create_user(
                conn,
                CreateUserInput {
                    email,
                    name: name.to_string(),
                    is_admin: false,
                    password_hash: None,
                },
            )
        })?;
        info!(user_id = %user.id, "Added patient");
        Ok(user)
    }

    /// Create or refresh the configured administrator account
    pub fn bootstrap_admin(&self, email: &str, name: &str, password: &str) -> Result<UserRow, TrackerError> {
        let email = normalize_email(email)?;
        let hash = hash_password(password)?;
        let admin = self
            .db
            .with_conn(|conn| users::upsert_admin(conn, &email, name, &hash))?;
        info!(user_id = %admin.id, "Admin account ready");
        Ok(admin)
    }

    pub fn clear_data(&self, action: ClearAction) -> Result<ClearDataResult, TrackerError> {
        let (users_deleted, unlocks_deleted) = self.db.with_conn(|conn| {
            let unlocks_deleted = match action {
                ClearAction::Unlocks | ClearAction::All => unlocks::delete_all_unlocks(conn)?,
                ClearAction::Users => 0,
            };
            let users_deleted = match action {
                ClearAction::Users | ClearAction::All => users::delete_non_admin_users(conn)?,
                ClearAction::Unlocks => 0,
            };
            Ok((users_deleted, unlocks_deleted))
        })?;

        warn!(?action, users_deleted, unlocks_deleted, "Cleared data");
        Ok(ClearDataResult {
            success: true,
            users_deleted,
            unlocks_deleted,
        })
    }
}

/// Trim, lower-case and sanity-check an email address
pub fn normalize_email(email: &str) -> Result<String, TrackerError> {
    let email = email.trim().to_lowercase();
    let invalid = || TrackerError::BadRequest("Invalid email".to_string());

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    let domain_ok = domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains('@');
    if local.is_empty() || !domain_ok || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::UnlockStore;
    use crate::services::test_support::{seed_tree, seed_user};
    use crate::services::ProgressService;

    fn service() -> (Arc<TrackerDb>, PatientService) {
        let db = Arc::new(TrackerDb::open_in_memory().unwrap());
        (db.clone(), PatientService::new(db))
    }

    fn patient(email: &str, name: &str) -> CreatePatientInput {
        CreatePatientInput {
            email: email.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email(" Pat@Example.com ").unwrap(), "pat@example.com");
        for bad in ["", "pat", "@example.com", "pat@", "pat@example", "pat@.com", "pa t@example.com", "a@b@c.com"] {
            assert!(normalize_email(bad).is_err(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_create_and_find() {
        let (_, patients) = service();
        let user = patients.create_patient(patient("Pat@Example.com", " Pat ")).unwrap();
        assert_eq!(user.email, "pat@example.com");
        assert_eq!(user.name, "Pat");

        assert_eq!(patients.find_by_email("PAT@example.com").unwrap().id, user.id);
        assert!(matches!(patients.find_by_email("who@example.com"), Err(TrackerError::NotFound(_))));
        assert!(matches!(patients.find_by_email("nope"), Err(TrackerError::BadRequest(_))));

        assert!(matches!(
            patients.create_patient(patient("pat@example.com", "Dup")),
            Err(TrackerError::Conflict(_))
        ));
        assert!(patients.create_patient(patient("x@example.com", "  ")).is_err());
    }

    #[test]
    fn test_admin_authentication() {
        let (_, patients) = service();
        patients.bootstrap_admin("admin@clinic.org", "Admin", "long-enough-password").unwrap();
        patients.create_patient(patient("pat@example.com", "Pat")).unwrap();

        let admin = patients.authenticate_admin("ADMIN@clinic.org", "long-enough-password").unwrap();
        assert!(admin.is_admin);
        assert!(patients.is_admin(&admin.id).unwrap());

        for (email, password) in [
            ("admin@clinic.org", "wrong-password-here"),
            ("pat@example.com", "long-enough-password"),
            ("ghost@clinic.org", "long-enough-password"),
        ] {
            let err = patients.authenticate_admin(email, password).unwrap_err();
            assert_eq!(err.message(), "Invalid credentials");
        }
    }

    #[test]
    fn test_search() {
        let (_, patients) = service();
        patients.create_patient(patient("ada@example.com", "Ada")).unwrap();
        patients.create_patient(patient("bob@example.com", "Bob")).unwrap();

        assert_eq!(patients.search("ada").unwrap().len(), 1);
        assert_eq!(patients.search("example").unwrap().len(), 2);
        assert!(patients.search(" ").is_err());
    }

    #[test]
    fn test_clear_data_actions() {
        let (db, patients) = service();
        seed_tree(&db);
        let a = seed_user(&db, "a@example.com");
        let b = seed_user(&db, "b@example.com");
        patients.bootstrap_admin("admin@clinic.org", "Admin", "long-enough-password").unwrap();
        let progress = ProgressService::new(db.clone());
        progress.ensure_basic_unlocks(&a).unwrap();
        progress.ensure_basic_unlocks(&b).unwrap();

        let result = patients.clear_data(ClearAction::Unlocks).unwrap();
        assert_eq!(result.users_deleted, 0);
        assert!(result.unlocks_deleted > 0);
        assert!(db.unlocked_set(&a).unwrap().is_empty());

        progress.ensure_basic_unlocks(&a).unwrap();
        let result = patients.clear_data(ClearAction::All).unwrap();
        assert_eq!(result.users_deleted, 2);
        assert_eq!(db.stats().unwrap().user_count, 1);
        assert_eq!(db.stats().unwrap().unlock_count, 0);
    }

    #[test]
    fn test_clear_action_parsing() {
        let action: ClearAction = serde_json::from_str("\"users\"").unwrap();
        assert_eq!(action, ClearAction::Users);
        assert!(serde_json::from_str::<ClearAction>("\"everything\"").is_err());
    }
}
