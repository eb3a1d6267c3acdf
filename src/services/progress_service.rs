//! Progress service - patient unlock state
//!
//! Wraps the unlock engine with the administrative operations around it:
//! reset, unlock-all and the record listings.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::db::{unlocks, TrackerDb, UnlockWithNode, UnlockedStep};
use crate::engine::{Attribution, SingleUnlock, UnlockActor, UnlockAuthority, UnlockEngine, UnlockStore};
use crate::types::TrackerError;

/// Result of an admin unlock-all
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockAllResult {
    pub success: bool,
    pub unlocked_count: usize,
}

/// Progress service for business logic
pub struct ProgressService {
    db: Arc<TrackerDb>,
    engine: UnlockEngine<Arc<TrackerDb>>,
}

impl ProgressService {
    pub fn new(db: Arc<TrackerDb>) -> Self {
        Self {
            engine: UnlockEngine::new(db.clone()),
            db,
        }
    }

    // =========================================================================
    // Engine Operations
    // =========================================================================

    pub fn ensure_basic_unlocks(&self, user_id: &str) -> Result<Vec<String>, TrackerError> {
        self.engine.ensure_basic_unlocks(user_id)
    }

    pub fn apply_symptom_report(
        &self,
        user_id: &str,
        symptoms: &[String],
        category: Option<&str>,
    ) -> Result<Vec<String>, TrackerError> {
        self.engine.apply_symptom_report(user_id, symptoms, category)
    }

    pub fn unlock_single_node(
        &self,
        user_id: &str,
        node_id: &str,
        authority: UnlockAuthority,
    ) -> Result<SingleUnlock, TrackerError> {
        self.engine.unlock_single_node(user_id, node_id, authority)
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// The patient's path, oldest unlock first. Runs propagation first so a
    /// fresh patient sees the root.
    pub fn patient_path(&self, user_id: &str) -> Result<Vec<UnlockedStep>, TrackerError> {
        self.engine.ensure_basic_unlocks(user_id)?;
        self.db.with_conn(|conn| unlocks::unlocked_steps(conn, user_id))
    }

    /// Records for the admin patient view, newest first
    pub fn list_unlocks(&self, user_id: &str) -> Result<Vec<UnlockWithNode>, TrackerError> {
        self.require_user(user_id)?;
        self.db.with_conn(|conn| unlocks::list_unlocks_with_nodes(conn, user_id))
    }

    // =========================================================================
    // Admin Operations
    // =========================================================================

    /// Delete every record of the user, then bootstrap again.
    ///
    /// A tree without a `root` node fails before anything is deleted.
    pub fn reset_progress(&self, user_id: &str) -> Result<Vec<String>, TrackerError> {
        self.require_user(user_id)?;
        if self.db.load_graph()?.root_id().is_none() {
            return Err(TrackerError::NotFound("Root node not found".to_string()));
        }
        let removed = self.db.with_conn(|conn| unlocks::delete_user_unlocks(conn, user_id))?;
        info!(user_id, removed, "Reset patient progress");
        self.engine.ensure_basic_unlocks(user_id)
    }

    /// Unlock every node the user does not have yet
    pub fn unlock_all(&self, user_id: &str) -> Result<UnlockAllResult, TrackerError> {
        self.require_user(user_id)?;
        let locked = self.db.with_conn(|conn| unlocks::locked_node_ids(conn, user_id))?;

        let inserted = if locked.is_empty() {
            vec![]
        } else {
            self.db.insert_unlocks(
                user_id,
                &locked,
                &Attribution::new(UnlockActor::Admin, "admin_unlock_all"),
            )?
        };
        info!(user_id, count = inserted.len(), "Unlocked all nodes");

        Ok(UnlockAllResult {
            success: true,
            unlocked_count: inserted.len(),
        })
    }

    fn require_user(&self, user_id: &str) -> Result<(), TrackerError> {
        if self.db.user_exists(user_id)? {
            Ok(())
        } else {
            Err(TrackerError::NotFound("User not found".to_string()))
        }
    }
}
