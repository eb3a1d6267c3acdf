//! Unlock propagation engine
//!
//! Decides which treatment steps a patient may see. Three entry points:
//!
//! - [`UnlockEngine::ensure_basic_unlocks`] - bootstrap the root and close
//!   over `always` edges
//! - [`UnlockEngine::apply_symptom_report`] - unlock children whose symptom
//!   rules match a report, then propagate
//! - [`UnlockEngine::unlock_single_node`] - explicit unlock of one step
//!
//! Propagation walks the tree level by level from an adjacency index built
//! once per call. Each level is one pass and is committed as its own batch;
//! at most [`MAX_PROPAGATION_PASSES`] passes run per call.

pub mod graph;
pub mod rule;
pub mod store;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::types::TrackerError;

pub use graph::{GraphEdge, GraphNode, UnlockGraph};
pub use rule::{UnlockAuthority, UnlockRule};
pub use store::{graph_from_rows, UnlockStore};

/// Ceiling on `always` propagation passes per call
pub const MAX_PROPAGATION_PASSES: usize = 20;

/// Key of the node every patient starts with
pub const ROOT_KEY: &str = "root";

/// Source tag when no category accompanies a symptom report
pub const DEFAULT_SYMPTOM_SOURCE: &str = "symptoms";

/// Who caused an unlock record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnlockActor {
    System,
    User,
    Admin,
}

impl UnlockActor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

/// Actor and free-text source stored with each record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    pub actor: UnlockActor,
    pub source: String,
}

impl Attribution {
    pub fn new(actor: UnlockActor, source: impl Into<String>) -> Self {
        Self {
            actor,
            source: source.into(),
        }
    }

    pub fn auto_root() -> Self {
        Self::new(UnlockActor::System, "auto_root")
    }

    pub fn auto_always() -> Self {
        Self::new(UnlockActor::System, "auto_always")
    }

    /// Record written by an explicit single unlock
    pub fn single(authority: UnlockAuthority) -> Self {
        match authority {
            UnlockAuthority::Patient => Self::new(UnlockActor::User, "patient_unlock"),
            UnlockAuthority::Admin => Self::new(UnlockActor::Admin, "admin_unlock"),
        }
    }
}

/// Result of an explicit single unlock
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleUnlock {
    pub node_id: String,
    /// Nodes unlocked afterwards by `always` propagation
    pub propagated: Vec<String>,
}

/// The propagation engine over a store
pub struct UnlockEngine<S> {
    store: S,
    max_passes: usize,
}

impl<S: UnlockStore> UnlockEngine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            max_passes: MAX_PROPAGATION_PASSES,
        }
    }

    /// Guarantee the root is unlocked and close over `always` edges.
    ///
    /// Idempotent. Returns the node ids this call unlocked.
    pub fn ensure_basic_unlocks(&self, user_id: &str) -> Result<Vec<String>, TrackerError> {
        self.require_user(user_id)?;
        let graph = self.store.load_graph()?;
        let mut unlocked = self.store.unlocked_set(user_id)?;
        self.ensure_with(user_id, &graph, &mut unlocked)
    }

    /// Unlock children whose edge from an unlocked parent is satisfied by
    /// the reported symptoms, then run basic propagation.
    ///
    /// Returns the ids unlocked by the report itself.
    pub fn apply_symptom_report(
        &self,
        user_id: &str,
        reported: &[String],
        category: Option<&str>,
    ) -> Result<Vec<String>, TrackerError> {
        self.require_user(user_id)?;
        let graph = self.store.load_graph()?;
        let mut unlocked = self.store.unlocked_set(user_id)?;

        let reported: HashSet<String> = reported.iter().cloned().collect();
        let candidates = graph.symptom_candidates(&unlocked, &reported, category);

        if !candidates.is_empty() {
            let source = category.unwrap_or(DEFAULT_SYMPTOM_SOURCE);
            let inserted = self.store.insert_unlocks(
                user_id,
                &candidates,
                &Attribution::new(UnlockActor::User, source),
            )?;
            info!(
                user_id,
                candidates = candidates.len(),
                inserted = inserted.len(),
                source,
                "Symptom report unlocked nodes"
            );
            unlocked.extend(candidates.iter().cloned());
        } else {
            debug!(user_id, reported = reported.len(), "Symptom report matched nothing new");
        }

        self.ensure_with(user_id, &graph, &mut unlocked)?;
        Ok(candidates)
    }

    /// Unlock one node if an unlocked parent's edge lets `authority` do so
    pub fn unlock_single_node(
        &self,
        user_id: &str,
        node_id: &str,
        authority: UnlockAuthority,
    ) -> Result<SingleUnlock, TrackerError> {
        self.require_user(user_id)?;
        let graph = self.store.load_graph()?;

        if graph.get(node_id).is_none() {
            return Err(TrackerError::NotFound("Node not found".to_string()));
        }

        let mut unlocked = self.store.unlocked_set(user_id)?;
        if unlocked.contains(node_id) {
            return Err(TrackerError::Conflict("Node already unlocked".to_string()));
        }

        let edge = graph
            .qualifying_edge(node_id, &unlocked, authority)
            .ok_or_else(|| {
                warn!(user_id, node_id, ?authority, "No qualifying edge for unlock");
                TrackerError::PreconditionFailed("Node cannot be unlocked yet".to_string())
            })?;
        debug!(user_id, node_id, edge_id = %edge.id, "Unlocking via edge");

        let inserted = self
            .store
            .insert_unlocks(user_id, &[node_id.to_string()], &Attribution::single(authority))?;
        if inserted.is_empty() {
            // Lost a race with a concurrent request; the node is unlocked either way
            debug!(user_id, node_id, "Node unlocked concurrently");
        }
        unlocked.insert(node_id.to_string());

        let propagated = self.ensure_with(user_id, &graph, &mut unlocked)?;
        Ok(SingleUnlock {
            node_id: node_id.to_string(),
            propagated,
        })
    }

    fn require_user(&self, user_id: &str) -> Result<(), TrackerError> {
        if self.store.user_exists(user_id)? {
            Ok(())
        } else {
            Err(TrackerError::NotFound("User not found".to_string()))
        }
    }

    /// Root bootstrap plus level-by-level `always` closure over `graph`
    fn ensure_with(
        &self,
        user_id: &str,
        graph: &UnlockGraph,
        unlocked: &mut HashSet<String>,
    ) -> Result<Vec<String>, TrackerError> {
        let mut newly = vec![];

        if unlocked.is_empty() {
            let root = graph
                .root_id()
                .ok_or_else(|| TrackerError::NotFound("Root node not found".to_string()))?
                .to_string();
            newly.extend(self.store.insert_unlocks(
                user_id,
                std::slice::from_ref(&root),
                &Attribution::auto_root(),
            )?);
            info!(user_id, "Bootstrapped root unlock");
            unlocked.insert(root);
        }

        // First pass looks at every unlocked node; later passes only at the
        // level added by the previous pass
        let mut frontier: Vec<String> = unlocked.iter().cloned().collect();
        for pass in 1..=self.max_passes {
            let batch = graph.next_always_batch(&frontier, unlocked);
            if batch.is_empty() {
                break;
            }

            let inserted = self
                .store
                .insert_unlocks(user_id, &batch, &Attribution::auto_always())?;
            debug!(user_id, pass, batch = batch.len(), inserted = inserted.len(), "Always pass");
            newly.extend(inserted);

            unlocked.extend(batch.iter().cloned());
            frontier = batch;

            if pass == self.max_passes {
                warn!(user_id, "Propagation stopped at the pass ceiling");
            }
        }

        Ok(newly)
    }
}
