//! Storage seam for the unlock engine

use std::collections::HashSet;
use std::sync::Arc;

use super::graph::{GraphEdge, GraphNode, UnlockGraph};
use super::rule::UnlockRule;
use super::Attribution;
use crate::db::{self, EdgeRow, NodeRow, TrackerDb};
use crate::types::TrackerError;

/// What the engine needs from persistence
pub trait UnlockStore {
    fn user_exists(&self, user_id: &str) -> Result<bool, TrackerError>;

    /// Snapshot of all nodes and edges with decoded rules
    fn load_graph(&self) -> Result<UnlockGraph, TrackerError>;

    fn unlocked_set(&self, user_id: &str) -> Result<HashSet<String>, TrackerError>;

    /// Insert one batch atomically. Pairs that already exist are skipped;
    /// returns the ids actually inserted.
    fn insert_unlocks(
        &self,
        user_id: &str,
        node_ids: &[String],
        attribution: &Attribution,
    ) -> Result<Vec<String>, TrackerError>;
}

impl<S: UnlockStore + ?Sized> UnlockStore for &S {
    fn user_exists(&self, user_id: &str) -> Result<bool, TrackerError> {
        (**self).user_exists(user_id)
    }

    fn load_graph(&self) -> Result<UnlockGraph, TrackerError> {
        (**self).load_graph()
    }

    fn unlocked_set(&self, user_id: &str) -> Result<HashSet<String>, TrackerError> {
        (**self).unlocked_set(user_id)
    }

    fn insert_unlocks(
        &self,
        user_id: &str,
        node_ids: &[String],
        attribution: &Attribution,
    ) -> Result<Vec<String>, TrackerError> {
        (**self).insert_unlocks(user_id, node_ids, attribution)
    }
}

impl<S: UnlockStore + ?Sized> UnlockStore for Arc<S> {
    fn user_exists(&self, user_id: &str) -> Result<bool, TrackerError> {
        (**self).user_exists(user_id)
    }

    fn load_graph(&self) -> Result<UnlockGraph, TrackerError> {
        (**self).load_graph()
    }

    fn unlocked_set(&self, user_id: &str) -> Result<HashSet<String>, TrackerError> {
        (**self).unlocked_set(user_id)
    }

    fn insert_unlocks(
        &self,
        user_id: &str,
        node_ids: &[String],
        attribution: &Attribution,
    ) -> Result<Vec<String>, TrackerError> {
        (**self).insert_unlocks(user_id, node_ids, attribution)
    }
}

impl UnlockStore for TrackerDb {
    fn user_exists(&self, user_id: &str) -> Result<bool, TrackerError> {
        self.with_conn(|conn| Ok(db::users::get_user(conn, user_id)?.is_some()))
    }

    fn load_graph(&self) -> Result<UnlockGraph, TrackerError> {
        let (nodes, edges) = self.with_conn(|conn| {
            Ok((db::nodes::list_nodes(conn)?, db::edges::list_edges(conn)?))
        })?;
        graph_from_rows(nodes, edges)
    }

    fn unlocked_set(&self, user_id: &str) -> Result<HashSet<String>, TrackerError> {
        self.with_conn(|conn| db::unlocks::unlocked_node_ids(conn, user_id))
    }

    fn insert_unlocks(
        &self,
        user_id: &str,
        node_ids: &[String],
        attribution: &Attribution,
    ) -> Result<Vec<String>, TrackerError> {
        self.with_conn_mut(|conn| db::unlocks::insert_unlock_batch(conn, user_id, node_ids, attribution))
    }
}

/// Build the engine graph from stored rows, decoding every rule
pub fn graph_from_rows(nodes: Vec<NodeRow>, edges: Vec<EdgeRow>) -> Result<UnlockGraph, TrackerError> {
    let nodes: Vec<GraphNode> = nodes
        .into_iter()
        .map(|n| UnlockGraph::node(&n.id, &n.key, &n.title, n.is_root, &n.categories))
        .collect();

    let edges = edges
        .into_iter()
        .map(|e| {
            let rule = UnlockRule::decode(&e.unlock_type, e.unlock_value.as_ref()).map_err(|err| {
                TrackerError::Database(format!("Edge {} has an invalid rule: {}", e.id, err.message()))
            })?;
            Ok(GraphEdge {
                id: e.id,
                parent_id: e.parent_id,
                child_id: e.child_id,
                rule,
                description: e.description,
                weight: e.weight.unwrap_or(0),
            })
        })
        .collect::<Result<Vec<_>, TrackerError>>()?;

    Ok(UnlockGraph::new(nodes, edges))
}
