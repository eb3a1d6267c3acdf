//! Tree service - treatment tree editing and the patient tree view

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::categories::{self, Category};
use crate::db::edges::{self, EdgeInput};
use crate::db::nodes::{self, NodeInput};
use crate::db::{symptoms, unlocks, EdgeRow, NodeRow, TrackerDb};
use crate::engine::{graph_from_rows, GraphEdge, UnlockAuthority, UnlockGraph, UnlockRule};
use crate::types::TrackerError;

/// Every node and edge, as the editor loads them
#[derive(Debug, Clone, Serialize)]
pub struct TreeSnapshot {
    pub nodes: Vec<NodeRow>,
    pub edges: Vec<EdgeRow>,
}

/// Full replacement of the tree
#[derive(Debug, Clone, Deserialize)]
pub struct SaveTreeInput {
    #[serde(default)]
    pub nodes: Vec<NodeInput>,
    #[serde(default)]
    pub edges: Vec<EdgeInput>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveTreeResult {
    pub success: bool,
    pub node_count: usize,
    pub edge_count: usize,
}

/// A node of the patient tree view
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeViewNode {
    pub id: String,
    pub key: String,
    pub title: String,
    pub summary: Option<String>,
    pub video_url: Option<String>,
    pub is_root: bool,
    pub categories: Vec<String>,
    pub depth: usize,
    pub has_children: bool,
    pub children: Vec<TreeViewNode>,
    /// Already expanded under another parent; `children` is left empty
    pub is_reference: bool,
    pub is_unlocked: bool,
    /// Locked, but the patient could unlock it now
    pub is_immediately_unlockable: bool,
    /// Rule of the edge this node was reached by (`None` for roots)
    pub unlock_type: Option<String>,
    pub unlock_value: Option<serde_json::Value>,
    pub unlock_description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientTree {
    pub roots: Vec<TreeViewNode>,
    pub unlocked_count: usize,
    pub total_nodes: usize,
}

/// A symptom a patient can report for a category
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymptomOption {
    pub key: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategorySymptoms {
    pub category: Category,
    pub symptoms: Vec<SymptomOption>,
}

/// Tree service for business logic
pub struct TreeService {
    db: Arc<TrackerDb>,
}

impl TreeService {
    pub fn new(db: Arc<TrackerDb>) -> Self {
        Self { db }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub fn get_tree(&self) -> Result<TreeSnapshot, TrackerError> {
        self.db.with_conn(|conn| {
            Ok(TreeSnapshot {
                nodes: nodes::list_nodes(conn)?,
                edges: edges::list_edges(conn)?,
            })
        })
    }

    /// Nested view from the root nodes with the patient's unlock state
    pub fn patient_tree(&self, user_id: &str) -> Result<PatientTree, TrackerError> {
        let (snapshot, unlocked) = self.db.with_conn(|conn| {
            let snapshot = TreeSnapshot {
                nodes: nodes::list_nodes(conn)?,
                edges: edges::list_edges(conn)?,
            };
            Ok((snapshot, unlocks::unlocked_node_ids(conn, user_id)?))
        })?;

        let rows: HashMap<String, NodeRow> = snapshot
            .nodes
            .iter()
            .map(|n| (n.id.clone(), n.clone()))
            .collect();
        let graph = graph_from_rows(snapshot.nodes, snapshot.edges)?;

        let view = TreeView {
            graph: &graph,
            rows: &rows,
            unlocked: &unlocked,
        };
        let mut walk = Walk::default();
        let roots = graph
            .entry_ids()
            .into_iter()
            .filter_map(|id| view.build(id, None, 0, &mut walk))
            .collect();

        Ok(PatientTree {
            roots,
            unlocked_count: unlocked.len(),
            total_nodes: graph.node_count(),
        })
    }

    /// Symptoms that could unlock something new in `category` for the user
    pub fn category_symptoms(&self, user_id: &str, category: &str) -> Result<CategorySymptoms, TrackerError> {
        let category = categories::find(category)
            .ok_or_else(|| TrackerError::NotFound(format!("Unknown category: {}", category)))?;

        let (snapshot, unlocked, catalogue) = self.db.with_conn(|conn| {
            Ok((
                TreeSnapshot {
                    nodes: nodes::list_nodes(conn)?,
                    edges: edges::list_edges(conn)?,
                },
                unlocks::unlocked_node_ids(conn, user_id)?,
                symptoms::list_symptoms(conn)?,
            ))
        })?;
        let graph = graph_from_rows(snapshot.nodes, snapshot.edges)?;

        let labels: HashMap<String, String> =
            catalogue.into_iter().map(|s| (s.key, s.label)).collect();
        let mut options: Vec<SymptomOption> = graph
            .category_symptom_keys(&unlocked, category.key)
            .into_iter()
            .map(|key| SymptomOption {
                label: labels.get(&key).cloned().unwrap_or_else(|| key.clone()),
                key,
            })
            .collect();
        options.sort_by(|a, b| a.label.cmp(&b.label));

        Ok(CategorySymptoms {
            category,
            symptoms: options,
        })
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Replace the whole tree. Every patient's unlock records go with it.
    pub fn save_tree(&self, input: SaveTreeInput) -> Result<SaveTreeResult, TrackerError> {
        let plan = validate_tree(&input)?;

        self.db.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| TrackerError::Database(format!("Transaction failed: {}", e)))?;

            unlocks::delete_all_unlocks(&tx)?;
            tx.execute("DELETE FROM edges", [])?;
            tx.execute("DELETE FROM node_categories", [])?;
            nodes::delete_all_nodes(&tx)?;

            for (id, node) in plan.node_ids.iter().zip(&input.nodes) {
                nodes::insert_node(&tx, id, node)?;
            }
            for ((id, parent_id, child_id), edge) in plan.edges.iter().zip(&input.edges) {
                edges::insert_edge(&tx, id, parent_id, child_id, edge)?;
            }

            tx.commit()
                .map_err(|e| TrackerError::Database(format!("Commit failed: {}", e)))
        })?;

        info!(nodes = input.nodes.len(), edges = input.edges.len(), "Saved treatment tree");
        Ok(SaveTreeResult {
            success: true,
            node_count: input.nodes.len(),
            edge_count: input.edges.len(),
        })
    }

    /// Set or clear the description shown for an edge
    pub fn save_edge_description(&self, edge_id: &str, description: Option<&str>) -> Result<EdgeRow, TrackerError> {
        let description = description.map(str::trim).filter(|d| !d.is_empty());

        self.db.with_conn(|conn| {
            if !edges::update_edge_description(conn, edge_id, description)? {
                return Err(TrackerError::NotFound("Edge not found".to_string()));
            }
            edges::get_edge(conn, edge_id)?
                .ok_or_else(|| TrackerError::Internal("Edge vanished after update".to_string()))
        })
    }
}

struct TreeView<'a> {
    graph: &'a UnlockGraph,
    rows: &'a HashMap<String, NodeRow>,
    unlocked: &'a HashSet<String>,
}

/// Visit state of one view build
#[derive(Default)]
struct Walk {
    /// Ancestors of the node being built
    on_path: HashSet<String>,
    /// Nodes whose children are already in the view
    expanded: HashSet<String>,
}

impl TreeView<'_> {
    /// Each node is expanded once. An edge back to an ancestor is a cycle
    /// and is not followed; a later edge into an expanded node yields a
    /// reference without children.
    fn build(
        &self,
        node_id: &str,
        via: Option<&GraphEdge>,
        depth: usize,
        walk: &mut Walk,
    ) -> Option<TreeViewNode> {
        let row = self.rows.get(node_id)?;
        let node = self.graph.get(node_id)?;

        let is_reference = !walk.expanded.insert(node_id.to_string());
        let mut children = vec![];
        if !is_reference {
            walk.on_path.insert(node_id.to_string());

            let mut outgoing: Vec<&GraphEdge> = self.graph.outgoing(node_id).collect();
            outgoing.sort_by(|a, b| {
                let title = |e: &GraphEdge| self.graph.get(&e.child_id).map(|n| n.title.clone()).unwrap_or_default();
                a.weight.cmp(&b.weight).then_with(|| title(a).cmp(&title(b)))
            });

            for edge in outgoing {
                if walk.on_path.contains(&edge.child_id) {
                    continue;
                }
                if let Some(child) = self.build(&edge.child_id, Some(edge), depth + 1, walk) {
                    children.push(child);
                }
            }

            walk.on_path.remove(node_id);
        }

        let has_children = if is_reference {
            self.graph.outgoing(node_id).next().is_some()
        } else {
            !children.is_empty()
        };
        let is_unlocked = self.unlocked.contains(node_id);
        Some(TreeViewNode {
            id: row.id.clone(),
            key: row.key.clone(),
            title: row.title.clone(),
            summary: row.summary.clone(),
            video_url: row.video_url.clone(),
            is_root: row.is_root,
            categories: node.categories.clone(),
            depth,
            has_children,
            children,
            is_reference,
            is_unlocked,
            is_immediately_unlockable: !is_unlocked
                && self.graph.can_unlock(node_id, self.unlocked, UnlockAuthority::Patient),
            unlock_type: via.map(|e| e.rule.unlock_type().to_string()),
            unlock_value: via.and_then(|e| e.rule.payload()),
            unlock_description: via.and_then(|e| e.description.clone()),
        })
    }
}

/// Resolved ids for a validated save
struct TreePlan {
    node_ids: Vec<String>,
    edges: Vec<(String, String, String)>,
}

/// Check the whole input before anything is deleted
fn validate_tree(input: &SaveTreeInput) -> Result<TreePlan, TrackerError> {
    let mut node_ids = Vec::with_capacity(input.nodes.len());
    let mut seen_ids = HashSet::new();
    let mut seen_keys = HashSet::new();

    for node in &input.nodes {
        let key = node.key.trim();
        if key.is_empty() {
            return Err(TrackerError::BadRequest("Node key is required".into()));
        }
        if node.title.trim().is_empty() {
            return Err(TrackerError::BadRequest(format!("Node {} needs a title", key)));
        }
        if !seen_keys.insert(key) {
            return Err(TrackerError::BadRequest(format!("Duplicate node key: {}", key)));
        }
        if let Some(unknown) = node.categories.iter().find(|c| !categories::is_known(c)) {
            return Err(TrackerError::BadRequest(format!("Unknown category: {}", unknown)));
        }

        let id = node
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if !seen_ids.insert(id.clone()) {
            return Err(TrackerError::BadRequest(format!("Duplicate node id: {}", id)));
        }
        node_ids.push(id);
    }

    // Edges may name their endpoints by node id or by key
    let mut refs: HashMap<String, String> = node_ids.iter().map(|id| (id.clone(), id.clone())).collect();
    for (node, id) in input.nodes.iter().zip(&node_ids) {
        refs.entry(node.key.trim().to_string()).or_insert_with(|| id.clone());
    }

    let mut edges = Vec::with_capacity(input.edges.len());
    for edge in &input.edges {
        let parent = refs
            .get(&edge.parent_id)
            .ok_or_else(|| TrackerError::BadRequest(format!("Edge parent not found: {}", edge.parent_id)))?;
        let child = refs
            .get(&edge.child_id)
            .ok_or_else(|| TrackerError::BadRequest(format!("Edge child not found: {}", edge.child_id)))?;
        if parent == child {
            return Err(TrackerError::BadRequest(format!("Edge from {} to itself", edge.parent_id)));
        }
        UnlockRule::decode(&edge.unlock_type, edge.unlock_value.as_ref())?;

        let id = edge
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        edges.push((id, parent.clone(), child.clone()));
    }

    Ok(TreePlan { node_ids, edges })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::UnlockStore;
    use crate::services::test_support::{edge_input, node_input, seed_tree, seed_user, tree_input};
    use crate::services::ProgressService;
    use serde_json::json;

    fn setup() -> (Arc<TrackerDb>, TreeService, String) {
        let db = Arc::new(TrackerDb::open_in_memory().unwrap());
        seed_tree(&db);
        let user = seed_user(&db, "pat@example.com");
        (db.clone(), TreeService::new(db), user)
    }

    fn find<'a>(nodes: &'a [TreeViewNode], key: &str) -> Option<&'a TreeViewNode> {
        for node in nodes {
            if node.key == key {
                return Some(node);
            }
            if let Some(found) = find(&node.children, key) {
                return Some(found);
            }
        }
        None
    }

    #[test]
    fn test_patient_tree_flags() {
        let (db, tree, user) = setup();
        ProgressService::new(db).ensure_basic_unlocks(&user).unwrap();

        let view = tree.patient_tree(&user).unwrap();
        assert_eq!(view.roots.len(), 1);
        let root = &view.roots[0];
        assert_eq!(root.key, "root");
        assert!(root.is_unlocked);
        assert_eq!(root.depth, 0);
        assert!(root.unlock_type.is_none());

        let tylenol = find(&view.roots, "tylenol").unwrap();
        assert!(!tylenol.is_unlocked);
        assert!(tylenol.is_immediately_unlockable);
        assert_eq!(tylenol.unlock_type.as_deref(), Some("symptom_match"));
        assert_eq!(tylenol.unlock_value, Some(json!({"all": ["pain"]})));
        assert_eq!(tylenol.depth, 1);

        // Manual edge: patients cannot unlock it themselves
        let mugard = find(&view.roots, "mugard").unwrap();
        assert!(!mugard.is_immediately_unlockable);
        assert_eq!(mugard.unlock_description.as_deref(), Some("Ask your care team"));

        // Parent still locked
        let rinse = find(&view.roots, "mugard_rinse").unwrap();
        assert!(!rinse.is_immediately_unlockable);
        assert_eq!(rinse.depth, 2);
        assert_eq!(view.total_nodes, 7);
    }

    #[test]
    fn test_children_ordered_by_weight_then_title() {
        let (_, tree, user) = setup();
        let view = tree.patient_tree(&user).unwrap();
        let titles: Vec<_> = view.roots[0].children.iter().map(|c| c.title.as_str()).collect();
        // skin_wash has weight -1; the rest tie at 0 and sort by title
        assert_eq!(titles, vec!["Skin wash", "Mugard", "Soft foods", "Tylenol"]);
    }

    #[test]
    fn test_cycle_is_cut() {
        let db = Arc::new(TrackerDb::open_in_memory().unwrap());
        let mut input = tree_input(vec![node_input("root", "Root"), node_input("a", "A"), node_input("b", "B")]);
        input.edges = vec![
            edge_input("root", "a", "always", None),
            edge_input("a", "b", "always", None),
            edge_input("b", "a", "always", None),
        ];
        let tree = TreeService::new(db.clone());
        tree.save_tree(input).unwrap();
        let user = seed_user(&db, "pat@example.com");

        let view = tree.patient_tree(&user).unwrap();
        let a = &view.roots[0].children[0];
        let b = &a.children[0];
        assert_eq!(b.key, "b");
        assert!(b.children.is_empty());
    }

    fn count(nodes: &[TreeViewNode]) -> (usize, usize) {
        nodes.iter().fold((0, 0), |(all, refs), n| {
            let (a, r) = count(&n.children);
            (all + 1 + a, refs + usize::from(n.is_reference) + r)
        })
    }

    #[test]
    fn test_shared_children_expand_once() {
        // Stacked diamonds: top_i -> left_i, right_i -> top_{i+1}
        const LEVELS: usize = 18;
        let db = Arc::new(TrackerDb::open_in_memory().unwrap());
        let top = |i: usize| if i == 0 { "root".to_string() } else { format!("top_{}", i) };

        let mut nodes = vec![node_input("root", "Root")];
        let mut edges = vec![];
        for i in 0..LEVELS {
            let (left, right, next) = (format!("left_{}", i), format!("right_{}", i), top(i + 1));
            nodes.push(node_input(&left, &left));
            nodes.push(node_input(&right, &right));
            nodes.push(node_input(&next, &next));
            for side in [&left, &right] {
                edges.push(edge_input(&top(i), side, "always", None));
                edges.push(edge_input(side, &next, "always", None));
            }
        }
        let stored = nodes.len();
        let edge_count = edges.len();
        let mut input = tree_input(nodes);
        input.edges = edges;

        let tree = TreeService::new(db.clone());
        tree.save_tree(input).unwrap();
        let user = seed_user(&db, "pat@example.com");

        let view = tree.patient_tree(&user).unwrap();
        let (all, refs) = count(&view.roots);
        // One view node per edge plus the root; every stored node expanded once
        assert_eq!(all, edge_count + 1);
        assert_eq!(all - refs, stored);
        assert_eq!(refs, LEVELS);

        let shared = find(&view.roots, "top_1").unwrap();
        assert!(!shared.is_reference);
        assert!(shared.has_children);
    }

    #[test]
    fn test_category_symptoms() {
        let (db, tree, user) = setup();
        ProgressService::new(db).ensure_basic_unlocks(&user).unwrap();

        let skin = tree.category_symptoms(&user, "skincare").unwrap();
        assert_eq!(skin.category.key, "skincare");
        let keys: Vec<_> = skin.symptoms.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["itch", "redness"]);
        assert_eq!(skin.symptoms[0].label, "Itching");

        assert!(matches!(tree.category_symptoms(&user, "dental"), Err(TrackerError::NotFound(_))));
    }

    #[test]
    fn test_save_tree_replaces_everything() {
        let (db, tree, user) = setup();
        ProgressService::new(db.clone()).ensure_basic_unlocks(&user).unwrap();

        let mut input = tree_input(vec![node_input("root", "New start"), node_input("next", "Next")]);
        input.edges = vec![edge_input("root", "next", "always", None)];
        let result = tree.save_tree(input).unwrap();
        assert_eq!(result.node_count, 2);
        assert_eq!(result.edge_count, 1);

        let snapshot = tree.get_tree().unwrap();
        assert_eq!(snapshot.nodes.len(), 2);
        assert_eq!(snapshot.edges.len(), 1);
        // Unlock records were cleared with the old tree
        assert!(db.unlocked_set(&user).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_tree_leaves_store_untouched() {
        let (_, tree, _) = setup();
        let before = tree.get_tree().unwrap();

        let mut dangling = tree_input(vec![node_input("root", "Root")]);
        dangling.edges = vec![edge_input("root", "ghost", "always", None)];
        assert!(matches!(tree.save_tree(dangling), Err(TrackerError::BadRequest(_))));

        let mut self_edge = tree_input(vec![node_input("root", "Root")]);
        self_edge.edges = vec![edge_input("root", "root", "always", None)];
        assert!(tree.save_tree(self_edge).is_err());

        let mut bad_rule = tree_input(vec![node_input("root", "Root"), node_input("a", "A")]);
        bad_rule.edges = vec![edge_input(
            "root",
            "a",
            "symptom_match",
            Some(json!("pain")),
        )];
        assert!(tree.save_tree(bad_rule).is_err());

        let dup = tree_input(vec![node_input("root", "Root"), node_input("root", "Again")]);
        assert!(tree.save_tree(dup).is_err());

        let mut bad_category = tree_input(vec![node_input("root", "Root")]);
        bad_category.nodes[0].categories = vec!["dental".into()];
        assert!(tree.save_tree(bad_category).is_err());

        assert_eq!(tree.get_tree().unwrap().nodes.len(), before.nodes.len());
    }

    #[test]
    fn test_save_edge_description() {
        let (_, tree, _) = setup();
        let edge_id = tree.get_tree().unwrap().edges[0].id.clone();

        let edge = tree.save_edge_description(&edge_id, Some("  Take with food ")).unwrap();
        assert_eq!(edge.description.as_deref(), Some("Take with food"));

        let edge = tree.save_edge_description(&edge_id, Some("   ")).unwrap();
        assert!(edge.description.is_none());

        assert!(matches!(
            tree.save_edge_description("missing", Some("x")),
            Err(TrackerError::NotFound(_))
        ));
    }
}
