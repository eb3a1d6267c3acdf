//! In-memory view of the treatment tree
//!
//! Built once per engine call from the stored nodes and edges, with
//! adjacency indexes in both directions.

use std::collections::{BTreeSet, HashMap, HashSet};

use super::rule::{UnlockAuthority, UnlockRule};
use crate::categories;

/// Node as seen by the engine
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: String,
    pub key: String,
    pub title: String,
    pub is_root: bool,
    /// Explicit labels, or the key-derived category when there are none
    pub categories: Vec<String>,
}

/// Edge with its decoded rule
#[derive(Debug, Clone)]
pub struct GraphEdge {
    pub id: String,
    pub parent_id: String,
    pub child_id: String,
    pub rule: UnlockRule,
    pub description: Option<String>,
    pub weight: i64,
}

#[derive(Debug, Default)]
pub struct UnlockGraph {
    nodes: HashMap<String, GraphNode>,
    edges: Vec<GraphEdge>,
    outgoing: HashMap<String, Vec<usize>>,
    incoming: HashMap<String, Vec<usize>>,
}

impl UnlockGraph {
    pub fn new(nodes: Vec<GraphNode>, edges: Vec<GraphEdge>) -> Self {
        let nodes: HashMap<String, GraphNode> = nodes.into_iter().map(|n| (n.id.clone(), n)).collect();

        let mut outgoing: HashMap<String, Vec<usize>> = HashMap::new();
        let mut incoming: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, edge) in edges.iter().enumerate() {
            outgoing.entry(edge.parent_id.clone()).or_default().push(idx);
            incoming.entry(edge.child_id.clone()).or_default().push(idx);
        }

        Self {
            nodes,
            edges,
            outgoing,
            incoming,
        }
    }

    /// Convenience constructor that fills in effective categories
    pub fn node(id: &str, key: &str, title: &str, is_root: bool, explicit: &[String]) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            key: key.to_string(),
            title: title.to_string(),
            is_root,
            categories: categories::effective_categories(key, explicit),
        }
    }

    pub fn get(&self, node_id: &str) -> Option<&GraphNode> {
        self.nodes.get(node_id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The bootstrap node: the one keyed `root`
    pub fn root_id(&self) -> Option<&str> {
        self.nodes
            .values()
            .find(|n| n.key == "root")
            .map(|n| n.id.as_str())
    }

    /// Entry points of the tree view: `is_root` nodes plus the `root` key
    pub fn entry_ids(&self) -> Vec<&str> {
        let mut roots: Vec<&GraphNode> = self
            .nodes
            .values()
            .filter(|n| n.is_root || n.key == "root")
            .collect();
        roots.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));
        roots.into_iter().map(|n| n.id.as_str()).collect()
    }

    pub fn outgoing(&self, node_id: &str) -> impl Iterator<Item = &GraphEdge> {
        self.outgoing
            .get(node_id)
            .into_iter()
            .flatten()
            .map(move |&idx| &self.edges[idx])
    }

    pub fn incoming(&self, node_id: &str) -> impl Iterator<Item = &GraphEdge> {
        self.incoming
            .get(node_id)
            .into_iter()
            .flatten()
            .map(move |&idx| &self.edges[idx])
    }

    pub fn in_category(&self, node_id: &str, category: &str) -> bool {
        self.nodes
            .get(node_id)
            .map(|n| n.categories.iter().any(|c| c == category))
            .unwrap_or(false)
    }

    /// Children reachable over `always` edges from `frontier` that are not
    /// yet unlocked. One propagation pass; sorted and deduplicated.
    pub fn next_always_batch<'a, I>(&self, frontier: I, unlocked: &HashSet<String>) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut batch = BTreeSet::new();
        for parent in frontier {
            for edge in self.outgoing(parent) {
                if edge.rule == UnlockRule::Always && !unlocked.contains(&edge.child_id) {
                    batch.insert(edge.child_id.clone());
                }
            }
        }
        batch.into_iter().collect()
    }

    /// Children whose edge from an unlocked parent is satisfied by the report.
    ///
    /// With a category, only children in that category are considered.
    /// Already-unlocked children are dropped; the result is deduplicated and
    /// keeps edge order.
    pub fn symptom_candidates(
        &self,
        unlocked: &HashSet<String>,
        reported: &HashSet<String>,
        category: Option<&str>,
    ) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut candidates = vec![];

        for edge in &self.edges {
            if !unlocked.contains(&edge.parent_id) || unlocked.contains(&edge.child_id) {
                continue;
            }
            if let Some(category) = category {
                if !self.in_category(&edge.child_id, category) {
                    continue;
                }
            }
            if edge.rule.matches_report(reported) && seen.insert(edge.child_id.clone()) {
                candidates.push(edge.child_id.clone());
            }
        }

        candidates
    }

    /// First incoming edge from an unlocked parent that the caller may use
    pub fn qualifying_edge(
        &self,
        node_id: &str,
        unlocked: &HashSet<String>,
        authority: UnlockAuthority,
    ) -> Option<&GraphEdge> {
        self.incoming(node_id)
            .find(|e| unlocked.contains(&e.parent_id) && authority.permits(&e.rule))
    }

    pub fn can_unlock(&self, node_id: &str, unlocked: &HashSet<String>, authority: UnlockAuthority) -> bool {
        !unlocked.contains(node_id) && self.qualifying_edge(node_id, unlocked, authority).is_some()
    }

    /// Symptom keys that could unlock something new in `category`: keys of
    /// `symptom_match` edges from unlocked parents into locked children of
    /// that category.
    pub fn category_symptom_keys(&self, unlocked: &HashSet<String>, category: &str) -> BTreeSet<String> {
        self.edges
            .iter()
            .filter(|e| matches!(e.rule, UnlockRule::SymptomMatch { .. }))
            .filter(|e| unlocked.contains(&e.parent_id) && !unlocked.contains(&e.child_id))
            .filter(|e| self.in_category(&e.child_id, category))
            .flat_map(|e| e.rule.symptom_keys().cloned())
            .collect()
    }
}
