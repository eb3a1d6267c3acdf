//! Service layer
//!
//! Services hold the business rules between HTTP handlers and the
//! repositories in `db`:
//!
//! ```text
//! HTTP Handlers (routes/*)
//!     ↓
//! Service Layer (validation, engine calls)
//!     ↓
//! Repository Layer (db/*.rs)
//!     ↓
//! SQLite Database
//! ```

pub mod patient_service;
pub mod progress_service;
pub mod response;
pub mod stats_service;
pub mod symptom_service;
pub mod tree_service;

pub use patient_service::{ClearAction, CreatePatientInput, PatientService};
pub use progress_service::ProgressService;
pub use stats_service::StatsService;
pub use symptom_service::SymptomService;
pub use tree_service::{SaveTreeInput, TreeService};

use std::sync::Arc;

use crate::db::TrackerDb;

/// Service container shared by all handlers
pub struct Services {
    pub patients: Arc<PatientService>,
    pub progress: Arc<ProgressService>,
    pub tree: Arc<TreeService>,
    pub symptoms: Arc<SymptomService>,
    pub stats: Arc<StatsService>,
}

impl Services {
    /// Create all services over one database
    pub fn new(db: Arc<TrackerDb>) -> Self {
        Self {
            patients: Arc::new(PatientService::new(db.clone())),
            progress: Arc::new(ProgressService::new(db.clone())),
            tree: Arc::new(TreeService::new(db.clone())),
            symptoms: Arc::new(SymptomService::new(db.clone())),
            stats: Arc::new(StatsService::new(db)),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Fixture tree shared by service tests
    //!
    //! ```text
    //! root ─always(w=-1)─> skin_wash ─symptom{any: itch, redness}─> calendula
    //!      ─symptom{all: pain}─> tylenol
    //!      ─symptom{any: sore_mouth}─> eat_soft [nutrition]
    //!      ─manual─> mugard ─always─> mugard_rinse
    //! ```

    use serde_json::json;

    use super::*;
    use crate::db::edges::EdgeInput;
    use crate::db::nodes::NodeInput;
    use crate::db::symptoms::{create_symptom, CreateSymptomInput};
    use crate::db::users::{create_user, CreateUserInput};

    pub fn node_input(key: &str, title: &str) -> NodeInput {
        NodeInput {
            id: None,
            key: key.to_string(),
            title: title.to_string(),
            summary: Some(format!("About {}", title)),
            video_url: None,
            is_root: key == "root",
            order_index: 0,
            pos_x: None,
            pos_y: None,
            categories: vec![],
        }
    }

    pub fn edge_input(
        parent: &str,
        child: &str,
        unlock_type: &str,
        value: Option<serde_json::Value>,
    ) -> EdgeInput {
        EdgeInput {
            id: None,
            parent_id: parent.to_string(),
            child_id: child.to_string(),
            unlock_type: unlock_type.to_string(),
            unlock_value: value,
            description: None,
            weight: None,
        }
    }

    pub fn tree_input(nodes: Vec<NodeInput>) -> SaveTreeInput {
        SaveTreeInput { nodes, edges: vec![] }
    }

    pub fn seed_tree(db: &Arc<TrackerDb>) {
        let mut soft = node_input("eat_soft", "Soft foods");
        soft.categories = vec!["nutrition".into()];

        let mut input = tree_input(vec![
            node_input("root", "Start here"),
            node_input("skin_wash", "Skin wash"),
            node_input("calendula", "Calendula"),
            node_input("tylenol", "Tylenol"),
            soft,
            node_input("mugard", "Mugard"),
            node_input("mugard_rinse", "Mugard rinse"),
        ]);

        let mut wash = edge_input("root", "skin_wash", "always", None);
        wash.weight = Some(-1);
        let mut manual = edge_input("root", "mugard", "manual", None);
        manual.description = Some("Ask your care team".into());
        input.edges = vec![
            wash,
            edge_input("skin_wash", "calendula", "symptom_match", Some(json!({"any": ["itch", "redness"]}))),
            edge_input("root", "tylenol", "symptom_match", Some(json!({"all": ["pain"]}))),
            edge_input("root", "eat_soft", "symptom_match", Some(json!({"any": ["sore_mouth"]}))),
            manual,
            edge_input("mugard", "mugard_rinse", "always", None),
        ];

        TreeService::new(db.clone()).save_tree(input).unwrap();

        db.with_conn(|conn| {
            for (key, label) in [("itch", "Itching"), ("redness", "Redness"), ("pain", "Pain"), ("sore_mouth", "Sore mouth")] {
                create_symptom(
                    conn,
                    CreateSymptomInput {
                        key: key.into(),
                        label: label.into(),
                        description: None,
                    },
                )?;
            }
            Ok(())
        })
        .unwrap();
    }

    pub fn seed_user(db: &Arc<TrackerDb>, email: &str) -> String {
        db.with_conn(|conn| {
            create_user(
                conn,
                CreateUserInput {
                    email: email.to_string(),
                    name: email.split('@').next().unwrap_or("patient").to_string(),
                    is_admin: false,
                    password_hash: None,
                },
            )
        })
        .unwrap()
        .id
    }
}
