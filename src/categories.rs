//! Treatment categories
//!
//! Nodes carry explicit category labels. Older trees have none, in which
//! case a single category is derived from the node key.

use serde::Serialize;

/// A category with its display label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Category {
    pub key: &'static str,
    pub label: &'static str,
}

pub const START: &str = "start";
pub const SKINCARE: &str = "skincare";
pub const NUTRITION: &str = "nutrition";
pub const ORAL_CARE: &str = "oral_care";
pub const PAIN: &str = "pain";

/// Every known category, in menu order
pub const CATEGORIES: [Category; 5] = [
    Category { key: START, label: "Start" },
    Category { key: SKINCARE, label: "Skincare" },
    Category { key: NUTRITION, label: "Nutrition" },
    Category { key: ORAL_CARE, label: "Oral Care" },
    Category { key: PAIN, label: "Pain" },
];

/// Look up a known category by key
pub fn find(key: &str) -> Option<Category> {
    CATEGORIES.iter().copied().find(|c| c.key == key)
}

pub fn is_known(key: &str) -> bool {
    find(key).is_some()
}

/// Category inferred from a node key when the node has no labels
pub fn category_for_node_key(key: &str) -> &'static str {
    if key == "root" {
        return START;
    }
    if key.starts_with("skin") || matches!(key, "calendula" | "silvadene" | "mepliex") {
        return SKINCARE;
    }
    if key.starts_with("eat") || key.contains("diet") || key.contains("tube") {
        return NUTRITION;
    }
    if key.contains("mugard") || matches!(key, "oral_care" | "supportive" | "apply_mugard_spot") {
        return ORAL_CARE;
    }
    PAIN
}

/// Explicit labels when present, otherwise the key-derived category
pub fn effective_categories(key: &str, explicit: &[String]) -> Vec<String> {
    if explicit.is_empty() {
        vec![category_for_node_key(key).to_string()]
    } else {
        explicit.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_fallback() {
        assert_eq!(category_for_node_key("root"), START);
        assert_eq!(category_for_node_key("skin_wash"), SKINCARE);
        assert_eq!(category_for_node_key("calendula"), SKINCARE);
        assert_eq!(category_for_node_key("eat_soft_foods"), NUTRITION);
        assert_eq!(category_for_node_key("liquid_diet"), NUTRITION);
        assert_eq!(category_for_node_key("feeding_tube"), NUTRITION);
        assert_eq!(category_for_node_key("mugard_rinse"), ORAL_CARE);
        assert_eq!(category_for_node_key("supportive"), ORAL_CARE);
        assert_eq!(category_for_node_key("tylenol"), PAIN);
    }

    #[test]
    fn test_explicit_labels_win() {
        let explicit = vec![PAIN.to_string(), NUTRITION.to_string()];
        assert_eq!(effective_categories("skin_wash", &explicit), explicit);
        assert_eq!(effective_categories("skin_wash", &[]), vec![SKINCARE.to_string()]);
    }

    #[test]
    fn test_lookup() {
        let labels: Vec<_> = CATEGORIES.iter().map(|c| c.label).collect();
        assert_eq!(labels, vec!["Start", "Skincare", "Nutrition", "Oral Care", "Pain"]);
        assert_eq!(find(ORAL_CARE).map(|c| c.label), Some("Oral Care"));
        assert!(is_known(PAIN));
        assert!(!is_known("dental"));
    }
}
