//! Unlock rules carried on edges
//!
//! The stored form is an `unlock_type` string plus an optional JSON payload.
//! It is decoded once, at load time, into [`UnlockRule`].

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::TrackerError;

pub const ALWAYS: &str = "always";
pub const MANUAL: &str = "manual";
pub const SYMPTOM_MATCH: &str = "symptom_match";

/// Condition under which a parent's child becomes available
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlockRule {
    /// Child unlocks as soon as the parent is unlocked
    Always,
    /// Child unlocks only by an administrator
    Manual,
    /// Child unlocks when reported symptoms satisfy both sets.
    /// An empty set is vacuously satisfied.
    SymptomMatch {
        any: BTreeSet<String>,
        all: BTreeSet<String>,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SymptomPayload {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    any: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    all: Vec<String>,
}

impl UnlockRule {
    /// Decode the stored representation
    pub fn decode(unlock_type: &str, value: Option<&Value>) -> Result<Self, TrackerError> {
        match unlock_type {
            ALWAYS => Ok(Self::Always),
            MANUAL => Ok(Self::Manual),
            SYMPTOM_MATCH => {
                let payload = match value {
                    None | Some(Value::Null) => SymptomPayload::default(),
                    Some(v @ Value::Object(_)) => serde_json::from_value(v.clone()).map_err(|e| {
                        TrackerError::BadRequest(format!("Invalid symptom rule: {}", e))
                    })?,
                    Some(other) => {
                        return Err(TrackerError::BadRequest(format!(
                            "Symptom rule must be an object, got {}",
                            other
                        )))
                    }
                };
                Ok(Self::SymptomMatch {
                    any: payload.any.into_iter().collect(),
                    all: payload.all.into_iter().collect(),
                })
            }
            other => Err(TrackerError::BadRequest(format!("Unknown unlock type: {}", other))),
        }
    }

    pub fn unlock_type(&self) -> &'static str {
        match self {
            Self::Always => ALWAYS,
            Self::Manual => MANUAL,
            Self::SymptomMatch { .. } => SYMPTOM_MATCH,
        }
    }

    /// Payload in stored form (`None` for rules without one)
    pub fn payload(&self) -> Option<Value> {
        match self {
            Self::SymptomMatch { any, all } => serde_json::to_value(SymptomPayload {
                any: any.iter().cloned().collect(),
                all: all.iter().cloned().collect(),
            })
            .ok(),
            _ => None,
        }
    }

    /// Whether a symptom report makes the child a candidate.
    ///
    /// `Always` edges qualify regardless of the report; `Manual` never does.
    pub fn matches_report(&self, reported: &HashSet<String>) -> bool {
        match self {
            Self::Always => true,
            Self::Manual => false,
            Self::SymptomMatch { any, all } => {
                let any_ok = any.is_empty() || any.iter().any(|k| reported.contains(k));
                let all_ok = all.iter().all(|k| reported.contains(k));
                any_ok && all_ok
            }
        }
    }

    /// Symptom keys the rule mentions
    pub fn symptom_keys(&self) -> impl Iterator<Item = &String> {
        let sets = match self {
            Self::SymptomMatch { any, all } => Some((any, all)),
            _ => None,
        };
        sets.into_iter().flat_map(|(any, all)| any.iter().chain(all.iter()))
    }
}

/// Who is asking for a single node unlock. Decides which edge types qualify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnlockAuthority {
    Patient,
    Admin,
}

impl UnlockAuthority {
    /// Whether an edge with this rule lets the caller unlock its child
    pub fn permits(&self, rule: &UnlockRule) -> bool {
        match rule {
            UnlockRule::Always | UnlockRule::SymptomMatch { .. } => true,
            UnlockRule::Manual => matches!(self, Self::Admin),
        }
    }
}
