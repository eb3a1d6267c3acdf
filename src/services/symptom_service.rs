//! Symptom service - the catalogue of reportable symptoms

use std::sync::Arc;

use tracing::info;

use crate::db::symptoms::{self, CreateSymptomInput};
use crate::db::{SymptomRow, TrackerDb};
use crate::types::TrackerError;

pub struct SymptomService {
    db: Arc<TrackerDb>,
}

impl SymptomService {
    pub fn new(db: Arc<TrackerDb>) -> Self {
        Self { db }
    }

    pub fn list(&self) -> Result<Vec<SymptomRow>, TrackerError> {
        self.db.with_conn(symptoms::list_symptoms)
    }

    /// Keys are slugs: lower-case letters, digits and underscores
    pub fn create(&self, input: CreateSymptomInput) -> Result<SymptomRow, TrackerError> {
        let key = input.key.trim();
        if key.is_empty()
            || !key
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(TrackerError::BadRequest(
                "Symptom key must be lower-case letters, digits or underscores".to_string(),
            ));
        }
        if input.label.trim().is_empty() {
            return Err(TrackerError::BadRequest("Symptom label is required".to_string()));
        }

        let symptom = self.db.with_conn(|conn| symptoms::create_symptom(conn, input))?;
        info!(key = %symptom.key, "Created symptom");
        Ok(symptom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(key: &str, label: &str) -> CreateSymptomInput {
        CreateSymptomInput {
            key: key.to_string(),
            label: label.to_string(),
            description: None,
        }
    }

    #[test]
    fn test_create_validates_key_and_label() {
        let service = SymptomService::new(Arc::new(TrackerDb::open_in_memory().unwrap()));

        assert!(service.create(input("dry_mouth", "Dry mouth")).is_ok());
        assert!(matches!(service.create(input("Dry Mouth", "x")), Err(TrackerError::BadRequest(_))));
        assert!(matches!(service.create(input("", "x")), Err(TrackerError::BadRequest(_))));
        assert!(matches!(service.create(input("ok", " ")), Err(TrackerError::BadRequest(_))));
        assert!(matches!(service.create(input("dry_mouth", "Again")), Err(TrackerError::Conflict(_))));

        assert_eq!(service.list().unwrap().len(), 1);
    }
}
