//! Generator assignment table: which provider and model produce each question type.
//!
//! Built once from validated configuration and shared read-only for the lifetime
//! of the process.

use crate::config::QforgeConfig;
use crate::error::ConfigurationError;
use crate::types::{ModelId, ProviderId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Primary and optional fallback generator for one question type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorAssignment {
    pub question_type: String,
    pub primary_provider: ProviderId,
    pub primary_model: ModelId,
    pub fallback_provider: Option<ProviderId>,
    /// `None` with a fallback provider set means "the fallback's default model".
    pub fallback_model: Option<ModelId>,
    /// Documentation only.
    pub rationale: String,
}

impl GeneratorAssignment {
    pub fn new(
        question_type: impl Into<String>,
        provider: ProviderId,
        model: impl Into<String>,
    ) -> Self {
        Self {
            question_type: question_type.into(),
            primary_provider: provider,
            primary_model: ModelId::new(model),
            fallback_provider: None,
            fallback_model: None,
            rationale: String::new(),
        }
    }

    pub fn with_fallback(mut self, provider: ProviderId, model: Option<&str>) -> Self {
        self.fallback_provider = Some(provider);
        self.fallback_model = model.map(ModelId::new);
        self
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback_provider.is_some()
    }
}

/// Immutable lookup table of generator assignments keyed by question type.
#[derive(Debug, Clone, Default)]
pub struct AssignmentTable {
    assignments: BTreeMap<String, GeneratorAssignment>,
}

impl AssignmentTable {
    /// Build the table from assignments, rejecting duplicate question types.
    pub fn new(
        assignments: impl IntoIterator<Item = GeneratorAssignment>,
    ) -> Result<Self, ConfigurationError> {
        let mut table = BTreeMap::new();
        for assignment in assignments {
            if assignment.fallback_model.is_some() && assignment.fallback_provider.is_none() {
                return Err(ConfigurationError::FallbackModelWithoutFallback(
                    assignment.question_type,
                ));
            }
            let key = assignment.question_type.clone();
            if table.insert(key.clone(), assignment).is_some() {
                return Err(ConfigurationError::InvalidGenerator(
                    key,
                    "question type assigned twice".to_string(),
                ));
            }
        }
        Ok(Self { assignments: table })
    }

    /// Build the table from the `generators` section of a validated config.
    pub fn from_config(config: &QforgeConfig) -> Result<Self, ConfigurationError> {
        config.ensure_valid()?;
        let assignments = config
            .generators
            .iter()
            .map(|(question_type, generator)| generator.to_assignment(question_type))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(assignments)
    }

    pub fn get(&self, question_type: &str) -> Option<&GeneratorAssignment> {
        self.assignments.get(question_type)
    }

    pub fn contains(&self, question_type: &str) -> bool {
        self.assignments.contains_key(question_type)
    }

    pub fn question_types(&self) -> impl Iterator<Item = &str> {
        self.assignments.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GeneratorAssignment> {
        self.assignments.values()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}
