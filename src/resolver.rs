//! Generator assignment resolution.
//!
//! Turns a question type and a requested tier into the provider and model to
//! call, given the set of providers whose circuits currently admit requests.
//! Resolution walks an explicit tier chain (`Primary`, `Fallback`, `Any`) from
//! the requested starting tier downward and returns the first tier that yields
//! an available provider.

use crate::assignment::{AssignmentTable, GeneratorAssignment};
use crate::config::QforgeConfig;
use crate::error::{ConfigurationError, ResolutionError};
use crate::types::{ModelId, ProviderId, Tier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub provider: ProviderId,
    /// `None` means the provider's own default model.
    pub model: Option<ModelId>,
    /// Tier of the chain that produced this resolution.
    pub satisfied_by: Tier,
}

/// Resolves (provider, model) pairs from the static assignment table.
#[derive(Debug, Clone)]
pub struct GeneratorAssignmentResolver {
    table: Arc<AssignmentTable>,
    provider_order: Vec<ProviderId>,
}

impl GeneratorAssignmentResolver {
    pub fn new(table: Arc<AssignmentTable>, provider_order: Vec<ProviderId>) -> Self {
        let provider_order = if provider_order.is_empty() {
            ProviderId::ALL.to_vec()
        } else {
            provider_order
        };
        Self {
            table,
            provider_order,
        }
    }

    pub fn from_config(config: &QforgeConfig) -> Result<Self, ConfigurationError> {
        let table = AssignmentTable::from_config(config)?;
        Ok(Self::new(Arc::new(table), config.routing.provider_order()?))
    }

    pub fn table(&self) -> &AssignmentTable {
        &self.table
    }

    pub fn provider_order(&self) -> &[ProviderId] {
        &self.provider_order
    }

    /// Resolve the provider and model for `question_type`.
    ///
    /// `Fallback` skips the primary provider when a fallback is configured; with
    /// no fallback configured it behaves like `Primary`. Every chain ends in
    /// `Any`, so a missing fallback never fails resolution by itself.
    pub fn resolve(
        &self,
        question_type: &str,
        tier: Tier,
        available: &BTreeSet<ProviderId>,
    ) -> Result<Resolution, ResolutionError> {
        let assignment = self
            .table
            .get(question_type)
            .ok_or_else(|| ResolutionError::UnknownQuestionType(question_type.to_string()))?;

        let start = match tier {
            Tier::Fallback if !assignment.has_fallback() => Tier::Primary,
            other => other,
        };

        start
            .chain()
            .iter()
            .find_map(|step| self.candidate(assignment, *step, available))
            .ok_or_else(|| ResolutionError::NoProviderAvailable(question_type.to_string()))
    }

    fn candidate(
        &self,
        assignment: &GeneratorAssignment,
        step: Tier,
        available: &BTreeSet<ProviderId>,
    ) -> Option<Resolution> {
        match step {
            Tier::Primary => available
                .contains(&assignment.primary_provider)
                .then(|| Resolution {
                    provider: assignment.primary_provider,
                    model: Some(assignment.primary_model.clone()),
                    satisfied_by: Tier::Primary,
                }),
            Tier::Fallback => assignment
                .fallback_provider
                .filter(|provider| available.contains(provider))
                .map(|provider| Resolution {
                    provider,
                    model: assignment.fallback_model.clone(),
                    satisfied_by: Tier::Fallback,
                }),
            Tier::Any => self
                .provider_order
                .iter()
                .copied()
                .find(|provider| available.contains(provider))
                .map(|provider| Resolution {
                    provider,
                    model: None,
                    satisfied_by: Tier::Any,
                }),
        }
    }
}
