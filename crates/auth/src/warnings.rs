//! Standing configuration warnings.
//!
//! A policy whose evaluator cannot run (unknown name, bad properties, ...)
//! is skipped during evaluation. Skipping alone would hide the problem
//! forever, so the manager also records it here until an administrator
//! clears it.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use idgov_core::PolicyId;

use crate::error::EvaluatorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    UnknownEvaluator,
    InvalidProperties,
    UnsupportedType,
    UnknownRelationFilter,
    RecursionLimit,
}

impl WarningKind {
    fn of(error: &EvaluatorError) -> Option<Self> {
        match error {
            EvaluatorError::UnknownEvaluator(_) => Some(Self::UnknownEvaluator),
            EvaluatorError::InvalidProperties { .. } => Some(Self::InvalidProperties),
            EvaluatorError::UnsupportedType { .. } => Some(Self::UnsupportedType),
            EvaluatorError::UnknownRelationFilter(_) => Some(Self::UnknownRelationFilter),
            EvaluatorError::RecursionLimit { .. } => Some(Self::RecursionLimit),
            EvaluatorError::Collaborator(_) | EvaluatorError::Nested(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigurationWarning {
    pub policy_id: PolicyId,
    pub evaluator: String,
    pub kind: WarningKind,
    pub message: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub occurrences: u64,
}

#[derive(Debug, Default)]
pub struct WarningBoard {
    warnings: RwLock<BTreeMap<PolicyId, ConfigurationWarning>>,
}

impl WarningBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a configuration error. Transient errors are ignored.
    pub fn record(&self, policy_id: PolicyId, evaluator: &str, error: &EvaluatorError) {
        let Some(kind) = WarningKind::of(error) else {
            return;
        };
        let now = Utc::now();
        let mut warnings = self.warnings.write().unwrap_or_else(PoisonError::into_inner);
        warnings
            .entry(policy_id)
            .and_modify(|w| {
                w.kind = kind;
                w.message = error.to_string();
                w.last_seen = now;
                w.occurrences += 1;
            })
            .or_insert_with(|| ConfigurationWarning {
                policy_id,
                evaluator: evaluator.to_string(),
                kind,
                message: error.to_string(),
                first_seen: now,
                last_seen: now,
                occurrences: 1,
            });
    }

    pub fn snapshot(&self) -> Vec<ConfigurationWarning> {
        let warnings = self.warnings.read().unwrap_or_else(PoisonError::into_inner);
        warnings.values().cloned().collect()
    }

    pub fn clear(&self, policy_id: PolicyId) -> Option<ConfigurationWarning> {
        let mut warnings = self.warnings.write().unwrap_or_else(PoisonError::into_inner);
        warnings.remove(&policy_id)
    }

    pub fn clear_all(&self) {
        let mut warnings = self.warnings.write().unwrap_or_else(PoisonError::into_inner);
        warnings.clear();
    }
}
