//! Name → evaluator registry.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::EvaluatorError;
use crate::policy::Policy;

use super::{
    BasePermissionEvaluator, DelegationEvaluator, Evaluator, OwnerByRelationEvaluator, SelfEvaluator,
    SubordinatesEvaluator, UuidEvaluator,
};

/// Evaluators by registry name, populated at process start.
///
/// Dispatch is a map lookup; evaluators are shared stateless instances.
#[derive(Clone, Default)]
pub struct EvaluatorRegistry {
    evaluators: HashMap<String, Arc<dyn Evaluator>>,
}

impl EvaluatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with every evaluator that needs no wiring.
    pub fn with_builtin() -> Self {
        Self::new()
            .with(BasePermissionEvaluator)
            .with(UuidEvaluator)
            .with(SelfEvaluator)
            .with(OwnerByRelationEvaluator)
            .with(SubordinatesEvaluator)
            .with(DelegationEvaluator)
    }

    pub fn with(mut self, evaluator: impl Evaluator + 'static) -> Self {
        self.register(Arc::new(evaluator));
        self
    }

    pub fn register(&mut self, evaluator: Arc<dyn Evaluator>) {
        let name = evaluator.name().to_string();
        if self.evaluators.insert(name.clone(), evaluator).is_some() {
            tracing::warn!(evaluator = %name, "evaluator registered twice, last one wins");
        }
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Evaluator>, EvaluatorError> {
        self.evaluators
            .get(name)
            .cloned()
            .ok_or_else(|| EvaluatorError::UnknownEvaluator(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.evaluators.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.evaluators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Load-time check of a policy: evaluator exists, supports the policy's
    /// type, and accepts its properties.
    pub fn validate_policy(&self, policy: &Policy) -> Result<(), EvaluatorError> {
        let evaluator = self.get(&policy.evaluator)?;
        if !policy.authorizable_type.is_wildcard() && !evaluator.supports(&policy.authorizable_type) {
            return Err(EvaluatorError::UnsupportedType {
                evaluator: policy.evaluator.clone(),
                object_type: policy.authorizable_type.clone(),
            });
        }
        evaluator
            .validate_properties(&policy.properties)
            .map_err(|source| EvaluatorError::invalid_properties(evaluator.name(), source))
    }
}

impl core::fmt::Debug for EvaluatorRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EvaluatorRegistry")
            .field("evaluators", &self.names())
            .finish()
    }
}
