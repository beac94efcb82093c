//! Evaluator contract.
//!
//! An evaluator is a stateless strategy deciding what one policy grants.
//! It answers the same question two ways:
//!
//! ```text
//! permissions_for(o, policy)        -> granted set for one object
//! predicate_for(row, policy, P)     -> condition true exactly for the rows
//!                                      whose granted set permits all of P
//! ```
//!
//! Both paths must agree for every object. Bulk filtering and single-object
//! checks are interchangeable only because of that.

pub mod basic;
pub mod delegation;
pub mod registry;
pub mod relation;
pub mod self_access;
pub mod subordinates;
pub mod transitive;

pub use basic::{BasePermissionEvaluator, UuidEvaluator};
pub use delegation::{DelegationEvaluator, DelegationSide};
pub use registry::EvaluatorRegistry;
pub use relation::OwnerByRelationEvaluator;
pub use self_access::SelfEvaluator;
pub use subordinates::SubordinatesEvaluator;
pub use transitive::{AttributeOwner, OwnerResolver, TransitiveEvaluator};

use uuid::Uuid;

use crate::condition::{Condition, ConditionBuilder, QueryContext};
use crate::context::EvaluationContext;
use crate::error::EvaluatorError;
use crate::object::{AuthorizableType, Record};
use crate::permissions::{Permission, PermissionSet};
use crate::policy::Policy;
use crate::properties::{EvaluatorProperties, PropertyDefinition, PropertyError};

pub trait Evaluator: Send + Sync {
    /// Registry identifier referenced by policies.
    fn name(&self) -> &str;

    /// Type this evaluator understands; the wildcard means any type.
    fn supported_type(&self) -> AuthorizableType {
        AuthorizableType::WILDCARD
    }

    fn property_schema(&self) -> &[PropertyDefinition] {
        &[]
    }

    fn validate_properties(&self, properties: &EvaluatorProperties) -> Result<(), PropertyError> {
        properties.validate(self.property_schema())
    }

    fn supports(&self, object_type: &AuthorizableType) -> bool {
        self.supported_type().covers(object_type)
    }

    /// Subset of the policy's permissions confirmed for `object`.
    ///
    /// `None` is a pre-creation check. Not matching is an empty set, never
    /// an error.
    fn permissions_for(
        &self,
        ctx: &EvaluationContext<'_>,
        object: Option<&Record>,
        policy: &Policy,
    ) -> Result<PermissionSet, EvaluatorError>;

    /// Condition over `query.row` true exactly where `permissions_for`
    /// permits every permission in `permissions`.
    ///
    /// `None` contributes nothing: the caller excludes every row for this
    /// policy.
    fn predicate_for(
        &self,
        ctx: &EvaluationContext<'_>,
        query: &QueryContext,
        builder: &mut ConditionBuilder,
        policy: &Policy,
        permissions: &[Permission],
    ) -> Result<Option<Condition>, EvaluatorError>;

    /// Object-less grant for capability display (menus, buttons).
    ///
    /// Anything returned here must be reachable for at least one real object.
    fn authorities_for(
        &self,
        _ctx: &EvaluationContext<'_>,
        _policy: &Policy,
    ) -> Result<PermissionSet, EvaluatorError> {
        Ok(PermissionSet::new())
    }
}

/// The policy's whole grant when `matched`, nothing otherwise.
pub(crate) fn grant_if(matched: bool, policy: &Policy) -> PermissionSet {
    if matched {
        policy.permissions.clone()
    } else {
        PermissionSet::new()
    }
}

pub(crate) fn required_text<'p>(
    evaluator: &str,
    policy: &'p Policy,
    name: &str,
) -> Result<&'p str, EvaluatorError> {
    policy
        .properties
        .text(name)
        .ok_or_else(|| EvaluatorError::invalid_properties(evaluator, PropertyError::Missing(name.into())))
}

pub(crate) fn required_id(evaluator: &str, policy: &Policy, name: &str) -> Result<Uuid, EvaluatorError> {
    policy
        .properties
        .id(name)
        .ok_or_else(|| EvaluatorError::invalid_properties(evaluator, PropertyError::Missing(name.into())))
}

#[cfg(test)]
pub(crate) mod test_support;
