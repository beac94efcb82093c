//! Evaluators that look at nothing but the object itself.

use crate::condition::{Condition, ConditionBuilder, Operand, QueryContext};
use crate::context::EvaluationContext;
use crate::error::EvaluatorError;
use crate::object::Record;
use crate::permissions::{Permission, PermissionSet};
use crate::policy::Policy;
use crate::properties::{PropertyDefinition, PropertyKind};

use super::{Evaluator, grant_if, required_id};

/// Grants the policy's permissions on every object of its type.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasePermissionEvaluator;

impl BasePermissionEvaluator {
    pub const NAME: &'static str = "base-permission";
}

impl Evaluator for BasePermissionEvaluator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn permissions_for(
        &self,
        _ctx: &EvaluationContext<'_>,
        _object: Option<&Record>,
        policy: &Policy,
    ) -> Result<PermissionSet, EvaluatorError> {
        Ok(policy.permissions.clone())
    }

    fn predicate_for(
        &self,
        _ctx: &EvaluationContext<'_>,
        _query: &QueryContext,
        _builder: &mut ConditionBuilder,
        policy: &Policy,
        permissions: &[Permission],
    ) -> Result<Option<Condition>, EvaluatorError> {
        Ok(policy.grants(permissions).then_some(Condition::True))
    }

    fn authorities_for(
        &self,
        _ctx: &EvaluationContext<'_>,
        policy: &Policy,
    ) -> Result<PermissionSet, EvaluatorError> {
        Ok(policy.permissions.clone())
    }
}

/// Grants the policy's permissions on the single object named by `uuid`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidEvaluator;

impl UuidEvaluator {
    pub const NAME: &'static str = "uuid";
    pub const PARAMETER_UUID: &'static str = "uuid";

    const SCHEMA: &'static [PropertyDefinition] =
        &[PropertyDefinition::required(Self::PARAMETER_UUID, PropertyKind::Id)];
}

impl Evaluator for UuidEvaluator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn property_schema(&self) -> &[PropertyDefinition] {
        Self::SCHEMA
    }

    fn permissions_for(
        &self,
        _ctx: &EvaluationContext<'_>,
        object: Option<&Record>,
        policy: &Policy,
    ) -> Result<PermissionSet, EvaluatorError> {
        let target = required_id(Self::NAME, policy, Self::PARAMETER_UUID)?;
        Ok(grant_if(
            object.is_some_and(|o| *o.id.as_uuid() == target),
            policy,
        ))
    }

    fn predicate_for(
        &self,
        _ctx: &EvaluationContext<'_>,
        query: &QueryContext,
        _builder: &mut ConditionBuilder,
        policy: &Policy,
        permissions: &[Permission],
    ) -> Result<Option<Condition>, EvaluatorError> {
        let target = required_id(Self::NAME, policy, Self::PARAMETER_UUID)?;
        if !policy.grants(permissions) {
            return Ok(None);
        }
        Ok(Some(Condition::eq(query.row.id(), Operand::value(target))))
    }
}
