//! Identities below the principal in the reporting hierarchy.

use crate::condition::{Condition, ConditionBuilder, QueryContext};
use crate::context::EvaluationContext;
use crate::error::EvaluatorError;
use crate::hierarchy::SubordinatesFilter;
use crate::object::{AuthorizableType, Record};
use crate::permissions::{Permission, PermissionSet};
use crate::policy::Policy;
use crate::properties::{PropertyDefinition, PropertyKind};

use super::{Evaluator, grant_if};

/// Grants on identities related to the principal through a registered
/// [`RelationFilter`](crate::hierarchy::RelationFilter), by default the
/// manager hierarchy.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubordinatesEvaluator;

impl SubordinatesEvaluator {
    pub const NAME: &'static str = "subordinates";
    pub const PARAMETER_FILTER: &'static str = "filter";

    const SCHEMA: &'static [PropertyDefinition] =
        &[PropertyDefinition::optional(Self::PARAMETER_FILTER, PropertyKind::Text)];

    fn filter_name(policy: &Policy) -> &str {
        policy.properties.text_or(Self::PARAMETER_FILTER, SubordinatesFilter::NAME)
    }
}

impl Evaluator for SubordinatesEvaluator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn supported_type(&self) -> AuthorizableType {
        AuthorizableType::IDENTITY
    }

    fn property_schema(&self) -> &[PropertyDefinition] {
        Self::SCHEMA
    }

    fn permissions_for(
        &self,
        ctx: &EvaluationContext<'_>,
        object: Option<&Record>,
        policy: &Policy,
    ) -> Result<PermissionSet, EvaluatorError> {
        let filter = ctx.relation_filter(Self::filter_name(policy))?;
        let Some(object) = object else {
            return Ok(PermissionSet::new());
        };
        Ok(grant_if(filter.is_related(ctx.principal_id(), object)?, policy))
    }

    fn predicate_for(
        &self,
        ctx: &EvaluationContext<'_>,
        query: &QueryContext,
        builder: &mut ConditionBuilder,
        policy: &Policy,
        permissions: &[Permission],
    ) -> Result<Option<Condition>, EvaluatorError> {
        let filter = ctx.relation_filter(Self::filter_name(policy))?;
        if !policy.grants(permissions) {
            return Ok(None);
        }
        Ok(Some(filter.predicate(ctx.principal_id(), query, builder)?))
    }
}
