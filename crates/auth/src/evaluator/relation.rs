//! Ownership through a relation (join) type.
//!
//! Typical use: an account is "mine" when an identity-account link row
//! connects it to my identity.

use crate::condition::{Condition, ConditionBuilder, Operand, QueryContext};
use crate::context::EvaluationContext;
use crate::error::EvaluatorError;
use crate::object::{AttrValue, AuthorizableType, Record};
use crate::permissions::{Permission, PermissionSet};
use crate::policy::Policy;
use crate::properties::{PropertyDefinition, PropertyKind};

use super::{Evaluator, required_text};

/// Grants when some `relation_type` row has `target_attribute` = object
/// and `owner_attribute` = principal.
#[derive(Debug, Default, Clone, Copy)]
pub struct OwnerByRelationEvaluator;

struct RelationConfig<'p> {
    relation_type: AuthorizableType,
    target_attribute: &'p str,
    owner_attribute: &'p str,
}

impl OwnerByRelationEvaluator {
    pub const NAME: &'static str = "owner-by-relation";
    pub const PARAMETER_RELATION_TYPE: &'static str = "relation_type";
    pub const PARAMETER_TARGET_ATTRIBUTE: &'static str = "target_attribute";
    pub const PARAMETER_OWNER_ATTRIBUTE: &'static str = "owner_attribute";

    const SCHEMA: &'static [PropertyDefinition] = &[
        PropertyDefinition::required(Self::PARAMETER_RELATION_TYPE, PropertyKind::Text),
        PropertyDefinition::required(Self::PARAMETER_TARGET_ATTRIBUTE, PropertyKind::Text),
        PropertyDefinition::required(Self::PARAMETER_OWNER_ATTRIBUTE, PropertyKind::Text),
    ];

    fn config(policy: &Policy) -> Result<RelationConfig<'_>, EvaluatorError> {
        Ok(RelationConfig {
            relation_type: AuthorizableType::new(
                required_text(Self::NAME, policy, Self::PARAMETER_RELATION_TYPE)?.to_string(),
            ),
            target_attribute: required_text(Self::NAME, policy, Self::PARAMETER_TARGET_ATTRIBUTE)?,
            owner_attribute: required_text(Self::NAME, policy, Self::PARAMETER_OWNER_ATTRIBUTE)?,
        })
    }
}

impl Evaluator for OwnerByRelationEvaluator {
    fn name(&self) -> &str {
        Self::NAME
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
        let config = Self::config(policy)?;
        let Some(object) = object else {
            return Ok(PermissionSet::new());
        };

        let relations = ctx.lookup().find_by_attribute(
            &config.relation_type,
            config.target_attribute,
            &AttrValue::from(object.id),
        )?;

        let mut granted = PermissionSet::new();
        for relation in relations
            .iter()
            .filter(|r| r.references_principal(config.owner_attribute, ctx.principal_id()))
        {
            tracing::trace!(relation_id = %relation.id, object_id = %object.id, "owning relation found");
            granted.union_with(&policy.permissions);
        }
        Ok(granted)
    }

    fn predicate_for(
        &self,
        ctx: &EvaluationContext<'_>,
        query: &QueryContext,
        builder: &mut ConditionBuilder,
        policy: &Policy,
        permissions: &[Permission],
    ) -> Result<Option<Condition>, EvaluatorError> {
        let config = Self::config(policy)?;
        if !policy.grants(permissions) {
            return Ok(None);
        }
        let principal = ctx.principal_id();
        builder
            .exists("rel", config.relation_type, |_, rel| {
                Ok(Condition::and([
                    Condition::eq(rel.attr(config.target_attribute), query.row.id()),
                    Condition::eq(rel.attr(config.owner_attribute), Operand::value(principal)),
                ]))
            })
            .map(Some)
    }
}
