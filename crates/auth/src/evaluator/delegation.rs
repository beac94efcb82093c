//! Delegation records: one identity acts on behalf of another.
//!
//! A `DELEGATION` row carries a `delegate` and a `delegator` identity. A
//! principal on the configured side gets the policy's grant on the row,
//! provided it independently holds `required_permission` on the identity at
//! the other end. That second check goes back through the manager, so it
//! honours every identity policy of the principal.

use core::str::FromStr;

use crate::condition::{Condition, ConditionBuilder, Operand, QueryContext};
use crate::context::EvaluationContext;
use crate::error::EvaluatorError;
use crate::object::{AuthorizableType, Record};
use crate::permissions::{Permission, PermissionSet, base};
use crate::policy::Policy;
use crate::properties::{EvaluatorProperties, PropertyDefinition, PropertyError, PropertyKind};

use super::{Evaluator, grant_if, required_text};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegationSide {
    Delegate,
    Delegator,
}

impl DelegationSide {
    pub const DELEGATE: &'static str = "delegate";
    pub const DELEGATOR: &'static str = "delegator";

    /// Attribute of the delegation row holding this side's identity.
    pub fn attribute(self) -> &'static str {
        match self {
            DelegationSide::Delegate => Self::DELEGATE,
            DelegationSide::Delegator => Self::DELEGATOR,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            DelegationSide::Delegate => DelegationSide::Delegator,
            DelegationSide::Delegator => DelegationSide::Delegate,
        }
    }
}

impl FromStr for DelegationSide {
    type Err = PropertyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            Self::DELEGATE => Ok(DelegationSide::Delegate),
            Self::DELEGATOR => Ok(DelegationSide::Delegator),
            other => Err(PropertyError::InvalidValue {
                name: DelegationEvaluator::PARAMETER_SIDE.to_string(),
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DelegationEvaluator;

struct DelegationConfig {
    side: DelegationSide,
    required: Permission,
    counterparty_type: AuthorizableType,
}

impl DelegationEvaluator {
    pub const NAME: &'static str = "delegation";
    pub const PARAMETER_SIDE: &'static str = "side";
    pub const PARAMETER_REQUIRED_PERMISSION: &'static str = "required_permission";
    pub const PARAMETER_COUNTERPARTY_TYPE: &'static str = "counterparty_type";

    pub const DELEGATION_TYPE: AuthorizableType = AuthorizableType::from_static("DELEGATION");

    const SCHEMA: &'static [PropertyDefinition] = &[
        PropertyDefinition::required(Self::PARAMETER_SIDE, PropertyKind::Text),
        PropertyDefinition::optional(Self::PARAMETER_REQUIRED_PERMISSION, PropertyKind::Permission),
        PropertyDefinition::optional(Self::PARAMETER_COUNTERPARTY_TYPE, PropertyKind::Text),
    ];

    fn config(policy: &Policy) -> Result<DelegationConfig, EvaluatorError> {
        let side = required_text(Self::NAME, policy, Self::PARAMETER_SIDE)?
            .parse::<DelegationSide>()
            .map_err(|source| EvaluatorError::invalid_properties(Self::NAME, source))?;
        let properties = &policy.properties;
        Ok(DelegationConfig {
            side,
            required: properties
                .permission(Self::PARAMETER_REQUIRED_PERMISSION)
                .unwrap_or(base::READ),
            counterparty_type: properties
                .text(Self::PARAMETER_COUNTERPARTY_TYPE)
                .map_or(AuthorizableType::IDENTITY, |t| AuthorizableType::new(t.to_string())),
        })
    }
}

impl Evaluator for DelegationEvaluator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn supported_type(&self) -> AuthorizableType {
        Self::DELEGATION_TYPE
    }

    fn property_schema(&self) -> &[PropertyDefinition] {
        Self::SCHEMA
    }

    fn validate_properties(&self, properties: &EvaluatorProperties) -> Result<(), PropertyError> {
        properties.validate(Self::SCHEMA)?;
        if let Some(side) = properties.text(Self::PARAMETER_SIDE) {
            side.parse::<DelegationSide>()?;
        }
        Ok(())
    }

    fn permissions_for(
        &self,
        ctx: &EvaluationContext<'_>,
        object: Option<&Record>,
        policy: &Policy,
    ) -> Result<PermissionSet, EvaluatorError> {
        let config = Self::config(policy)?;
        let Some(delegation) = object else {
            return Ok(PermissionSet::new());
        };
        if !delegation.references_principal(config.side.attribute(), ctx.principal_id()) {
            return Ok(PermissionSet::new());
        }
        let Some(counterparty_id) = delegation.reference(config.side.opposite().attribute()) else {
            return Ok(PermissionSet::new());
        };
        let Some(counterparty) = ctx.lookup().find(&config.counterparty_type, counterparty_id)? else {
            tracing::debug!(
                delegation_id = %delegation.id,
                counterparty_id = %counterparty_id,
                "delegation counterparty not found"
            );
            return Ok(PermissionSet::new());
        };

        let held = ctx.permissions_of(&counterparty)?;
        Ok(grant_if(held.permits(&config.required), policy))
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

        let on_side = Condition::eq(
            query.row.attr(config.side.attribute()),
            Operand::value(ctx.principal_id()),
        );
        let counter_attribute = config.side.opposite().attribute();
        let counterparty = builder.exists("cp", config.counterparty_type.clone(), |builder, cp| {
            let held = ctx.filter_for(
                &QueryContext::new(cp.clone(), config.counterparty_type.clone()),
                builder,
                std::slice::from_ref(&config.required),
            )?;
            Ok::<_, EvaluatorError>(Condition::and([
                Condition::eq(cp.id(), query.row.attr(counter_attribute)),
                held,
            ]))
        })?;
        Ok(Some(Condition::and([on_side, counterparty])))
    }
}
