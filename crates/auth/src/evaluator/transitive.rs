//! Transitive evaluators: borrow the decision of an owner object.
//!
//! Used for types with no ownership signal of their own, e.g. a link row
//! whose real owner is the identity or contract it points at. The grant on
//! the object is whatever the principal holds on the owner, capped by the
//! policy.

use crate::condition::{Condition, ConditionBuilder, QueryContext};
use crate::context::EvaluationContext;
use crate::error::EvaluatorError;
use crate::object::{AuthorizableType, Record};
use crate::permissions::{Permission, PermissionSet};
use crate::policy::Policy;

use super::Evaluator;

/// Locates the owner of an object.
pub trait OwnerResolver: Send + Sync {
    fn owner_type(&self) -> &AuthorizableType;

    /// Attribute of the owned object referencing the owner's id.
    fn owner_attribute(&self) -> &str;

    /// `None` when the reference is unset or dangling. Never an error for
    /// that reason alone.
    fn owner(
        &self,
        ctx: &EvaluationContext<'_>,
        object: &Record,
    ) -> Result<Option<Record>, EvaluatorError> {
        let Some(owner_id) = object.reference(self.owner_attribute()) else {
            return Ok(None);
        };
        Ok(ctx.lookup().find(self.owner_type(), owner_id)?)
    }
}

/// Owner referenced by a plain attribute.
#[derive(Debug, Clone)]
pub struct AttributeOwner {
    owner_type: AuthorizableType,
    attribute: String,
}

impl AttributeOwner {
    pub fn new(owner_type: AuthorizableType, attribute: impl Into<String>) -> Self {
        Self {
            owner_type,
            attribute: attribute.into(),
        }
    }
}

impl OwnerResolver for AttributeOwner {
    fn owner_type(&self) -> &AuthorizableType {
        &self.owner_type
    }

    fn owner_attribute(&self) -> &str {
        &self.attribute
    }
}

/// Evaluator deferring to the principal's aggregate permissions on the owner.
#[derive(Debug, Clone)]
pub struct TransitiveEvaluator<R> {
    name: String,
    supported: AuthorizableType,
    resolver: R,
}

impl<R: OwnerResolver> TransitiveEvaluator<R> {
    pub fn new(name: impl Into<String>, supported: AuthorizableType, resolver: R) -> Self {
        Self {
            name: name.into(),
            supported,
            resolver,
        }
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }
}

impl TransitiveEvaluator<AttributeOwner> {
    /// `supported` objects owned through `attribute` by an `owner_type` object.
    pub fn by_attribute(
        name: impl Into<String>,
        supported: AuthorizableType,
        owner_type: AuthorizableType,
        attribute: impl Into<String>,
    ) -> Self {
        Self::new(name, supported, AttributeOwner::new(owner_type, attribute))
    }
}

impl<R: OwnerResolver> Evaluator for TransitiveEvaluator<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_type(&self) -> AuthorizableType {
        self.supported.clone()
    }

    fn permissions_for(
        &self,
        ctx: &EvaluationContext<'_>,
        object: Option<&Record>,
        policy: &Policy,
    ) -> Result<PermissionSet, EvaluatorError> {
        let Some(object) = object else {
            return Ok(PermissionSet::new());
        };
        let Some(owner) = self.resolver.owner(ctx, object)? else {
            return Ok(PermissionSet::new());
        };
        Ok(ctx.permissions_of(&owner)?.restrict_to(&policy.permissions))
    }

    fn predicate_for(
        &self,
        ctx: &EvaluationContext<'_>,
        query: &QueryContext,
        builder: &mut ConditionBuilder,
        policy: &Policy,
        permissions: &[Permission],
    ) -> Result<Option<Condition>, EvaluatorError> {
        if !policy.grants(permissions) {
            return Ok(None);
        }
        let owner_type = self.resolver.owner_type();
        let owner_attribute = self.resolver.owner_attribute();
        let condition = builder.exists("owner", owner_type.clone(), |builder, owner| {
            let held = ctx.filter_for(
                &QueryContext::new(owner.clone(), owner_type.clone()),
                builder,
                permissions,
            )?;
            Ok::<_, EvaluatorError>(Condition::and([
                Condition::eq(owner.id(), query.row.attr(owner_attribute)),
                held,
            ]))
        })?;
        Ok(Some(condition))
    }
}
