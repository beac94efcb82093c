//! Self access: the object references the principal directly.

use crate::condition::{Condition, ConditionBuilder, Operand, QueryContext};
use crate::context::EvaluationContext;
use crate::error::EvaluatorError;
use crate::object::{AuthorizableType, ID_ATTRIBUTE, Record};
use crate::permissions::{Permission, PermissionSet};
use crate::policy::Policy;
use crate::properties::{PropertyDefinition, PropertyKind};

use super::{Evaluator, grant_if};

/// Grants when `object.<attribute>` is the principal.
///
/// With the default attribute (`id`) this is "my own identity"; with e.g.
/// `owner` it is "objects I own".
#[derive(Debug, Default, Clone, Copy)]
pub struct SelfEvaluator;

impl SelfEvaluator {
    pub const NAME: &'static str = "self";
    pub const PARAMETER_ATTRIBUTE: &'static str = "attribute";

    const SCHEMA: &'static [PropertyDefinition] =
        &[PropertyDefinition::optional(Self::PARAMETER_ATTRIBUTE, PropertyKind::Text)];

    fn attribute(policy: &Policy) -> &str {
        policy.properties.text_or(Self::PARAMETER_ATTRIBUTE, ID_ATTRIBUTE)
    }
}

impl Evaluator for SelfEvaluator {
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
        let attribute = Self::attribute(policy);
        Ok(grant_if(
            object.is_some_and(|o| o.references_principal(attribute, ctx.principal_id())),
            policy,
        ))
    }

    fn predicate_for(
        &self,
        ctx: &EvaluationContext<'_>,
        query: &QueryContext,
        _builder: &mut ConditionBuilder,
        policy: &Policy,
        permissions: &[Permission],
    ) -> Result<Option<Condition>, EvaluatorError> {
        if !policy.grants(permissions) {
            return Ok(None);
        }
        Ok(Some(Condition::eq(
            query.row.attr(Self::attribute(policy)),
            Operand::value(ctx.principal_id()),
        )))
    }

    /// Only "my own identity" is guaranteed to exist for every principal.
    fn authorities_for(
        &self,
        _ctx: &EvaluationContext<'_>,
        policy: &Policy,
    ) -> Result<PermissionSet, EvaluatorError> {
        let own_identity = Self::attribute(policy) == ID_ATTRIBUTE
            && policy.authorizable_type.covers(&AuthorizableType::IDENTITY);
        Ok(grant_if(own_identity, policy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::test_support::{Fixture, arb_references};
    use crate::permissions::base::*;
    use idgov_core::ObjectId;
    use proptest::prelude::*;

    #[test]
    fn own_identity_is_granted() {
        let fx = Fixture::new();
        let me = fx.insert(Record::new(AuthorizableType::IDENTITY, fx.principal.into()));
        let other = fx.insert(Record::new(AuthorizableType::IDENTITY, ObjectId::new()));
        let policy = fx.policy(AuthorizableType::IDENTITY, SelfEvaluator::NAME, [READ, UPDATE]);

        assert!(fx.permissions(&SelfEvaluator, &policy, &me).permits_all(&[READ, UPDATE]));
        assert!(fx.permissions(&SelfEvaluator, &policy, &other).is_empty());
        fx.assert_agrees(&SelfEvaluator, &policy, &[me, other], &[READ]);
    }

    #[test]
    fn pre_creation_check_grants_nothing() {
        let fx = Fixture::new();
        let policy = fx.policy(AuthorizableType::IDENTITY, SelfEvaluator::NAME, [CREATE]);
        let granted = fx
            .with_ctx(|ctx| SelfEvaluator.permissions_for(ctx, None, &policy))
            .unwrap();
        assert!(granted.is_empty());
    }

    #[test]
    fn authorities_only_for_own_identity() {
        let fx = Fixture::new();
        let own = fx.policy(AuthorizableType::IDENTITY, SelfEvaluator::NAME, [READ]);
        let owned = fx
            .policy(AuthorizableType::new("ACCOUNT"), SelfEvaluator::NAME, [READ])
            .with_property(SelfEvaluator::PARAMETER_ATTRIBUTE, "owner");

        let a = fx.with_ctx(|ctx| SelfEvaluator.authorities_for(ctx, &own)).unwrap();
        let b = fx.with_ctx(|ctx| SelfEvaluator.authorities_for(ctx, &owned)).unwrap();
        assert!(a.permits(&READ));
        assert!(b.is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Property: predicate and imperative check agree on "owner" references.
        #[test]
        fn owner_attribute_agrees(refs in arb_references(12)) {
            let fx = Fixture::new();
            let account = AuthorizableType::new("ACCOUNT");
            let rows = fx.insert_referencing(&account, "owner", &refs);
            let policy = fx
                .policy(account, SelfEvaluator::NAME, [READ, UPDATE])
                .with_property(SelfEvaluator::PARAMETER_ATTRIBUTE, "owner");

            for requested in [vec![READ], vec![READ, UPDATE], vec![DELETE]] {
                prop_assert_eq!(fx.disagreements(&SelfEvaluator, &policy, &rows, &requested), Vec::<String>::new());
            }
        }
    }
}
