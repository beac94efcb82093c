//! Authorization manager: policy lookup, evaluator dispatch, aggregation.
//!
//! - OR across policies: any applicable policy may contribute a grant.
//! - AND across requested permissions, tested against the union of grants.
//!
//! Failures local to one policy never abort the others; that policy simply
//! contributes nothing. Only failing to resolve the principal's roles or the
//! policy set is reported to the caller.

use std::collections::BTreeSet;
use std::sync::Arc;

use idgov_core::{ObjectId, PrincipalId, RoleId};

use crate::cache::{DecisionKey, Dependencies, InMemoryPermissionCache, PermissionCache};
use crate::condition::{Condition, ConditionBuilder, QueryContext};
use crate::config::AuthorizationConfig;
use crate::context::EvaluationContext;
use crate::error::{AuthorizationError, CollaboratorError, EvaluatorError};
use crate::evaluator::{Evaluator, EvaluatorRegistry};
use crate::hierarchy::RelationFilterRegistry;
use crate::lookup::ObjectLookup;
use crate::object::{AuthorizableType, Record};
use crate::permissions::{GroupPermissionRegistry, Permission, PermissionSet};
use crate::policy::{DuplicatePolicy, Policy, dedupe, find_duplicates};
use crate::principal::PrincipalContext;
use crate::roles::RoleProvider;
use crate::store::PolicyStore;
use crate::warnings::{ConfigurationWarning, WarningBoard};

/// What a check is about: an existing object, or a type before creation.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    Object(&'a Record),
    New(&'a AuthorizableType),
}

impl<'a> Target<'a> {
    pub fn object_type(&self) -> &'a AuthorizableType {
        match *self {
            Target::Object(record) => &record.object_type,
            Target::New(object_type) => object_type,
        }
    }

    pub fn object(&self) -> Option<&'a Record> {
        match *self {
            Target::Object(record) => Some(record),
            Target::New(_) => None,
        }
    }

    pub fn object_id(&self) -> Option<ObjectId> {
        self.object().map(|r| r.id)
    }
}

impl<'a> From<&'a Record> for Target<'a> {
    fn from(value: &'a Record) -> Self {
        Target::Object(value)
    }
}

impl<'a> From<&'a AuthorizableType> for Target<'a> {
    fn from(value: &'a AuthorizableType) -> Self {
        Target::New(value)
    }
}

pub struct AuthorizationManager {
    roles: Arc<dyn RoleProvider>,
    policies: Arc<dyn PolicyStore>,
    evaluators: EvaluatorRegistry,
    lookup: Arc<dyn ObjectLookup>,
    relation_filters: RelationFilterRegistry,
    groups: Option<GroupPermissionRegistry>,
    cache: Option<Arc<dyn PermissionCache>>,
    warnings: WarningBoard,
    config: AuthorizationConfig,
}

pub struct AuthorizationManagerBuilder {
    roles: Arc<dyn RoleProvider>,
    policies: Arc<dyn PolicyStore>,
    evaluators: EvaluatorRegistry,
    lookup: Arc<dyn ObjectLookup>,
    relation_filters: RelationFilterRegistry,
    groups: Option<GroupPermissionRegistry>,
    cache: Option<Arc<dyn PermissionCache>>,
    config: AuthorizationConfig,
}

impl AuthorizationManagerBuilder {
    pub fn relation_filters(mut self, filters: RelationFilterRegistry) -> Self {
        self.relation_filters = filters;
        self
    }

    pub fn groups(mut self, groups: GroupPermissionRegistry) -> Self {
        self.groups = Some(groups);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn PermissionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(mut self, config: AuthorizationConfig) -> Self {
        self.config = config;
        self
    }

    /// Without an explicit cache, `cache_enabled` installs an in-memory one.
    pub fn build(self) -> AuthorizationManager {
        let cache = self.cache.or_else(|| {
            self.config.cache_enabled.then(|| {
                Arc::new(InMemoryPermissionCache::new(self.config.cache_capacity))
                    as Arc<dyn PermissionCache>
            })
        });
        AuthorizationManager {
            roles: self.roles,
            policies: self.policies,
            evaluators: self.evaluators,
            lookup: self.lookup,
            relation_filters: self.relation_filters,
            groups: self.groups,
            cache,
            warnings: WarningBoard::new(),
            config: self.config,
        }
    }
}

impl AuthorizationManager {
    pub fn builder(
        roles: Arc<dyn RoleProvider>,
        policies: Arc<dyn PolicyStore>,
        evaluators: EvaluatorRegistry,
        lookup: Arc<dyn ObjectLookup>,
    ) -> AuthorizationManagerBuilder {
        AuthorizationManagerBuilder {
            roles,
            policies,
            evaluators,
            lookup,
            relation_filters: RelationFilterRegistry::new(),
            groups: None,
            cache: None,
            config: AuthorizationConfig::default(),
        }
    }

    pub fn config(&self) -> &AuthorizationConfig {
        &self.config
    }

    pub fn evaluators(&self) -> &EvaluatorRegistry {
        &self.evaluators
    }

    /// True iff the principal's aggregate permissions permit every requested one.
    ///
    /// Denial is `Ok(false)`. A super-admin is always granted.
    pub fn evaluate<'t>(
        &self,
        principal: PrincipalId,
        target: impl Into<Target<'t>>,
        permissions: &[Permission],
    ) -> Result<bool, AuthorizationError> {
        let target = target.into();
        self.check_request(target.object_type(), permissions)?;
        let principal = self.resolve_principal(principal)?;
        if principal.is_admin() {
            tracing::debug!(principal = %principal.principal_id, "super-admin bypass");
            return Ok(true);
        }

        let granted = self.object_permissions(&principal, target)?.permits_all(permissions);
        tracing::debug!(
            principal = %principal.principal_id,
            object_type = %target.object_type(),
            object_id = ?target.object_id(),
            requested = ?permissions,
            granted,
            "authorization decision"
        );
        Ok(granted)
    }

    /// Union of what every applicable, non-duplicate policy grants.
    pub fn get_permissions<'t>(
        &self,
        principal: PrincipalId,
        target: impl Into<Target<'t>>,
    ) -> Result<PermissionSet, AuthorizationError> {
        let target = target.into();
        let principal = self.resolve_principal(principal)?;
        if principal.is_admin() {
            return Ok(PermissionSet::admin());
        }
        self.object_permissions(&principal, target)
    }

    /// Row-level condition over `root` rows of `object_type`, true exactly
    /// for the rows [`evaluate`](Self::evaluate) would grant.
    ///
    /// No contributing policy yields `FALSE` (fail closed).
    pub fn build_filter(
        &self,
        principal: PrincipalId,
        object_type: &AuthorizableType,
        permissions: &[Permission],
    ) -> Result<Condition, AuthorizationError> {
        self.check_request(object_type, permissions)?;
        let principal = self.resolve_principal(principal)?;
        if principal.is_admin() {
            return Ok(Condition::True);
        }

        let ctx = EvaluationContext::root(self, &principal);
        let query = QueryContext::root(object_type.clone());
        let mut builder = ConditionBuilder::new();
        let filter = self.filter_in(&ctx, &query, &mut builder, permissions)?;
        tracing::debug!(
            principal = %principal.principal_id,
            object_type = %object_type,
            requested = ?permissions,
            filter = %filter,
            "built row-level filter"
        );
        Ok(filter)
    }

    /// Object-less grants, for capability display only.
    pub fn get_authorities(
        &self,
        principal: PrincipalId,
        object_type: &AuthorizableType,
    ) -> Result<PermissionSet, AuthorizationError> {
        let principal = self.resolve_principal(principal)?;
        if principal.is_admin() {
            return Ok(PermissionSet::admin());
        }

        let ctx = EvaluationContext::root(self, &principal);
        let mut granted = PermissionSet::new();
        for policy in self.applicable(&principal, object_type)? {
            let result = self
                .resolve_evaluator(&policy, object_type)
                .and_then(|evaluator| evaluator.authorities_for(&ctx, &policy));
            match result {
                Ok(authorities) => granted.union_with(&authorities.restrict_to(&policy.permissions)),
                Err(err) => self.skip(&policy, None, &err),
            }
        }
        Ok(granted)
    }

    pub fn is_duplicate(&self, a: &Policy, b: &Policy) -> bool {
        a.is_duplicate(b)
    }

    pub fn find_duplicates(&self, policies: &[Policy]) -> Vec<DuplicatePolicy> {
        find_duplicates(policies)
    }

    pub fn configuration_warnings(&self) -> Vec<ConfigurationWarning> {
        self.warnings.snapshot()
    }

    pub fn warnings(&self) -> &WarningBoard {
        &self.warnings
    }

    /// Policies of `role` changed; cached decisions depending on it are dropped.
    pub fn invalidate_role(&self, role: RoleId) {
        if let Some(cache) = &self.cache {
            cache.invalidate_role(role);
        }
    }

    /// Policies bound to `object_type` changed.
    ///
    /// Reaches every cached decision that consulted those policies: decisions
    /// on declared subtypes, and transitive or delegated decisions that
    /// looked at an object of that type.
    pub fn invalidate_type(&self, object_type: &AuthorizableType) {
        if let Some(cache) = &self.cache {
            cache.invalidate_type(object_type);
        }
    }

    /// Data of one object changed.
    ///
    /// Link rows and hierarchy edges are not tracked by the cache: when one
    /// is added or removed, invalidate the objects at both of its ends.
    pub fn invalidate_object(&self, object_type: &AuthorizableType, id: ObjectId) {
        if let Some(cache) = &self.cache {
            cache.invalidate_object(object_type, id);
        }
    }

    pub fn invalidate_all(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    pub(crate) fn lookup(&self) -> &dyn ObjectLookup {
        self.lookup.as_ref()
    }

    pub(crate) fn relation_filters(&self) -> &RelationFilterRegistry {
        &self.relation_filters
    }

    pub(crate) fn permissions_in(
        &self,
        ctx: &EvaluationContext<'_>,
        target: Target<'_>,
    ) -> Result<PermissionSet, AuthorizationError> {
        let object_type = target.object_type();
        ctx.record_read(target);
        let mut granted = PermissionSet::new();
        for policy in self.applicable(ctx.principal(), object_type)? {
            let result = self
                .resolve_evaluator(&policy, object_type)
                .and_then(|evaluator| evaluator.permissions_for(ctx, target.object(), &policy));
            match result {
                Ok(permissions) => granted.union_with(&permissions.restrict_to(&policy.permissions)),
                Err(err) => self.skip(&policy, target.object_id(), &err),
            }
        }
        Ok(granted)
    }

    /// `AND(p in P) OR(policy) predicate(policy, {p})`.
    ///
    /// Grants are unioned across policies, so READ may come from one policy
    /// and UPDATE from another. Composing per permission keeps the filter
    /// exactly equivalent to `permits_all` on that union.
    pub(crate) fn filter_in(
        &self,
        ctx: &EvaluationContext<'_>,
        query: &QueryContext,
        builder: &mut ConditionBuilder,
        permissions: &[Permission],
    ) -> Result<Condition, AuthorizationError> {
        let policies = self.applicable(ctx.principal(), &query.object_type)?;
        let requested: BTreeSet<&Permission> = permissions.iter().collect();

        let mut clauses = Vec::with_capacity(requested.len());
        for permission in requested {
            let mut branches = Vec::new();
            for policy in &policies {
                let result = self.resolve_evaluator(policy, &query.object_type).and_then(|evaluator| {
                    evaluator.predicate_for(ctx, query, builder, policy, std::slice::from_ref(permission))
                });
                match result {
                    Ok(Some(condition)) => branches.push(condition),
                    Ok(None) => {}
                    Err(err) => self.skip(policy, None, &err),
                }
            }
            let clause = Condition::or(branches);
            if clause.is_false() {
                return Ok(Condition::False);
            }
            clauses.push(clause);
        }
        Ok(Condition::and(clauses))
    }

    fn object_permissions(
        &self,
        principal: &PrincipalContext,
        target: Target<'_>,
    ) -> Result<PermissionSet, AuthorizationError> {
        let ctx = EvaluationContext::root(self, principal);
        let (Some(cache), Some(object)) = (&self.cache, target.object()) else {
            return self.permissions_in(&ctx, target);
        };

        let key = DecisionKey {
            principal: principal.principal_id,
            object_type: object.object_type.clone(),
            object_id: object.id,
        };
        if let Some(hit) = cache.get(&key, &principal.roles) {
            tracing::trace!(principal = %principal.principal_id, object_id = %object.id, "permission cache hit");
            return Ok(hit);
        }

        let stamp = cache.stamp();
        let granted = self.permissions_in(&ctx, target)?;
        match self.dependencies(ctx.reads()) {
            Ok(dependencies) => {
                cache.put(key, stamp, principal.roles.clone(), dependencies, granted.clone());
            }
            Err(err) => {
                tracing::debug!(error = %err, "decision not cached, supertypes unavailable");
            }
        }
        Ok(granted)
    }

    /// What a decision read, widened to every type whose policies it used.
    fn dependencies(&self, mut reads: Dependencies) -> Result<Dependencies, CollaboratorError> {
        let read_types: Vec<AuthorizableType> = reads.types().cloned().collect();
        for object_type in &read_types {
            for supertype in self.policies.supertypes_of(object_type)? {
                reads.add_type(supertype);
            }
        }
        reads.add_type(AuthorizableType::WILDCARD);
        Ok(reads)
    }

    fn resolve_principal(&self, principal: PrincipalId) -> Result<PrincipalContext, AuthorizationError> {
        self.roles
            .resolve(principal)
            .map_err(|source| AuthorizationError::RoleResolution { principal, source })
    }

    fn check_request(
        &self,
        object_type: &AuthorizableType,
        permissions: &[Permission],
    ) -> Result<(), AuthorizationError> {
        if permissions.is_empty() {
            return Err(AuthorizationError::EmptyPermissionRequest);
        }
        if let Some(permission) = self
            .groups
            .as_ref()
            .and_then(|g| g.first_foreign(object_type, permissions))
        {
            return Err(AuthorizationError::PermissionNotInGroup {
                permission,
                object_type: object_type.clone(),
            });
        }
        Ok(())
    }

    fn applicable(
        &self,
        principal: &PrincipalContext,
        object_type: &AuthorizableType,
    ) -> Result<Vec<Policy>, AuthorizationError> {
        if principal.roles.is_empty() {
            return Ok(Vec::new());
        }
        let policies = self
            .policies
            .policies_for(&principal.roles, object_type)
            .map_err(|source| AuthorizationError::PolicyStore {
                object_type: object_type.clone(),
                source,
            })?;
        Ok(dedupe(policies.into_iter().filter(|p| !p.disabled).collect()))
    }

    fn resolve_evaluator(
        &self,
        policy: &Policy,
        object_type: &AuthorizableType,
    ) -> Result<Arc<dyn Evaluator>, EvaluatorError> {
        let evaluator = self.evaluators.get(&policy.evaluator)?;
        // a policy on a declared supertype reaches its subtypes through the store
        let bound = &policy.authorizable_type;
        if !evaluator.supports(object_type) && (bound.is_wildcard() || !evaluator.supports(bound)) {
            return Err(EvaluatorError::UnsupportedType {
                evaluator: policy.evaluator.clone(),
                object_type: object_type.clone(),
            });
        }
        Ok(evaluator)
    }

    fn skip(&self, policy: &Policy, object_id: Option<ObjectId>, err: &EvaluatorError) {
        tracing::warn!(
            policy_id = %policy.id,
            evaluator = %policy.evaluator,
            object_id = ?object_id,
            error = %err,
            "policy skipped, contributes nothing"
        );
        self.warnings.record(policy.id, &policy.evaluator, err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::test_support::Fixture;
    use crate::evaluator::{
        AttributeOwner, BasePermissionEvaluator, OwnerByRelationEvaluator, SelfEvaluator, TransitiveEvaluator,
    };
    use crate::permissions::GroupPermission;
    use crate::permissions::base::*;
    use crate::warnings::WarningKind;
    use proptest::prelude::*;

    const ACCOUNT: AuthorizableType = AuthorizableType::from_static("ACCOUNT");
    const ABSTRACT_ACCOUNT: AuthorizableType = AuthorizableType::from_static("ABSTRACT_ACCOUNT");
    const IDENTITY_ACCOUNT: AuthorizableType = AuthorizableType::from_static("IDENTITY_ACCOUNT");
    const GUARANTEE: AuthorizableType = AuthorizableType::from_static("CONTRACT_GUARANTEE");
    const ABSTRACT_LINK: AuthorizableType = AuthorizableType::from_static("ABSTRACT_LINK");
    const IDENTITY_LINK: AuthorizableType = AuthorizableType::from_static("IDENTITY_LINK");

    /// Returns whatever it was built with.
    struct FixedStore(Result<Vec<Policy>, CollaboratorError>);

    impl PolicyStore for FixedStore {
        fn policies_for(
            &self,
            _roles: &BTreeSet<RoleId>,
            _object_type: &AuthorizableType,
        ) -> Result<Vec<Policy>, CollaboratorError> {
            self.0.clone()
        }
    }

    struct UnreachableDirectory;

    impl RoleProvider for UnreachableDirectory {
        fn resolve(&self, _principal: PrincipalId) -> Result<PrincipalContext, CollaboratorError> {
            Err(CollaboratorError::unavailable("directory", "connection refused"))
        }
    }

    struct BrokenLookup;

    impl ObjectLookup for BrokenLookup {
        fn find(&self, _: &AuthorizableType, _: ObjectId) -> Result<Option<Record>, CollaboratorError> {
            Err(CollaboratorError::unavailable("lookup", "timeout"))
        }

        fn find_by_attribute(
            &self,
            _: &AuthorizableType,
            _: &str,
            _: &crate::object::AttrValue,
        ) -> Result<Vec<Record>, CollaboratorError> {
            Err(CollaboratorError::unavailable("lookup", "timeout"))
        }
    }

    /// Claims ADMIN on everything, whatever the policy says.
    struct Overreaching;

    impl Evaluator for Overreaching {
        fn name(&self) -> &str {
            "overreaching"
        }

        fn permissions_for(
            &self,
            _ctx: &EvaluationContext<'_>,
            _object: Option<&Record>,
            _policy: &Policy,
        ) -> Result<PermissionSet, EvaluatorError> {
            Ok(PermissionSet::admin())
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
    }

    fn builder_with(fx: &Fixture, store: impl PolicyStore + 'static) -> AuthorizationManagerBuilder {
        AuthorizationManager::builder(
            fx.roles.clone(),
            Arc::new(store),
            EvaluatorRegistry::with_builtin(),
            fx.data.clone(),
        )
    }

    fn account(fx: &Fixture, owner: impl Into<crate::object::AttrValue>) -> Record {
        fx.insert(Record::new(ACCOUNT, ObjectId::new()).with("owner", owner))
    }

    fn owned(fx: &Fixture, permissions: impl IntoIterator<Item = Permission>) -> Policy {
        fx.policy(ACCOUNT, SelfEvaluator::NAME, permissions)
            .with_property(SelfEvaluator::PARAMETER_ATTRIBUTE, "owner")
    }

    fn linked(fx: &Fixture, permissions: impl IntoIterator<Item = Permission>) -> Policy {
        fx.policy(ACCOUNT, OwnerByRelationEvaluator::NAME, permissions)
            .with_property(OwnerByRelationEvaluator::PARAMETER_RELATION_TYPE, IDENTITY_ACCOUNT.as_str())
            .with_property(OwnerByRelationEvaluator::PARAMETER_TARGET_ATTRIBUTE, "account")
            .with_property(OwnerByRelationEvaluator::PARAMETER_OWNER_ATTRIBUTE, "identity")
    }

    fn link(fx: &Fixture, account: &Record) -> Record {
        fx.insert(
            Record::new(IDENTITY_ACCOUNT, ObjectId::new())
                .with("identity", fx.principal)
                .with("account", account.id),
        )
    }

    /// Manager over the fixture's collaborators with the decision cache on.
    fn cached(fx: &Fixture) -> AuthorizationManager {
        AuthorizationManager::builder(
            fx.roles.clone(),
            fx.store.clone(),
            fx.manager.evaluators().clone(),
            fx.data.clone(),
        )
        .config(AuthorizationConfig {
            cache_enabled: true,
            ..AuthorizationConfig::default()
        })
        .build()
    }

    /// Rows of `object_type` the executed filter lets through.
    fn selected(
        fx: &Fixture,
        manager: &AuthorizationManager,
        object_type: &AuthorizableType,
        permissions: &[Permission],
    ) -> Vec<Record> {
        let filter = manager.build_filter(fx.principal, object_type, permissions).unwrap();
        fx.data.select(&QueryContext::root(object_type.clone()), &filter).unwrap()
    }

    #[test]
    fn grants_are_unioned_across_policies() {
        let fx = Fixture::new();
        fx.load(fx.policy(ACCOUNT, BasePermissionEvaluator::NAME, [READ]));
        fx.load(owned(&fx, [UPDATE]));
        let mine = account(&fx, fx.principal);
        let theirs = account(&fx, ObjectId::new());

        assert!(fx.manager.evaluate(fx.principal, &mine, &[READ, UPDATE]).unwrap());
        assert!(fx.manager.evaluate(fx.principal, &theirs, &[READ]).unwrap());
        assert!(!fx.manager.evaluate(fx.principal, &theirs, &[READ, UPDATE]).unwrap());

        let filter = fx.manager.build_filter(fx.principal, &ACCOUNT, &[READ, UPDATE]).unwrap();
        let rows = fx.data.select(&QueryContext::root(ACCOUNT), &filter).unwrap();
        assert_eq!(rows, vec![mine]);
    }

    #[test]
    fn pre_creation_check_uses_object_less_grants() {
        let fx = Fixture::new();
        fx.load(fx.policy(ACCOUNT, BasePermissionEvaluator::NAME, [CREATE]));
        fx.load(owned(&fx, [DELETE]));

        assert!(fx.manager.evaluate(fx.principal, &ACCOUNT, &[CREATE]).unwrap());
        assert!(!fx.manager.evaluate(fx.principal, &ACCOUNT, &[DELETE]).unwrap());
    }

    #[test]
    fn missing_evaluator_fails_closed_without_failing_aggregate() {
        let fx = Fixture::new();
        let ghost = fx.policy(ACCOUNT, "ghost", [READ, UPDATE]);
        let base = fx.policy(ACCOUNT, BasePermissionEvaluator::NAME, [READ]);
        let manager = builder_with(&fx, FixedStore(Ok(vec![ghost.clone(), base]))).build();
        let row = account(&fx, ObjectId::new());

        assert!(manager.evaluate(fx.principal, &row, &[READ]).unwrap());
        assert!(!manager.evaluate(fx.principal, &row, &[UPDATE]).unwrap());
        assert_eq!(manager.build_filter(fx.principal, &ACCOUNT, &[UPDATE]).unwrap(), Condition::False);

        let warnings = manager.configuration_warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].policy_id, ghost.id);
        assert_eq!(warnings[0].kind, WarningKind::UnknownEvaluator);
    }

    #[test]
    fn evaluator_cannot_exceed_policy_grant() {
        let fx = Fixture::new();
        let policy = fx.policy(ACCOUNT, "overreaching", [READ]);
        let manager = AuthorizationManager::builder(
            fx.roles.clone(),
            Arc::new(FixedStore(Ok(vec![policy]))),
            EvaluatorRegistry::with_builtin().with(Overreaching),
            fx.data.clone(),
        )
        .build();
        let row = account(&fx, ObjectId::new());

        let granted = manager.get_permissions(fx.principal, &row).unwrap();
        assert!(granted.permits(&READ));
        assert!(!granted.permits(&DELETE));
        assert!(!manager.evaluate(fx.principal, &row, &[DELETE]).unwrap());
    }

    #[test]
    fn super_admin_bypasses_policies() {
        let fx = Fixture::new();
        let admin = PrincipalId::new();
        fx.roles.put(PrincipalContext::super_admin(admin)).unwrap();
        let row = account(&fx, ObjectId::new());

        assert!(fx.manager.evaluate(admin, &row, &[DELETE]).unwrap());
        assert!(fx.manager.get_permissions(admin, &row).unwrap().is_admin());
        assert_eq!(fx.manager.build_filter(admin, &ACCOUNT, &[READ]).unwrap(), Condition::True);
        assert!(fx.manager.get_authorities(admin, &ACCOUNT).unwrap().is_admin());
    }

    #[test]
    fn principal_without_roles_gets_nothing() {
        let fx = Fixture::new();
        fx.load(fx.policy(ACCOUNT, BasePermissionEvaluator::NAME, [READ]));
        let nobody = PrincipalId::new();
        let row = account(&fx, nobody);

        assert!(!fx.manager.evaluate(nobody, &row, &[READ]).unwrap());
        assert_eq!(fx.manager.build_filter(nobody, &ACCOUNT, &[READ]).unwrap(), Condition::False);
    }

    #[test]
    fn empty_request_is_rejected() {
        let fx = Fixture::new();
        let row = account(&fx, fx.principal);
        assert_eq!(
            fx.manager.evaluate(fx.principal, &row, &[]),
            Err(AuthorizationError::EmptyPermissionRequest)
        );
        assert_eq!(
            fx.manager.build_filter(fx.principal, &ACCOUNT, &[]),
            Err(AuthorizationError::EmptyPermissionRequest)
        );
    }

    #[test]
    fn permission_outside_group_is_rejected() {
        let fx = Fixture::new();
        let groups = GroupPermissionRegistry::new().with_group(GroupPermission::new(
            "ACCOUNT",
            ACCOUNT,
            [ADMIN, READ, CREATE, UPDATE, DELETE, AUTOCOMPLETE],
        ));
        let manager = builder_with(&fx, FixedStore(Ok(Vec::new()))).groups(groups).build();
        let row = account(&fx, fx.principal);

        assert_eq!(
            manager.evaluate(fx.principal, &row, &[COUNT]),
            Err(AuthorizationError::PermissionNotInGroup {
                permission: COUNT,
                object_type: ACCOUNT,
            })
        );
        assert_eq!(manager.evaluate(fx.principal, &row, &[READ]), Ok(false));
    }

    #[test]
    fn role_resolution_failure_is_escalated() {
        let fx = Fixture::new();
        let manager = AuthorizationManager::builder(
            Arc::new(UnreachableDirectory),
            fx.store.clone(),
            EvaluatorRegistry::with_builtin(),
            fx.data.clone(),
        )
        .build();
        let row = account(&fx, fx.principal);

        assert!(matches!(
            manager.evaluate(fx.principal, &row, &[READ]),
            Err(AuthorizationError::RoleResolution { principal, .. }) if principal == fx.principal
        ));
    }

    #[test]
    fn policy_store_failure_is_escalated() {
        let fx = Fixture::new();
        let manager = builder_with(&fx, FixedStore(Err(CollaboratorError::unavailable("policies", "down")))).build();

        assert!(matches!(
            manager.build_filter(fx.principal, &ACCOUNT, &[READ]),
            Err(AuthorizationError::PolicyStore { .. })
        ));
    }

    #[test]
    fn failing_lookup_fails_closed() {
        let fx = Fixture::new();
        let by_link = fx
            .policy(ACCOUNT, OwnerByRelationEvaluator::NAME, [UPDATE])
            .with_property(OwnerByRelationEvaluator::PARAMETER_RELATION_TYPE, "IDENTITY_ACCOUNT")
            .with_property(OwnerByRelationEvaluator::PARAMETER_TARGET_ATTRIBUTE, "account")
            .with_property(OwnerByRelationEvaluator::PARAMETER_OWNER_ATTRIBUTE, "identity");
        let base = fx.policy(ACCOUNT, BasePermissionEvaluator::NAME, [READ]);
        let manager = AuthorizationManager::builder(
            fx.roles.clone(),
            Arc::new(FixedStore(Ok(vec![by_link, base]))),
            EvaluatorRegistry::with_builtin(),
            Arc::new(BrokenLookup),
        )
        .build();
        let row = Record::new(ACCOUNT, ObjectId::new());

        assert!(manager.evaluate(fx.principal, &row, &[READ]).unwrap());
        assert!(!manager.evaluate(fx.principal, &row, &[UPDATE]).unwrap());
        // transient failures are logged, not kept as standing warnings
        assert!(manager.configuration_warnings().is_empty());
    }

    #[test]
    fn duplicates_are_evaluated_once() {
        let fx = Fixture::new();
        let first = fx.policy(ACCOUNT, BasePermissionEvaluator::NAME, [READ]).with_seq(1);
        let second = fx.policy(ACCOUNT, BasePermissionEvaluator::NAME, [READ]).with_seq(2);

        assert!(fx.manager.is_duplicate(&first, &second));
        let duplicates = fx.manager.find_duplicates(&[second.clone(), first.clone()]);
        assert_eq!(duplicates.len(), 1);
        assert_eq!(duplicates[0].kept, first.id);
        assert_eq!(duplicates[0].duplicate, second.id);
    }

    #[test]
    fn disabled_policy_contributes_nothing() {
        let fx = Fixture::new();
        fx.load(fx.policy(ACCOUNT, BasePermissionEvaluator::NAME, [READ]).disabled());
        let row = account(&fx, fx.principal);
        assert!(!fx.manager.evaluate(fx.principal, &row, &[READ]).unwrap());
    }

    #[test]
    fn authorities_report_object_less_grants() {
        let fx = Fixture::new();
        fx.load(fx.policy(AuthorizableType::IDENTITY, BasePermissionEvaluator::NAME, [AUTOCOMPLETE]));
        fx.load(fx.policy(AuthorizableType::IDENTITY, SelfEvaluator::NAME, [READ]));

        let authorities = fx.manager.get_authorities(fx.principal, &AuthorizableType::IDENTITY).unwrap();
        assert!(authorities.permits_all(&[AUTOCOMPLETE, READ]));
        assert!(!authorities.permits(&UPDATE));
    }

    #[test]
    fn invalidation_never_serves_stale_grant() {
        let fx = Fixture::new();
        let manager = cached(&fx);
        let policy = fx.policy(ACCOUNT, BasePermissionEvaluator::NAME, [READ]);
        fx.load(policy.clone());
        let row = account(&fx, ObjectId::new());
        assert!(manager.evaluate(fx.principal, &row, &[READ]).unwrap());

        fx.store.remove(policy.id).unwrap();
        // still cached until told otherwise
        assert!(manager.evaluate(fx.principal, &row, &[READ]).unwrap());
        manager.invalidate_role(fx.role);
        assert!(!manager.evaluate(fx.principal, &row, &[READ]).unwrap());

        fx.load(policy);
        manager.invalidate_type(&ACCOUNT);
        assert!(manager.evaluate(fx.principal, &row, &[READ]).unwrap());
    }

    #[test]
    fn wildcard_policy_applies_to_every_type() {
        let fx = Fixture::new();
        fx.load(fx.policy(AuthorizableType::WILDCARD, BasePermissionEvaluator::NAME, [READ]));
        let row = account(&fx, ObjectId::new());
        assert!(fx.manager.evaluate(fx.principal, &row, &[READ]).unwrap());
    }

    #[test]
    fn revoking_owner_type_policy_reaches_transitive_decisions() {
        let fx = Fixture::with_registry(EvaluatorRegistry::with_builtin().with(
            TransitiveEvaluator::by_attribute("guarantee-by-identity", GUARANTEE, AuthorizableType::IDENTITY, "identity"),
        ));
        let own_identity = fx.policy(AuthorizableType::IDENTITY, SelfEvaluator::NAME, [READ]);
        fx.load(own_identity.clone());
        fx.load(fx.policy(GUARANTEE, "guarantee-by-identity", [READ]));
        fx.insert(Record::new(AuthorizableType::IDENTITY, fx.principal.into()));
        let guarantee = fx.insert(Record::new(GUARANTEE, ObjectId::new()).with("identity", fx.principal));
        let manager = cached(&fx);
        assert!(manager.evaluate(fx.principal, &guarantee, &[READ]).unwrap());

        fx.store.remove(own_identity.id).unwrap();
        // unrelated types leave the decision cached
        manager.invalidate_type(&ACCOUNT);
        assert!(manager.evaluate(fx.principal, &guarantee, &[READ]).unwrap());

        manager.invalidate_type(&AuthorizableType::IDENTITY);
        assert!(!manager.evaluate(fx.principal, &guarantee, &[READ]).unwrap());
        assert!(selected(&fx, &manager, &GUARANTEE, &[READ]).is_empty());
    }

    #[test]
    fn supertype_policy_applies_to_subtype_and_follows_its_invalidation() {
        let fx = Fixture::new();
        fx.store.declare_supertype(ACCOUNT, ABSTRACT_ACCOUNT).unwrap();
        let inherited = fx.policy(ABSTRACT_ACCOUNT, BasePermissionEvaluator::NAME, [READ]);
        fx.load(inherited.clone());
        let row = account(&fx, ObjectId::new());
        let manager = cached(&fx);

        assert!(manager.evaluate(fx.principal, &row, &[READ]).unwrap());
        assert_eq!(selected(&fx, &manager, &ACCOUNT, &[READ]), vec![row.clone()]);

        fx.store.remove(inherited.id).unwrap();
        manager.invalidate_type(&ABSTRACT_ACCOUNT);
        assert!(!manager.evaluate(fx.principal, &row, &[READ]).unwrap());
        assert!(selected(&fx, &manager, &ACCOUNT, &[READ]).is_empty());

        fx.load(inherited);
        manager.invalidate_type(&ABSTRACT_ACCOUNT);
        assert!(manager.evaluate(fx.principal, &row, &[READ]).unwrap());
    }

    #[test]
    fn evaluator_bound_to_supertype_serves_declared_subtypes() {
        let fx = Fixture::with_registry(EvaluatorRegistry::with_builtin().with(
            TransitiveEvaluator::by_attribute("link-by-identity", ABSTRACT_LINK, AuthorizableType::IDENTITY, "identity"),
        ));
        fx.store.declare_supertype(IDENTITY_LINK, ABSTRACT_LINK).unwrap();
        fx.load(fx.policy(AuthorizableType::IDENTITY, SelfEvaluator::NAME, [READ]));
        fx.load(fx.policy(ABSTRACT_LINK, "link-by-identity", [READ]));
        fx.insert(Record::new(AuthorizableType::IDENTITY, fx.principal.into()));
        fx.insert(Record::new(AuthorizableType::IDENTITY, fx.stranger));
        let mine = fx.insert(Record::new(IDENTITY_LINK, ObjectId::new()).with("identity", fx.principal));
        let theirs = fx.insert(Record::new(IDENTITY_LINK, ObjectId::new()).with("identity", fx.stranger));

        assert!(fx.manager.evaluate(fx.principal, &mine, &[READ]).unwrap());
        assert!(!fx.manager.evaluate(fx.principal, &theirs, &[READ]).unwrap());
        assert_eq!(selected(&fx, &fx.manager, &IDENTITY_LINK, &[READ]), vec![mine]);
        assert!(fx.manager.configuration_warnings().is_empty());
    }

    #[test]
    fn removed_link_stops_granting_once_account_is_invalidated() {
        let fx = Fixture::new();
        fx.load(linked(&fx, [UPDATE]));
        let row = account(&fx, fx.stranger);
        let still_linked = account(&fx, fx.stranger);
        let removed = link(&fx, &row);
        link(&fx, &still_linked);
        let manager = cached(&fx);
        assert!(manager.evaluate(fx.principal, &row, &[UPDATE]).unwrap());

        fx.data.remove(&IDENTITY_ACCOUNT, removed.id).unwrap();
        // relation rows are not tracked by the cache
        assert!(manager.evaluate(fx.principal, &row, &[UPDATE]).unwrap());

        manager.invalidate_object(&ACCOUNT, row.id);
        assert!(!manager.evaluate(fx.principal, &row, &[UPDATE]).unwrap());
        assert!(manager.evaluate(fx.principal, &still_linked, &[UPDATE]).unwrap());
        assert_eq!(selected(&fx, &manager, &ACCOUNT, &[UPDATE]), vec![still_linked]);
    }

    #[derive(Debug, Clone)]
    enum Grant {
        Base,
        Owned,
        Linked,
    }

    fn arb_grant() -> impl Strategy<Value = (Grant, Vec<Permission>)> {
        (
            prop_oneof![Just(Grant::Base), Just(Grant::Owned), Just(Grant::Linked)],
            prop::sample::subsequence(vec![ADMIN, READ, UPDATE, DELETE], 1..3),
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 48,
            ..ProptestConfig::default()
        })]

        /// Property: for any mix of policies, `evaluate` and the executed
        /// `build_filter` select the same rows.
        #[test]
        fn evaluate_agrees_with_filter(
            grants in prop::collection::vec(arb_grant(), 0..4),
            owners in prop::collection::vec(any::<bool>(), 1..8),
            links in prop::collection::vec(any::<bool>(), 1..8),
            requested in prop::sample::subsequence(vec![READ, UPDATE, DELETE], 1..3),
        ) {
            let fx = Fixture::new();
            for (grant, permissions) in &grants {
                let policy = match grant {
                    Grant::Base => fx.policy(ACCOUNT, BasePermissionEvaluator::NAME, permissions.clone()),
                    Grant::Owned => owned(&fx, permissions.clone()),
                    Grant::Linked => linked(&fx, permissions.clone()),
                };
                fx.load(policy);
            }
            let rows: Vec<Record> = owners
                .iter()
                .enumerate()
                .map(|(idx, mine)| {
                    let row = if *mine { account(&fx, fx.principal) } else { account(&fx, fx.stranger) };
                    if links.get(idx).copied().unwrap_or(false) {
                        link(&fx, &row);
                    }
                    row
                })
                .collect();

            let filter = fx.manager.build_filter(fx.principal, &ACCOUNT, &requested).unwrap();
            let selected = fx.data.select(&QueryContext::root(ACCOUNT), &filter).unwrap();
            for row in &rows {
                let granted = fx.manager.evaluate(fx.principal, row, &requested).unwrap();
                prop_assert_eq!(granted, selected.contains(row), "row {} filter {}", row.id, filter);
            }
        }
    }
}
