//! Shared fixture for evaluator tests: one principal holding one role,
//! in-memory collaborators, and agreement checks between the imperative
//! and the predicate path.

use std::sync::Arc;

use idgov_core::{ObjectId, PrincipalId, RoleId};
use proptest::prelude::*;

use crate::condition::{Condition, ConditionBuilder, QueryContext};
use crate::context::EvaluationContext;
use crate::datasource::InMemoryDataSource;
use crate::evaluator::{Evaluator, EvaluatorRegistry};
use crate::hierarchy::{InMemoryHierarchy, RelationFilterRegistry, SubordinatesFilter};
use crate::manager::AuthorizationManager;
use crate::object::{AttrValue, AuthorizableType, Record};
use crate::permissions::{Permission, PermissionSet};
use crate::policy::Policy;
use crate::principal::PrincipalContext;
use crate::roles::InMemoryRoleProvider;
use crate::store::InMemoryPolicyStore;

/// What a generated reference attribute points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Principal,
    Stranger,
    Null,
}

pub fn arb_ref_kind() -> impl Strategy<Value = RefKind> {
    prop_oneof![
        Just(RefKind::Principal),
        Just(RefKind::Stranger),
        Just(RefKind::Null),
    ]
}

pub fn arb_references(max: usize) -> impl Strategy<Value = Vec<RefKind>> {
    prop::collection::vec(arb_ref_kind(), 0..max)
}

pub struct Fixture {
    pub principal: PrincipalId,
    /// Identity id that never belongs to the principal.
    pub stranger: ObjectId,
    pub role: RoleId,
    pub data: Arc<InMemoryDataSource>,
    pub hierarchy: Arc<InMemoryHierarchy>,
    pub roles: Arc<InMemoryRoleProvider>,
    pub store: Arc<InMemoryPolicyStore>,
    pub manager: AuthorizationManager,
    context: PrincipalContext,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_registry(EvaluatorRegistry::with_builtin())
    }

    pub fn with_registry(registry: EvaluatorRegistry) -> Self {
        let principal = PrincipalId::new();
        let role = RoleId::new();
        let context = PrincipalContext::new(principal).with_role(role);

        let data = Arc::new(InMemoryDataSource::new());
        let hierarchy = Arc::new(InMemoryHierarchy::new());
        let roles = Arc::new(InMemoryRoleProvider::new());
        let store = Arc::new(InMemoryPolicyStore::new());
        roles.put(context.clone()).unwrap();

        let manager = AuthorizationManager::builder(roles.clone(), store.clone(), registry, data.clone())
            .relation_filters(
                RelationFilterRegistry::new().with_filter(SubordinatesFilter::new(hierarchy.clone())),
            )
            .build();

        Self {
            principal,
            stranger: ObjectId::new(),
            role,
            data,
            hierarchy,
            roles,
            store,
            manager,
            context,
        }
    }

    /// Unloaded policy of the fixture role.
    pub fn policy(
        &self,
        object_type: AuthorizableType,
        evaluator: &str,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> Policy {
        Policy::new(self.role, object_type, evaluator).with_permissions(permissions)
    }

    /// Validate and store a policy so nested evaluations see it.
    pub fn load(&self, policy: Policy) {
        self.store.load(policy, self.manager.evaluators(), None).unwrap();
    }

    pub fn insert(&self, record: Record) -> Record {
        self.data.insert(record.clone()).unwrap();
        record
    }

    pub fn resolve(&self, kind: &RefKind) -> AttrValue {
        match kind {
            RefKind::Principal => self.principal.into(),
            RefKind::Stranger => self.stranger.into(),
            RefKind::Null => AttrValue::Null,
        }
    }

    /// One `object_type` row per reference, `attribute` set accordingly.
    pub fn insert_referencing(
        &self,
        object_type: &AuthorizableType,
        attribute: &str,
        refs: &[RefKind],
    ) -> Vec<Record> {
        refs.iter()
            .map(|kind| {
                self.insert(
                    Record::new(object_type.clone(), ObjectId::new()).with(attribute, self.resolve(kind)),
                )
            })
            .collect()
    }

    pub fn with_ctx<T>(&self, f: impl FnOnce(&EvaluationContext<'_>) -> T) -> T {
        let ctx = EvaluationContext::root(&self.manager, &self.context);
        f(&ctx)
    }

    pub fn permissions(&self, evaluator: &dyn Evaluator, policy: &Policy, object: &Record) -> PermissionSet {
        self.with_ctx(|ctx| evaluator.permissions_for(ctx, Some(object), policy))
            .unwrap()
    }

    pub fn predicate(
        &self,
        evaluator: &dyn Evaluator,
        policy: &Policy,
        permissions: &[Permission],
    ) -> Option<Condition> {
        let object_type = policy.authorizable_type.clone();
        self.with_ctx(|ctx| {
            evaluator.predicate_for(
                ctx,
                &QueryContext::root(object_type),
                &mut ConditionBuilder::new(),
                policy,
                permissions,
            )
        })
        .unwrap()
    }

    /// Rows on which the two evaluation paths disagree, rendered for
    /// assertion messages.
    pub fn disagreements(
        &self,
        evaluator: &dyn Evaluator,
        policy: &Policy,
        rows: &[Record],
        permissions: &[Permission],
    ) -> Vec<String> {
        let predicate = self.predicate(evaluator, policy, permissions);
        rows.iter()
            .filter_map(|row| {
                let imperative = self.permissions(evaluator, policy, row).permits_all(permissions);
                let filtered = match &predicate {
                    Some(condition) => self
                        .data
                        .matches(&QueryContext::root(row.object_type.clone()), row, condition)
                        .unwrap(),
                    None => false,
                };
                (imperative != filtered).then(|| {
                    format!(
                        "row {} ({:?}): permissions_for={imperative}, predicate={filtered} [{}]",
                        row.id,
                        row.attributes,
                        predicate.as_ref().map_or_else(|| "none".to_string(), Condition::to_string),
                    )
                })
            })
            .collect()
    }

    pub fn assert_agrees(
        &self,
        evaluator: &dyn Evaluator,
        policy: &Policy,
        rows: &[Record],
        permissions: &[Permission],
    ) {
        let disagreements = self.disagreements(evaluator, policy, rows, permissions);
        assert!(disagreements.is_empty(), "paths disagree: {disagreements:#?}");
    }
}
