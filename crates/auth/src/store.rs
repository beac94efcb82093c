//! Policy store boundary.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use idgov_core::{PolicyId, RoleId};

use crate::error::{CollaboratorError, PolicyLoadError};
use crate::evaluator::EvaluatorRegistry;
use crate::object::AuthorizableType;
use crate::permissions::GroupPermissionRegistry;
use crate::policy::{DuplicatePolicy, Policy, find_duplicates};

/// Source of the policies attached to roles.
///
/// Read-only from the engine's point of view and assumed consistent for the
/// duration of one evaluation call.
pub trait PolicyStore: Send + Sync {
    /// Enabled policies of `roles` whose type is `object_type`, one of its
    /// declared supertypes, or the wildcard.
    fn policies_for(
        &self,
        roles: &BTreeSet<RoleId>,
        object_type: &AuthorizableType,
    ) -> Result<Vec<Policy>, CollaboratorError>;

    /// Declared supertypes of `object_type`, whose policies also apply to it.
    fn supertypes_of(
        &self,
        _object_type: &AuthorizableType,
    ) -> Result<BTreeSet<AuthorizableType>, CollaboratorError> {
        Ok(BTreeSet::new())
    }
}

#[derive(Debug, Default)]
struct StoreState {
    policies: Vec<Policy>,
    supertypes: HashMap<AuthorizableType, BTreeSet<AuthorizableType>>,
}

/// In-memory policy store.
///
/// Policies are validated against the evaluator registry when loaded, so
/// evaluation never re-checks evaluator properties.
#[derive(Debug, Default)]
pub struct InMemoryPolicyStore {
    state: RwLock<StoreState>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Policies bound to `supertype` also apply to `subtype`.
    pub fn declare_supertype(
        &self,
        subtype: AuthorizableType,
        supertype: AuthorizableType,
    ) -> Result<(), CollaboratorError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| CollaboratorError::Poisoned("policy store"))?;
        state.supertypes.entry(subtype).or_default().insert(supertype);
        Ok(())
    }

    /// Validate and store a policy.
    ///
    /// Returns the duplicates the new policy creates among the policies of
    /// the same role, for administrative warnings. Duplicates are stored
    /// anyway; evaluation skips them.
    pub fn load(
        &self,
        policy: Policy,
        registry: &EvaluatorRegistry,
        groups: Option<&GroupPermissionRegistry>,
    ) -> Result<Vec<DuplicatePolicy>, PolicyLoadError> {
        registry
            .validate_policy(&policy)
            .map_err(|source| PolicyLoadError::InvalidPolicy {
                policy: policy.id,
                source,
            })?;

        if let Some(permission) =
            groups.and_then(|g| g.first_foreign(&policy.authorizable_type, &policy.permissions))
        {
            return Err(PolicyLoadError::PermissionNotInGroup {
                policy: policy.id,
                permission,
                object_type: policy.authorizable_type.clone(),
            });
        }

        let mut state = self
            .state
            .write()
            .map_err(|_| CollaboratorError::Poisoned("policy store"))?;
        state.policies.retain(|p| p.id != policy.id);

        let role_id = policy.role_id;
        let new_id = policy.id;
        state.policies.push(policy);

        let same_role: Vec<Policy> = state
            .policies
            .iter()
            .filter(|p| p.role_id == role_id && !p.disabled)
            .cloned()
            .collect();
        Ok(find_duplicates(&same_role)
            .into_iter()
            .filter(|d| d.kept == new_id || d.duplicate == new_id)
            .collect())
    }

    pub fn remove(&self, id: PolicyId) -> Result<Option<Policy>, CollaboratorError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| CollaboratorError::Poisoned("policy store"))?;
        let position = state.policies.iter().position(|p| p.id == id);
        Ok(position.map(|idx| state.policies.remove(idx)))
    }

    pub fn all(&self) -> Result<Vec<Policy>, CollaboratorError> {
        let state = self
            .state
            .read()
            .map_err(|_| CollaboratorError::Poisoned("policy store"))?;
        Ok(state.policies.clone())
    }
}

impl PolicyStore for InMemoryPolicyStore {
    fn policies_for(
        &self,
        roles: &BTreeSet<RoleId>,
        object_type: &AuthorizableType,
    ) -> Result<Vec<Policy>, CollaboratorError> {
        let state = self
            .state
            .read()
            .map_err(|_| CollaboratorError::Poisoned("policy store"))?;
        let supertypes = state.supertypes.get(object_type);
        Ok(state
            .policies
            .iter()
            .filter(|p| !p.disabled && roles.contains(&p.role_id))
            .filter(|p| {
                p.authorizable_type.covers(object_type)
                    || supertypes.is_some_and(|s| s.contains(&p.authorizable_type))
            })
            .cloned()
            .collect())
    }

    fn supertypes_of(
        &self,
        object_type: &AuthorizableType,
    ) -> Result<BTreeSet<AuthorizableType>, CollaboratorError> {
        let state = self
            .state
            .read()
            .map_err(|_| CollaboratorError::Poisoned("policy store"))?;
        Ok(state.supertypes.get(object_type).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::BasePermissionEvaluator;
    use crate::permissions::base::*;

    const ACCOUNT: AuthorizableType = AuthorizableType::from_static("ACCOUNT");
    const ABSTRACT_ACCOUNT: AuthorizableType = AuthorizableType::from_static("ABSTRACT_ACCOUNT");
    const IDENTITY: AuthorizableType = AuthorizableType::IDENTITY;

    fn base(role: RoleId, object_type: AuthorizableType) -> Policy {
        Policy::new(role, object_type, BasePermissionEvaluator::NAME).with_permissions([READ])
    }

    #[test]
    fn supertype_policies_apply_to_declared_subtypes_only() {
        let store = InMemoryPolicyStore::new();
        let registry = EvaluatorRegistry::with_builtin();
        let role = RoleId::new();
        let inherited = base(role, ABSTRACT_ACCOUNT);
        store.load(inherited.clone(), &registry, None).unwrap();
        store.declare_supertype(ACCOUNT, ABSTRACT_ACCOUNT).unwrap();

        let roles = BTreeSet::from([role]);
        let for_account = store.policies_for(&roles, &ACCOUNT).unwrap();
        assert_eq!(for_account.len(), 1);
        assert_eq!(for_account[0].id, inherited.id);
        assert!(store.policies_for(&roles, &IDENTITY).unwrap().is_empty());
        assert_eq!(store.policies_for(&roles, &ABSTRACT_ACCOUNT).unwrap().len(), 1);

        assert_eq!(store.supertypes_of(&ACCOUNT).unwrap(), BTreeSet::from([ABSTRACT_ACCOUNT]));
        assert!(store.supertypes_of(&IDENTITY).unwrap().is_empty());
    }

    #[test]
    fn policies_of_other_roles_and_disabled_policies_are_hidden() {
        let store = InMemoryPolicyStore::new();
        let registry = EvaluatorRegistry::with_builtin();
        let role = RoleId::new();
        store.load(base(role, ACCOUNT).disabled(), &registry, None).unwrap();
        store.load(base(RoleId::new(), ACCOUNT), &registry, None).unwrap();
        store
            .load(base(role, AuthorizableType::WILDCARD), &registry, None)
            .unwrap();

        let found = store.policies_for(&BTreeSet::from([role]), &ACCOUNT).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].authorizable_type.is_wildcard());
    }

    #[test]
    fn reloading_replaces_and_remove_drops() {
        let store = InMemoryPolicyStore::new();
        let registry = EvaluatorRegistry::with_builtin();
        let policy = base(RoleId::new(), ACCOUNT);
        store.load(policy.clone(), &registry, None).unwrap();
        store.load(policy.clone(), &registry, None).unwrap();
        assert_eq!(store.all().unwrap().len(), 1);

        assert_eq!(store.remove(policy.id).unwrap().map(|p| p.id), Some(policy.id));
        assert!(store.all().unwrap().is_empty());
        assert!(store.remove(policy.id).unwrap().is_none());
    }
}
