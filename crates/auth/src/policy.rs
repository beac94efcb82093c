//! Authorization policies.

use serde::{Deserialize, Serialize};

use idgov_core::{Entity, PolicyId, RoleId};

use crate::object::AuthorizableType;
use crate::permissions::{Permission, PermissionSet};
use crate::properties::{EvaluatorProperties, PropertyValue};

/// Binding of a role to an evaluator, an authorizable type and a granted
/// permission subset.
///
/// Policies are read-only once loaded; evaluation never mutates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,
    pub role_id: RoleId,
    pub authorizable_type: AuthorizableType,
    /// Registry name of the evaluator to run.
    pub evaluator: String,
    pub permissions: PermissionSet,
    #[serde(default)]
    pub properties: EvaluatorProperties,
    #[serde(default)]
    pub disabled: bool,
    /// Ordering hint; lower runs first and wins among duplicates.
    #[serde(default)]
    pub seq: i32,
}

impl Policy {
    pub fn new(
        role_id: RoleId,
        authorizable_type: AuthorizableType,
        evaluator: impl Into<String>,
    ) -> Self {
        Self {
            id: PolicyId::new(),
            role_id,
            authorizable_type,
            evaluator: evaluator.into(),
            permissions: PermissionSet::new(),
            properties: EvaluatorProperties::new(),
            disabled: false,
            seq: 0,
        }
    }

    pub fn with_id(mut self, id: PolicyId) -> Self {
        self.id = id;
        self
    }

    pub fn with_permissions(mut self, permissions: impl IntoIterator<Item = Permission>) -> Self {
        self.permissions.extend(permissions);
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name, value);
        self
    }

    pub fn with_seq(mut self, seq: i32) -> Self {
        self.seq = seq;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// Whether the granted permissions cover every requested one.
    pub fn grants(&self, permissions: &[Permission]) -> bool {
        self.permissions.permits_all(permissions)
    }

    /// Structural equality: same type, evaluator, permission set and
    /// properties. Id, role, ordering and the disabled flag are ignored.
    pub fn is_duplicate(&self, other: &Policy) -> bool {
        self.authorizable_type == other.authorizable_type
            && self.evaluator == other.evaluator
            && self.permissions == other.permissions
            && self.properties == other.properties
    }
}

impl Entity for Policy {
    type Id = PolicyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// A policy that adds nothing because an earlier one grants the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DuplicatePolicy {
    pub kept: PolicyId,
    pub duplicate: PolicyId,
}

fn by_order(policies: &mut [Policy]) {
    policies.sort_by(|a, b| a.seq.cmp(&b.seq).then_with(|| a.id.cmp(&b.id)));
}

/// Drop structural duplicates, keeping the first by `(seq, id)`.
pub fn dedupe(mut policies: Vec<Policy>) -> Vec<Policy> {
    by_order(&mut policies);
    let mut kept: Vec<Policy> = Vec::with_capacity(policies.len());
    for policy in policies {
        if !kept.iter().any(|k| k.is_duplicate(&policy)) {
            kept.push(policy);
        }
    }
    kept
}

/// Every duplicate in `policies`, paired with the policy that shadows it.
pub fn find_duplicates(policies: &[Policy]) -> Vec<DuplicatePolicy> {
    let mut ordered = policies.to_vec();
    by_order(&mut ordered);
    let mut kept: Vec<&Policy> = Vec::new();
    let mut found = Vec::new();
    for policy in &ordered {
        match kept.iter().find(|k| k.is_duplicate(policy)) {
            Some(k) => found.push(DuplicatePolicy {
                kept: k.id,
                duplicate: policy.id,
            }),
            None => kept.push(policy),
        }
    }
    found
}
