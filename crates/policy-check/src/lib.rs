//! Offline validation of policy files.
//!
//! Every policy is loaded into an [`InMemoryPolicyStore`] exactly as a
//! running engine would load it: the evaluator must exist, support the
//! policy's type and accept its properties, and the granted permissions
//! must belong to the type's group when groups are given.

use serde::Serialize;

use idgov_authz::{
    DuplicatePolicy, EvaluatorRegistry, GroupPermission, GroupPermissionRegistry, InMemoryPolicyStore,
    Policy,
};
use idgov_core::PolicyId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedPolicy {
    pub policy: PolicyId,
    pub evaluator: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    pub loaded: usize,
    pub rejected: Vec<RejectedPolicy>,
    pub duplicates: Vec<DuplicatePolicy>,
}

impl Report {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty() && self.duplicates.is_empty()
    }
}

pub fn groups_from(groups: Vec<GroupPermission>) -> GroupPermissionRegistry {
    groups
        .into_iter()
        .fold(GroupPermissionRegistry::new(), GroupPermissionRegistry::with_group)
}

pub fn check(
    policies: Vec<Policy>,
    registry: &EvaluatorRegistry,
    groups: Option<&GroupPermissionRegistry>,
) -> Report {
    let store = InMemoryPolicyStore::new();
    let mut report = Report::default();
    for policy in policies {
        let id = policy.id;
        let evaluator = policy.evaluator.clone();
        match store.load(policy, registry, groups) {
            Ok(duplicates) => {
                report.loaded += 1;
                for duplicate in duplicates {
                    tracing::warn!(kept = %duplicate.kept, duplicate = %duplicate.duplicate, "duplicate policy");
                    report.duplicates.push(duplicate);
                }
            }
            Err(err) => {
                tracing::warn!(policy_id = %id, evaluator = %evaluator, error = %err, "policy rejected");
                report.rejected.push(RejectedPolicy {
                    policy: id,
                    evaluator,
                    error: err.to_string(),
                });
            }
        }
    }
    report
}
