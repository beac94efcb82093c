use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use idgov_core::{PrincipalId, RoleId};

/// A fully resolved principal for one authorization call.
///
/// Roles are already filtered for assignment/contract validity by whoever
/// resolved them; the engine takes them as given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalContext {
    pub principal_id: PrincipalId,
    pub roles: BTreeSet<RoleId>,
    /// Super-admin bypass: every check succeeds without consulting policies.
    #[serde(default)]
    pub admin: bool,
}

impl PrincipalContext {
    pub fn new(principal_id: PrincipalId) -> Self {
        Self {
            principal_id,
            roles: BTreeSet::new(),
            admin: false,
        }
    }

    pub fn with_role(mut self, role: RoleId) -> Self {
        self.roles.insert(role);
        self
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = RoleId>) -> Self {
        self.roles.extend(roles);
        self
    }

    pub fn super_admin(principal_id: PrincipalId) -> Self {
        Self {
            admin: true,
            ..Self::new(principal_id)
        }
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }
}
