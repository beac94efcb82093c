use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use idgov_core::ValueObject;

use crate::object::AuthorizableType;

/// Permission identifier.
///
/// Permissions are compared by name (e.g. `"READ"`). A granted [`base::ADMIN`]
/// permits every other permission of its group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_admin(&self) -> bool {
        self.as_str() == base::ADMIN.as_str()
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl ValueObject for Permission {}

/// Base permission vocabulary shared by every authorizable group.
pub mod base {
    use super::Permission;

    pub const ADMIN: Permission = Permission::from_static("ADMIN");
    pub const READ: Permission = Permission::from_static("READ");
    pub const CREATE: Permission = Permission::from_static("CREATE");
    pub const UPDATE: Permission = Permission::from_static("UPDATE");
    pub const DELETE: Permission = Permission::from_static("DELETE");
    pub const COUNT: Permission = Permission::from_static("COUNT");
    pub const AUTOCOMPLETE: Permission = Permission::from_static("AUTOCOMPLETE");

    /// Every base permission, `ADMIN` first.
    pub fn all() -> [Permission; 7] {
        [ADMIN, READ, CREATE, UPDATE, DELETE, COUNT, AUTOCOMPLETE]
    }
}

/// A set of granted permissions.
///
/// "Permits" checks honour `ADMIN`: a set containing it permits anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The set a super-admin holds on everything.
    pub fn admin() -> Self {
        Self::from_iter([base::ADMIN])
    }

    pub fn insert(&mut self, permission: Permission) -> bool {
        self.0.insert(permission)
    }

    pub fn contains(&self, permission: &Permission) -> bool {
        self.0.contains(permission)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.0.iter()
    }

    pub fn is_admin(&self) -> bool {
        self.0.contains(&base::ADMIN)
    }

    pub fn permits(&self, permission: &Permission) -> bool {
        self.is_admin() || self.0.contains(permission)
    }

    /// True iff every requested permission is permitted.
    pub fn permits_all(&self, permissions: &[Permission]) -> bool {
        self.is_admin() || permissions.iter().all(|p| self.0.contains(p))
    }

    pub fn union_with(&mut self, other: &PermissionSet) {
        self.0.extend(other.0.iter().cloned());
    }

    /// Keep only what both sides permit.
    ///
    /// `ADMIN` on one side defers to the other side, so the result permits `p`
    /// exactly when both `self` and `grant` permit `p`.
    pub fn restrict_to(&self, grant: &PermissionSet) -> PermissionSet {
        if self.is_admin() {
            grant.clone()
        } else if grant.is_admin() {
            self.clone()
        } else {
            Self(self.0.intersection(&grant.0).cloned().collect())
        }
    }

    pub fn to_vec(&self) -> Vec<Permission> {
        self.0.iter().cloned().collect()
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<Permission> for PermissionSet {
    fn extend<I: IntoIterator<Item = Permission>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl<'a> IntoIterator for &'a PermissionSet {
    type Item = &'a Permission;
    type IntoIter = std::collections::btree_set::Iter<'a, Permission>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl core::fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("{")?;
        for (idx, p) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            f.write_str(p.as_str())?;
        }
        f.write_str("}")
    }
}

impl ValueObject for PermissionSet {}

/// Named bundle of permissions scoped to one authorizable type
/// (e.g. `ACCOUNT` → {ADMIN, READ, CREATE, UPDATE, DELETE, AUTOCOMPLETE}).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPermission {
    pub name: String,
    pub authorizable_type: AuthorizableType,
    pub permissions: PermissionSet,
}

impl GroupPermission {
    pub fn new(
        name: impl Into<String>,
        authorizable_type: AuthorizableType,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> Self {
        Self {
            name: name.into(),
            authorizable_type,
            permissions: permissions.into_iter().collect(),
        }
    }

    /// Membership test; no `ADMIN` expansion here, the vocabulary is literal.
    pub fn contains(&self, permission: &Permission) -> bool {
        self.permissions.contains(permission)
    }
}

/// Authorizable type → permission group.
#[derive(Debug, Clone, Default)]
pub struct GroupPermissionRegistry {
    groups: HashMap<AuthorizableType, GroupPermission>,
}

impl GroupPermissionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, group: GroupPermission) -> Self {
        self.register(group);
        self
    }

    pub fn register(&mut self, group: GroupPermission) {
        self.groups.insert(group.authorizable_type.clone(), group);
    }

    pub fn group_for(&self, object_type: &AuthorizableType) -> Option<&GroupPermission> {
        self.groups.get(object_type)
    }

    /// First permission that falls outside the type's group, if any.
    ///
    /// Types without a registered group (including the wildcard) accept
    /// everything.
    pub fn first_foreign<'a>(
        &self,
        object_type: &AuthorizableType,
        permissions: impl IntoIterator<Item = &'a Permission>,
    ) -> Option<Permission> {
        let group = self.group_for(object_type)?;
        permissions
            .into_iter()
            .find(|p| !group.contains(p))
            .cloned()
    }
}
