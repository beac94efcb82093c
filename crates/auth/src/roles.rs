//! Principal → currently valid roles.

use std::collections::HashMap;
use std::sync::RwLock;

use idgov_core::PrincipalId;

use crate::error::CollaboratorError;
use crate::principal::PrincipalContext;

/// Resolves the roles a principal holds right now.
///
/// Consulted at the start of every evaluation. Implementations apply
/// assignment and contract validity windows themselves.
pub trait RoleProvider: Send + Sync {
    fn resolve(&self, principal: PrincipalId) -> Result<PrincipalContext, CollaboratorError>;
}

/// In-memory role provider.
///
/// Intended for tests/dev. Unknown principals hold no roles.
#[derive(Debug, Default)]
pub struct InMemoryRoleProvider {
    principals: RwLock<HashMap<PrincipalId, PrincipalContext>>,
}

impl InMemoryRoleProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, context: PrincipalContext) -> Result<(), CollaboratorError> {
        let mut principals = self
            .principals
            .write()
            .map_err(|_| CollaboratorError::Poisoned("role provider"))?;
        principals.insert(context.principal_id, context);
        Ok(())
    }
}

impl RoleProvider for InMemoryRoleProvider {
    fn resolve(&self, principal: PrincipalId) -> Result<PrincipalContext, CollaboratorError> {
        let principals = self
            .principals
            .read()
            .map_err(|_| CollaboratorError::Poisoned("role provider"))?;
        Ok(principals
            .get(&principal)
            .cloned()
            .unwrap_or_else(|| PrincipalContext::new(principal)))
    }
}
