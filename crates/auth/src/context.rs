use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use idgov_core::PrincipalId;

use crate::cache::Dependencies;
use crate::condition::{Condition, ConditionBuilder, QueryContext};
use crate::error::EvaluatorError;
use crate::hierarchy::RelationFilter;
use crate::lookup::ObjectLookup;
use crate::manager::{AuthorizationManager, Target};
use crate::object::Record;
use crate::permissions::{Permission, PermissionSet};
use crate::principal::PrincipalContext;

/// What an evaluator may see while deciding: the principal, read-only
/// collaborators, and the manager for evaluating related objects.
///
/// Every call back into the manager goes one level deeper; past the
/// configured limit it fails with [`EvaluatorError::RecursionLimit`].
///
/// Nested contexts share one record of the types and objects the decision
/// read, which the decision cache uses for invalidation.
pub struct EvaluationContext<'a> {
    manager: &'a AuthorizationManager,
    principal: &'a PrincipalContext,
    depth: usize,
    reads: Rc<RefCell<Dependencies>>,
}

impl<'a> EvaluationContext<'a> {
    pub(crate) fn root(manager: &'a AuthorizationManager, principal: &'a PrincipalContext) -> Self {
        Self {
            manager,
            principal,
            depth: 0,
            reads: Rc::default(),
        }
    }

    pub fn principal(&self) -> &PrincipalContext {
        self.principal
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.principal.principal_id
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn lookup(&self) -> &dyn ObjectLookup {
        self.manager.lookup()
    }

    pub fn relation_filter(&self, name: &str) -> Result<Arc<dyn RelationFilter>, EvaluatorError> {
        self.manager
            .relation_filters()
            .get(name)
            .ok_or_else(|| EvaluatorError::UnknownRelationFilter(name.to_string()))
    }

    /// Aggregate permissions of the principal on a related object.
    pub fn permissions_of(&self, object: &Record) -> Result<PermissionSet, EvaluatorError> {
        let nested = self.descend()?;
        Ok(self.manager.permissions_in(&nested, Target::Object(object))?)
    }

    /// Aggregate filter of the principal over a related row.
    pub fn filter_for(
        &self,
        query: &QueryContext,
        builder: &mut ConditionBuilder,
        permissions: &[Permission],
    ) -> Result<Condition, EvaluatorError> {
        let nested = self.descend()?;
        Ok(self.manager.filter_in(&nested, query, builder, permissions)?)
    }

    pub(crate) fn record_read(&self, target: Target<'_>) {
        let mut reads = self.reads.borrow_mut();
        reads.add_type(target.object_type().clone());
        if let Some(id) = target.object_id() {
            reads.add_object(target.object_type().clone(), id);
        }
    }

    pub(crate) fn reads(&self) -> Dependencies {
        self.reads.borrow().clone()
    }

    fn descend(&self) -> Result<EvaluationContext<'a>, EvaluatorError> {
        let limit = self.manager.config().max_depth;
        if self.depth >= limit {
            return Err(EvaluatorError::RecursionLimit { limit });
        }
        Ok(Self {
            manager: self.manager,
            principal: self.principal,
            depth: self.depth + 1,
            reads: Rc::clone(&self.reads),
        })
    }
}
