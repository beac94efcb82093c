//! Management hierarchy and the relation filters built on it.
//!
//! The engine never derives "who manages whom" itself. A
//! [`ManagerHierarchy`] answers that, and a [`RelationFilter`] turns the
//! answer into both a per-object check and a row-level condition.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use idgov_core::{ObjectId, PrincipalId};

use crate::condition::{Condition, ConditionBuilder, QueryContext};
use crate::error::CollaboratorError;
use crate::object::{AttrValue, Record};

/// "Reports-to" relation between identities.
pub trait ManagerHierarchy: Send + Sync {
    /// Every identity managed by `manager`, directly or transitively.
    fn subordinates_of(&self, manager: PrincipalId) -> Result<BTreeSet<ObjectId>, CollaboratorError>;

    fn is_subordinate(
        &self,
        manager: PrincipalId,
        subject: ObjectId,
    ) -> Result<bool, CollaboratorError> {
        Ok(self.subordinates_of(manager)?.contains(&subject))
    }
}

/// In-memory hierarchy (subordinate → direct managers).
///
/// Intended for tests/dev. Cycles in the reports-to graph are tolerated.
#[derive(Debug, Default)]
pub struct InMemoryHierarchy {
    managers: RwLock<HashMap<ObjectId, BTreeSet<ObjectId>>>,
}

impl InMemoryHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_manager(
        &self,
        subordinate: ObjectId,
        manager: ObjectId,
    ) -> Result<(), CollaboratorError> {
        let mut managers = self
            .managers
            .write()
            .map_err(|_| CollaboratorError::Poisoned("hierarchy"))?;
        managers.entry(subordinate).or_default().insert(manager);
        Ok(())
    }
}

impl ManagerHierarchy for InMemoryHierarchy {
    fn subordinates_of(&self, manager: PrincipalId) -> Result<BTreeSet<ObjectId>, CollaboratorError> {
        let managers = self
            .managers
            .read()
            .map_err(|_| CollaboratorError::Poisoned("hierarchy"))?;

        let root = ObjectId::from(manager);
        let mut found = BTreeSet::new();
        let mut queue = VecDeque::from([root]);
        while let Some(current) = queue.pop_front() {
            for (subordinate, their_managers) in managers.iter() {
                if their_managers.contains(&current) && *subordinate != root && found.insert(*subordinate) {
                    queue.push_back(*subordinate);
                }
            }
        }
        Ok(found)
    }
}

/// A registered relation between the principal and an object, usable both
/// imperatively and as a row-level condition.
pub trait RelationFilter: Send + Sync {
    fn name(&self) -> &str;

    fn is_related(&self, principal: PrincipalId, object: &Record) -> Result<bool, CollaboratorError>;

    fn predicate(
        &self,
        principal: PrincipalId,
        query: &QueryContext,
        builder: &mut ConditionBuilder,
    ) -> Result<Condition, CollaboratorError>;
}

/// Objects whose `id` is a (transitive) subordinate of the principal.
pub struct SubordinatesFilter {
    hierarchy: Arc<dyn ManagerHierarchy>,
}

impl SubordinatesFilter {
    pub const NAME: &'static str = "subordinates";

    pub fn new(hierarchy: Arc<dyn ManagerHierarchy>) -> Self {
        Self { hierarchy }
    }
}

impl RelationFilter for SubordinatesFilter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_related(&self, principal: PrincipalId, object: &Record) -> Result<bool, CollaboratorError> {
        self.hierarchy.is_subordinate(principal, object.id)
    }

    fn predicate(
        &self,
        principal: PrincipalId,
        query: &QueryContext,
        _builder: &mut ConditionBuilder,
    ) -> Result<Condition, CollaboratorError> {
        let subordinates = self.hierarchy.subordinates_of(principal)?;
        Ok(Condition::is_in(
            query.row.id(),
            subordinates.into_iter().map(AttrValue::from),
        ))
    }
}

/// Name → relation filter.
#[derive(Clone, Default)]
pub struct RelationFilterRegistry {
    filters: HashMap<String, Arc<dyn RelationFilter>>,
}

impl RelationFilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: impl RelationFilter + 'static) -> Self {
        self.register(Arc::new(filter));
        self
    }

    pub fn register(&mut self, filter: Arc<dyn RelationFilter>) {
        self.filters.insert(filter.name().to_string(), filter);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn RelationFilter>> {
        self.filters.get(name).cloned()
    }
}

impl core::fmt::Debug for RelationFilterRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut names: Vec<&String> = self.filters.keys().collect();
        names.sort();
        f.debug_struct("RelationFilterRegistry")
            .field("filters", &names)
            .finish()
    }
}
