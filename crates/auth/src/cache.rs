//! Object-decision cache.
//!
//! Every invalidation takes the next tick of one monotonic counter and
//! remembers it for what it invalidated (a role, a type, an object). A
//! decision is stamped with the current tick before it is computed and is
//! served only while nothing it depends on was invalidated after that tick,
//! so a decision computed before a policy change can never be served after
//! it, even if it is written to the cache after the invalidation happened.
//!
//! A decision depends on the roles the principal held, on every type whose
//! policies were consulted while computing it (including nested decisions on
//! owners and counterparties, their declared supertypes and the wildcard),
//! and on every object it was computed for. Relation rows (links, hierarchy
//! edges) are not tracked: when one changes, invalidate the objects at both
//! ends with [`PermissionCache::invalidate_object`], or clear the cache.

use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

use idgov_core::{ObjectId, PrincipalId, RoleId};

use crate::object::AuthorizableType;
use crate::permissions::PermissionSet;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecisionKey {
    pub principal: PrincipalId,
    pub object_type: AuthorizableType,
    pub object_id: ObjectId,
}

/// Tick observed before a decision was computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CacheStamp(u64);

/// Types and objects a decision read while it was computed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependencies {
    types: BTreeSet<AuthorizableType>,
    objects: BTreeSet<(AuthorizableType, ObjectId)>,
}

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_type(&mut self, object_type: AuthorizableType) {
        self.types.insert(object_type);
    }

    pub fn add_object(&mut self, object_type: AuthorizableType, id: ObjectId) {
        self.objects.insert((object_type, id));
    }

    pub fn types(&self) -> impl Iterator<Item = &AuthorizableType> {
        self.types.iter()
    }

    pub fn objects(&self) -> impl Iterator<Item = &(AuthorizableType, ObjectId)> {
        self.objects.iter()
    }

    pub fn depends_on_type(&self, object_type: &AuthorizableType) -> bool {
        self.types.contains(object_type)
    }
}

/// Cache of per-object decisions.
///
/// See the module docs for what invalidates an entry.
pub trait PermissionCache: Send + Sync {
    /// Snapshot the invalidation counter; call before computing the decision.
    fn stamp(&self) -> CacheStamp;

    fn get(&self, key: &DecisionKey, roles: &BTreeSet<RoleId>) -> Option<PermissionSet>;

    fn put(
        &self,
        key: DecisionKey,
        stamp: CacheStamp,
        roles: BTreeSet<RoleId>,
        dependencies: Dependencies,
        permissions: PermissionSet,
    );

    /// Policies of `role` changed.
    fn invalidate_role(&self, role: RoleId);

    /// Policies bound to `object_type` changed (the wildcard invalidates all).
    fn invalidate_type(&self, object_type: &AuthorizableType);

    /// Data of one object changed, including relation rows pointing at it.
    fn invalidate_object(&self, object_type: &AuthorizableType, id: ObjectId);

    fn clear(&self);
}

#[derive(Debug)]
struct Entry {
    stamp: CacheStamp,
    roles: BTreeSet<RoleId>,
    dependencies: Dependencies,
    permissions: PermissionSet,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<DecisionKey, Entry>,
    tick: u64,
    cleared_at: u64,
    roles: HashMap<RoleId, u64>,
    types: HashMap<AuthorizableType, u64>,
    objects: HashMap<(AuthorizableType, ObjectId), u64>,
}

impl CacheState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Nothing the entry depends on was invalidated after its stamp.
    fn is_fresh(&self, entry: &Entry) -> bool {
        let after = |tick: Option<&u64>| tick.is_some_and(|t| *t > entry.stamp.0);
        self.cleared_at <= entry.stamp.0
            && !after(self.types.get(&AuthorizableType::WILDCARD))
            && !entry.roles.iter().any(|r| after(self.roles.get(r)))
            && !entry.dependencies.types().any(|t| after(self.types.get(t)))
            && !entry.dependencies.objects().any(|o| after(self.objects.get(o)))
    }
}

/// In-memory permission cache guarded by a single `RwLock`.
///
/// When full, the whole cache is dropped rather than evicting selectively.
#[derive(Debug)]
pub struct InMemoryPermissionCache {
    state: RwLock<CacheState>,
    capacity: usize,
}

impl InMemoryPermissionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PermissionCache for InMemoryPermissionCache {
    fn stamp(&self) -> CacheStamp {
        CacheStamp(self.state.read().unwrap_or_else(PoisonError::into_inner).tick)
    }

    fn get(&self, key: &DecisionKey, roles: &BTreeSet<RoleId>) -> Option<PermissionSet> {
        // A poisoned cache is a miss, never a grant.
        let state = self.state.read().ok()?;
        let entry = state.entries.get(key)?;
        (entry.roles == *roles && state.is_fresh(entry)).then(|| entry.permissions.clone())
    }

    fn put(
        &self,
        key: DecisionKey,
        stamp: CacheStamp,
        roles: BTreeSet<RoleId>,
        dependencies: Dependencies,
        permissions: PermissionSet,
    ) {
        let Ok(mut state) = self.state.write() else {
            return;
        };
        let entry = Entry {
            stamp,
            roles,
            dependencies,
            permissions,
        };
        if !state.is_fresh(&entry) {
            return;
        }
        if state.entries.len() >= self.capacity {
            state.entries.clear();
        }
        state.entries.insert(key, entry);
    }

    fn invalidate_role(&self, role: RoleId) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let tick = state.next_tick();
        state.roles.insert(role, tick);
        state.entries.retain(|_, entry| !entry.roles.contains(&role));
    }

    fn invalidate_type(&self, object_type: &AuthorizableType) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let tick = state.next_tick();
        state.types.insert(object_type.clone(), tick);
        if object_type.is_wildcard() {
            state.entries.clear();
        } else {
            state
                .entries
                .retain(|_, entry| !entry.dependencies.depends_on_type(object_type));
        }
    }

    fn invalidate_object(&self, object_type: &AuthorizableType, id: ObjectId) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let tick = state.next_tick();
        let object = (object_type.clone(), id);
        state
            .entries
            .retain(|_, entry| !entry.dependencies.objects.contains(&object));
        state.objects.insert(object, tick);
    }

    fn clear(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.cleared_at = state.next_tick();
        state.entries.clear();
        // every older invalidation is covered by `cleared_at`
        state.roles.clear();
        state.types.clear();
        state.objects.clear();
    }
}
