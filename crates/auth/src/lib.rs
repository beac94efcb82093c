//! `idgov-authz`: policy-based authorization engine.
//!
//! For a principal and a requested permission set the engine answers two
//! equivalent questions:
//!
//! - may the principal act on this object ([`AuthorizationManager::evaluate`]);
//! - which rows of a type may it act on ([`AuthorizationManager::build_filter`]).
//!
//! Policies bind a role to an object type and an [`Evaluator`] strategy.
//! Storage, role resolution and query execution stay behind the traits in
//! [`roles`], [`store`], [`lookup`] and [`hierarchy`].

pub mod cache;
pub mod condition;
pub mod config;
pub mod context;
pub mod datasource;
pub mod error;
pub mod evaluator;
pub mod hierarchy;
pub mod lookup;
pub mod manager;
pub mod object;
pub mod permissions;
pub mod policy;
pub mod principal;
pub mod properties;
pub mod roles;
pub mod store;
pub mod warnings;

pub use cache::{CacheStamp, Dependencies, InMemoryPermissionCache, PermissionCache};
pub use condition::{Condition, ConditionBuilder, QueryContext, RowVar};
pub use config::AuthorizationConfig;
pub use context::EvaluationContext;
pub use datasource::InMemoryDataSource;
pub use error::{AuthorizationError, CollaboratorError, EvaluatorError, PolicyLoadError};
pub use evaluator::{Evaluator, EvaluatorRegistry};
pub use hierarchy::{InMemoryHierarchy, ManagerHierarchy, RelationFilter, RelationFilterRegistry};
pub use lookup::ObjectLookup;
pub use manager::{AuthorizationManager, AuthorizationManagerBuilder, Target};
pub use object::{AttrValue, AuthorizableType, Record};
pub use permissions::{GroupPermission, GroupPermissionRegistry, Permission, PermissionSet};
pub use policy::{DuplicatePolicy, Policy};
pub use principal::PrincipalContext;
pub use properties::{EvaluatorProperties, PropertyValue};
pub use roles::{InMemoryRoleProvider, RoleProvider};
pub use store::{InMemoryPolicyStore, PolicyStore};
pub use warnings::{ConfigurationWarning, WarningBoard};
