//! Error taxonomy of the authorization engine.
//!
//! - [`AuthorizationError`] is escalated to callers (the whole decision failed).
//! - [`EvaluatorError`] is local to one policy: logged, contributes nothing.
//! - Access denied is never an error: it is `Ok(false)` / an empty set.

use thiserror::Error;

use idgov_core::{PolicyId, PrincipalId};

use crate::object::AuthorizableType;
use crate::permissions::Permission;
use crate::properties::PropertyError;

/// Failure reported by an external collaborator (lookup, store, hierarchy).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("{collaborator} unavailable: {message}")]
    Unavailable {
        collaborator: &'static str,
        message: String,
    },

    #[error("{0}: lock poisoned")]
    Poisoned(&'static str),
}

impl CollaboratorError {
    pub fn unavailable(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            collaborator,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("cannot resolve roles of principal {principal}: {source}")]
    RoleResolution {
        principal: PrincipalId,
        source: CollaboratorError,
    },

    #[error("cannot load policies for type {object_type}: {source}")]
    PolicyStore {
        object_type: AuthorizableType,
        source: CollaboratorError,
    },

    #[error("no permission requested")]
    EmptyPermissionRequest,

    #[error("permission '{permission}' does not belong to the group of type {object_type}")]
    PermissionNotInGroup {
        permission: Permission,
        object_type: AuthorizableType,
    },
}

/// Failure of one evaluator for one policy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvaluatorError {
    #[error("evaluator '{0}' is not registered")]
    UnknownEvaluator(String),

    #[error("invalid properties for evaluator '{evaluator}': {source}")]
    InvalidProperties {
        evaluator: String,
        source: PropertyError,
    },

    #[error("evaluator '{evaluator}' does not support type {object_type}")]
    UnsupportedType {
        evaluator: String,
        object_type: AuthorizableType,
    },

    #[error("relation filter '{0}' is not registered")]
    UnknownRelationFilter(String),

    #[error("evaluation nested deeper than {limit} levels")]
    RecursionLimit { limit: usize },

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error("nested evaluation failed: {0}")]
    Nested(String),
}

impl EvaluatorError {
    /// Configuration errors stay on the warning board until fixed; the rest
    /// are transient and only logged.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, EvaluatorError::Collaborator(_) | EvaluatorError::Nested(_))
    }

    pub fn invalid_properties(evaluator: &str, source: PropertyError) -> Self {
        Self::InvalidProperties {
            evaluator: evaluator.to_string(),
            source,
        }
    }
}

impl From<AuthorizationError> for EvaluatorError {
    fn from(value: AuthorizationError) -> Self {
        match value {
            AuthorizationError::RoleResolution { source, .. }
            | AuthorizationError::PolicyStore { source, .. } => EvaluatorError::Collaborator(source),
            other => EvaluatorError::Nested(other.to_string()),
        }
    }
}

/// A policy rejected while loading configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyLoadError {
    #[error("policy {policy} rejected: {source}")]
    InvalidPolicy {
        policy: PolicyId,
        source: EvaluatorError,
    },

    #[error("policy {policy} grants '{permission}' outside the group of type {object_type}")]
    PermissionNotInGroup {
        policy: PolicyId,
        permission: Permission,
        object_type: AuthorizableType,
    },

    #[error(transparent)]
    Store(#[from] CollaboratorError),
}
