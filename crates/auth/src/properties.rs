//! Typed evaluator configuration.
//!
//! Policies carry an opaque key → value map that only the bound evaluator
//! interprets. Each evaluator declares the keys it understands; a policy is
//! checked against that schema once, when it is loaded.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use idgov_core::ValueObject;

use crate::permissions::Permission;

/// Kind of value a property must hold.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    Bool,
    Int,
    Text,
    Id,
    /// Text naming a permission.
    Permission,
}

/// One entry of an evaluator's property schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyDefinition {
    pub name: &'static str,
    pub kind: PropertyKind,
    pub required: bool,
}

impl PropertyDefinition {
    pub const fn required(name: &'static str, kind: PropertyKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: PropertyKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }
}

/// Property value as configured on a policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Id(Uuid),
    Text(String),
}

impl PropertyValue {
    fn matches(&self, kind: PropertyKind) -> bool {
        matches!(
            (self, kind),
            (PropertyValue::Bool(_), PropertyKind::Bool)
                | (PropertyValue::Int(_), PropertyKind::Int)
                | (PropertyValue::Id(_), PropertyKind::Id)
                | (PropertyValue::Text(_), PropertyKind::Text)
                | (PropertyValue::Text(_), PropertyKind::Permission)
        )
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<Uuid> for PropertyValue {
    fn from(value: Uuid) -> Self {
        PropertyValue::Id(value)
    }
}

impl From<Permission> for PropertyValue {
    fn from(value: Permission) -> Self {
        PropertyValue::Text(value.as_str().to_string())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PropertyError {
    #[error("missing required property '{0}'")]
    Missing(String),

    #[error("property '{name}' must be of kind {expected:?}")]
    WrongKind { name: String, expected: PropertyKind },

    #[error("unknown property '{0}'")]
    Unknown(String),

    #[error("property '{name}' has unsupported value '{value}'")]
    InvalidValue { name: String, value: String },
}

/// Evaluator properties of one policy (unordered; compared as a map).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvaluatorProperties(BTreeMap<String, PropertyValue>);

impl EvaluatorProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(PropertyValue::Text(v)) => Some(v),
            _ => None,
        }
    }

    pub fn id(&self, name: &str) -> Option<Uuid> {
        match self.0.get(name) {
            Some(PropertyValue::Id(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        match self.0.get(name) {
            Some(PropertyValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn permission(&self, name: &str) -> Option<Permission> {
        self.text(name).map(|p| Permission::new(p.to_string()))
    }

    /// Text property or a default.
    pub fn text_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.text(name).unwrap_or(default)
    }

    /// Check presence and kinds against a schema. Unknown keys are rejected.
    pub fn validate(&self, schema: &[PropertyDefinition]) -> Result<(), PropertyError> {
        for (name, value) in &self.0 {
            let Some(def) = schema.iter().find(|d| d.name == name) else {
                return Err(PropertyError::Unknown(name.clone()));
            };
            if !value.matches(def.kind) {
                return Err(PropertyError::WrongKind {
                    name: name.clone(),
                    expected: def.kind,
                });
            }
        }
        for def in schema.iter().filter(|d| d.required) {
            if !self.0.contains_key(def.name) {
                return Err(PropertyError::Missing(def.name.to_string()));
            }
        }
        Ok(())
    }
}

impl FromIterator<(String, PropertyValue)> for EvaluatorProperties {
    fn from_iter<I: IntoIterator<Item = (String, PropertyValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl ValueObject for EvaluatorProperties {}
