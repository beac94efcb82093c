//! Authorizable domain objects as seen by evaluators.
//!
//! The engine does not know concrete entity structs. An object is a typed
//! bag of attributes; the same attribute names are used by evaluators when
//! they inspect one object and when they build a row-level condition.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use idgov_core::{Entity, ObjectId, PrincipalId};

/// Attribute every record exposes for its own identifier.
pub const ID_ATTRIBUTE: &str = "id";

/// Identifier of an authorizable object type (e.g. `"IDENTITY"`, `"ACCOUNT"`).
///
/// `"*"` is the wildcard: a policy bound to it applies to every type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorizableType(Cow<'static, str>);

impl AuthorizableType {
    pub const WILDCARD: AuthorizableType = AuthorizableType::from_static("*");
    pub const IDENTITY: AuthorizableType = AuthorizableType::from_static("IDENTITY");

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }

    /// Whether something bound to `self` applies to objects of `concrete`.
    pub fn covers(&self, concrete: &AuthorizableType) -> bool {
        self.is_wildcard() || self == concrete
    }
}

impl core::fmt::Display for AuthorizableType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Attribute value.
///
/// Equality in conditions follows SQL: `Null` never equals anything,
/// including another `Null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Id(Uuid),
}

impl AttrValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }

    pub fn as_id(&self) -> Option<Uuid> {
        match self {
            AttrValue::Id(id) => Some(*id),
            _ => None,
        }
    }

    /// Condition-language equality (`Null` is never equal).
    pub fn sql_eq(&self, other: &AttrValue) -> bool {
        !self.is_null() && !other.is_null() && self == other
    }
}

impl From<Uuid> for AttrValue {
    fn from(value: Uuid) -> Self {
        AttrValue::Id(value)
    }
}

impl From<ObjectId> for AttrValue {
    fn from(value: ObjectId) -> Self {
        AttrValue::Id(*value.as_uuid())
    }
}

impl From<PrincipalId> for AttrValue {
    fn from(value: PrincipalId) -> Self {
        AttrValue::Id(*value.as_uuid())
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl<T: Into<AttrValue>> From<Option<T>> for AttrValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(AttrValue::Null)
    }
}

impl core::fmt::Display for AttrValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AttrValue::Null => f.write_str("NULL"),
            AttrValue::Bool(v) => write!(f, "{v}"),
            AttrValue::Int(v) => write!(f, "{v}"),
            AttrValue::Text(v) => write!(f, "'{v}'"),
            AttrValue::Id(v) => write!(f, "'{v}'"),
        }
    }
}

/// A concrete authorizable object (one row of its type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub object_type: AuthorizableType,
    pub id: ObjectId,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttrValue>,
}

impl Record {
    pub fn new(object_type: AuthorizableType, id: ObjectId) -> Self {
        Self {
            object_type,
            id,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Attribute value; `id` resolves to the record id, missing names to `Null`.
    pub fn attribute(&self, name: &str) -> AttrValue {
        if name == ID_ATTRIBUTE {
            return AttrValue::from(self.id);
        }
        self.attributes.get(name).cloned().unwrap_or_default()
    }

    /// Attribute interpreted as a reference to another object.
    pub fn reference(&self, name: &str) -> Option<ObjectId> {
        self.attribute(name).as_id().map(ObjectId::from_uuid)
    }

    /// Whether the attribute references the given principal.
    pub fn references_principal(&self, name: &str, principal: PrincipalId) -> bool {
        self.attribute(name).sql_eq(&AttrValue::from(principal))
    }
}

impl Entity for Record {
    type Id = ObjectId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
