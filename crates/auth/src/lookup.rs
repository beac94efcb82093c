//! Read-only object lookups used by relation-based evaluators.

use idgov_core::ObjectId;

use crate::error::CollaboratorError;
use crate::object::{AttrValue, AuthorizableType, Record};

/// Narrow read-only access to domain objects.
///
/// Evaluators use it on the imperative path only: to load an owner object,
/// or to iterate the relation rows pointing at an object. The query path
/// expresses the same lookups as `EXISTS` sub-conditions instead.
pub trait ObjectLookup: Send + Sync {
    fn find(
        &self,
        object_type: &AuthorizableType,
        id: ObjectId,
    ) -> Result<Option<Record>, CollaboratorError>;

    /// Objects of `object_type` whose `attribute` equals `value`
    /// (condition-language equality: `Null` matches nothing).
    fn find_by_attribute(
        &self,
        object_type: &AuthorizableType,
        attribute: &str,
        value: &AttrValue,
    ) -> Result<Vec<Record>, CollaboratorError>;
}
