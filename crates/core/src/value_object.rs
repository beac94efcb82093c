//! Value object trait: equality by value, not identity.

/// Marker trait for immutable values compared by their attributes.
///
/// Permissions, permission sets and evaluator properties are value objects:
/// two policies granting `{READ, UPDATE}` grant the same thing no matter
/// which policy record they came from. Duplicate-policy detection relies on
/// this.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
