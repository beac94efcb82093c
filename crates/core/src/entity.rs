//! Entity trait: anything with a stable identifier.

/// Entity marker + minimal interface.
///
/// Implemented by domain objects handed to evaluators and by persisted
/// configuration records such as policies.
pub trait Entity {
    /// Strongly-typed identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the identifier.
    fn id(&self) -> &Self::Id;
}
