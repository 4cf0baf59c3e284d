//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Batches are entities: a batch keeps its id while its quantity is consumed
/// down to zero, and a depleted batch is still the same record.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
