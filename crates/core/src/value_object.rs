//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have no identity and are never mutated in place: a changed
/// amount is a new value. `Money` and a resolved `Location` are value objects;
/// a `Batch` is not (it keeps its identity while its quantity changes).
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
