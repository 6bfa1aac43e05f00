//! Value object trait: equality by value, not identity.
//!
//! Value objects have no identity; two value objects with the same attributes
//! are the same value. Totals snapshots, addresses and line details are value
//! objects; companies and packages are not.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by value. To "modify" one, build a
/// new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
