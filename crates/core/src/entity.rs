//! Entities: records with an identity that outlives edits to their attributes.
//!
//! Companies, clients and projects are entities. Billing packages go further
//! and are aggregates (see [`crate::AggregateRoot`]).

pub trait Entity {
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug + core::fmt::Display;

    fn id(&self) -> &Self::Id;
}
