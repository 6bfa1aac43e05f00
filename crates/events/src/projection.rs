use crate::{Event, EventEnvelope};

/// A projection folds published events into a disposable read model.
///
/// `apply` must be idempotent: the bus is at-least-once, so the same envelope
/// can arrive more than once. Use `sequence_number` to skip stale deliveries.
pub trait Projection {
    type Ev: Event;

    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>);
}
