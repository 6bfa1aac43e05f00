//! Domain events and their distribution.
//!
//! Aggregates emit typed events; the application layer wraps them in
//! [`EventEnvelope`]s and publishes them on an [`EventBus`] so read models
//! (dashboards, audit views) can follow package lifecycles without touching
//! the write path.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod projection;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use projection::Projection;
