//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus distributes package events after the package snapshot has been
//! persisted. The repository is the source of truth; the bus only feeds read
//! models, so delivery is at-least-once and consumers must be idempotent.

use std::sync::Arc;
use std::sync::mpsc::Receiver;

/// A subscription to a bus: every subscriber receives a copy of every message
/// published after it subscribed.
///
/// Consumers pull with [`Subscription::drain`]; it never blocks.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Take every message that is already queued, without blocking.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

/// Transport-agnostic pub/sub contract.
///
/// `publish` failures are surfaced to the caller; since the snapshot is already
/// stored, a failed publish never rolls back the write.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
