//! Read models folded from published package events.
//!
//! Projections are disposable and idempotent: they can be rebuilt from stored
//! packages and tolerate redelivered events.

pub mod dashboard;
