//! Errors raised by domain decisions.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Why a command or a record was rejected.
///
/// Only deterministic, business-level failures live here. Pure computations
/// (amounts, totals, words) never produce one; storage and delivery failures
/// are modelled by the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input, e.g. an end date before a start date.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The command would break a rule of the record, e.g. moving a PAID package back.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The addressed item (line, image, section) is not part of the record.
    #[error("not found")]
    NotFound,

    /// Stale version or a transition to the current status.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized")]
    Unauthorized,

    /// The caller's role may not mutate the record in its current status.
    #[error("edit denied: {0}")]
    EditDenied(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn edit_denied(msg: impl Into<String>) -> Self {
        Self::EditDenied(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
