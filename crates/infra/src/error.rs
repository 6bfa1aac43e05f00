//! Infrastructure and orchestration error types.

use thiserror::Error;

use construcbill_core::DomainError;

/// Storage failures surfaced by repositories.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,

    /// Another package of the same company already carries this number.
    #[error("duplicate invoice number '{0}'")]
    DuplicateInvoiceNumber(String),

    /// Optimistic concurrency or uniqueness conflict.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("serialization failure: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(e: serde_json::Error) -> Self {
        RepositoryError::Serialization(e.to_string())
    }
}

/// Failures at the renderer/mailer boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExportError {
    #[error("document rendering failed: {0}")]
    Render(String),

    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Which kind of record a dangling reference pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Company,
    Client,
    Project,
    Package,
}

impl core::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            ReferenceKind::Company => "company",
            ReferenceKind::Client => "client",
            ReferenceKind::Project => "project",
            ReferenceKind::Package => "billing package",
        })
    }
}

/// Error returned by the billing application services.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BillingError {
    /// A referenced record does not exist. Nothing was written.
    #[error("{kind} {id} not found")]
    ReferenceNotFound { kind: ReferenceKind, id: String },

    #[error("duplicate invoice number '{0}'")]
    DuplicateInvoiceNumber(String),

    /// Role/status lock violation. The package was left unchanged.
    #[error("edit denied: {0}")]
    EditDenied(String),

    #[error(transparent)]
    Domain(DomainError),

    #[error(transparent)]
    Repository(RepositoryError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

impl BillingError {
    pub fn not_found(kind: ReferenceKind, id: impl ToString) -> Self {
        BillingError::ReferenceNotFound {
            kind,
            id: id.to_string(),
        }
    }
}

impl From<DomainError> for BillingError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::EditDenied(msg) => BillingError::EditDenied(msg),
            other => BillingError::Domain(other),
        }
    }
}

impl From<RepositoryError> for BillingError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::DuplicateInvoiceNumber(n) => BillingError::DuplicateInvoiceNumber(n),
            other => BillingError::Repository(other),
        }
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
