use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use construcbill_auth::AuthzError;
use construcbill_core::DomainError;
use construcbill_infra::{BillingError, ExportError, RepositoryError};

/// A failed request, already rendered as a JSON error response.
#[derive(Debug)]
pub struct ApiError(Response);

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self(json_error(status, code, message))
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn status(&self) -> StatusCode {
        self.0.status()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.0
    }
}

impl From<AuthzError> for ApiError {
    fn from(e: AuthzError) -> Self {
        ApiError::new(StatusCode::FORBIDDEN, "forbidden", e.to_string())
    }
}

impl From<DomainError> for ApiError {
    fn from(e: DomainError) -> Self {
        ApiError(domain_error_to_response(e))
    }
}

impl From<BillingError> for ApiError {
    fn from(e: BillingError) -> Self {
        ApiError(billing_error_to_response(e))
    }
}

pub fn billing_error_to_response(err: BillingError) -> Response {
    match err {
        BillingError::ReferenceNotFound { .. } => {
            json_error(StatusCode::NOT_FOUND, "not_found", err.to_string())
        }
        BillingError::DuplicateInvoiceNumber(_) => {
            json_error(StatusCode::CONFLICT, "duplicate_invoice_number", err.to_string())
        }
        BillingError::EditDenied(msg) => json_error(StatusCode::FORBIDDEN, "edit_denied", msg),
        BillingError::Domain(e) => domain_error_to_response(e),
        BillingError::Repository(e) => repository_error_to_response(e),
        BillingError::Export(ExportError::Delivery(msg)) => {
            json_error(StatusCode::BAD_GATEWAY, "delivery_failed", msg)
        }
        BillingError::Export(ExportError::Render(msg)) => {
            error!(error = %msg, "document rendering failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "render_error", msg)
        }
    }
}

fn domain_error_to_response(err: DomainError) -> Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DomainError::Unauthorized => json_error(StatusCode::FORBIDDEN, "unauthorized", "unauthorized"),
        DomainError::EditDenied(msg) => json_error(StatusCode::FORBIDDEN, "edit_denied", msg),
    }
}

fn repository_error_to_response(err: RepositoryError) -> Response {
    match err {
        RepositoryError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        RepositoryError::DuplicateInvoiceNumber(_) => {
            json_error(StatusCode::CONFLICT, "duplicate_invoice_number", err.to_string())
        }
        RepositoryError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        RepositoryError::Storage(msg) => {
            error!(error = %msg, "storage failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
        RepositoryError::Serialization(msg) => {
            error!(error = %msg, "stored record could not be decoded");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "serialization_error", msg)
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use construcbill_infra::ReferenceKind;

    use super::*;

    fn status_of(err: BillingError) -> StatusCode {
        ApiError::from(err).status()
    }

    #[test]
    fn taxonomy_maps_to_statuses() {
        assert_eq!(
            status_of(BillingError::not_found(ReferenceKind::Project, "p-1")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(BillingError::DuplicateInvoiceNumber("AQ/7".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(status_of(BillingError::EditDenied("locked".into())), StatusCode::FORBIDDEN);
        assert_eq!(
            status_of(BillingError::Domain(DomainError::validation("bad"))),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(BillingError::Domain(DomainError::invariant("backwards"))),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(BillingError::Export(ExportError::Delivery("smtp down".into()))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(BillingError::Repository(RepositoryError::Storage("io".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
