//! Request/response bodies and small parsing helpers.
//!
//! Domain types that already carry a camelCase serde shape (profiles, line
//! items, invoice terms, status reports) are accepted as-is; the types here
//! only cover route-specific envelopes.

use axum::http::{HeaderMap, header};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use construcbill_billing::{
    BillingPackage, InvoiceLineItem, LineItemId, PackageStatus, SectionId,
};
use construcbill_core::ExpectedVersion;

use crate::app::errors::ApiError;

/// Query string of `GET /packages`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageListQuery {
    pub project_id: Option<String>,
    pub company_id: Option<String>,
    pub status: Option<PackageStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectListQuery {
    pub company_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceLineItemsRequest {
    pub items: Vec<InvoiceLineItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingPeriodRequest {
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default)]
    pub phase_number: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebindProjectRequest {
    pub project_id: String,
}

/// An image for the narrative gallery, or for a section when `sectionId` is set.
///
/// Exactly one of `dataUrl` (already encoded) and `path` (a file readable by
/// the server) must be given.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddImageRequest {
    #[serde(default)]
    pub section_id: Option<SectionId>,
    #[serde(default)]
    pub data_url: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub linked_line_item_id: Option<LineItemId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddSectionRequest {
    pub section_name: String,
    #[serde(default)]
    pub planned_quantity: Option<Decimal>,
    #[serde(default)]
    pub completed_quantity: Option<Decimal>,
    #[serde(default)]
    pub unit: String,
}

#[derive(Debug, Deserialize)]
pub struct ReorderSectionsRequest {
    pub order: Vec<SectionId>,
}

#[derive(Debug, Deserialize)]
pub struct SendPackageRequest {
    pub recipient: String,
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: PackageStatus,
}

/// A package as returned by the API, with its non-blocking validation warnings.
#[derive(Debug, Serialize)]
pub struct PackageView {
    #[serde(flatten)]
    pub package: BillingPackage,
    pub warnings: Vec<String>,
}

impl From<BillingPackage> for PackageView {
    fn from(package: BillingPackage) -> Self {
        let warnings = package.validation_warnings();
        Self { package, warnings }
    }
}

/// Parse an identifier from a path segment or query value.
pub fn parse_id<T>(raw: &str) -> Result<T, ApiError>
where
    T: core::str::FromStr<Err = construcbill_core::DomainError>,
{
    raw.trim().parse::<T>().map_err(ApiError::from)
}

/// Optimistic concurrency precondition from `If-Match`; absent means "any version".
pub fn expected_version(headers: &HeaderMap) -> Result<ExpectedVersion, ApiError> {
    let Some(value) = headers.get(header::IF_MATCH) else {
        return Ok(ExpectedVersion::Any);
    };
    let raw = value
        .to_str()
        .map_err(|_| ApiError::bad_request("invalid_if_match", "If-Match must be ASCII"))?;
    let raw = raw.trim().trim_start_matches("W/").trim_matches('"');
    if raw == "*" {
        return Ok(ExpectedVersion::Any);
    }
    raw.parse::<u64>()
        .map(ExpectedVersion::Exact)
        .map_err(|_| ApiError::bad_request("invalid_if_match", "If-Match must be a package version"))
}
