use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
};
use chrono::{DateTime, Utc};

use construcbill_auth::Permission;
use construcbill_billing::{
    Actor, InvoiceLineItem, InvoiceTerms, LineItemId, PackageCommand, PackageId,
};
use construcbill_infra::{NewPackage, PackageFilter};
use construcbill_parties::CompanyId;
use construcbill_projects::ProjectId;

use crate::app::dto::{
    self, BillingPeriodRequest, PackageListQuery, PackageView, RebindProjectRequest,
    ReplaceLineItemsRequest, SendPackageRequest, SetStatusRequest, parse_id,
};
use crate::app::errors::ApiResult;
use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_package).get(list_packages))
        .route("/:id", get(get_package).delete(delete_package))
        .route("/:id/items", put(replace_line_items).post(add_line_item))
        .route("/:id/items/:item_id", put(update_line_item).delete(remove_line_item))
        .route("/:id/period", put(update_billing_period))
        .route("/:id/project", put(rebind_project))
        .route("/:id/terms", put(update_invoice_terms))
        .route("/:id/send", post(send_package))
        .route("/:id/mark-paid", post(mark_paid))
        .route("/:id/status", put(set_status))
}

/// Authorize and run a content command against a stored package.
///
/// `If-Match`, when present, must carry the package's current version.
pub(super) async fn run_command(
    services: &AppServices,
    principal: &PrincipalContext,
    id: &str,
    headers: &HeaderMap,
    build: impl FnOnce(Actor, DateTime<Utc>) -> PackageCommand,
) -> ApiResult<Json<PackageView>> {
    let id: PackageId = parse_id(id)?;
    let expected = dto::expected_version(headers)?;

    let cmd_auth = CmdAuth::new(build(principal.actor(), Utc::now()), Permission::PACKAGES_UPDATE);
    authz::authorize_command(principal, &cmd_auth)?;

    let pkg = services.execute(id, expected, cmd_auth.inner).await?;
    Ok(Json(PackageView::from(pkg)))
}

pub async fn create_package(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewPackage>,
) -> ApiResult<(StatusCode, Json<PackageView>)> {
    authz::require(&principal, &Permission::PACKAGES_CREATE)?;
    let pkg = services.create_package(&principal.actor(), body).await?;
    Ok((StatusCode::CREATED, Json(PackageView::from(pkg))))
}

/// Filterable by `projectId`, `companyId` and `status`; newest first.
pub async fn list_packages(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<PackageListQuery>,
) -> ApiResult<Json<Vec<PackageView>>> {
    authz::require(&principal, &Permission::PACKAGES_READ)?;
    let filter = PackageFilter {
        project_id: query.project_id.as_deref().map(parse_id::<ProjectId>).transpose()?,
        company_id: query.company_id.as_deref().map(parse_id::<CompanyId>).transpose()?,
        status: query.status,
    };
    let packages = services.list_packages(filter).await?;
    Ok(Json(packages.into_iter().map(PackageView::from).collect()))
}

pub async fn get_package(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<PackageView>> {
    authz::require(&principal, &Permission::PACKAGES_READ)?;
    let id: PackageId = parse_id(&id)?;
    Ok(Json(PackageView::from(services.get_package(id).await?)))
}

pub async fn delete_package(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    authz::require(&principal, &Permission::PACKAGES_DELETE)?;
    let id: PackageId = parse_id(&id)?;
    services.delete_package(&principal.actor(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn replace_line_items(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ReplaceLineItemsRequest>,
) -> ApiResult<Json<PackageView>> {
    authz::require(&principal, &Permission::PACKAGES_UPDATE)?;
    let id: PackageId = parse_id(&id)?;
    let expected = dto::expected_version(&headers)?;
    let pkg = services
        .replace_line_items(&principal.actor(), id, expected, body.items)
        .await?;
    Ok(Json(PackageView::from(pkg)))
}

/// Append a line; progress lines without a retainage percent take the project's.
pub async fn add_line_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(item): Json<InvoiceLineItem>,
) -> ApiResult<(StatusCode, Json<PackageView>)> {
    authz::require(&principal, &Permission::PACKAGES_UPDATE)?;
    let id: PackageId = parse_id(&id)?;
    let expected = dto::expected_version(&headers)?;
    let pkg = services
        .add_line_item(&principal.actor(), id, expected, item)
        .await?;
    Ok((StatusCode::CREATED, Json(PackageView::from(pkg))))
}

pub async fn update_line_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, item_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(item): Json<InvoiceLineItem>,
) -> ApiResult<Json<PackageView>> {
    let item_id: LineItemId = parse_id(&item_id)?;
    let item = InvoiceLineItem::new(item_id, item.detail().clone());
    authz::require(&principal, &Permission::PACKAGES_UPDATE)?;
    let id: PackageId = parse_id(&id)?;
    let expected = dto::expected_version(&headers)?;
    let pkg = services
        .update_line_item(&principal.actor(), id, expected, item)
        .await?;
    Ok(Json(PackageView::from(pkg)))
}

pub async fn remove_line_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, item_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<PackageView>> {
    let line_item_id: LineItemId = parse_id(&item_id)?;
    run_command(&services, &principal, &id, &headers, |actor, occurred_at| {
        PackageCommand::RemoveLineItem {
            actor,
            line_item_id,
            occurred_at,
        }
    })
    .await
}

pub async fn update_billing_period(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<BillingPeriodRequest>,
) -> ApiResult<Json<PackageView>> {
    run_command(&services, &principal, &id, &headers, |actor, occurred_at| {
        PackageCommand::UpdateBillingPeriod {
            actor,
            start: body.start,
            end: body.end,
            phase_number: body.phase_number,
            occurred_at,
        }
    })
    .await
}

pub async fn rebind_project(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<RebindProjectRequest>,
) -> ApiResult<Json<PackageView>> {
    authz::require(&principal, &Permission::PACKAGES_UPDATE)?;
    let id: PackageId = parse_id(&id)?;
    let project_id: ProjectId = parse_id(&body.project_id)?;
    let expected = dto::expected_version(&headers)?;
    let pkg = services
        .rebind_project(&principal.actor(), id, expected, project_id)
        .await?;
    Ok(Json(PackageView::from(pkg)))
}

pub async fn update_invoice_terms(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(terms): Json<InvoiceTerms>,
) -> ApiResult<Json<PackageView>> {
    run_command(&services, &principal, &id, &headers, |actor, occurred_at| {
        PackageCommand::UpdateInvoiceTerms {
            actor,
            terms,
            occurred_at,
        }
    })
    .await
}

/// Render, deliver, then mark SENT. A failed delivery leaves the package untouched.
pub async fn send_package(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<SendPackageRequest>,
) -> ApiResult<Json<PackageView>> {
    authz::require(&principal, &Permission::PACKAGES_SEND)?;
    let id: PackageId = parse_id(&id)?;
    let pkg = services
        .send_package(&principal.actor(), id, &body.recipient)
        .await?;
    Ok(Json(PackageView::from(pkg)))
}

pub async fn mark_paid(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<PackageView>> {
    authz::require(&principal, &Permission::PACKAGES_MARK_PAID)?;
    let id: PackageId = parse_id(&id)?;
    let pkg = services.mark_paid(&principal.actor(), id).await?;
    Ok(Json(PackageView::from(pkg)))
}

/// Direct status edit, privileged roles only.
pub async fn set_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<SetStatusRequest>,
) -> ApiResult<Json<PackageView>> {
    authz::require(&principal, &Permission::PACKAGES_SET_STATUS)?;
    let id: PackageId = parse_id(&id)?;
    let pkg = services
        .set_status(&principal.actor(), id, body.status)
        .await?;
    Ok(Json(PackageView::from(pkg)))
}
