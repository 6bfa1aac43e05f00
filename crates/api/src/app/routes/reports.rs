//! Status report routes: narrative/section content, galleries and section order.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    routing::{delete, post, put},
};

use construcbill_auth::Permission;
use construcbill_billing::{
    GalleryTarget, ImageId, PackageCommand, PackageId, ReportSection, SectionId, StatusReport,
    StatusReportImage,
};

use crate::app::dto::{
    self, AddImageRequest, AddSectionRequest, PackageView, ReorderSectionsRequest, parse_id,
};
use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::packages::run_command;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/:id/report", put(replace_status_report))
        .route("/:id/report/images", post(add_report_image))
        .route("/:id/report/images/:image_id", delete(remove_report_image))
        .route("/:id/report/sections", post(add_report_section))
        .route("/:id/report/sections/:section_id", delete(remove_report_section))
        .route("/:id/report/section-order", put(reorder_report_sections))
}

pub async fn replace_status_report(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(report): Json<StatusReport>,
) -> ApiResult<Json<PackageView>> {
    run_command(&services, &principal, &id, &headers, |actor, occurred_at| {
        PackageCommand::ReplaceStatusReport {
            actor,
            report,
            occurred_at,
        }
    })
    .await
}

/// Attach an image from an inline data URL, or ingest it from a path under
/// the configured upload directory.
pub async fn add_report_image(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<AddImageRequest>,
) -> ApiResult<(StatusCode, Json<PackageView>)> {
    let target = match body.section_id {
        Some(section_id) => GalleryTarget::Section(section_id),
        None => GalleryTarget::Report,
    };

    match (body.data_url, body.path) {
        (Some(data_url), None) => {
            if !data_url.starts_with("data:image/") {
                return Err(ApiError::bad_request(
                    "invalid_image",
                    "dataUrl must be a data:image/... URL",
                ));
            }
            let image = StatusReportImage {
                id: ImageId::new(),
                data_url,
                caption: body.caption,
                linked_line_item_id: body.linked_line_item_id,
            };
            let view = run_command(&services, &principal, &id, &headers, |actor, occurred_at| {
                PackageCommand::AddReportImage {
                    actor,
                    target,
                    image,
                    occurred_at,
                }
            })
            .await?;
            Ok((StatusCode::CREATED, view))
        }
        (None, Some(path)) => {
            authz::require(&principal, &Permission::PACKAGES_UPDATE)?;
            let id: PackageId = parse_id(&id)?;
            let expected = dto::expected_version(&headers)?;
            let pkg = services
                .attach_image_file(
                    &principal.actor(),
                    id,
                    expected,
                    target,
                    &PathBuf::from(path),
                    body.caption,
                    body.linked_line_item_id,
                )
                .await?;
            Ok((StatusCode::CREATED, Json(PackageView::from(pkg))))
        }
        _ => Err(ApiError::bad_request(
            "invalid_image",
            "exactly one of dataUrl and path is required",
        )),
    }
}

pub async fn remove_report_image(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, image_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<PackageView>> {
    let image_id: ImageId = parse_id(&image_id)?;
    run_command(&services, &principal, &id, &headers, |actor, occurred_at| {
        PackageCommand::RemoveReportImage {
            actor,
            image_id,
            occurred_at,
        }
    })
    .await
}

pub async fn add_report_section(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<AddSectionRequest>,
) -> ApiResult<(StatusCode, Json<PackageView>)> {
    let section = ReportSection {
        planned_quantity: body.planned_quantity,
        completed_quantity: body.completed_quantity,
        unit: body.unit,
        ..ReportSection::named(body.section_name)
    };
    let view = run_command(&services, &principal, &id, &headers, |actor, occurred_at| {
        PackageCommand::AddReportSection {
            actor,
            section,
            occurred_at,
        }
    })
    .await?;
    Ok((StatusCode::CREATED, view))
}

pub async fn remove_report_section(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, section_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<PackageView>> {
    let section_id: SectionId = parse_id(&section_id)?;
    run_command(&services, &principal, &id, &headers, |actor, occurred_at| {
        PackageCommand::RemoveReportSection {
            actor,
            section_id,
            occurred_at,
        }
    })
    .await
}

pub async fn reorder_report_sections(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ReorderSectionsRequest>,
) -> ApiResult<Json<PackageView>> {
    run_command(&services, &principal, &id, &headers, |actor, occurred_at| {
        PackageCommand::ReorderReportSections {
            actor,
            order: body.order,
            occurred_at,
        }
    })
    .await
}
