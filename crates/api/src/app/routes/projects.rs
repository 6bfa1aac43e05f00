use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    routing::{get, post},
};

use construcbill_auth::Permission;
use construcbill_parties::CompanyId;
use construcbill_projects::{Project, ProjectId, ProjectProfile};

use crate::app::dto::{ProjectListQuery, parse_id};
use crate::app::errors::ApiResult;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_project).get(list_projects))
        .route("/:id", get(get_project))
}

pub async fn create_project(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<ProjectProfile>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    authz::require(&principal, &Permission::PROJECTS_MANAGE)?;
    let project = services.create_project(body).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn list_projects(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ProjectListQuery>,
) -> ApiResult<Json<Vec<Project>>> {
    authz::require(&principal, &Permission::PROJECTS_READ)?;
    let company_id = query
        .company_id
        .as_deref()
        .map(parse_id::<CompanyId>)
        .transpose()?;
    Ok(Json(services.list_projects(company_id).await?))
}

pub async fn get_project(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Project>> {
    authz::require(&principal, &Permission::PROJECTS_READ)?;
    let id: ProjectId = parse_id(&id)?;
    Ok(Json(services.get_project(id).await?))
}
