use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
};

use construcbill_auth::Permission;
use construcbill_infra::NewCompany;
use construcbill_parties::{Company, CompanyId, CompanyProfile};

use crate::app::dto::parse_id;
use crate::app::errors::ApiResult;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_company).get(list_companies))
        .route("/:id", get(get_company).put(update_company))
        .route("/:id/default", post(set_default_company))
}

pub async fn create_company(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewCompany>,
) -> ApiResult<(StatusCode, Json<Company>)> {
    authz::require(&principal, &Permission::COMPANIES_MANAGE)?;
    let company = services.create_company(body).await?;
    Ok((StatusCode::CREATED, Json(company)))
}

pub async fn list_companies(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult<Json<Vec<Company>>> {
    authz::require(&principal, &Permission::COMPANIES_READ)?;
    Ok(Json(services.list_companies().await?))
}

pub async fn get_company(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Company>> {
    authz::require(&principal, &Permission::COMPANIES_READ)?;
    let id: CompanyId = parse_id(&id)?;
    Ok(Json(services.get_company(id).await?))
}

/// Replace the editable profile. The invoice counter is never touched.
pub async fn update_company(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<CompanyProfile>,
) -> ApiResult<Json<Company>> {
    authz::require(&principal, &Permission::COMPANIES_MANAGE)?;
    let id: CompanyId = parse_id(&id)?;
    Ok(Json(services.update_company(id, body).await?))
}

pub async fn set_default_company(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Company>> {
    authz::require(&principal, &Permission::COMPANIES_MANAGE)?;
    let id: CompanyId = parse_id(&id)?;
    Ok(Json(services.set_default_company(id).await?))
}
