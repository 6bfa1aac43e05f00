use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use construcbill_auth::Permission;
use construcbill_infra::DashboardSummary;

use crate::app::errors::ApiResult;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(principal): Extension<PrincipalContext>) -> impl IntoResponse {
    Json(serde_json::json!({
        "userId": principal.user_id().to_string(),
        "roles": principal.roles().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        "effectiveRole": principal.actor().role.as_str(),
    }))
}

pub async fn dashboard(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult<Json<DashboardSummary>> {
    authz::require(&principal, &Permission::PACKAGES_READ)?;
    Ok(Json(services.dashboard().await?))
}
