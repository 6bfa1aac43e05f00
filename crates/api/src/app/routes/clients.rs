use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
};

use construcbill_auth::Permission;
use construcbill_parties::{Client, ClientId, ClientProfile};

use crate::app::dto::parse_id;
use crate::app::errors::ApiResult;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_client).get(list_clients))
        .route("/:id", get(get_client))
}

pub async fn create_client(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<ClientProfile>,
) -> ApiResult<(StatusCode, Json<Client>)> {
    authz::require(&principal, &Permission::CLIENTS_MANAGE)?;
    let client = services.create_client(body).await?;
    Ok((StatusCode::CREATED, Json(client)))
}

pub async fn list_clients(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult<Json<Vec<Client>>> {
    authz::require(&principal, &Permission::CLIENTS_READ)?;
    Ok(Json(services.list_clients().await?))
}

pub async fn get_client(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Client>> {
    authz::require(&principal, &Permission::CLIENTS_READ)?;
    let id: ClientId = parse_id(&id)?;
    Ok(Json(services.get_client(id).await?))
}
