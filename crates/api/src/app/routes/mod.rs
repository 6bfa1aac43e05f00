use axum::{Router, routing::get};

pub mod clients;
pub mod common;
pub mod companies;
pub mod packages;
pub mod projects;
pub mod reports;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/dashboard", get(system::dashboard))
        .nest("/companies", companies::router())
        .nest("/clients", clients::router())
        .nest("/projects", projects::router())
        .nest("/packages", packages::router().merge(reports::router()))
}
