//! HTTP API: router, bearer-token authentication, request/response mapping.

pub mod app;
pub mod authz;
pub mod context;
pub mod middleware;
