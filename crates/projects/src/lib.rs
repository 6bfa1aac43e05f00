//! Contract scopes: one project binds a company (issuer) to a client (payer).

pub mod project;

pub use project::{Project, ProjectId, ProjectProfile};
