//! `construcbill-auth` — role checks at the command boundary.
//!
//! Decoupled from HTTP and storage: the API layer turns a bearer token into a
//! [`Principal`], then asks [`authorize`] before touching any service.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, CommandAuthorization, authorize, permissions_for_role};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtError, JwtValidator};
pub use permissions::Permission;
pub use principal::Principal;
pub use roles::Role;
