//! Infrastructure layer: configuration, storage, numbering, delivery
//! boundaries and the application services that tie them to the billing
//! engine.

pub mod config;
pub mod error;
pub mod export;
pub mod images;
pub mod numbering;
pub mod projections;
pub mod repository;
pub mod service;

pub use config::AppConfig;
pub use error::{BillingError, BillingResult, ExportError, ReferenceKind, RepositoryError};
pub use export::{DocumentKind, DocumentRenderer, JsonDocumentRenderer, LoggingMailer, Mailer, RenderedDocument};
pub use numbering::{AssignedNumber, BillingParties, InvoiceNumberingService};
pub use projections::dashboard::{DashboardFeed, DashboardProjection, DashboardSummary};
pub use repository::{PackageFilter, Repositories};
pub use service::{BillingService, NewCompany, NewPackage, PackageEnvelope};
