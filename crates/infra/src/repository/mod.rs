//! Storage boundary for companies, clients, projects and billing packages.
//!
//! Every record is stored whole (snapshot storage). Two implementations ship:
//! in-memory for tests and local runs, and Postgres.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;

use construcbill_billing::{BillingPackage, PackageId, PackageStatus};
use construcbill_core::ExpectedVersion;
use construcbill_parties::{Client, ClientId, Company, CompanyId};
use construcbill_projects::{Project, ProjectId};

use crate::error::RepositoryError;

pub use in_memory::{
    InMemoryClientRepository, InMemoryCompanyRepository, InMemoryPackageRepository,
    InMemoryProjectRepository,
};
pub use postgres::{
    PostgresClientRepository, PostgresCompanyRepository, PostgresPackageRepository,
    PostgresProjectRepository,
};

/// Package listing filter. Unset fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackageFilter {
    pub project_id: Option<ProjectId>,
    pub company_id: Option<CompanyId>,
    pub status: Option<PackageStatus>,
}

impl PackageFilter {
    pub fn matches(&self, pkg: &BillingPackage) -> bool {
        self.project_id.is_none_or(|id| id == pkg.project_id())
            && self.company_id.is_none_or(|id| id == pkg.company_id())
            && self.status.is_none_or(|s| s == pkg.status())
    }
}

#[async_trait]
pub trait PackageRepository: Send + Sync {
    /// Insert a new package. Fails with `DuplicateInvoiceNumber` when another
    /// package of the same company already uses the number.
    async fn create(&self, pkg: &BillingPackage) -> Result<(), RepositoryError>;

    async fn get(&self, id: PackageId) -> Result<BillingPackage, RepositoryError>;

    async fn exists(&self, id: PackageId) -> Result<bool, RepositoryError>;

    /// Matching packages, newest first.
    async fn list(&self, filter: PackageFilter) -> Result<Vec<BillingPackage>, RepositoryError>;

    /// Replace a stored package. `expected` is checked against the stored version.
    async fn update(
        &self,
        pkg: &BillingPackage,
        expected: ExpectedVersion,
    ) -> Result<(), RepositoryError>;

    async fn delete(&self, id: PackageId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait CompanyRepository: Send + Sync {
    async fn get(&self, id: CompanyId) -> Result<Company, RepositoryError>;

    async fn list(&self) -> Result<Vec<Company>, RepositoryError>;

    /// Insert or update the company profile. Never moves an existing counter.
    async fn save(&self, company: &Company) -> Result<(), RepositoryError>;

    /// Make `id` the only default company, atomically.
    async fn set_default(&self, id: CompanyId) -> Result<(), RepositoryError>;

    /// Atomically consume the current counter value and advance it by one.
    ///
    /// Returns the consumed value together with the company as it was read in
    /// the same critical section. Concurrent callers never see the same value.
    async fn increment_invoice_counter(
        &self,
        id: CompanyId,
    ) -> Result<(u64, Company), RepositoryError>;
}

#[async_trait]
pub trait ClientRepository: Send + Sync {
    async fn get(&self, id: ClientId) -> Result<Client, RepositoryError>;

    async fn list(&self) -> Result<Vec<Client>, RepositoryError>;

    async fn insert(&self, client: &Client) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn get(&self, id: ProjectId) -> Result<Project, RepositoryError>;

    async fn list(&self, company_id: Option<CompanyId>) -> Result<Vec<Project>, RepositoryError>;

    async fn insert(&self, project: &Project) -> Result<(), RepositoryError>;

    async fn count(&self) -> Result<u64, RepositoryError>;
}

/// The full set of stores the services need.
#[derive(Clone)]
pub struct Repositories {
    pub packages: Arc<dyn PackageRepository>,
    pub companies: Arc<dyn CompanyRepository>,
    pub clients: Arc<dyn ClientRepository>,
    pub projects: Arc<dyn ProjectRepository>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            packages: Arc::new(InMemoryPackageRepository::new()),
            companies: Arc::new(InMemoryCompanyRepository::new()),
            clients: Arc::new(InMemoryClientRepository::new()),
            projects: Arc::new(InMemoryProjectRepository::new()),
        }
    }

    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self {
            packages: Arc::new(PostgresPackageRepository::new(pool.clone())),
            companies: Arc::new(PostgresCompanyRepository::new(pool.clone())),
            clients: Arc::new(PostgresClientRepository::new(pool.clone())),
            projects: Arc::new(PostgresProjectRepository::new(pool)),
        }
    }
}
