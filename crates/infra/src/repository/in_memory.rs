use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use construcbill_billing::{BillingPackage, PackageId};
use construcbill_core::{AggregateRoot, ExpectedVersion};
use construcbill_parties::{Client, ClientId, Company, CompanyId, set_default_company};
use construcbill_projects::{Project, ProjectId};

use super::{ClientRepository, CompanyRepository, PackageFilter, PackageRepository, ProjectRepository};
use crate::error::RepositoryError;

fn poisoned<T>(_: T) -> RepositoryError {
    RepositoryError::Storage("lock poisoned".to_string())
}

/// In-memory package store.
///
/// Intended for tests/dev. Locks are never held across an await point.
#[derive(Debug, Default)]
pub struct InMemoryPackageRepository {
    packages: RwLock<HashMap<PackageId, BillingPackage>>,
}

impl InMemoryPackageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn number_taken(
    packages: &HashMap<PackageId, BillingPackage>,
    pkg: &BillingPackage,
) -> bool {
    packages.values().any(|other| {
        other.id_typed() != pkg.id_typed()
            && other.company_id() == pkg.company_id()
            && other.invoice().invoice_number() == pkg.invoice().invoice_number()
    })
}

#[async_trait]
impl PackageRepository for InMemoryPackageRepository {
    async fn create(&self, pkg: &BillingPackage) -> Result<(), RepositoryError> {
        let mut packages = self.packages.write().map_err(poisoned)?;
        if packages.contains_key(&pkg.id_typed()) {
            return Err(RepositoryError::Conflict(format!(
                "package {} already exists",
                pkg.id_typed()
            )));
        }
        if number_taken(&packages, pkg) {
            return Err(RepositoryError::DuplicateInvoiceNumber(
                pkg.invoice().invoice_number().to_string(),
            ));
        }
        packages.insert(pkg.id_typed(), pkg.clone());
        Ok(())
    }

    async fn get(&self, id: PackageId) -> Result<BillingPackage, RepositoryError> {
        let packages = self.packages.read().map_err(poisoned)?;
        packages.get(&id).cloned().ok_or(RepositoryError::NotFound)
    }

    async fn exists(&self, id: PackageId) -> Result<bool, RepositoryError> {
        let packages = self.packages.read().map_err(poisoned)?;
        Ok(packages.contains_key(&id))
    }

    async fn list(&self, filter: PackageFilter) -> Result<Vec<BillingPackage>, RepositoryError> {
        let packages = self.packages.read().map_err(poisoned)?;
        let mut out: Vec<BillingPackage> = packages
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id_typed().cmp(&a.id_typed()))
        });
        Ok(out)
    }

    async fn update(
        &self,
        pkg: &BillingPackage,
        expected: ExpectedVersion,
    ) -> Result<(), RepositoryError> {
        let mut packages = self.packages.write().map_err(poisoned)?;
        let current = packages
            .get(&pkg.id_typed())
            .ok_or(RepositoryError::NotFound)?;
        if !expected.matches(current.version()) {
            return Err(RepositoryError::Conflict(format!(
                "package {} is at version {}, expected {expected:?}",
                pkg.id_typed(),
                current.version()
            )));
        }
        if number_taken(&packages, pkg) {
            return Err(RepositoryError::DuplicateInvoiceNumber(
                pkg.invoice().invoice_number().to_string(),
            ));
        }
        packages.insert(pkg.id_typed(), pkg.clone());
        Ok(())
    }

    async fn delete(&self, id: PackageId) -> Result<(), RepositoryError> {
        let mut packages = self.packages.write().map_err(poisoned)?;
        packages.remove(&id).map(|_| ()).ok_or(RepositoryError::NotFound)
    }
}

/// In-memory company store. The write lock is the per-store critical section
/// that serializes counter increments.
#[derive(Debug, Default)]
pub struct InMemoryCompanyRepository {
    companies: RwLock<Vec<Company>>,
}

impl InMemoryCompanyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CompanyRepository for InMemoryCompanyRepository {
    async fn get(&self, id: CompanyId) -> Result<Company, RepositoryError> {
        let companies = self.companies.read().map_err(poisoned)?;
        companies
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn list(&self) -> Result<Vec<Company>, RepositoryError> {
        let companies = self.companies.read().map_err(poisoned)?;
        Ok(companies.clone())
    }

    async fn save(&self, company: &Company) -> Result<(), RepositoryError> {
        let mut companies = self.companies.write().map_err(poisoned)?;
        match companies.iter_mut().find(|c| c.id == company.id) {
            Some(existing) => {
                let stored = existing.defaults.clone();
                let is_default = existing.is_default;
                *existing = company.clone();
                // The stored counter and default flag win over whatever the caller read.
                existing.defaults = company.defaults.with_counter_from(&stored);
                existing.is_default = is_default;
            }
            None => companies.push(company.clone()),
        }
        Ok(())
    }

    async fn set_default(&self, id: CompanyId) -> Result<(), RepositoryError> {
        let mut companies = self.companies.write().map_err(poisoned)?;
        set_default_company(&mut companies, id).map_err(|e| match e {
            construcbill_core::DomainError::NotFound => RepositoryError::NotFound,
            other => RepositoryError::Conflict(other.to_string()),
        })
    }

    async fn increment_invoice_counter(
        &self,
        id: CompanyId,
    ) -> Result<(u64, Company), RepositoryError> {
        let mut companies = self.companies.write().map_err(poisoned)?;
        let company = companies
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(RepositoryError::NotFound)?;
        let snapshot = company.clone();
        let issued = company.defaults.advance_counter();
        Ok((issued, snapshot))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryClientRepository {
    clients: RwLock<HashMap<ClientId, Client>>,
}

impl InMemoryClientRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClientRepository for InMemoryClientRepository {
    async fn get(&self, id: ClientId) -> Result<Client, RepositoryError> {
        let clients = self.clients.read().map_err(poisoned)?;
        clients.get(&id).cloned().ok_or(RepositoryError::NotFound)
    }

    async fn list(&self) -> Result<Vec<Client>, RepositoryError> {
        let clients = self.clients.read().map_err(poisoned)?;
        let mut out: Vec<Client> = clients.values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn insert(&self, client: &Client) -> Result<(), RepositoryError> {
        let mut clients = self.clients.write().map_err(poisoned)?;
        if clients.contains_key(&client.id) {
            return Err(RepositoryError::Conflict(format!("client {} already exists", client.id)));
        }
        clients.insert(client.id, client.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryProjectRepository {
    projects: RwLock<HashMap<ProjectId, Project>>,
}

impl InMemoryProjectRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectRepository for InMemoryProjectRepository {
    async fn get(&self, id: ProjectId) -> Result<Project, RepositoryError> {
        let projects = self.projects.read().map_err(poisoned)?;
        projects.get(&id).cloned().ok_or(RepositoryError::NotFound)
    }

    async fn list(&self, company_id: Option<CompanyId>) -> Result<Vec<Project>, RepositoryError> {
        let projects = self.projects.read().map_err(poisoned)?;
        let mut out: Vec<Project> = projects
            .values()
            .filter(|p| company_id.is_none_or(|id| id == p.company_id))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn insert(&self, project: &Project) -> Result<(), RepositoryError> {
        let mut projects = self.projects.write().map_err(poisoned)?;
        if projects.contains_key(&project.id) {
            return Err(RepositoryError::Conflict(format!("project {} already exists", project.id)));
        }
        projects.insert(project.id, project.clone());
        Ok(())
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let projects = self.projects.read().map_err(poisoned)?;
        Ok(projects.len() as u64)
    }
}
