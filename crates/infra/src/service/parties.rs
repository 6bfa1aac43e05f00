use chrono::Utc;
use serde::Deserialize;
use tracing::{info, instrument};

use construcbill_core::DomainError;
use construcbill_events::EventBus;
use construcbill_parties::{Client, ClientId, ClientProfile, Company, CompanyId, CompanyProfile};
use construcbill_projects::{Project, ProjectId, ProjectProfile};

use super::{BillingService, PackageEnvelope};
use crate::error::{BillingError, BillingResult, ReferenceKind, RepositoryError};

/// Input for registering a company.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCompany {
    #[serde(flatten)]
    pub profile: CompanyProfile,
    /// First invoice number the company will issue.
    #[serde(default = "first_counter")]
    pub starting_counter: u64,
    #[serde(default)]
    pub is_default: bool,
}

fn first_counter() -> u64 {
    1
}

pub(super) fn missing(kind: ReferenceKind, id: impl ToString) -> impl FnOnce(RepositoryError) -> BillingError {
    move |e| match e {
        RepositoryError::NotFound => BillingError::not_found(kind, id),
        other => other.into(),
    }
}

impl<B> BillingService<B>
where
    B: EventBus<PackageEnvelope>,
{
    #[instrument(skip(self, input), fields(company = %input.profile.name))]
    pub async fn create_company(&self, input: NewCompany) -> BillingResult<Company> {
        let company = Company::register(CompanyId::new(), input.profile, input.starting_counter, Utc::now())?;
        if input.is_default && !company.is_active {
            return Err(DomainError::validation("an inactive company cannot be the default").into());
        }

        // The first active company becomes the default even when not asked to.
        let has_default = self.repos.companies.list().await?.iter().any(|c| c.is_default);
        let make_default = input.is_default || (!has_default && company.is_active);

        self.repos.companies.save(&company).await?;
        if make_default {
            self.repos.companies.set_default(company.id).await?;
        }
        info!(company_id = %company.id, "company registered");
        self.get_company(company.id).await
    }

    pub async fn update_company(&self, id: CompanyId, profile: CompanyProfile) -> BillingResult<Company> {
        let mut company = self.get_company(id).await?;
        company.apply_profile(profile, Utc::now())?;
        self.repos.companies.save(&company).await?;
        self.get_company(id).await
    }

    pub async fn get_company(&self, id: CompanyId) -> BillingResult<Company> {
        self.repos
            .companies
            .get(id)
            .await
            .map_err(missing(ReferenceKind::Company, id))
    }

    pub async fn list_companies(&self) -> BillingResult<Vec<Company>> {
        Ok(self.repos.companies.list().await?)
    }

    #[instrument(skip(self))]
    pub async fn set_default_company(&self, id: CompanyId) -> BillingResult<Company> {
        self.repos
            .companies
            .set_default(id)
            .await
            .map_err(missing(ReferenceKind::Company, id))?;
        self.get_company(id).await
    }

    pub async fn create_client(&self, profile: ClientProfile) -> BillingResult<Client> {
        let client = Client::register(ClientId::new(), profile, Utc::now())?;
        self.repos.clients.insert(&client).await?;
        info!(client_id = %client.id, "client registered");
        Ok(client)
    }

    pub async fn get_client(&self, id: ClientId) -> BillingResult<Client> {
        self.repos
            .clients
            .get(id)
            .await
            .map_err(missing(ReferenceKind::Client, id))
    }

    pub async fn list_clients(&self) -> BillingResult<Vec<Client>> {
        Ok(self.repos.clients.list().await?)
    }

    /// Create a project. Both the company and the client must already exist.
    #[instrument(skip(self, profile), fields(company_id = %profile.company_id, client_id = %profile.client_id))]
    pub async fn create_project(&self, profile: ProjectProfile) -> BillingResult<Project> {
        self.get_company(profile.company_id).await?;
        self.get_client(profile.client_id).await?;

        let project = Project::create(ProjectId::new(), profile, Utc::now())?;
        self.repos.projects.insert(&project).await?;
        info!(project_id = %project.id, "project created");
        Ok(project)
    }

    pub async fn get_project(&self, id: ProjectId) -> BillingResult<Project> {
        self.repos
            .projects
            .get(id)
            .await
            .map_err(missing(ReferenceKind::Project, id))
    }

    pub async fn list_projects(&self, company_id: Option<CompanyId>) -> BillingResult<Vec<Project>> {
        Ok(self.repos.projects.list(company_id).await?)
    }
}
