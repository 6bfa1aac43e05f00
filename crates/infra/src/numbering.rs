//! Company-scoped invoice numbering.
//!
//! Numbers are `<prefix><counter>`. The counter lives on the company record and
//! is consumed through [`CompanyRepository::increment_invoice_counter`], the
//! only place that moves it; the repository serializes concurrent callers.

use std::sync::Arc;

use tracing::{debug, instrument};

use construcbill_parties::Company;
use construcbill_projects::{Project, ProjectId};

use crate::error::{BillingError, BillingResult, ReferenceKind, RepositoryError};
use crate::repository::{CompanyRepository, ProjectRepository};

/// A project together with the company that issues its invoices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingParties {
    pub project: Project,
    pub company: Company,
}

/// Outcome of [`InvoiceNumberingService::assign`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignedNumber {
    /// The caller supplied a number; no counter was consumed.
    Supplied(String),
    /// A fresh number was issued from the company counter.
    Issued { invoice_number: String, counter: u64 },
}

impl AssignedNumber {
    pub fn invoice_number(&self) -> &str {
        match self {
            AssignedNumber::Supplied(n) => n,
            AssignedNumber::Issued { invoice_number, .. } => invoice_number,
        }
    }

    pub fn is_issued(&self) -> bool {
        matches!(self, AssignedNumber::Issued { .. })
    }
}

#[derive(Clone)]
pub struct InvoiceNumberingService {
    companies: Arc<dyn CompanyRepository>,
    projects: Arc<dyn ProjectRepository>,
    default_prefix: String,
}

impl InvoiceNumberingService {
    pub fn new(
        companies: Arc<dyn CompanyRepository>,
        projects: Arc<dyn ProjectRepository>,
        default_prefix: impl Into<String>,
    ) -> Self {
        Self {
            companies,
            projects,
            default_prefix: default_prefix.into(),
        }
    }

    /// Resolve a project and its issuing company. Reads only.
    pub async fn resolve(&self, project_id: ProjectId) -> BillingResult<BillingParties> {
        let project = match self.projects.get(project_id).await {
            Ok(p) => p,
            Err(RepositoryError::NotFound) => {
                return Err(BillingError::not_found(ReferenceKind::Project, project_id));
            }
            Err(e) => return Err(e.into()),
        };
        let company = match self.companies.get(project.company_id).await {
            Ok(c) => c,
            Err(RepositoryError::NotFound) => {
                return Err(BillingError::not_found(ReferenceKind::Company, project.company_id));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(BillingParties { project, company })
    }

    /// Pick the invoice number for a new package of `parties.company`.
    ///
    /// A non-blank `supplied` number is returned untouched. Otherwise the
    /// company counter is consumed exactly once.
    #[instrument(skip(self, parties), fields(company_id = %parties.company.id))]
    pub async fn assign(
        &self,
        parties: &BillingParties,
        supplied: Option<&str>,
    ) -> BillingResult<AssignedNumber> {
        if let Some(number) = supplied.map(str::trim).filter(|n| !n.is_empty()) {
            debug!(invoice_number = number, "keeping caller-supplied invoice number");
            return Ok(AssignedNumber::Supplied(number.to_string()));
        }

        let company_id = parties.company.id;
        let (counter, company) = match self.companies.increment_invoice_counter(company_id).await {
            Ok(issued) => issued,
            Err(RepositoryError::NotFound) => {
                return Err(BillingError::not_found(ReferenceKind::Company, company_id));
            }
            Err(e) => return Err(e.into()),
        };

        let invoice_number = self.format(&company, counter);
        debug!(invoice_number = %invoice_number, counter, "issued invoice number");
        Ok(AssignedNumber::Issued {
            invoice_number,
            counter,
        })
    }

    fn format(&self, company: &Company, counter: u64) -> String {
        if company.defaults.invoice_prefix.trim().is_empty() && !self.default_prefix.is_empty() {
            format!("{}{}", self.default_prefix, counter)
        } else {
            company.defaults.format_invoice_number(counter)
        }
    }
}
