use std::path::Path;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use construcbill_billing::{
    Actor, BillingPackage, CreatePackage, GalleryTarget, ImageId, InvoiceLineItem, InvoiceTerms,
    LineDetail, LineItemId, PackageCommand, PackageId, PackageStatus, StatusReport,
    StatusReportImage, StatusTrigger,
};
use construcbill_core::{Aggregate, AggregateRoot, DomainError, ExpectedVersion};
use construcbill_events::EventBus;
use construcbill_parties::Company;
use construcbill_projects::ProjectId;

use super::parties::missing;
use super::{BillingService, PackageEnvelope};
use crate::error::{BillingError, BillingResult, ReferenceKind, RepositoryError};
use crate::images::{ImageError, read_uploaded_image};
use crate::projections::dashboard::DashboardSummary;
use crate::repository::PackageFilter;

/// Fresh counter values tried before giving up on a duplicate number.
const MAX_NUMBERING_ATTEMPTS: usize = 3;

/// Input for creating a billing package.
///
/// Unset terms are seeded from the project and its company.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPackage {
    pub project_id: ProjectId,
    pub billing_period_start: NaiveDate,
    pub billing_period_end: NaiveDate,
    #[serde(default)]
    pub phase_number: Option<u32>,
    /// Caller-supplied number; the company counter is used when absent.
    #[serde(default)]
    pub invoice_number: Option<String>,
    /// Defaults to the end of the billing period.
    #[serde(default)]
    pub invoice_date: Option<NaiveDate>,
    #[serde(default)]
    pub po_reference: Option<String>,
    /// Defaults to the issuing company's state.
    #[serde(default)]
    pub place_of_supply: Option<String>,
    /// Defaults to the company's retention percent.
    #[serde(default)]
    pub retainage_percent: Option<Decimal>,
    #[serde(default)]
    pub items: Vec<InvoiceLineItem>,
    #[serde(default)]
    pub status_report: StatusReport,
    /// Seed progress lines from an earlier package of the same project.
    #[serde(default)]
    pub carry_forward_from: Option<PackageId>,
}

/// Progress lines without their own retainage take the project default.
fn seed_line_retainage(items: &mut [InvoiceLineItem], percent: Decimal) {
    for item in items.iter_mut() {
        item.edit(|detail| {
            if let LineDetail::Progress(line) = detail {
                line.retainage_percent.get_or_insert(percent);
            }
        });
    }
}

fn supply_state(company: &Company) -> Option<String> {
    [Some(company.address.state.as_str()), company.legal.state.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl<B> BillingService<B>
where
    B: EventBus<PackageEnvelope>,
{
    /// Create a DRAFT package with a company-scoped invoice number.
    ///
    /// Missing references fail before any counter value is consumed. A
    /// duplicate issued number is retried with a fresh counter value; a
    /// duplicate caller-supplied number is returned as an error.
    #[instrument(skip(self, actor, input), fields(project_id = %input.project_id))]
    pub async fn create_package(&self, actor: &Actor, input: NewPackage) -> BillingResult<BillingPackage> {
        let parties = self.numbering.resolve(input.project_id).await?;

        let mut items = match input.carry_forward_from {
            Some(previous) => self.carried_items(previous, input.project_id).await?,
            None => Vec::new(),
        };
        items.extend(input.items);
        seed_line_retainage(&mut items, parties.project.default_retainage_percent);

        let supplied = non_blank(input.invoice_number);
        let package_id = PackageId::generate();
        let mut command = CreatePackage {
            package_id,
            project_id: parties.project.id,
            company_id: parties.company.id,
            billing_period_start: input.billing_period_start,
            billing_period_end: input.billing_period_end,
            phase_number: input.phase_number,
            invoice_number: supplied.clone().unwrap_or_else(|| "pending".to_string()),
            terms: InvoiceTerms {
                invoice_date: input.invoice_date.unwrap_or(input.billing_period_end),
                po_reference: non_blank(input.po_reference),
                place_of_supply: non_blank(input.place_of_supply).or_else(|| supply_state(&parties.company)),
                retainage_percent: input
                    .retainage_percent
                    .unwrap_or(parties.company.defaults.retention_percent),
            },
            tax_rate_percent: parties
                .company
                .defaults
                .tax_rate_percent
                .unwrap_or(self.default_tax_rate_percent),
            items,
            status_report: input.status_report,
            actor: actor.clone(),
            occurred_at: Utc::now(),
        };

        // Validate before a counter value is consumed.
        BillingPackage::empty(package_id).handle(&PackageCommand::Create(command.clone()))?;

        for attempt in 1..=MAX_NUMBERING_ATTEMPTS {
            let assigned = self.numbering.assign(&parties, supplied.as_deref()).await?;
            command.invoice_number = assigned.invoice_number().to_string();

            let mut pkg = BillingPackage::empty(package_id);
            let events = pkg.execute(&PackageCommand::Create(command.clone()))?;

            match self.repos.packages.create(&pkg).await {
                Ok(()) => {
                    info!(
                        package_id = %package_id,
                        company_id = %pkg.company_id(),
                        invoice_number = pkg.invoice().invoice_number(),
                        "billing package created"
                    );
                    self.log_warnings(&pkg);
                    self.publish(&pkg, 0, events);
                    return Ok(pkg);
                }
                Err(RepositoryError::DuplicateInvoiceNumber(number))
                    if assigned.is_issued() && attempt < MAX_NUMBERING_ATTEMPTS =>
                {
                    warn!(invoice_number = %number, attempt, "invoice number already in use, issuing another");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(BillingError::DuplicateInvoiceNumber(command.invoice_number))
    }

    async fn carried_items(
        &self,
        previous: PackageId,
        project_id: ProjectId,
    ) -> BillingResult<Vec<InvoiceLineItem>> {
        let prev = self.get_package(previous).await?;
        if prev.project_id() != project_id {
            return Err(DomainError::validation(format!(
                "package {previous} belongs to another project and cannot seed this one"
            ))
            .into());
        }
        Ok(prev.carried_forward_items())
    }

    pub async fn get_package(&self, id: PackageId) -> BillingResult<BillingPackage> {
        self.repos
            .packages
            .get(id)
            .await
            .map_err(missing(ReferenceKind::Package, id))
    }

    /// Packages matching `filter`, newest first.
    pub async fn list_packages(&self, filter: PackageFilter) -> BillingResult<Vec<BillingPackage>> {
        Ok(self.repos.packages.list(filter).await?)
    }

    /// Run a command against a stored package.
    ///
    /// `expected` is checked against the stored version before anything else;
    /// the write itself is conditional on the version that was loaded.
    #[instrument(skip(self, command), fields(package_id = %id))]
    pub async fn execute(
        &self,
        id: PackageId,
        expected: ExpectedVersion,
        command: PackageCommand,
    ) -> BillingResult<BillingPackage> {
        if matches!(command, PackageCommand::Create(_) | PackageCommand::Delete { .. }) {
            return Err(DomainError::invariant("create and delete have dedicated operations").into());
        }

        let mut pkg = self.get_package(id).await?;
        expected.check(pkg.version())?;

        let before = pkg.version();
        let events = pkg.execute(&command)?;
        self.repos
            .packages
            .update(&pkg, ExpectedVersion::Exact(before))
            .await?;

        self.log_warnings(&pkg);
        self.publish(&pkg, before, events);
        Ok(pkg)
    }

    /// Retainage percent of the project `id` currently belongs to.
    async fn project_retainage(&self, id: PackageId) -> BillingResult<Decimal> {
        let pkg = self.get_package(id).await?;
        let project = self.get_project(pkg.project_id()).await?;
        Ok(project.default_retainage_percent)
    }

    /// Replace every line item. Progress lines without their own retainage
    /// take the project's, exactly as on create.
    pub async fn replace_line_items(
        &self,
        actor: &Actor,
        id: PackageId,
        expected: ExpectedVersion,
        mut items: Vec<InvoiceLineItem>,
    ) -> BillingResult<BillingPackage> {
        seed_line_retainage(&mut items, self.project_retainage(id).await?);
        self.execute(
            id,
            expected,
            PackageCommand::ReplaceLineItems {
                actor: actor.clone(),
                items,
                occurred_at: Utc::now(),
            },
        )
        .await
    }

    /// Add a line item, seeding progress-line retainage from the project.
    pub async fn add_line_item(
        &self,
        actor: &Actor,
        id: PackageId,
        expected: ExpectedVersion,
        mut item: InvoiceLineItem,
    ) -> BillingResult<BillingPackage> {
        seed_line_retainage(std::slice::from_mut(&mut item), self.project_retainage(id).await?);
        self.execute(
            id,
            expected,
            PackageCommand::AddLineItem {
                actor: actor.clone(),
                item,
                occurred_at: Utc::now(),
            },
        )
        .await
    }

    pub async fn update_line_item(
        &self,
        actor: &Actor,
        id: PackageId,
        expected: ExpectedVersion,
        mut item: InvoiceLineItem,
    ) -> BillingResult<BillingPackage> {
        seed_line_retainage(std::slice::from_mut(&mut item), self.project_retainage(id).await?);
        self.execute(
            id,
            expected,
            PackageCommand::UpdateLineItem {
                actor: actor.clone(),
                item,
                occurred_at: Utc::now(),
            },
        )
        .await
    }

    /// Move a package to another project of the same company.
    pub async fn rebind_project(
        &self,
        actor: &Actor,
        id: PackageId,
        expected: ExpectedVersion,
        project_id: ProjectId,
    ) -> BillingResult<BillingPackage> {
        let project = self.get_project(project_id).await?;
        self.execute(
            id,
            expected,
            PackageCommand::RebindProject {
                actor: actor.clone(),
                project_id: project.id,
                project_company_id: project.company_id,
                occurred_at: Utc::now(),
            },
        )
        .await
    }

    /// Read an image file from the upload directory and attach it to the
    /// report gallery or a section.
    #[allow(clippy::too_many_arguments)]
    pub async fn attach_image_file(
        &self,
        actor: &Actor,
        id: PackageId,
        expected: ExpectedVersion,
        target: GalleryTarget,
        path: &Path,
        caption: String,
        linked_line_item_id: Option<LineItemId>,
    ) -> BillingResult<BillingPackage> {
        let data_url = read_uploaded_image(self.upload_dir.as_deref(), path)
            .await
            .map_err(|e| match e {
                ImageError::OutsideUploadDir(_) => {
                    warn!(path = %path.display(), "image path outside the upload directory refused");
                    DomainError::Unauthorized
                }
                other => DomainError::validation(other.to_string()),
            })?;
        let image = StatusReportImage {
            id: ImageId::new(),
            data_url,
            caption,
            linked_line_item_id,
        };
        self.execute(
            id,
            expected,
            PackageCommand::AddReportImage {
                actor: actor.clone(),
                target,
                image,
                occurred_at: Utc::now(),
            },
        )
        .await
    }

    /// Render, deliver, and only then mark the package SENT.
    #[instrument(skip(self, actor), fields(package_id = %id))]
    pub async fn send_package(
        &self,
        actor: &Actor,
        id: PackageId,
        recipient: &str,
    ) -> BillingResult<BillingPackage> {
        let pkg = self.get_package(id).await?;
        let command = PackageCommand::ChangeStatus {
            actor: actor.clone(),
            to: PackageStatus::Sent,
            trigger: StatusTrigger::Send,
            recipient: Some(recipient.to_string()),
            occurred_at: Utc::now(),
        };
        // Refuse before anything is rendered or delivered.
        pkg.handle(&command)?;

        let project = self.get_project(pkg.project_id()).await?;
        let client = self.get_client(project.client_id).await?;
        let invoice = self.renderer.render_invoice(&pkg, &project, &client).await?;
        let report = self.renderer.render_status_report(&pkg, &project, &client).await?;

        self.mailer.send(&pkg, recipient.trim(), &[invoice, report]).await?;
        info!(
            invoice_number = pkg.invoice().invoice_number(),
            recipient = recipient.trim(),
            "delivery acknowledged"
        );

        self.execute(id, ExpectedVersion::Exact(pkg.version()), command).await
    }

    /// SENT → PAID.
    pub async fn mark_paid(&self, actor: &Actor, id: PackageId) -> BillingResult<BillingPackage> {
        self.execute(
            id,
            ExpectedVersion::Any,
            PackageCommand::ChangeStatus {
                actor: actor.clone(),
                to: PackageStatus::Paid,
                trigger: StatusTrigger::MarkPaid,
                recipient: None,
                occurred_at: Utc::now(),
            },
        )
        .await
    }

    /// Direct status edit by a privileged role.
    pub async fn set_status(
        &self,
        actor: &Actor,
        id: PackageId,
        to: PackageStatus,
    ) -> BillingResult<BillingPackage> {
        self.execute(
            id,
            ExpectedVersion::Any,
            PackageCommand::ChangeStatus {
                actor: actor.clone(),
                to,
                trigger: StatusTrigger::DirectEdit,
                recipient: None,
                occurred_at: Utc::now(),
            },
        )
        .await
    }

    /// Delete a package. Its invoice number is never handed out again.
    #[instrument(skip(self, actor), fields(package_id = %id))]
    pub async fn delete_package(&self, actor: &Actor, id: PackageId) -> BillingResult<()> {
        let mut pkg = self.get_package(id).await?;
        let before = pkg.version();
        let events = pkg.execute(&PackageCommand::Delete {
            actor: actor.clone(),
            occurred_at: Utc::now(),
        })?;

        self.repos
            .packages
            .delete(id)
            .await
            .map_err(missing(ReferenceKind::Package, id))?;
        info!(invoice_number = pkg.invoice().invoice_number(), "billing package deleted");
        self.publish(&pkg, before, events);
        Ok(())
    }

    /// Headline counts, folded from every package event published so far.
    pub async fn dashboard(&self) -> BillingResult<DashboardSummary> {
        let mut summary = self
            .dashboard
            .lock()
            .map(|mut feed| {
                debug!(folded = feed.folded(), "summarising dashboard");
                feed.catch_up()
            })
            .map_err(|_| RepositoryError::Storage("dashboard lock poisoned".to_string()))?;
        summary.projects = self.repos.projects.count().await?;
        Ok(summary)
    }

    /// Seed the dashboard from stored packages, e.g. after a restart against
    /// persistent storage.
    pub async fn rebuild_dashboard(&self) -> BillingResult<()> {
        let packages = self.repos.packages.list(PackageFilter::default()).await?;
        let mut feed = self
            .dashboard
            .lock()
            .map_err(|_| RepositoryError::Storage("dashboard lock poisoned".to_string()))?;
        feed.seed(&packages);
        Ok(())
    }
}
