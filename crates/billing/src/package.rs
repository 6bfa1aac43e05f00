use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use construcbill_auth::Role;
use construcbill_core::{Aggregate, AggregateId, AggregateRoot, DomainError, UserId};
use construcbill_events::Event;
use construcbill_parties::CompanyId;
use construcbill_projects::ProjectId;

use crate::line_item::{InvoiceLineItem, LineDetail, LineItemId};
use crate::report::{GalleryTarget, ImageId, ReportSection, SectionId, StatusReport, StatusReportImage};
use crate::status::{PackageStatus, StatusTrigger, check_transition, is_editable};
use crate::totals::{Totals, compute_totals};

/// Billing package identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageId(pub AggregateId);

impl PackageId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

impl core::fmt::Display for PackageId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for PackageId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Who is issuing a command, and in which role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }
}

/// Invoice embedded in a package.
///
/// `totals` is derived from the other fields on every change and recomputed
/// when the invoice is read back from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "InvoiceDocument")]
pub struct Invoice {
    invoice_number: String,
    invoice_date: NaiveDate,
    po_reference: Option<String>,
    place_of_supply: Option<String>,
    retainage_percent: Decimal,
    tax_rate_percent: Decimal,
    items: Vec<InvoiceLineItem>,
    totals: Totals,
}

impl Invoice {
    pub fn new(
        invoice_number: impl Into<String>,
        terms: InvoiceTerms,
        tax_rate_percent: Decimal,
        items: Vec<InvoiceLineItem>,
    ) -> Self {
        let totals = compute_totals(&items, terms.retainage_percent, tax_rate_percent);
        Self {
            invoice_number: invoice_number.into(),
            invoice_date: terms.invoice_date,
            po_reference: terms.po_reference,
            place_of_supply: terms.place_of_supply,
            retainage_percent: terms.retainage_percent,
            tax_rate_percent,
            items,
            totals,
        }
    }

    pub fn invoice_number(&self) -> &str {
        &self.invoice_number
    }

    pub fn invoice_date(&self) -> NaiveDate {
        self.invoice_date
    }

    pub fn po_reference(&self) -> Option<&str> {
        self.po_reference.as_deref()
    }

    pub fn place_of_supply(&self) -> Option<&str> {
        self.place_of_supply.as_deref()
    }

    pub fn retainage_percent(&self) -> Decimal {
        self.retainage_percent
    }

    pub fn tax_rate_percent(&self) -> Decimal {
        self.tax_rate_percent
    }

    pub fn items(&self) -> &[InvoiceLineItem] {
        &self.items
    }

    pub fn item(&self, id: LineItemId) -> Option<&InvoiceLineItem> {
        self.items.iter().find(|i| i.id() == id)
    }

    pub fn totals(&self) -> &Totals {
        &self.totals
    }

    fn recompute(&mut self) {
        self.totals = compute_totals(&self.items, self.retainage_percent, self.tax_rate_percent);
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvoiceDocument {
    invoice_number: String,
    invoice_date: NaiveDate,
    #[serde(default)]
    po_reference: Option<String>,
    #[serde(default)]
    place_of_supply: Option<String>,
    #[serde(default)]
    retainage_percent: Decimal,
    tax_rate_percent: Decimal,
    #[serde(default)]
    items: Vec<InvoiceLineItem>,
}

impl From<InvoiceDocument> for Invoice {
    fn from(doc: InvoiceDocument) -> Self {
        Invoice::new(
            doc.invoice_number,
            InvoiceTerms {
                invoice_date: doc.invoice_date,
                po_reference: doc.po_reference,
                place_of_supply: doc.place_of_supply,
                retainage_percent: doc.retainage_percent,
            },
            doc.tax_rate_percent,
            doc.items,
        )
    }
}

/// Editable invoice header fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceTerms {
    pub invoice_date: NaiveDate,
    #[serde(default)]
    pub po_reference: Option<String>,
    #[serde(default)]
    pub place_of_supply: Option<String>,
    pub retainage_percent: Decimal,
}

/// Aggregate root: BillingPackage.
///
/// One progress invoice plus one status report for a billing period of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingPackage {
    id: PackageId,
    project_id: ProjectId,
    company_id: CompanyId,
    billing_period_start: NaiveDate,
    billing_period_end: NaiveDate,
    phase_number: Option<u32>,
    status: PackageStatus,
    invoice: Invoice,
    status_report: StatusReport,
    created_by: UserId,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    paid_date: Option<DateTime<Utc>>,
    sent_to: Option<String>,
    sent_at: Option<DateTime<Utc>>,
    version: u64,
    #[serde(skip, default = "stored_packages_exist")]
    created: bool,
}

fn stored_packages_exist() -> bool {
    true
}

impl BillingPackage {
    /// Create an empty, not-yet-created aggregate instance for a `Create` command.
    pub fn empty(id: PackageId) -> Self {
        let epoch = DateTime::<Utc>::default();
        let day = NaiveDate::default();
        Self {
            id,
            project_id: ProjectId::from_uuid(Default::default()),
            company_id: CompanyId::from_uuid(Default::default()),
            billing_period_start: day,
            billing_period_end: day,
            phase_number: None,
            status: PackageStatus::Draft,
            invoice: Invoice::new(
                String::new(),
                InvoiceTerms {
                    invoice_date: day,
                    po_reference: None,
                    place_of_supply: None,
                    retainage_percent: Decimal::ZERO,
                },
                Decimal::ZERO,
                Vec::new(),
            ),
            status_report: StatusReport::default(),
            created_by: UserId::from_uuid(Default::default()),
            created_at: epoch,
            updated_at: epoch,
            paid_date: None,
            sent_to: None,
            sent_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PackageId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn company_id(&self) -> CompanyId {
        self.company_id
    }

    pub fn billing_period(&self) -> (NaiveDate, NaiveDate) {
        (self.billing_period_start, self.billing_period_end)
    }

    pub fn phase_number(&self) -> Option<u32> {
        self.phase_number
    }

    pub fn status(&self) -> PackageStatus {
        self.status
    }

    pub fn invoice(&self) -> &Invoice {
        &self.invoice
    }

    pub fn totals(&self) -> &Totals {
        self.invoice.totals()
    }

    pub fn status_report(&self) -> &StatusReport {
        &self.status_report
    }

    pub fn created_by(&self) -> UserId {
        self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn paid_date(&self) -> Option<DateTime<Utc>> {
        self.paid_date
    }

    pub fn sent_to(&self) -> Option<&str> {
        self.sent_to.as_deref()
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.sent_at
    }

    pub fn is_editable_by(&self, role: &Role) -> bool {
        is_editable(self.status, role)
    }

    /// Inputs accepted without complaint that a reviewer should still see.
    pub fn validation_warnings(&self) -> Vec<String> {
        self.invoice
            .items()
            .iter()
            .flat_map(InvoiceLineItem::warnings)
            .collect()
    }

    /// Drafts can be deleted by anyone allowed to delete packages; issued ones
    /// only by privileged roles.
    pub fn ensure_deletable(&self, role: &Role) -> Result<(), DomainError> {
        if self.status == PackageStatus::Draft || role.is_privileged() {
            Ok(())
        } else {
            Err(DomainError::edit_denied(format!(
                "role '{role}' cannot delete a {} package",
                self.status
            )))
        }
    }

    /// Progress lines seeded for the next period: cumulative percent becomes the
    /// previous percent, this-period figures start at zero. Quantity × rate lines
    /// are one-off and are not carried.
    pub fn carried_forward_items(&self) -> Vec<InvoiceLineItem> {
        self.invoice
            .items()
            .iter()
            .filter_map(|item| match item.detail() {
                LineDetail::Progress(line) => Some(InvoiceLineItem::new(
                    LineItemId::new(),
                    LineDetail::Progress(line.carried_forward()),
                )),
                LineDetail::Simple(_) => None,
            })
            .collect()
    }
}

impl AggregateRoot for BillingPackage {
    type Id = PackageId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreatePackage.
///
/// The invoice number is assigned before the command is built; the aggregate
/// only checks that one is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePackage {
    pub package_id: PackageId,
    pub project_id: ProjectId,
    pub company_id: CompanyId,
    pub billing_period_start: NaiveDate,
    pub billing_period_end: NaiveDate,
    pub phase_number: Option<u32>,
    pub invoice_number: String,
    pub terms: InvoiceTerms,
    pub tax_rate_percent: Decimal,
    pub items: Vec<InvoiceLineItem>,
    pub status_report: StatusReport,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageCommand {
    Create(CreatePackage),
    ReplaceLineItems {
        actor: Actor,
        items: Vec<InvoiceLineItem>,
        occurred_at: DateTime<Utc>,
    },
    AddLineItem {
        actor: Actor,
        item: InvoiceLineItem,
        occurred_at: DateTime<Utc>,
    },
    UpdateLineItem {
        actor: Actor,
        item: InvoiceLineItem,
        occurred_at: DateTime<Utc>,
    },
    RemoveLineItem {
        actor: Actor,
        line_item_id: LineItemId,
        occurred_at: DateTime<Utc>,
    },
    UpdateBillingPeriod {
        actor: Actor,
        start: NaiveDate,
        end: NaiveDate,
        phase_number: Option<u32>,
        occurred_at: DateTime<Utc>,
    },
    /// Move the package to another project of the same company.
    RebindProject {
        actor: Actor,
        project_id: ProjectId,
        project_company_id: CompanyId,
        occurred_at: DateTime<Utc>,
    },
    UpdateInvoiceTerms {
        actor: Actor,
        terms: InvoiceTerms,
        occurred_at: DateTime<Utc>,
    },
    ReplaceStatusReport {
        actor: Actor,
        report: StatusReport,
        occurred_at: DateTime<Utc>,
    },
    AddReportImage {
        actor: Actor,
        target: GalleryTarget,
        image: StatusReportImage,
        occurred_at: DateTime<Utc>,
    },
    RemoveReportImage {
        actor: Actor,
        image_id: ImageId,
        occurred_at: DateTime<Utc>,
    },
    AddReportSection {
        actor: Actor,
        section: ReportSection,
        occurred_at: DateTime<Utc>,
    },
    RemoveReportSection {
        actor: Actor,
        section_id: SectionId,
        occurred_at: DateTime<Utc>,
    },
    ReorderReportSections {
        actor: Actor,
        order: Vec<SectionId>,
        occurred_at: DateTime<Utc>,
    },
    ChangeStatus {
        actor: Actor,
        to: PackageStatus,
        trigger: StatusTrigger,
        /// Delivery address; required for `Send`.
        recipient: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    /// Checked by the aggregate; the caller removes the record afterwards.
    Delete {
        actor: Actor,
        occurred_at: DateTime<Utc>,
    },
}

impl PackageCommand {
    pub fn actor(&self) -> &Actor {
        match self {
            PackageCommand::Create(cmd) => &cmd.actor,
            PackageCommand::ReplaceLineItems { actor, .. }
            | PackageCommand::AddLineItem { actor, .. }
            | PackageCommand::UpdateLineItem { actor, .. }
            | PackageCommand::RemoveLineItem { actor, .. }
            | PackageCommand::UpdateBillingPeriod { actor, .. }
            | PackageCommand::RebindProject { actor, .. }
            | PackageCommand::UpdateInvoiceTerms { actor, .. }
            | PackageCommand::ReplaceStatusReport { actor, .. }
            | PackageCommand::AddReportImage { actor, .. }
            | PackageCommand::RemoveReportImage { actor, .. }
            | PackageCommand::AddReportSection { actor, .. }
            | PackageCommand::RemoveReportSection { actor, .. }
            | PackageCommand::ReorderReportSections { actor, .. }
            | PackageCommand::ChangeStatus { actor, .. }
            | PackageCommand::Delete { actor, .. } => actor,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PackageCommand::Create(cmd) => cmd.occurred_at,
            PackageCommand::ReplaceLineItems { occurred_at, .. }
            | PackageCommand::AddLineItem { occurred_at, .. }
            | PackageCommand::UpdateLineItem { occurred_at, .. }
            | PackageCommand::RemoveLineItem { occurred_at, .. }
            | PackageCommand::UpdateBillingPeriod { occurred_at, .. }
            | PackageCommand::RebindProject { occurred_at, .. }
            | PackageCommand::UpdateInvoiceTerms { occurred_at, .. }
            | PackageCommand::ReplaceStatusReport { occurred_at, .. }
            | PackageCommand::AddReportImage { occurred_at, .. }
            | PackageCommand::RemoveReportImage { occurred_at, .. }
            | PackageCommand::AddReportSection { occurred_at, .. }
            | PackageCommand::RemoveReportSection { occurred_at, .. }
            | PackageCommand::ReorderReportSections { occurred_at, .. }
            | PackageCommand::ChangeStatus { occurred_at, .. }
            | PackageCommand::Delete { occurred_at, .. } => *occurred_at,
        }
    }
}

/// Event: PackageCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageCreated {
    pub package_id: PackageId,
    pub project_id: ProjectId,
    pub company_id: CompanyId,
    pub billing_period_start: NaiveDate,
    pub billing_period_end: NaiveDate,
    pub phase_number: Option<u32>,
    pub invoice: Invoice,
    pub status_report: StatusReport,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PackageEvent {
    Created(PackageCreated),
    #[serde(rename_all = "camelCase")]
    LineItemsReplaced {
        items: Vec<InvoiceLineItem>,
        changed_by: UserId,
        occurred_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    LineItemAdded {
        item: InvoiceLineItem,
        changed_by: UserId,
        occurred_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    LineItemUpdated {
        item: InvoiceLineItem,
        changed_by: UserId,
        occurred_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    LineItemRemoved {
        line_item_id: LineItemId,
        changed_by: UserId,
        occurred_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    BillingPeriodChanged {
        start: NaiveDate,
        end: NaiveDate,
        phase_number: Option<u32>,
        changed_by: UserId,
        occurred_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    ProjectRebound {
        project_id: ProjectId,
        changed_by: UserId,
        occurred_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    InvoiceTermsUpdated {
        terms: InvoiceTerms,
        changed_by: UserId,
        occurred_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    StatusReportReplaced {
        report: StatusReport,
        changed_by: UserId,
        occurred_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    ReportImageAdded {
        target: GalleryTarget,
        image: StatusReportImage,
        changed_by: UserId,
        occurred_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    ReportImageRemoved {
        image_id: ImageId,
        changed_by: UserId,
        occurred_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    ReportSectionAdded {
        section: ReportSection,
        changed_by: UserId,
        occurred_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    ReportSectionRemoved {
        section_id: SectionId,
        changed_by: UserId,
        occurred_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    ReportSectionsReordered {
        order: Vec<SectionId>,
        changed_by: UserId,
        occurred_at: DateTime<Utc>,
    },
    /// Emitted after any change that moved the invoice totals.
    #[serde(rename_all = "camelCase")]
    TotalsRecomputed {
        totals: Totals,
        occurred_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    StatusChanged {
        from: PackageStatus,
        to: PackageStatus,
        trigger: StatusTrigger,
        recipient: Option<String>,
        changed_by: UserId,
        occurred_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Deleted {
        deleted_by: UserId,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for PackageEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PackageEvent::Created(_) => "billing.package.created",
            PackageEvent::LineItemsReplaced { .. } => "billing.package.line_items_replaced",
            PackageEvent::LineItemAdded { .. } => "billing.package.line_item_added",
            PackageEvent::LineItemUpdated { .. } => "billing.package.line_item_updated",
            PackageEvent::LineItemRemoved { .. } => "billing.package.line_item_removed",
            PackageEvent::BillingPeriodChanged { .. } => "billing.package.billing_period_changed",
            PackageEvent::ProjectRebound { .. } => "billing.package.project_rebound",
            PackageEvent::InvoiceTermsUpdated { .. } => "billing.package.invoice_terms_updated",
            PackageEvent::StatusReportReplaced { .. } => "billing.package.status_report_replaced",
            PackageEvent::ReportImageAdded { .. } => "billing.package.report_image_added",
            PackageEvent::ReportImageRemoved { .. } => "billing.package.report_image_removed",
            PackageEvent::ReportSectionAdded { .. } => "billing.package.report_section_added",
            PackageEvent::ReportSectionRemoved { .. } => "billing.package.report_section_removed",
            PackageEvent::ReportSectionsReordered { .. } => {
                "billing.package.report_sections_reordered"
            }
            PackageEvent::TotalsRecomputed { .. } => "billing.package.totals_recomputed",
            PackageEvent::StatusChanged { .. } => "billing.package.status_changed",
            PackageEvent::Deleted { .. } => "billing.package.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PackageEvent::Created(e) => e.occurred_at,
            PackageEvent::LineItemsReplaced { occurred_at, .. }
            | PackageEvent::LineItemAdded { occurred_at, .. }
            | PackageEvent::LineItemUpdated { occurred_at, .. }
            | PackageEvent::LineItemRemoved { occurred_at, .. }
            | PackageEvent::BillingPeriodChanged { occurred_at, .. }
            | PackageEvent::ProjectRebound { occurred_at, .. }
            | PackageEvent::InvoiceTermsUpdated { occurred_at, .. }
            | PackageEvent::StatusReportReplaced { occurred_at, .. }
            | PackageEvent::ReportImageAdded { occurred_at, .. }
            | PackageEvent::ReportImageRemoved { occurred_at, .. }
            | PackageEvent::ReportSectionAdded { occurred_at, .. }
            | PackageEvent::ReportSectionRemoved { occurred_at, .. }
            | PackageEvent::ReportSectionsReordered { occurred_at, .. }
            | PackageEvent::TotalsRecomputed { occurred_at, .. }
            | PackageEvent::StatusChanged { occurred_at, .. }
            | PackageEvent::Deleted { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Aggregate for BillingPackage {
    type Command = PackageCommand;
    type Event = PackageEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        apply_to_invoice(&mut self.invoice, event);

        match event {
            PackageEvent::Created(e) => {
                self.id = e.package_id;
                self.project_id = e.project_id;
                self.company_id = e.company_id;
                self.billing_period_start = e.billing_period_start;
                self.billing_period_end = e.billing_period_end;
                self.phase_number = e.phase_number;
                self.status = PackageStatus::Draft;
                self.invoice = e.invoice.clone();
                self.status_report = e.status_report.clone();
                self.created_by = e.created_by;
                self.created_at = e.occurred_at;
                self.created = true;
            }
            PackageEvent::BillingPeriodChanged {
                start,
                end,
                phase_number,
                ..
            } => {
                self.billing_period_start = *start;
                self.billing_period_end = *end;
                self.phase_number = *phase_number;
            }
            PackageEvent::ProjectRebound { project_id, .. } => {
                self.project_id = *project_id;
            }
            PackageEvent::StatusReportReplaced { report, .. } => {
                self.status_report = report.clone();
            }
            // Report edits below were validated against this state in `handle`.
            PackageEvent::ReportImageAdded { target, image, .. } => {
                let _ = self.status_report.add_image(*target, image.clone());
            }
            PackageEvent::ReportImageRemoved { image_id, .. } => {
                let _ = self.status_report.remove_image(*image_id);
            }
            PackageEvent::ReportSectionAdded { section, .. } => {
                let _ = self.status_report.add_section(section.clone());
            }
            PackageEvent::ReportSectionRemoved { section_id, .. } => {
                let _ = self.status_report.remove_section(*section_id);
            }
            PackageEvent::ReportSectionsReordered { order, .. } => {
                let _ = self.status_report.reorder_sections(order);
            }
            PackageEvent::StatusChanged {
                to,
                recipient,
                occurred_at,
                ..
            } => {
                self.status = *to;
                match to {
                    PackageStatus::Sent => {
                        self.sent_to = recipient.clone();
                        self.sent_at = Some(*occurred_at);
                    }
                    PackageStatus::Paid => {
                        self.paid_date = Some(*occurred_at);
                    }
                    PackageStatus::Draft => {}
                }
            }
            PackageEvent::LineItemsReplaced { .. }
            | PackageEvent::LineItemAdded { .. }
            | PackageEvent::LineItemUpdated { .. }
            | PackageEvent::LineItemRemoved { .. }
            | PackageEvent::InvoiceTermsUpdated { .. }
            | PackageEvent::TotalsRecomputed { .. }
            | PackageEvent::Deleted { .. } => {}
        }

        self.updated_at = event.occurred_at();
        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PackageCommand::Create(cmd) => self.handle_create(cmd),
            PackageCommand::ChangeStatus {
                actor,
                to,
                trigger,
                recipient,
                occurred_at,
            } => self.handle_change_status(actor, *to, *trigger, recipient.as_deref(), *occurred_at),
            PackageCommand::Delete { actor, occurred_at } => {
                self.ensure_created()?;
                self.ensure_deletable(&actor.role)?;
                Ok(vec![PackageEvent::Deleted {
                    deleted_by: actor.user_id,
                    occurred_at: *occurred_at,
                }])
            }
            content => {
                self.ensure_created()?;
                let actor = content.actor();
                if !self.is_editable_by(&actor.role) {
                    return Err(DomainError::edit_denied(format!(
                        "package is {} and role '{}' may only edit drafts",
                        self.status, actor.role
                    )));
                }
                let event = self.decide_content(content)?;
                Ok(self.with_recomputed_totals(event))
            }
        }
    }
}

/// Invoice-side effect of an event; totals are recomputed whenever one applies.
fn apply_to_invoice(invoice: &mut Invoice, event: &PackageEvent) {
    match event {
        PackageEvent::LineItemsReplaced { items, .. } => {
            invoice.items = items.clone();
        }
        PackageEvent::LineItemAdded { item, .. } => {
            invoice.items.push(item.clone());
        }
        PackageEvent::LineItemUpdated { item, .. } => {
            if let Some(slot) = invoice.items.iter_mut().find(|i| i.id() == item.id()) {
                *slot = item.clone();
            }
        }
        PackageEvent::LineItemRemoved { line_item_id, .. } => {
            invoice.items.retain(|i| i.id() != *line_item_id);
        }
        PackageEvent::InvoiceTermsUpdated { terms, .. } => {
            invoice.invoice_date = terms.invoice_date;
            invoice.po_reference = terms.po_reference.clone();
            invoice.place_of_supply = terms.place_of_supply.clone();
            invoice.retainage_percent = terms.retainage_percent;
        }
        _ => return,
    }
    invoice.recompute();
}

fn ensure_unique_line_ids(items: &[InvoiceLineItem]) -> Result<(), DomainError> {
    let mut seen = HashSet::new();
    for item in items {
        if !seen.insert(item.id()) {
            return Err(DomainError::validation(format!(
                "line item {} appears more than once",
                item.id()
            )));
        }
    }
    Ok(())
}

fn ensure_period(start: NaiveDate, end: NaiveDate) -> Result<(), DomainError> {
    if end < start {
        return Err(DomainError::validation(format!(
            "billing period end {end} precedes start {start}"
        )));
    }
    Ok(())
}

impl BillingPackage {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if self.created {
            Ok(())
        } else {
            Err(DomainError::not_found())
        }
    }

    fn handle_create(&self, cmd: &CreatePackage) -> Result<Vec<PackageEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("package already exists"));
        }
        if cmd.package_id != self.id {
            return Err(DomainError::invariant("package_id mismatch"));
        }
        if cmd.invoice_number.trim().is_empty() {
            return Err(DomainError::validation("invoice number must be assigned before creation"));
        }
        ensure_period(cmd.billing_period_start, cmd.billing_period_end)?;
        ensure_unique_line_ids(&cmd.items)?;

        let invoice = Invoice::new(
            cmd.invoice_number.clone(),
            cmd.terms.clone(),
            cmd.tax_rate_percent,
            cmd.items.clone(),
        );

        Ok(vec![PackageEvent::Created(PackageCreated {
            package_id: cmd.package_id,
            project_id: cmd.project_id,
            company_id: cmd.company_id,
            billing_period_start: cmd.billing_period_start,
            billing_period_end: cmd.billing_period_end,
            phase_number: cmd.phase_number,
            invoice,
            status_report: cmd.status_report.clone(),
            created_by: cmd.actor.user_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_status(
        &self,
        actor: &Actor,
        to: PackageStatus,
        trigger: StatusTrigger,
        recipient: Option<&str>,
        occurred_at: DateTime<Utc>,
    ) -> Result<Vec<PackageEvent>, DomainError> {
        self.ensure_created()?;
        check_transition(self.status, to, trigger, &actor.role)?;

        let recipient = recipient.map(str::trim).filter(|r| !r.is_empty());
        if trigger == StatusTrigger::Send && recipient.is_none() {
            return Err(DomainError::validation("sending requires a recipient address"));
        }

        Ok(vec![PackageEvent::StatusChanged {
            from: self.status,
            to,
            trigger,
            recipient: recipient.map(str::to_string),
            changed_by: actor.user_id,
            occurred_at,
        }])
    }

    fn decide_content(&self, command: &PackageCommand) -> Result<PackageEvent, DomainError> {
        let changed_by = command.actor().user_id;
        let occurred_at = command.occurred_at();

        let event = match command {
            PackageCommand::ReplaceLineItems { items, .. } => {
                ensure_unique_line_ids(items)?;
                PackageEvent::LineItemsReplaced {
                    items: items.clone(),
                    changed_by,
                    occurred_at,
                }
            }
            PackageCommand::AddLineItem { item, .. } => {
                if self.invoice.item(item.id()).is_some() {
                    return Err(DomainError::conflict(format!(
                        "line item {} already exists",
                        item.id()
                    )));
                }
                PackageEvent::LineItemAdded {
                    item: item.clone(),
                    changed_by,
                    occurred_at,
                }
            }
            PackageCommand::UpdateLineItem { item, .. } => {
                self.invoice.item(item.id()).ok_or_else(DomainError::not_found)?;
                PackageEvent::LineItemUpdated {
                    item: item.clone(),
                    changed_by,
                    occurred_at,
                }
            }
            PackageCommand::RemoveLineItem { line_item_id, .. } => {
                self.invoice.item(*line_item_id).ok_or_else(DomainError::not_found)?;
                PackageEvent::LineItemRemoved {
                    line_item_id: *line_item_id,
                    changed_by,
                    occurred_at,
                }
            }
            PackageCommand::UpdateBillingPeriod {
                start,
                end,
                phase_number,
                ..
            } => {
                ensure_period(*start, *end)?;
                PackageEvent::BillingPeriodChanged {
                    start: *start,
                    end: *end,
                    phase_number: *phase_number,
                    changed_by,
                    occurred_at,
                }
            }
            PackageCommand::RebindProject {
                project_id,
                project_company_id,
                ..
            } => {
                if *project_company_id != self.company_id {
                    return Err(DomainError::invariant(format!(
                        "project {project_id} belongs to company {project_company_id}, not {}",
                        self.company_id
                    )));
                }
                PackageEvent::ProjectRebound {
                    project_id: *project_id,
                    changed_by,
                    occurred_at,
                }
            }
            PackageCommand::UpdateInvoiceTerms { terms, .. } => PackageEvent::InvoiceTermsUpdated {
                terms: terms.clone(),
                changed_by,
                occurred_at,
            },
            PackageCommand::ReplaceStatusReport { report, .. } => {
                PackageEvent::StatusReportReplaced {
                    report: report.clone(),
                    changed_by,
                    occurred_at,
                }
            }
            PackageCommand::AddReportImage { target, image, .. } => {
                self.status_report.check_image_target(*target)?;
                if self.status_report.contains_image(image.id) {
                    return Err(DomainError::conflict(format!("image {} already exists", image.id)));
                }
                PackageEvent::ReportImageAdded {
                    target: *target,
                    image: image.clone(),
                    changed_by,
                    occurred_at,
                }
            }
            PackageCommand::RemoveReportImage { image_id, .. } => {
                if !self.status_report.contains_image(*image_id) {
                    return Err(DomainError::not_found());
                }
                PackageEvent::ReportImageRemoved {
                    image_id: *image_id,
                    changed_by,
                    occurred_at,
                }
            }
            PackageCommand::AddReportSection { section, .. } => {
                match &self.status_report {
                    StatusReport::Narrative { .. } => {
                        return Err(DomainError::validation(
                            "sections can only be added to a sectioned report",
                        ));
                    }
                    StatusReport::Sectioned { sections } => {
                        if sections.iter().any(|s| s.id == section.id) {
                            return Err(DomainError::conflict(format!(
                                "section {} already exists",
                                section.id
                            )));
                        }
                    }
                }
                PackageEvent::ReportSectionAdded {
                    section: section.clone(),
                    changed_by,
                    occurred_at,
                }
            }
            PackageCommand::RemoveReportSection { section_id, .. } => {
                if !self.status_report.sections().iter().any(|s| s.id == *section_id) {
                    return Err(DomainError::not_found());
                }
                PackageEvent::ReportSectionRemoved {
                    section_id: *section_id,
                    changed_by,
                    occurred_at,
                }
            }
            PackageCommand::ReorderReportSections { order, .. } => {
                self.status_report.check_section_order(order)?;
                PackageEvent::ReportSectionsReordered {
                    order: order.clone(),
                    changed_by,
                    occurred_at,
                }
            }
            PackageCommand::Create(_)
            | PackageCommand::ChangeStatus { .. }
            | PackageCommand::Delete { .. } => {
                return Err(DomainError::invariant("not a content command"));
            }
        };
        Ok(event)
    }

    /// Append a `TotalsRecomputed` event when `event` moves the totals.
    fn with_recomputed_totals(&self, event: PackageEvent) -> Vec<PackageEvent> {
        let mut preview = self.invoice.clone();
        apply_to_invoice(&mut preview, &event);

        let occurred_at = event.occurred_at();
        let mut events = vec![event];
        if preview.totals != self.invoice.totals {
            events.push(PackageEvent::TotalsRecomputed {
                totals: preview.totals,
                occurred_at,
            });
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_item::{ProgressLine, SimpleLine};
    use crate::report::ReportSection;
    use crate::totals::DEFAULT_TAX_RATE_PERCENT;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn pm() -> Actor {
        Actor::new(UserId::new(), Role::PROJECT_MANAGER)
    }

    fn finance() -> Actor {
        Actor::new(UserId::new(), Role::FINANCE)
    }

    fn flat(amount: Decimal) -> InvoiceLineItem {
        InvoiceLineItem::simple(SimpleLine {
            particulars: "Site mobilisation".to_string(),
            hsn_code: None,
            unit: "LS".to_string(),
            quantity: Decimal::ONE,
            rate: amount,
        })
    }

    fn steel(prev: Decimal, this: Decimal) -> InvoiceLineItem {
        InvoiceLineItem::progress(ProgressLine {
            description: "Structural steel".to_string(),
            original_value: dec!(100000),
            work_completed_prev_percent: prev,
            this_period_percent: this,
            stored_materials_amount: dec!(5000),
            retainage_percent: None,
            is_change_order: false,
        })
    }

    fn create_cmd(id: PackageId, items: Vec<InvoiceLineItem>) -> CreatePackage {
        CreatePackage {
            package_id: id,
            project_id: ProjectId::new(),
            company_id: CompanyId::new(),
            billing_period_start: date(2024, 10, 1),
            billing_period_end: date(2024, 10, 31),
            phase_number: Some(1),
            invoice_number: "AQ/101".to_string(),
            terms: InvoiceTerms {
                invoice_date: date(2024, 10, 31),
                po_reference: Some("PO-7781".to_string()),
                place_of_supply: Some("Maharashtra".to_string()),
                retainage_percent: dec!(10),
            },
            tax_rate_percent: DEFAULT_TAX_RATE_PERCENT,
            items,
            status_report: StatusReport::default(),
            actor: pm(),
            occurred_at: Utc::now(),
        }
    }

    fn created(items: Vec<InvoiceLineItem>) -> BillingPackage {
        let id = PackageId::generate();
        let mut pkg = BillingPackage::empty(id);
        pkg.execute(&PackageCommand::Create(create_cmd(id, items))).unwrap();
        pkg
    }

    fn send(pkg: &mut BillingPackage) {
        pkg.execute(&PackageCommand::ChangeStatus {
            actor: pm(),
            to: PackageStatus::Sent,
            trigger: StatusTrigger::Send,
            recipient: Some("lois@metropolis.com".to_string()),
            occurred_at: Utc::now(),
        })
        .unwrap();
    }

    #[test]
    fn create_computes_totals_and_starts_in_draft() {
        let pkg = created(vec![flat(dec!(1000)), flat(dec!(2000))]);

        assert_eq!(pkg.status(), PackageStatus::Draft);
        assert_eq!(pkg.version(), 1);
        assert_eq!(pkg.invoice().invoice_number(), "AQ/101");
        assert_eq!(pkg.totals().grand_total, dec!(2922.75));
    }

    #[test]
    fn create_twice_conflicts() {
        let pkg = created(Vec::new());
        let err = pkg
            .handle(&PackageCommand::Create(create_cmd(pkg.id_typed(), Vec::new())))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn create_requires_an_invoice_number() {
        let id = PackageId::generate();
        let mut cmd = create_cmd(id, Vec::new());
        cmd.invoice_number = " ".to_string();
        let err = BillingPackage::empty(id)
            .handle(&PackageCommand::Create(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn line_item_change_emits_recomputed_totals() {
        let mut pkg = created(vec![flat(dec!(1000))]);
        let events = pkg
            .execute(&PackageCommand::AddLineItem {
                actor: pm(),
                item: flat(dec!(2000)),
                occurred_at: Utc::now(),
            })
            .unwrap();

        assert_eq!(events.len(), 2);
        match &events[1] {
            PackageEvent::TotalsRecomputed { totals, .. } => {
                assert_eq!(totals.grand_total, dec!(2922.75));
            }
            other => panic!("expected TotalsRecomputed, got {other:?}"),
        }
        assert_eq!(pkg.totals().subtotal, dec!(3000));
    }

    #[test]
    fn report_only_change_leaves_totals_alone() {
        let pkg = created(vec![flat(dec!(1000))]);
        let events = pkg
            .handle(&PackageCommand::ReplaceStatusReport {
                actor: pm(),
                report: StatusReport::sectioned(),
                occurred_at: Utc::now(),
            })
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn sent_package_is_locked_for_project_managers_but_not_finance() {
        let mut pkg = created(vec![flat(dec!(1000))]);
        send(&mut pkg);
        let before = pkg.clone();

        let edit = |actor: Actor| PackageCommand::AddLineItem {
            actor,
            item: flat(dec!(2000)),
            occurred_at: Utc::now(),
        };

        let err = pkg.execute(&edit(pm())).unwrap_err();
        assert!(matches!(err, DomainError::EditDenied(_)));
        assert_eq!(pkg, before);

        pkg.execute(&edit(finance())).unwrap();
        assert_eq!(pkg.invoice().items().len(), 2);

        pkg.execute(&PackageCommand::ChangeStatus {
            actor: finance(),
            to: PackageStatus::Paid,
            trigger: StatusTrigger::MarkPaid,
            recipient: None,
            occurred_at: Utc::now(),
        })
        .unwrap();
        assert_eq!(pkg.status(), PackageStatus::Paid);
        assert!(pkg.paid_date().is_some());
    }

    #[test]
    fn sending_records_recipient() {
        let mut pkg = created(Vec::new());
        send(&mut pkg);
        assert_eq!(pkg.sent_to(), Some("lois@metropolis.com"));
        assert!(pkg.sent_at().is_some());
    }

    #[test]
    fn send_without_recipient_is_rejected() {
        let pkg = created(Vec::new());
        let err = pkg
            .handle(&PackageCommand::ChangeStatus {
                actor: pm(),
                to: PackageStatus::Sent,
                trigger: StatusTrigger::Send,
                recipient: Some("  ".to_string()),
                occurred_at: Utc::now(),
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn rebinding_to_another_company_is_rejected() {
        let pkg = created(Vec::new());
        let err = pkg
            .handle(&PackageCommand::RebindProject {
                actor: pm(),
                project_id: ProjectId::new(),
                project_company_id: CompanyId::new(),
                occurred_at: Utc::now(),
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        let ok = pkg.handle(&PackageCommand::RebindProject {
            actor: pm(),
            project_id: ProjectId::new(),
            project_company_id: pkg.company_id(),
            occurred_at: Utc::now(),
        });
        assert!(ok.is_ok());
    }

    #[test]
    fn unknown_line_item_update_is_not_found() {
        let pkg = created(vec![flat(dec!(10))]);
        let err = pkg
            .handle(&PackageCommand::UpdateLineItem {
                actor: pm(),
                item: flat(dec!(20)),
                occurred_at: Utc::now(),
            })
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn over_hundred_percent_lines_are_kept_and_flagged() {
        let pkg = created(vec![steel(dec!(90), dec!(25))]);
        assert_eq!(pkg.totals().subtotal, dec!(30000));
        assert_eq!(pkg.validation_warnings().len(), 1);
    }

    #[test]
    fn carry_forward_seeds_only_progress_lines() {
        let pkg = created(vec![steel(dec!(40), dec!(25)), flat(dec!(500))]);
        let next = pkg.carried_forward_items();

        assert_eq!(next.len(), 1);
        match next[0].detail() {
            LineDetail::Progress(line) => {
                assert_eq!(line.work_completed_prev_percent, dec!(65));
                assert_eq!(line.this_period_percent, Decimal::ZERO);
            }
            other => panic!("expected progress line, got {other:?}"),
        }
        assert_ne!(next[0].id(), pkg.invoice().items()[0].id());
    }

    #[test]
    fn delete_rules_follow_status_and_role() {
        let mut pkg = created(Vec::new());
        assert!(pkg.ensure_deletable(&Role::PROJECT_MANAGER).is_ok());
        send(&mut pkg);
        assert!(matches!(
            pkg.ensure_deletable(&Role::PROJECT_MANAGER),
            Err(DomainError::EditDenied(_))
        ));
        assert!(pkg.ensure_deletable(&Role::ADMIN).is_ok());

        let delete = |actor: Actor| PackageCommand::Delete {
            actor,
            occurred_at: Utc::now(),
        };
        assert!(matches!(pkg.handle(&delete(pm())), Err(DomainError::EditDenied(_))));
        let events = pkg.handle(&delete(finance())).unwrap();
        assert!(matches!(events.as_slice(), [PackageEvent::Deleted { .. }]));
    }

    #[test]
    fn sections_are_managed_through_commands() {
        let mut pkg = created(Vec::new());
        pkg.execute(&PackageCommand::ReplaceStatusReport {
            actor: pm(),
            report: StatusReport::sectioned(),
            occurred_at: Utc::now(),
        })
        .unwrap();

        let section = ReportSection::named("Façade glazing");
        let section_id = section.id;
        pkg.execute(&PackageCommand::AddReportSection {
            actor: pm(),
            section,
            occurred_at: Utc::now(),
        })
        .unwrap();

        let image = StatusReportImage {
            id: ImageId::new(),
            data_url: "data:image/jpeg;base64,/9j/4AAQ".to_string(),
            caption: "Level 3 panels".to_string(),
            linked_line_item_id: None,
        };
        let image_id = image.id;
        pkg.execute(&PackageCommand::AddReportImage {
            actor: pm(),
            target: GalleryTarget::Section(section_id),
            image,
            occurred_at: Utc::now(),
        })
        .unwrap();
        assert_eq!(pkg.status_report().image_count(), 1);

        pkg.execute(&PackageCommand::RemoveReportImage {
            actor: pm(),
            image_id,
            occurred_at: Utc::now(),
        })
        .unwrap();
        assert_eq!(pkg.status_report().image_count(), 0);
    }

    #[test]
    fn section_added_after_client_supplied_maximal_order_lands_last() {
        let mut pkg = created(Vec::new());
        let mut existing = ReportSection::named("Piling");
        existing.sort_order = u32::MAX;
        pkg.execute(&PackageCommand::ReplaceStatusReport {
            actor: pm(),
            report: StatusReport::Sectioned {
                sections: vec![existing],
            },
            occurred_at: Utc::now(),
        })
        .unwrap();

        pkg.execute(&PackageCommand::AddReportSection {
            actor: pm(),
            section: ReportSection::named("Pile caps"),
            occurred_at: Utc::now(),
        })
        .unwrap();

        let names: Vec<_> = pkg
            .status_report()
            .sections()
            .iter()
            .map(|s| s.section_name.clone())
            .collect();
        assert_eq!(names, vec!["Piling", "Pile caps"]);
    }

    #[test]
    fn snapshot_round_trip_recomputes_totals() {
        let pkg = created(vec![flat(dec!(1000)), flat(dec!(2000))]);
        let mut json = serde_json::to_value(&pkg).unwrap();
        json["invoice"]["totals"]["grandTotal"] = serde_json::json!("1");

        let restored: BillingPackage = serde_json::from_value(json).unwrap();
        assert!(restored.is_created());
        assert_eq!(restored.totals().grand_total, dec!(2922.75));
        assert_eq!(restored.version(), pkg.version());
    }
}
