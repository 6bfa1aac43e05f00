//! Document rendering and delivery boundaries.
//!
//! Real PDF output and mail transport are out of scope; the shipped
//! implementations render a JSON document and log deliveries. Callers only
//! ever see the traits.

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use construcbill_billing::{BillingPackage, format_inr};
use construcbill_parties::Client;
use construcbill_projects::Project;

use crate::error::ExportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DocumentKind {
    Invoice,
    StatusReport,
}

/// Opaque rendered document handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub kind: DocumentKind,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Turns a finalized package into printable documents.
///
/// Totals and amount-in-words on `package` are final when these are called.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render_invoice(
        &self,
        package: &BillingPackage,
        project: &Project,
        client: &Client,
    ) -> Result<RenderedDocument, ExportError>;

    async fn render_status_report(
        &self,
        package: &BillingPackage,
        project: &Project,
        client: &Client,
    ) -> Result<RenderedDocument, ExportError>;
}

/// Delivers rendered documents. `Ok` is the delivery acknowledgment.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(
        &self,
        package: &BillingPackage,
        recipient: &str,
        attachments: &[RenderedDocument],
    ) -> Result<(), ExportError>;
}

/// Renders documents as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDocumentRenderer;

fn file_stem(package: &BillingPackage) -> String {
    package
        .invoice()
        .invoice_number()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

fn json_document(
    kind: DocumentKind,
    file_name: String,
    body: serde_json::Value,
) -> Result<RenderedDocument, ExportError> {
    let bytes = serde_json::to_vec_pretty(&body).map_err(|e| ExportError::Render(e.to_string()))?;
    Ok(RenderedDocument {
        kind,
        file_name,
        content_type: "application/json".to_string(),
        bytes,
    })
}

#[async_trait]
impl DocumentRenderer for JsonDocumentRenderer {
    async fn render_invoice(
        &self,
        package: &BillingPackage,
        project: &Project,
        client: &Client,
    ) -> Result<RenderedDocument, ExportError> {
        let invoice = package.invoice();
        let totals = invoice.totals();
        let body = serde_json::json!({
            "invoiceNumber": invoice.invoice_number(),
            "invoiceDate": invoice.invoice_date(),
            "project": { "name": project.name, "code": project.code },
            "billTo": {
                "name": client.name,
                "address": client.address,
                "gstNumber": client.gst_number,
            },
            "placeOfSupply": invoice.place_of_supply(),
            "items": invoice.items(),
            "subtotal": format_inr(totals.subtotal),
            "retainage": format_inr(totals.retainage_amount),
            "tax": format_inr(totals.tax_amount),
            "grandTotal": format_inr(totals.grand_total),
            "amountInWords": totals.amount_in_words,
        });
        json_document(DocumentKind::Invoice, format!("{}.invoice.json", file_stem(package)), body)
    }

    async fn render_status_report(
        &self,
        package: &BillingPackage,
        project: &Project,
        client: &Client,
    ) -> Result<RenderedDocument, ExportError> {
        let (start, end) = package.billing_period();
        let body = serde_json::json!({
            "project": project.name,
            "client": client.name,
            "billingPeriodStart": start,
            "billingPeriodEnd": end,
            "phaseNumber": package.phase_number(),
            "report": package.status_report(),
        });
        json_document(
            DocumentKind::StatusReport,
            format!("{}.status-report.json", file_stem(package)),
            body,
        )
    }
}

/// Acknowledges every well-formed address and logs the delivery.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingMailer;

#[async_trait]
impl Mailer for LoggingMailer {
    async fn send(
        &self,
        package: &BillingPackage,
        recipient: &str,
        attachments: &[RenderedDocument],
    ) -> Result<(), ExportError> {
        let recipient = recipient.trim();
        let well_formed = recipient
            .split_once('@')
            .is_some_and(|(user, domain)| !user.is_empty() && domain.contains('.'));
        if !well_formed {
            return Err(ExportError::Delivery(format!(
                "'{recipient}' is not a deliverable address"
            )));
        }

        info!(
            package_id = %package.id_typed(),
            invoice_number = package.invoice().invoice_number(),
            recipient,
            attachments = attachments.len(),
            "billing package delivered"
        );
        Ok(())
    }
}
