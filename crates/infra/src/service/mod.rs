//! Application services: the orchestration between HTTP handlers and the
//! pure billing engine.
//!
//! ```text
//! command
//!   ↓ load snapshot (repository)
//!   ↓ handle + apply (BillingPackage, pure)
//!   ↓ store snapshot (optimistic version check)
//!   ↓ publish envelopes (event bus → dashboard projection)
//! ```
//!
//! The repository is the source of truth. Publication happens after the
//! write; a failed publish is logged and never rolls the write back.

mod packages;
mod parties;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;
use tracing::warn;

use construcbill_billing::{BillingPackage, PackageEvent};
use construcbill_events::{Event, EventBus, EventEnvelope};

use crate::config::AppConfig;
use crate::export::{DocumentRenderer, JsonDocumentRenderer, LoggingMailer, Mailer};
use crate::numbering::InvoiceNumberingService;
use crate::projections::dashboard::{DashboardFeed, PACKAGE_AGGREGATE_TYPE};
use crate::repository::Repositories;

pub use packages::NewPackage;
pub use parties::NewCompany;

pub type PackageEnvelope = EventEnvelope<PackageEvent>;

pub struct BillingService<B> {
    repos: Repositories,
    numbering: InvoiceNumberingService,
    bus: B,
    renderer: Arc<dyn DocumentRenderer>,
    mailer: Arc<dyn Mailer>,
    dashboard: Mutex<DashboardFeed>,
    default_tax_rate_percent: Decimal,
    upload_dir: Option<PathBuf>,
}

impl<B> BillingService<B>
where
    B: EventBus<PackageEnvelope>,
{
    /// Wire a service with the JSON renderer and the logging mailer.
    pub fn new(repos: Repositories, bus: B, config: &AppConfig) -> Self {
        let numbering = InvoiceNumberingService::new(
            repos.companies.clone(),
            repos.projects.clone(),
            config.default_invoice_prefix.clone(),
        );
        let dashboard = Mutex::new(DashboardFeed::new(bus.subscribe()));
        Self {
            repos,
            numbering,
            bus,
            renderer: Arc::new(JsonDocumentRenderer),
            mailer: Arc::new(LoggingMailer),
            dashboard,
            default_tax_rate_percent: config.default_tax_rate_percent,
            upload_dir: config.upload_dir.clone(),
        }
    }

    pub fn with_exporters(
        mut self,
        renderer: Arc<dyn DocumentRenderer>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        self.renderer = renderer;
        self.mailer = mailer;
        self
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repos
    }

    /// Publish `events` emitted while `pkg` moved from `version_before`.
    ///
    /// Each envelope carries the version right after its event was applied.
    fn publish(&self, pkg: &BillingPackage, version_before: u64, events: Vec<PackageEvent>) {
        for (offset, event) in events.into_iter().enumerate() {
            let envelope = EventEnvelope::new(
                pkg.id_typed().0,
                PACKAGE_AGGREGATE_TYPE,
                event.event_type(),
                version_before + offset as u64 + 1,
                event,
            );
            if let Err(e) = self.bus.publish(envelope) {
                warn!(package_id = %pkg.id_typed(), error = ?e, "failed to publish package event");
            }
        }

        // Fold right away; an unread subscription would otherwise keep every payload.
        match self.dashboard.lock() {
            Ok(mut feed) => feed.pump(),
            Err(_) => warn!(package_id = %pkg.id_typed(), "dashboard lock poisoned; events left queued"),
        }
    }

    #[cfg(test)]
    pub(crate) fn dashboard_folded(&self) -> u64 {
        self.dashboard.lock().map(|feed| feed.folded()).unwrap_or(0)
    }

    /// Log deferred validations. They never block a write.
    fn log_warnings(&self, pkg: &BillingPackage) {
        for warning in pkg.validation_warnings() {
            warn!(
                package_id = %pkg.id_typed(),
                invoice_number = pkg.invoice().invoice_number(),
                warning = %warning,
                "deferred validation"
            );
        }
    }
}
