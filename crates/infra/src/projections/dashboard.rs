use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;

use construcbill_billing::{BillingPackage, PackageEvent, PackageStatus};
use construcbill_core::{AggregateId, AggregateRoot};
use construcbill_events::{EventEnvelope, Projection, Subscription};

pub const PACKAGE_AGGREGATE_TYPE: &str = "billing.package";

/// Headline numbers for the landing dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    /// Packages still in DRAFT.
    pub pending: u64,
    pub sent: u64,
    pub paid: u64,
    /// Sum of grand totals over PAID packages.
    pub paid_revenue: Decimal,
    pub projects: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PackageRow {
    status: PackageStatus,
    grand_total: Decimal,
    last_sequence: u64,
    deleted: bool,
}

/// Per-package status and grand total, folded from package events.
///
/// Deleted packages are kept as tombstones so late duplicates cannot revive them.
#[derive(Debug, Default)]
pub struct DashboardProjection {
    packages: HashMap<AggregateId, PackageRow>,
}

impl DashboardProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a stored package as of its current version.
    pub fn track(&mut self, pkg: &BillingPackage) {
        let row = PackageRow {
            status: pkg.status(),
            grand_total: pkg.totals().grand_total,
            last_sequence: pkg.version(),
            deleted: false,
        };
        match self.packages.get_mut(&pkg.id_typed().0) {
            Some(existing) if existing.last_sequence >= row.last_sequence => {}
            Some(existing) => *existing = row,
            None => {
                self.packages.insert(pkg.id_typed().0, row);
            }
        }
    }

    /// Current counters; `projects` is left at zero for the caller to fill.
    pub fn summary(&self) -> DashboardSummary {
        let mut summary = DashboardSummary::default();
        for row in self.packages.values().filter(|r| !r.deleted) {
            match row.status {
                PackageStatus::Draft => summary.pending += 1,
                PackageStatus::Sent => summary.sent += 1,
                PackageStatus::Paid => {
                    summary.paid += 1;
                    summary.paid_revenue += row.grand_total;
                }
            }
        }
        summary
    }
}

impl Projection for DashboardProjection {
    type Ev = PackageEvent;

    fn apply(&mut self, envelope: &EventEnvelope<PackageEvent>) {
        if envelope.aggregate_type() != PACKAGE_AGGREGATE_TYPE {
            return;
        }
        let id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if let PackageEvent::Created(created) = envelope.payload() {
            self.packages.entry(id).or_insert(PackageRow {
                status: PackageStatus::Draft,
                grand_total: created.invoice.totals().grand_total,
                last_sequence: seq,
                deleted: false,
            });
            return;
        }

        // Events for packages this projection never saw created are dropped.
        let Some(row) = self.packages.get_mut(&id) else {
            return;
        };
        if seq <= row.last_sequence {
            return;
        }
        row.last_sequence = seq;

        match envelope.payload() {
            PackageEvent::TotalsRecomputed { totals, .. } => row.grand_total = totals.grand_total,
            PackageEvent::StatusChanged { to, .. } => row.status = *to,
            PackageEvent::Deleted { .. } => row.deleted = true,
            _ => {}
        }
    }
}

/// A dashboard projection attached to a bus subscription.
///
/// The owner pumps it after every publish so the subscription queue never
/// holds more than one command's events.
#[derive(Debug)]
pub struct DashboardFeed {
    subscription: Subscription<EventEnvelope<PackageEvent>>,
    projection: DashboardProjection,
    folded: u64,
}

impl DashboardFeed {
    pub fn new(subscription: Subscription<EventEnvelope<PackageEvent>>) -> Self {
        Self {
            subscription,
            projection: DashboardProjection::new(),
            folded: 0,
        }
    }

    /// Envelopes folded since the feed was created.
    pub fn folded(&self) -> u64 {
        self.folded
    }

    /// Fold everything queued on the subscription.
    pub fn pump(&mut self) {
        for envelope in self.subscription.drain() {
            self.projection.apply(&envelope);
            self.folded += 1;
        }
    }

    /// Start from stored packages; queued events they already reflect are skipped.
    pub fn seed(&mut self, packages: &[BillingPackage]) {
        for pkg in packages {
            self.projection.track(pkg);
        }
    }

    /// Fold anything still queued, then summarise.
    pub fn catch_up(&mut self) -> DashboardSummary {
        self.pump();
        self.projection.summary()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;

    use construcbill_billing::{
        Invoice, InvoiceTerms, PackageCreated, PackageId, StatusReport, StatusTrigger, Totals,
    };
    use construcbill_core::UserId;
    use construcbill_parties::CompanyId;
    use construcbill_projects::ProjectId;

    use super::*;

    fn envelope(id: PackageId, seq: u64, event: PackageEvent) -> EventEnvelope<PackageEvent> {
        let event_type = construcbill_events::Event::event_type(&event);
        EventEnvelope::new(id.0, PACKAGE_AGGREGATE_TYPE, event_type, seq, event)
    }

    fn created(id: PackageId) -> PackageEvent {
        let date = NaiveDate::from_ymd_opt(2024, 10, 31).unwrap();
        PackageEvent::Created(PackageCreated {
            package_id: id,
            project_id: ProjectId::new(),
            company_id: CompanyId::new(),
            billing_period_start: date,
            billing_period_end: date,
            phase_number: None,
            invoice: Invoice::new(
                "AQ/1".to_string(),
                InvoiceTerms {
                    invoice_date: date,
                    po_reference: None,
                    place_of_supply: None,
                    retainage_percent: dec!(0),
                },
                dec!(0),
                Vec::new(),
            ),
            status_report: StatusReport::default(),
            created_by: UserId::new(),
            occurred_at: Utc::now(),
        })
    }

    fn recomputed(grand_total: Decimal) -> PackageEvent {
        let mut totals = Totals::empty();
        totals.grand_total = grand_total;
        PackageEvent::TotalsRecomputed {
            totals,
            occurred_at: Utc::now(),
        }
    }

    fn status(from: PackageStatus, to: PackageStatus) -> PackageEvent {
        PackageEvent::StatusChanged {
            from,
            to,
            trigger: StatusTrigger::DirectEdit,
            recipient: None,
            changed_by: UserId::new(),
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn counts_by_status_and_sums_paid_revenue() {
        let mut projection = DashboardProjection::new();
        let paid = PackageId::generate();
        let draft = PackageId::generate();

        projection.apply(&envelope(paid, 1, created(paid)));
        projection.apply(&envelope(paid, 2, recomputed(dec!(2922.75))));
        projection.apply(&envelope(paid, 3, status(PackageStatus::Draft, PackageStatus::Paid)));
        projection.apply(&envelope(draft, 1, created(draft)));

        let summary = projection.summary();
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.sent, 0);
        assert_eq!(summary.paid, 1);
        assert_eq!(summary.paid_revenue, dec!(2922.75));
    }

    #[test]
    fn redelivered_and_stale_events_are_ignored() {
        let mut projection = DashboardProjection::new();
        let id = PackageId::generate();

        projection.apply(&envelope(id, 1, created(id)));
        projection.apply(&envelope(id, 2, status(PackageStatus::Draft, PackageStatus::Sent)));
        projection.apply(&envelope(id, 2, status(PackageStatus::Draft, PackageStatus::Sent)));
        projection.apply(&envelope(id, 1, created(id)));

        let summary = projection.summary();
        assert_eq!((summary.pending, summary.sent), (0, 1));
    }

    #[test]
    fn pump_empties_the_subscription_queue() {
        use construcbill_events::{EventBus, InMemoryEventBus};

        let bus: InMemoryEventBus<EventEnvelope<PackageEvent>> = InMemoryEventBus::new();
        let mut feed = DashboardFeed::new(bus.subscribe());
        let id = PackageId::generate();

        bus.publish(envelope(id, 1, created(id))).unwrap();
        bus.publish(envelope(id, 2, recomputed(dec!(150)))).unwrap();
        feed.pump();
        assert_eq!(feed.folded(), 2);

        // Nothing left behind for the next summary to fold.
        assert_eq!(feed.catch_up().pending, 1);
        assert_eq!(feed.folded(), 2);
    }

    #[test]
    fn deleted_packages_drop_out() {
        let mut projection = DashboardProjection::new();
        let id = PackageId::generate();

        projection.apply(&envelope(id, 1, created(id)));
        projection.apply(&envelope(
            id,
            2,
            PackageEvent::Deleted {
                deleted_by: UserId::new(),
                occurred_at: Utc::now(),
            },
        ));
        projection.apply(&envelope(id, 1, created(id)));

        assert_eq!(projection.summary(), DashboardSummary::default());
    }
}
