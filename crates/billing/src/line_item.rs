use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use construcbill_core::uuid_newtype;

uuid_newtype!(
    /// Identifier of an invoice line, stable across edits.
    pub struct LineItemId,
    "LineItemId"
);

/// A quantity × rate line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleLine {
    pub particulars: String,
    #[serde(default)]
    pub hsn_code: Option<String>,
    #[serde(default)]
    pub unit: String,
    pub quantity: Decimal,
    pub rate: Decimal,
}

impl SimpleLine {
    pub fn amount(&self) -> Decimal {
        self.quantity * self.rate
    }
}

/// A schedule-of-values line billed by percent complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressLine {
    pub description: String,
    /// Contract value of this scope item.
    pub original_value: Decimal,
    /// Percent completed in earlier periods. Informational in this period.
    #[serde(default)]
    pub work_completed_prev_percent: Decimal,
    pub this_period_percent: Decimal,
    /// Materials delivered but not yet installed, billed at face value.
    #[serde(default)]
    pub stored_materials_amount: Decimal,
    /// Per-line retainage; the package percent applies when absent.
    #[serde(default)]
    pub retainage_percent: Option<Decimal>,
    #[serde(default)]
    pub is_change_order: bool,
}

impl ProgressLine {
    pub fn work_this_period(&self) -> Decimal {
        self.original_value * self.this_period_percent / Decimal::ONE_HUNDRED
    }

    pub fn amount(&self) -> Decimal {
        self.work_this_period() + self.stored_materials_amount
    }

    pub fn cumulative_percent(&self) -> Decimal {
        self.work_completed_prev_percent + self.this_period_percent
    }

    /// Billed more than the full contract value of the item. Flagged, never rejected.
    pub fn exceeds_contract(&self) -> bool {
        self.cumulative_percent() > Decimal::ONE_HUNDRED
    }

    /// The same scope item seeded for the following period: everything billed so
    /// far becomes the previous percent.
    pub fn carried_forward(&self) -> Self {
        Self {
            work_completed_prev_percent: self.cumulative_percent(),
            this_period_percent: Decimal::ZERO,
            stored_materials_amount: Decimal::ZERO,
            ..self.clone()
        }
    }
}

/// The two line kinds, resolved once at ingestion by the `kind` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LineDetail {
    Simple(SimpleLine),
    Progress(ProgressLine),
}

impl LineDetail {
    pub fn amount(&self) -> Decimal {
        match self {
            LineDetail::Simple(line) => line.amount(),
            LineDetail::Progress(line) => line.amount(),
        }
    }

    pub fn own_retainage_percent(&self) -> Option<Decimal> {
        match self {
            LineDetail::Simple(_) => None,
            LineDetail::Progress(line) => line.retainage_percent,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            LineDetail::Simple(line) => &line.particulars,
            LineDetail::Progress(line) => &line.description,
        }
    }
}

/// An invoice line together with its derived amount.
///
/// The amount is private and recomputed by every constructor and mutator, and
/// again when a line is deserialized, so a stale stored amount is never trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "LineItemRecord", into = "LineItemRecord")]
pub struct InvoiceLineItem {
    id: LineItemId,
    detail: LineDetail,
    amount: Decimal,
}

impl InvoiceLineItem {
    pub fn new(id: LineItemId, detail: LineDetail) -> Self {
        let amount = detail.amount();
        Self { id, detail, amount }
    }

    pub fn simple(line: SimpleLine) -> Self {
        Self::new(LineItemId::new(), LineDetail::Simple(line))
    }

    pub fn progress(line: ProgressLine) -> Self {
        Self::new(LineItemId::new(), LineDetail::Progress(line))
    }

    pub fn id(&self) -> LineItemId {
        self.id
    }

    pub fn detail(&self) -> &LineDetail {
        &self.detail
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn set_detail(&mut self, detail: LineDetail) {
        self.detail = detail;
        self.amount = self.detail.amount();
    }

    /// Mutate the line in place; the amount is recomputed before returning.
    pub fn edit(&mut self, f: impl FnOnce(&mut LineDetail)) {
        f(&mut self.detail);
        self.amount = self.detail.amount();
    }

    /// Inputs the engine accepts but a reviewer should look at: negative
    /// figures and progress beyond 100%.
    pub fn warnings(&self) -> Vec<String> {
        let mut out = Vec::new();
        let label = self.detail.label();
        match &self.detail {
            LineDetail::Simple(line) => {
                if line.quantity.is_sign_negative() {
                    out.push(format!("line '{label}': negative quantity {}", line.quantity));
                }
                if line.rate.is_sign_negative() {
                    out.push(format!("line '{label}': negative rate {}", line.rate));
                }
            }
            LineDetail::Progress(line) => {
                if line.this_period_percent.is_sign_negative()
                    || line.work_completed_prev_percent.is_sign_negative()
                {
                    out.push(format!("line '{label}': negative percent complete"));
                }
                if line.stored_materials_amount.is_sign_negative() {
                    out.push(format!("line '{label}': negative stored materials amount"));
                }
                if line.exceeds_contract() {
                    out.push(format!(
                        "line '{label}': cumulative completion {}% exceeds 100%",
                        line.cumulative_percent()
                    ));
                }
            }
        }
        out
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LineItemRecord {
    #[serde(default)]
    id: LineItemId,
    #[serde(flatten)]
    detail: LineDetail,
    #[serde(default, skip_deserializing)]
    amount: Decimal,
}

impl From<LineItemRecord> for InvoiceLineItem {
    fn from(record: LineItemRecord) -> Self {
        InvoiceLineItem::new(record.id, record.detail)
    }
}

impl From<InvoiceLineItem> for LineItemRecord {
    fn from(item: InvoiceLineItem) -> Self {
        LineItemRecord {
            id: item.id,
            detail: item.detail,
            amount: item.amount,
        }
    }
}
