//! Construction billing engine.
//!
//! Everything in here is pure and synchronous: line-item amounts, invoice
//! totals, amount-in-words, the package status machine with its role-based
//! edit locks, and the [`BillingPackage`] aggregate tying them together.
//! Storage, numbering and delivery live in `construcbill-infra`.

pub mod currency;
pub mod line_item;
pub mod package;
pub mod report;
pub mod status;
pub mod totals;
pub mod words;

pub use currency::{format_inr, format_international};
pub use line_item::{InvoiceLineItem, LineDetail, LineItemId, ProgressLine, SimpleLine};
pub use package::{
    Actor, BillingPackage, CreatePackage, Invoice, InvoiceTerms, PackageCommand, PackageCreated,
    PackageEvent, PackageId,
};
pub use report::{GalleryTarget, ImageId, ReportSection, SectionId, StatusReport, StatusReportImage};
pub use status::{PackageStatus, StatusTrigger, check_transition, is_editable};
pub use totals::{DEFAULT_TAX_RATE_PERCENT, RetainageMode, Totals, compute_totals};
pub use words::{amount_in_words, amount_in_words_with};
