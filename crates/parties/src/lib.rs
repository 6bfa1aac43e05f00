//! Billing counterparties: the issuing company and the billed client.
//!
//! Plain entities (no event history). Invariants that span several records,
//! like "exactly one default company", are expressed as functions over slices
//! so any repository can enforce them inside its own critical section.

pub mod client;
pub mod company;

pub use client::{Client, ClientId, ClientProfile};
pub use company::{
    Address, Branding, Company, CompanyId, CompanyProfile, Contacts, DEFAULT_INVOICE_PREFIX,
    InvoicingDefaults, LegalIdentifiers, set_default_company,
};
