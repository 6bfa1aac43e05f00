use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use construcbill_core::{DomainError, DomainResult, Entity, ValueObject, uuid_newtype};

uuid_newtype!(
    /// Identifier of an issuing company.
    pub struct CompanyId,
    "CompanyId"
);

/// Prefix used when a company has not configured its own.
pub const DEFAULT_INVOICE_PREFIX: &str = "INV/";

const DEFAULT_PRIMARY_COLOR: &str = "#2563eb";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub pin_code: String,
}

impl ValueObject for Address {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contacts {
    #[serde(default)]
    pub phones: Vec<String>,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub website: Option<String>,
}

/// Registration numbers printed on a tax invoice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegalIdentifiers {
    /// GSTIN.
    pub gst_number: String,
    /// PAN.
    pub pan_number: String,
    /// Legal state of registration.
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branding {
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default = "default_primary_color")]
    pub primary_color: String,
    #[serde(default)]
    pub authorized_signatory: Option<String>,
    #[serde(default)]
    pub signatory_designation: Option<String>,
}

fn default_primary_color() -> String {
    DEFAULT_PRIMARY_COLOR.to_string()
}

impl Default for Branding {
    fn default() -> Self {
        Self {
            logo_url: None,
            primary_color: default_primary_color(),
            authorized_signatory: None,
            signatory_designation: None,
        }
    }
}

/// Invoicing defaults, including the per-company invoice counter.
///
/// The counter is the next number to hand out. It only moves forward, one
/// step per issued invoice, through [`InvoicingDefaults::advance_counter`]
/// (or the storage-level equivalent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoicingDefaults {
    pub retention_percent: Decimal,
    #[serde(default)]
    pub invoice_prefix: String,
    invoice_counter: u64,
    /// Company-level tax rate; the process default applies when absent.
    #[serde(default)]
    pub tax_rate_percent: Option<Decimal>,
}

impl InvoicingDefaults {
    pub fn new(retention_percent: Decimal, invoice_prefix: impl Into<String>, starting_counter: u64) -> Self {
        Self {
            retention_percent,
            invoice_prefix: invoice_prefix.into(),
            invoice_counter: starting_counter,
            tax_rate_percent: None,
        }
    }

    pub fn invoice_counter(&self) -> u64 {
        self.invoice_counter
    }

    /// Prefix to use, falling back to [`DEFAULT_INVOICE_PREFIX`].
    pub fn effective_prefix(&self) -> &str {
        if self.invoice_prefix.trim().is_empty() {
            DEFAULT_INVOICE_PREFIX
        } else {
            &self.invoice_prefix
        }
    }

    /// Render `<prefix><counter>` for a given counter value.
    pub fn format_invoice_number(&self, counter: u64) -> String {
        format!("{}{}", self.effective_prefix(), counter)
    }

    /// These settings carrying `stored`'s counter, for profile writes that must
    /// not move it.
    pub fn with_counter_from(&self, stored: &InvoicingDefaults) -> Self {
        Self {
            invoice_counter: stored.invoice_counter,
            ..self.clone()
        }
    }

    /// Consume the current counter value and move to the next one.
    ///
    /// Returns the consumed value. Only storage implementations should call
    /// this, inside whatever critical section serializes the company record.
    pub fn advance_counter(&mut self) -> u64 {
        let issued = self.invoice_counter;
        self.invoice_counter += 1;
        issued
    }
}

impl Default for InvoicingDefaults {
    fn default() -> Self {
        Self::new(Decimal::new(5, 0), String::new(), 1)
    }
}

/// Editable company attributes.
///
/// The invoice counter is deliberately absent: profile updates can never move it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyProfile {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub address: Address,
    #[serde(default)]
    pub contacts: Contacts,
    pub legal: LegalIdentifiers,
    #[serde(default)]
    pub branding: Branding,
    #[serde(default = "default_retention_percent")]
    pub retention_percent: Decimal,
    #[serde(default)]
    pub invoice_prefix: String,
    #[serde(default)]
    pub tax_rate_percent: Option<Decimal>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_retention_percent() -> Decimal {
    Decimal::new(5, 0)
}

fn default_active() -> bool {
    true
}

impl CompanyProfile {
    fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("company name must not be empty"));
        }
        if self.display_name.trim().is_empty() {
            return Err(DomainError::validation("company display name must not be empty"));
        }
        if self.legal.gst_number.trim().is_empty() {
            return Err(DomainError::validation("company GST number is required"));
        }
        if self.legal.pan_number.trim().is_empty() {
            return Err(DomainError::validation("company PAN is required"));
        }
        Ok(())
    }
}

/// Issuing legal entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    pub display_name: String,
    pub address: Address,
    pub contacts: Contacts,
    pub legal: LegalIdentifiers,
    pub branding: Branding,
    pub defaults: InvoicingDefaults,
    pub is_active: bool,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Company {
    /// Register a new company. `starting_counter` is the first invoice number
    /// it will issue (1 when not migrating an existing series).
    pub fn register(
        id: CompanyId,
        profile: CompanyProfile,
        starting_counter: u64,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        profile.validate()?;
        if starting_counter == 0 {
            return Err(DomainError::validation("invoice counter must start at 1 or above"));
        }

        let mut defaults = InvoicingDefaults::new(
            profile.retention_percent,
            profile.invoice_prefix.clone(),
            starting_counter,
        );
        defaults.tax_rate_percent = profile.tax_rate_percent;

        Ok(Self {
            id,
            name: profile.name,
            display_name: profile.display_name,
            address: profile.address,
            contacts: profile.contacts,
            legal: profile.legal,
            branding: profile.branding,
            defaults,
            is_active: profile.is_active,
            is_default: false,
            created_at: now,
            updated_at: now,
        })
    }

    /// Replace the editable attributes, keeping identity, default flag and counter.
    pub fn apply_profile(&mut self, profile: CompanyProfile, now: DateTime<Utc>) -> DomainResult<()> {
        profile.validate()?;
        self.name = profile.name;
        self.display_name = profile.display_name;
        self.address = profile.address;
        self.contacts = profile.contacts;
        self.legal = profile.legal;
        self.branding = profile.branding;
        self.defaults.retention_percent = profile.retention_percent;
        self.defaults.invoice_prefix = profile.invoice_prefix;
        self.defaults.tax_rate_percent = profile.tax_rate_percent;
        self.is_active = profile.is_active;
        self.updated_at = now;
        Ok(())
    }
}

impl Entity for Company {
    type Id = CompanyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Make `id` the only default company in `companies`.
///
/// Fails with `NotFound` (and leaves every flag untouched) when `id` is absent,
/// and with a validation error when the target is inactive.
pub fn set_default_company(companies: &mut [Company], id: CompanyId) -> DomainResult<()> {
    let target = companies
        .iter()
        .find(|c| c.id == id)
        .ok_or_else(DomainError::not_found)?;
    if !target.is_active {
        return Err(DomainError::validation("an inactive company cannot be the default"));
    }

    for company in companies.iter_mut() {
        company.is_default = company.id == id;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn profile(name: &str) -> CompanyProfile {
        CompanyProfile {
            name: name.to_string(),
            display_name: format!("{name} Pvt Ltd"),
            address: Address {
                line1: "12 MG Road".to_string(),
                line2: None,
                city: "Pune".to_string(),
                state: "Maharashtra".to_string(),
                pin_code: "411001".to_string(),
            },
            contacts: Contacts::default(),
            legal: LegalIdentifiers {
                gst_number: "27AAAAA0000A1Z5".to_string(),
                pan_number: "AAAAA0000A".to_string(),
                state: Some("Maharashtra".to_string()),
            },
            branding: Branding::default(),
            retention_percent: dec!(5),
            invoice_prefix: "AQ/".to_string(),
            tax_rate_percent: None,
            is_active: true,
        }
    }

    #[test]
    fn register_validates_legal_identifiers() {
        let mut p = profile("Aqua");
        p.legal.gst_number = "  ".to_string();
        let err = Company::register(CompanyId::new(), p, 1, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn counter_advances_one_step_per_call() {
        let mut company = Company::register(CompanyId::new(), profile("Aqua"), 101, Utc::now()).unwrap();
        assert_eq!(company.defaults.advance_counter(), 101);
        assert_eq!(company.defaults.advance_counter(), 102);
        assert_eq!(company.defaults.invoice_counter(), 103);
        assert_eq!(company.defaults.format_invoice_number(103), "AQ/103");
    }

    #[test]
    fn blank_prefix_falls_back_to_default() {
        let mut p = profile("Aqua");
        p.invoice_prefix = String::new();
        let company = Company::register(CompanyId::new(), p, 1, Utc::now()).unwrap();
        assert_eq!(company.defaults.format_invoice_number(1), "INV/1");
    }

    #[test]
    fn profile_update_keeps_counter() {
        let mut company = Company::register(CompanyId::new(), profile("Aqua"), 7, Utc::now()).unwrap();
        company.defaults.advance_counter();
        let mut p = profile("Aqua Renamed");
        p.invoice_prefix = "AQR/".to_string();
        company.apply_profile(p, Utc::now()).unwrap();

        assert_eq!(company.name, "Aqua Renamed");
        assert_eq!(company.defaults.invoice_counter(), 8);
        assert_eq!(company.defaults.effective_prefix(), "AQR/");
    }

    #[test]
    fn exactly_one_default_after_switch() {
        let now = Utc::now();
        let mut companies = vec![
            Company::register(CompanyId::new(), profile("A"), 1, now).unwrap(),
            Company::register(CompanyId::new(), profile("B"), 1, now).unwrap(),
            Company::register(CompanyId::new(), profile("C"), 1, now).unwrap(),
        ];
        let first = companies[0].id;
        let last = companies[2].id;

        set_default_company(&mut companies, first).unwrap();
        set_default_company(&mut companies, last).unwrap();

        let defaults: Vec<_> = companies.iter().filter(|c| c.is_default).map(|c| c.id).collect();
        assert_eq!(defaults, vec![last]);
    }

    #[test]
    fn unknown_default_leaves_flags_untouched() {
        let now = Utc::now();
        let mut companies = vec![Company::register(CompanyId::new(), profile("A"), 1, now).unwrap()];
        let id = companies[0].id;
        set_default_company(&mut companies, id).unwrap();

        assert_eq!(
            set_default_company(&mut companies, CompanyId::new()),
            Err(DomainError::NotFound)
        );
        assert!(companies[0].is_default);
    }

    #[test]
    fn counter_serializes_with_defaults() {
        let company = Company::register(CompanyId::new(), profile("Aqua"), 42, Utc::now()).unwrap();
        let json = serde_json::to_value(&company).unwrap();
        assert_eq!(json["defaults"]["invoiceCounter"], 42);
        assert_eq!(json["defaults"]["invoicePrefix"], "AQ/");
    }
}
