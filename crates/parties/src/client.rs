use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use construcbill_core::{DomainError, DomainResult, Entity, uuid_newtype};

uuid_newtype!(
    /// Identifier of a billed client.
    pub struct ClientId,
    "ClientId"
);

/// Attributes supplied when registering a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientProfile {
    pub name: String,
    #[serde(default)]
    pub contact_person: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub gst_number: Option<String>,
    #[serde(default)]
    pub pan_number: Option<String>,
}

/// Billing counterparty.
///
/// Immutable once registered: projects reference clients by id and no cascade
/// rules exist for edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    pub contact_person: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub gst_number: Option<String>,
    pub pan_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Client {
    pub fn register(id: ClientId, profile: ClientProfile, now: DateTime<Utc>) -> DomainResult<Self> {
        if profile.name.trim().is_empty() {
            return Err(DomainError::validation("client name must not be empty"));
        }

        Ok(Self {
            id,
            name: profile.name,
            contact_person: profile.contact_person,
            email: profile.email,
            phone: profile.phone,
            address: profile.address,
            gst_number: profile.gst_number.filter(|s| !s.trim().is_empty()),
            pan_number: profile.pan_number.filter(|s| !s.trim().is_empty()),
            created_at: now,
        })
    }

    /// A GST-registered client gets a tax invoice with its GSTIN printed.
    pub fn is_gst_registered(&self) -> bool {
        self.gst_number.is_some()
    }
}

impl Entity for Client {
    type Id = ClientId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> ClientProfile {
        ClientProfile {
            name: "Metropolis Dev Corp".to_string(),
            contact_person: "Lois Lane".to_string(),
            email: "lois@metropolis.com".to_string(),
            phone: "555-0199".to_string(),
            address: "123 Daily Planet Way".to_string(),
            gst_number: Some("".to_string()),
            pan_number: None,
        }
    }

    #[test]
    fn blank_tax_ids_are_dropped() {
        let client = Client::register(ClientId::new(), profile(), Utc::now()).unwrap();
        assert_eq!(client.gst_number, None);
        assert!(!client.is_gst_registered());
    }

    #[test]
    fn name_is_required() {
        let mut p = profile();
        p.name = String::new();
        assert!(matches!(
            Client::register(ClientId::new(), p, Utc::now()),
            Err(DomainError::Validation(_))
        ));
    }
}
