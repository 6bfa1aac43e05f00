use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use construcbill_core::{DomainError, DomainResult, Entity, uuid_newtype};
use construcbill_parties::{ClientId, CompanyId};

uuid_newtype!(
    /// Identifier of a contract scope.
    pub struct ProjectId,
    "ProjectId"
);

/// Attributes supplied when creating a project.
///
/// Reference checks on `company_id`/`client_id` happen at the application
/// boundary, which can see the stores; this type only validates its own fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectProfile {
    pub company_id: CompanyId,
    pub client_id: ClientId,
    pub name: String,
    #[serde(default)]
    pub code: String,
    pub contract_value: Decimal,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Free text, e.g. "Monthly" or "Phase-wise".
    #[serde(default)]
    pub billing_cycle: String,
    #[serde(default)]
    pub default_retainage_percent: Decimal,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub company_id: CompanyId,
    pub client_id: ClientId,
    pub name: String,
    pub code: String,
    pub contract_value: Decimal,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub billing_cycle: String,
    /// Seeds the retainage percent of new progress lines.
    pub default_retainage_percent: Decimal,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn create(id: ProjectId, profile: ProjectProfile, now: DateTime<Utc>) -> DomainResult<Self> {
        if profile.name.trim().is_empty() {
            return Err(DomainError::validation("project name must not be empty"));
        }
        if profile.end_date < profile.start_date {
            return Err(DomainError::validation(format!(
                "project end date {} precedes start date {}",
                profile.end_date, profile.start_date
            )));
        }

        Ok(Self {
            id,
            company_id: profile.company_id,
            client_id: profile.client_id,
            name: profile.name,
            code: profile.code,
            contract_value: profile.contract_value,
            start_date: profile.start_date,
            end_date: profile.end_date,
            billing_cycle: profile.billing_cycle,
            default_retainage_percent: profile.default_retainage_percent,
            location: profile.location,
            created_at: now,
        })
    }
}

impl Entity for Project {
    type Id = ProjectId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn profile() -> ProjectProfile {
        ProjectProfile {
            company_id: CompanyId::new(),
            client_id: ClientId::new(),
            name: "Skyline Tower Phase 1".to_string(),
            code: "SKY-001".to_string(),
            contract_value: dec!(5000000),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 12, 31).unwrap(),
            billing_cycle: "Monthly".to_string(),
            default_retainage_percent: dec!(10),
            location: None,
        }
    }

    #[test]
    fn create_keeps_contract_terms() {
        let project = Project::create(ProjectId::new(), profile(), Utc::now()).unwrap();
        assert_eq!(project.code, "SKY-001");
        assert_eq!(project.default_retainage_percent, dec!(10));
    }

    #[test]
    fn end_before_start_is_rejected() {
        let mut p = profile();
        p.end_date = NaiveDate::from_ymd_opt(2023, 6, 30).unwrap();
        assert!(matches!(
            Project::create(ProjectId::new(), p, Utc::now()),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn single_day_project_is_allowed() {
        let mut p = profile();
        p.end_date = p.start_date;
        assert!(Project::create(ProjectId::new(), p, Utc::now()).is_ok());
    }
}
