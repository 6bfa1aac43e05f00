//! Package lifecycle: DRAFT → SENT → PAID, plus the edit-lock predicate.

use serde::{Deserialize, Serialize};

use construcbill_auth::Role;
use construcbill_core::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PackageStatus {
    Draft,
    Sent,
    Paid,
}

impl PackageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PackageStatus::Draft => "DRAFT",
            PackageStatus::Sent => "SENT",
            PackageStatus::Paid => "PAID",
        }
    }

    fn rank(self) -> u8 {
        match self {
            PackageStatus::Draft => 0,
            PackageStatus::Sent => 1,
            PackageStatus::Paid => 2,
        }
    }
}

impl core::fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for PackageStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DRAFT" => Ok(PackageStatus::Draft),
            "SENT" => Ok(PackageStatus::Sent),
            "PAID" => Ok(PackageStatus::Paid),
            other => Err(DomainError::validation(format!("unknown package status '{other}'"))),
        }
    }
}

/// What is asking for a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatusTrigger {
    /// Successful delivery to the client.
    Send,
    /// Payment received.
    MarkPaid,
    /// Privileged override of the status field.
    DirectEdit,
}

/// Whether `role` may change package content while it is in `status`.
///
/// Drafts are open to every role; once sent, only privileged roles
/// (finance/admin) may edit.
pub fn is_editable(status: PackageStatus, role: &Role) -> bool {
    status == PackageStatus::Draft || role.is_privileged()
}

/// Validate a status change requested through `trigger` by `role`.
pub fn check_transition(
    from: PackageStatus,
    to: PackageStatus,
    trigger: StatusTrigger,
    role: &Role,
) -> DomainResult<()> {
    if from == to {
        return Err(DomainError::conflict(format!("package is already {from}")));
    }
    if to.rank() < from.rank() {
        return Err(DomainError::invariant(format!(
            "status cannot move back from {from} to {to}"
        )));
    }

    match trigger {
        StatusTrigger::Send => {
            if from != PackageStatus::Draft || to != PackageStatus::Sent {
                return Err(DomainError::invariant(format!(
                    "send moves DRAFT to SENT, not {from} to {to}"
                )));
            }
        }
        StatusTrigger::MarkPaid => {
            if from != PackageStatus::Sent || to != PackageStatus::Paid {
                return Err(DomainError::invariant(format!(
                    "only a SENT package can be marked paid (package is {from})"
                )));
            }
            if !role.is_privileged() {
                return Err(DomainError::edit_denied(format!(
                    "role '{role}' cannot mark packages paid"
                )));
            }
        }
        StatusTrigger::DirectEdit => {
            if !role.is_privileged() {
                return Err(DomainError::edit_denied(format!(
                    "role '{role}' cannot edit package status directly"
                )));
            }
        }
    }
    Ok(())
}
