use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role identifier used for RBAC.
///
/// Roles stay opaque strings on the wire; the three roles the billing workflow
/// knows about are exposed as constants. Comparison is case-insensitive so
/// `"FINANCE"` and `"finance"` are the same role.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const ADMIN: Role = Role(Cow::Borrowed("admin"));
    pub const FINANCE: Role = Role(Cow::Borrowed("finance"));
    pub const PROJECT_MANAGER: Role = Role(Cow::Borrowed("project_manager"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Privileged roles keep full edit rights on packages in every status.
    pub fn is_privileged(&self) -> bool {
        self.is(&Role::ADMIN) || self.is(&Role::FINANCE)
    }

    fn is(&self, other: &Role) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl PartialEq for Role {
    fn eq(&self, other: &Self) -> bool {
        self.is(other)
    }
}

impl core::hash::Hash for Role {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        for b in self.0.bytes() {
            state.write_u8(b.to_ascii_lowercase());
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
