use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier (e.g. "packages.send").
///
/// The wildcard `"*"` grants everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const ALL: Permission = Permission(Cow::Borrowed("*"));

    pub const PACKAGES_READ: Permission = Permission(Cow::Borrowed("packages.read"));
    pub const PACKAGES_CREATE: Permission = Permission(Cow::Borrowed("packages.create"));
    pub const PACKAGES_UPDATE: Permission = Permission(Cow::Borrowed("packages.update"));
    pub const PACKAGES_DELETE: Permission = Permission(Cow::Borrowed("packages.delete"));
    pub const PACKAGES_SEND: Permission = Permission(Cow::Borrowed("packages.send"));
    pub const PACKAGES_MARK_PAID: Permission = Permission(Cow::Borrowed("packages.mark_paid"));
    pub const PACKAGES_SET_STATUS: Permission = Permission(Cow::Borrowed("packages.set_status"));

    pub const COMPANIES_READ: Permission = Permission(Cow::Borrowed("companies.read"));
    pub const COMPANIES_MANAGE: Permission = Permission(Cow::Borrowed("companies.manage"));
    pub const CLIENTS_READ: Permission = Permission(Cow::Borrowed("clients.read"));
    pub const CLIENTS_MANAGE: Permission = Permission(Cow::Borrowed("clients.manage"));
    pub const PROJECTS_READ: Permission = Permission(Cow::Borrowed("projects.read"));
    pub const PROJECTS_MANAGE: Permission = Permission(Cow::Borrowed("projects.manage"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
