use thiserror::Error;

use crate::{Permission, Principal, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Command-side authorization contract (checked at the command boundary).
///
/// The API layer enforces these requirements before calling into services.
pub trait CommandAuthorization {
    fn required_permissions(&self) -> &[Permission];
}

/// Check that the principal holds `required` (or the wildcard).
///
/// Pure policy check: no IO, no business rules. Status-dependent edit locks
/// live with the package state machine, not here.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let granted = principal
        .permissions
        .iter()
        .any(|p| p.is_wildcard() || p == required);

    if granted {
        Ok(())
    } else {
        tracing::debug!(
            user_id = %principal.user_id,
            permission = %required,
            "authorization denied"
        );
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Built-in role → permission policy.
///
/// - admin: everything
/// - finance: full package lifecycle, client/project upkeep, read companies
/// - project_manager: drafts and sends packages, maintains clients/projects
/// - unknown roles: nothing
pub fn permissions_for_role(role: &Role) -> Vec<Permission> {
    if *role == Role::ADMIN {
        return vec![Permission::ALL];
    }

    if *role == Role::FINANCE {
        return vec![
            Permission::PACKAGES_READ,
            Permission::PACKAGES_CREATE,
            Permission::PACKAGES_UPDATE,
            Permission::PACKAGES_DELETE,
            Permission::PACKAGES_SEND,
            Permission::PACKAGES_MARK_PAID,
            Permission::PACKAGES_SET_STATUS,
            Permission::COMPANIES_READ,
            Permission::CLIENTS_READ,
            Permission::CLIENTS_MANAGE,
            Permission::PROJECTS_READ,
            Permission::PROJECTS_MANAGE,
        ];
    }

    if *role == Role::PROJECT_MANAGER {
        return vec![
            Permission::PACKAGES_READ,
            Permission::PACKAGES_CREATE,
            Permission::PACKAGES_UPDATE,
            Permission::PACKAGES_DELETE,
            Permission::PACKAGES_SEND,
            Permission::COMPANIES_READ,
            Permission::CLIENTS_READ,
            Permission::CLIENTS_MANAGE,
            Permission::PROJECTS_READ,
            Permission::PROJECTS_MANAGE,
        ];
    }

    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use construcbill_core::UserId;

    fn principal(roles: Vec<Role>) -> Principal {
        Principal::from_roles(UserId::new(), roles)
    }

    #[test]
    fn admin_wildcard_grants_everything() {
        let p = principal(vec![Role::ADMIN]);
        assert!(authorize(&p, &Permission::COMPANIES_MANAGE).is_ok());
        assert!(authorize(&p, &Permission::new("anything.at.all")).is_ok());
    }

    #[test]
    fn project_manager_cannot_mark_paid() {
        let p = principal(vec![Role::PROJECT_MANAGER]);
        assert!(authorize(&p, &Permission::PACKAGES_SEND).is_ok());
        assert_eq!(
            authorize(&p, &Permission::PACKAGES_MARK_PAID),
            Err(AuthzError::Forbidden("packages.mark_paid".to_string()))
        );
    }

    #[test]
    fn finance_cannot_manage_companies() {
        let p = principal(vec![Role::FINANCE]);
        assert!(authorize(&p, &Permission::PACKAGES_SET_STATUS).is_ok());
        assert!(authorize(&p, &Permission::COMPANIES_MANAGE).is_err());
    }

    #[test]
    fn unknown_role_has_no_permissions() {
        let p = principal(vec![Role::new("auditor")]);
        assert!(p.permissions.is_empty());
        assert!(authorize(&p, &Permission::PACKAGES_READ).is_err());
    }

    #[test]
    fn effective_role_prefers_privileged() {
        let p = principal(vec![Role::PROJECT_MANAGER, Role::FINANCE]);
        assert_eq!(p.effective_role(), Role::FINANCE);
    }
}
