//! Permission checks at the HTTP boundary, before any service is called.
//!
//! Role/status edit locks are a separate, later check made by the package
//! aggregate itself.

use construcbill_auth::{AuthzError, CommandAuthorization, Permission, authorize};

use crate::context::PrincipalContext;

/// Require every permission a command declares.
pub fn authorize_command<C: CommandAuthorization>(
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    for perm in command.required_permissions() {
        authorize(principal.principal(), perm)?;
    }
    Ok(())
}

/// Require a single permission.
pub fn require(principal: &PrincipalContext, permission: &Permission) -> Result<(), AuthzError> {
    authorize(principal.principal(), permission)
}

#[cfg(test)]
mod tests {
    use construcbill_auth::Role;
    use construcbill_core::UserId;

    use super::*;
    use crate::app::routes::common::CmdAuth;

    #[test]
    fn project_manager_cannot_mark_paid() {
        let pm = PrincipalContext::new(UserId::new(), vec![Role::PROJECT_MANAGER]);
        let cmd = CmdAuth {
            inner: (),
            required: vec![Permission::PACKAGES_UPDATE, Permission::PACKAGES_MARK_PAID],
        };
        assert!(matches!(authorize_command(&pm, &cmd), Err(AuthzError::Forbidden(_))));
        assert!(require(&pm, &Permission::PACKAGES_UPDATE).is_ok());
    }

    #[test]
    fn admin_passes_everything() {
        let admin = PrincipalContext::new(UserId::new(), vec![Role::ADMIN]);
        assert!(require(&admin, &Permission::COMPANIES_MANAGE).is_ok());
        assert!(require(&admin, &Permission::PACKAGES_SET_STATUS).is_ok());
    }
}
