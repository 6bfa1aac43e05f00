use construcbill_core::UserId;

use crate::{Permission, Role, permissions_for_role};

/// A fully resolved caller: identity, roles and the permissions they grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl Principal {
    /// Resolve permissions from roles using the built-in policy.
    pub fn from_roles(user_id: UserId, roles: Vec<Role>) -> Self {
        let mut permissions: Vec<Permission> = Vec::new();
        for role in &roles {
            for perm in permissions_for_role(role) {
                if !permissions.contains(&perm) {
                    permissions.push(perm);
                }
            }
        }
        Self {
            user_id,
            roles,
            permissions,
        }
    }

    /// The role used for edit-lock decisions: the most privileged one held.
    pub fn effective_role(&self) -> Role {
        self.roles
            .iter()
            .find(|r| r.is_privileged())
            .or_else(|| self.roles.first())
            .cloned()
            .unwrap_or(Role::PROJECT_MANAGER)
    }
}
