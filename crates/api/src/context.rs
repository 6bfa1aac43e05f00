use construcbill_auth::{Principal, Role};
use construcbill_billing::Actor;
use construcbill_core::UserId;

/// Authenticated caller for a request, inserted by the auth middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(user_id: UserId, roles: Vec<Role>) -> Self {
        Self {
            principal: Principal::from_roles(user_id, roles),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.principal.user_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.principal.roles
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// The actor recorded on package commands, acting in its most privileged role.
    pub fn actor(&self) -> Actor {
        Actor::new(self.principal.user_id, self.principal.effective_role())
    }
}
