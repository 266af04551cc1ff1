use super::authorizer::Capabilities;
use super::principal::{Identity, Role};

/// The principal an operation is performed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub identity: Identity,
    pub role: Role,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl Actor {
    pub fn new(identity: Identity, role: Role) -> Self {
        Self { identity, role, name: None, email: None }
    }

    pub fn capabilities(&self) -> Capabilities { Capabilities::for_role(self.role) }

    pub fn is_admin(&self) -> bool { self.role == Role::Admin }
}
