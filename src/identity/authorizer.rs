use super::principal::{Identity, Profile, Role};

/// Capability flags derived from the resolved profile's role.
/// An unresolved profile yields the safe default (no admin rights).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub is_admin: bool,
}

impl Capabilities {
    pub fn for_role(role: Role) -> Self { Self { is_admin: role == Role::Admin } }

    pub fn from_profile(profile: Option<&Profile>) -> Self {
        profile.map(|p| Self::for_role(p.role)).unwrap_or_default()
    }

    /// Unrestricted feed scope.
    pub fn can_view_all_activity(&self) -> bool { self.is_admin }

    pub fn can_manage_users(&self) -> bool { self.is_admin }

    pub fn can_change_roles(&self) -> bool { self.is_admin }

    /// Vehicles are editable by their owner or by an admin.
    pub fn can_edit_vehicle(&self, actor: &Identity, owner: &Identity) -> bool {
        self.is_admin || actor == owner
    }

    /// Profiles are editable by their owner or by an admin.
    pub fn can_edit_profile(&self, actor: &Identity, target: &Identity) -> bool {
        self.is_admin || actor == target
    }
}
