use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use super::vehicle::{Vehicle, VehicleDraft, VehicleRepository};
use crate::activity::{ActivityAction, ActivityDetails, ActivityRecorder, NewActivity};
use crate::error::{FleetError, FleetResult};
use crate::identity::{Actor, Identity, Profile, ProfileChanges, ProfileRepository, Role};

/// Vehicle and user management on behalf of an actor. Authorization is checked
/// here, before any repository call; every successful mutation is audited.
#[derive(Clone)]
pub struct FleetService {
    vehicles: Arc<dyn VehicleRepository>,
    profiles: Arc<dyn ProfileRepository>,
    recorder: ActivityRecorder,
}

fn vehicle_details(vehicle: &Vehicle) -> ActivityDetails {
    ActivityDetails::entity("Vehicle")
        .with("id", vehicle.id.to_string())
        .with("make", vehicle.make.as_str())
        .with("model", vehicle.model.as_str())
}

impl FleetService {
    pub fn new(vehicles: Arc<dyn VehicleRepository>, profiles: Arc<dyn ProfileRepository>, recorder: ActivityRecorder) -> Self {
        Self { vehicles, profiles, recorder }
    }

    async fn audit(&self, actor: &Actor, action: ActivityAction, details: ActivityDetails) {
        self.recorder.record(NewActivity::new(action, actor.identity.clone(), details)).await;
    }

    async fn owned_vehicle(&self, actor: &Actor, id: &Uuid) -> FleetResult<Vehicle> {
        let vehicle = self
            .vehicles
            .get_by_id(id)
            .await?
            .ok_or_else(|| FleetError::NotFound(format!("vehicle {}", id)))?;
        if !actor.capabilities().can_edit_vehicle(&actor.identity, &vehicle.user_id) {
            return Err(FleetError::Forbidden("only the owner or an admin can change this vehicle".into()));
        }
        Ok(vehicle)
    }

    /// Admins see every vehicle, users their own. Newest first.
    pub async fn list_vehicles(&self, actor: &Actor) -> FleetResult<Vec<Vehicle>> {
        let owner = if actor.is_admin() { None } else { Some(&actor.identity) };
        let mut vehicles = self.vehicles.list(owner).await?;
        vehicles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(vehicles)
    }

    pub async fn add_vehicle(&self, actor: &Actor, draft: VehicleDraft) -> FleetResult<Vehicle> {
        draft.validate()?;
        let vehicle = self.vehicles.insert(&actor.identity, &draft).await?;
        info!(target: "fleetwatch::fleet", user = %actor.identity, vehicle = %vehicle.id, "vehicle added");
        let details = ActivityDetails::entity("Vehicle").with("make", draft.make.as_str()).with("model", draft.model.as_str());
        self.audit(actor, ActivityAction::Add, details).await;
        Ok(vehicle)
    }

    pub async fn update_vehicle(&self, actor: &Actor, id: &Uuid, draft: VehicleDraft) -> FleetResult<Vehicle> {
        draft.validate()?;
        self.owned_vehicle(actor, id).await?;
        let vehicle = self.vehicles.update(id, &draft).await?;
        info!(target: "fleetwatch::fleet", user = %actor.identity, vehicle = %id, "vehicle updated");
        self.audit(actor, ActivityAction::Update, vehicle_details(&vehicle)).await;
        Ok(vehicle)
    }

    pub async fn delete_vehicle(&self, actor: &Actor, id: &Uuid) -> FleetResult<Vehicle> {
        let vehicle = self.owned_vehicle(actor, id).await?;
        self.vehicles.delete(id).await?;
        info!(target: "fleetwatch::fleet", user = %actor.identity, vehicle = %id, "vehicle deleted");
        self.audit(actor, ActivityAction::Delete, vehicle_details(&vehicle)).await;
        Ok(vehicle)
    }

    pub async fn list_users(&self, actor: &Actor) -> FleetResult<Vec<Profile>> {
        if !actor.capabilities().can_manage_users() {
            return Err(FleetError::Forbidden("only admins can list users".into()));
        }
        let mut users = self.profiles.list().await?;
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    /// Name and email only; the role changes through `set_role`.
    pub async fn update_profile(&self, actor: &Actor, id: &Identity, name: &str, email: &str) -> FleetResult<Profile> {
        if !actor.capabilities().can_edit_profile(&actor.identity, id) {
            return Err(FleetError::Forbidden("only the profile owner or an admin can edit it".into()));
        }
        let name = name.trim();
        let email = email.trim();
        if name.is_empty() {
            return Err(FleetError::Invalid("name is required".into()));
        }
        if !email.contains('@') {
            return Err(FleetError::Invalid("a valid email is required".into()));
        }
        let changes = ProfileChanges { name: Some(name.to_string()), email: Some(email.to_string()), role: None };
        let profile = self.profiles.update(id, changes).await?;
        info!(target: "fleetwatch::fleet", user = %actor.identity, profile = %id, "profile updated");
        let details = ActivityDetails::entity("Profile")
            .with("id", id.as_str())
            .with("name", profile.name.as_str())
            .with("email", profile.email.as_str());
        self.audit(actor, ActivityAction::Update, details).await;
        Ok(profile)
    }

    pub async fn set_role(&self, actor: &Actor, id: &Identity, role: Role) -> FleetResult<Profile> {
        if !actor.capabilities().can_change_roles() {
            return Err(FleetError::Forbidden("only admins can change roles".into()));
        }
        let changes = ProfileChanges { role: Some(role), ..ProfileChanges::default() };
        let profile = self.profiles.update(id, changes).await?;
        info!(target: "fleetwatch::fleet", user = %actor.identity, profile = %id, %role, "role changed");
        let details = ActivityDetails::entity("Profile").with("id", id.as_str()).with("role", role.as_str());
        self.audit(actor, ActivityAction::Update, details).await;
        Ok(profile)
    }

    /// Removes the profile and, with it, the user's vehicles.
    pub async fn delete_user(&self, actor: &Actor, id: &Identity) -> FleetResult<Profile> {
        if !actor.capabilities().can_manage_users() {
            return Err(FleetError::Forbidden("only admins can delete users".into()));
        }
        if &actor.identity == id {
            return Err(FleetError::Forbidden("you cannot delete your own account".into()));
        }
        let profile = self
            .profiles
            .get_by_id(id)
            .await?
            .ok_or_else(|| FleetError::NotFound(format!("user {}", id)))?;
        self.profiles.delete(id).await?;
        info!(target: "fleetwatch::fleet", user = %actor.identity, profile = %id, "user deleted");
        let details = ActivityDetails::entity("User")
            .with("id", id.as_str())
            .with("name", profile.name.as_str())
            .with("email", profile.email.as_str());
        self.audit(actor, ActivityAction::Delete, details).await;
        Ok(profile)
    }
}
