use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;
use uuid::Uuid;

use super::{RestBackend, RestQuery};
use crate::activity::{ActivityLogEntry, ActivityLogRepository, ActivityQuery, NewActivity};
use crate::error::BackendError;
use crate::fleet::{Vehicle, VehicleDraft, VehicleRepository};
use crate::identity::{Identity, NewProfile, Profile, ProfileChanges, ProfileRepository};

const PROFILES: &str = "profiles";
const ACTIVITY: &str = "activity_logs";
const VEHICLES: &str = "vehicles";

#[derive(Serialize)]
struct VehicleRow<'a> {
    #[serde(flatten)]
    draft: &'a VehicleDraft,
    user_id: &'a Identity,
}

fn single<T>(rows: Vec<T>, what: String) -> Result<T, BackendError> {
    rows.into_iter().next().ok_or(BackendError::NotFound(what))
}

#[async_trait]
impl ProfileRepository for RestBackend {
    async fn get_by_id(&self, id: &Identity) -> Result<Option<Profile>, BackendError> {
        let rows: Vec<Profile> = self.select(PROFILES, &RestQuery::all().eq("id", id)).await?;
        Ok(rows.into_iter().next())
    }

    async fn insert(&self, profile: NewProfile) -> Result<Profile, BackendError> {
        let rows = self.write(Method::POST, PROFILES, &RestQuery::new(), &[profile]).await?;
        rows.into_iter().next().ok_or_else(|| BackendError::Decode("profile insert returned no row".into()))
    }

    async fn update(&self, id: &Identity, changes: ProfileChanges) -> Result<Profile, BackendError> {
        let rows = self.write(Method::PATCH, PROFILES, &RestQuery::new().eq("id", id), &changes).await?;
        single(rows, format!("profile {}", id))
    }

    async fn delete(&self, id: &Identity) -> Result<(), BackendError> {
        self.remove(PROFILES, &RestQuery::new().eq("id", id)).await
    }

    async fn list(&self) -> Result<Vec<Profile>, BackendError> {
        self.select(PROFILES, &RestQuery::all().order_desc(&["created_at"])).await
    }
}

#[async_trait]
impl ActivityLogRepository for RestBackend {
    async fn insert(&self, entry: NewActivity) -> Result<(), BackendError> {
        self.write_minimal(ACTIVITY, &[entry]).await
    }

    async fn query(&self, query: &ActivityQuery) -> Result<Vec<ActivityLogEntry>, BackendError> {
        self.select(ACTIVITY, &RestQuery::for_activity(query)).await
    }
}

#[async_trait]
impl VehicleRepository for RestBackend {
    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Vehicle>, BackendError> {
        let rows: Vec<Vehicle> = self.select(VEHICLES, &RestQuery::all().eq("id", id)).await?;
        Ok(rows.into_iter().next())
    }

    async fn list(&self, owner: Option<&Identity>) -> Result<Vec<Vehicle>, BackendError> {
        let mut q = RestQuery::all().order_desc(&["created_at"]);
        if let Some(owner) = owner {
            q = q.eq("user_id", owner);
        }
        self.select(VEHICLES, &q).await
    }

    async fn insert(&self, owner: &Identity, draft: &VehicleDraft) -> Result<Vehicle, BackendError> {
        let row = VehicleRow { draft, user_id: owner };
        let rows = self.write(Method::POST, VEHICLES, &RestQuery::new(), &[row]).await?;
        rows.into_iter().next().ok_or_else(|| BackendError::Decode("vehicle insert returned no row".into()))
    }

    async fn update(&self, id: &Uuid, draft: &VehicleDraft) -> Result<Vehicle, BackendError> {
        let rows = self.write(Method::PATCH, VEHICLES, &RestQuery::new().eq("id", id), draft).await?;
        single(rows, format!("vehicle {}", id))
    }

    async fn delete(&self, id: &Uuid) -> Result<(), BackendError> {
        self.remove(VEHICLES, &RestQuery::new().eq("id", id)).await
    }
}
