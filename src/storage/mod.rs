//!
//! fleetwatch storage module
//! -------------------------
//! In-process stand-in for the hosted database: the `profiles`, `activity_logs`
//! and `vehicles` tables behind one lock, with the same observable behaviour
//! the remote tables have.
//!
//! Key behaviours:
//! - Activity rows come back newest first by event timestamp; rows with equal
//!   timestamps come back in reverse insertion order, so paging is stable.
//! - Deleting a profile cascades to that identity's vehicles.
//! - Vehicles reference their owner's profile (insert fails without one).
//! - `created_at` stamps are strictly increasing, so "newest first" is total.
//!
//! `MemoryBackend` is cheap to clone; clones share the same tables.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::activity::{ActivityLogEntry, ActivityLogRepository, ActivityQuery, NewActivity};
use crate::error::BackendError;
use crate::fleet::{Vehicle, VehicleDraft, VehicleRepository};
use crate::identity::{Identity, NewProfile, Profile, ProfileChanges, ProfileRepository};

mod seed;

pub use seed::{seed_admin, AdminSeed};

#[derive(Debug, Clone)]
struct ActivityRow {
    seq: u64,
    entry: ActivityLogEntry,
}

#[derive(Debug, Default)]
struct Tables {
    profiles: HashMap<Identity, Profile>,
    activity: Vec<ActivityRow>,
    vehicles: HashMap<Uuid, Vehicle>,
    next_seq: u64,
    last_stamp: Option<DateTime<Utc>>,
}

impl Tables {
    fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }
}

type SharedTables = Arc<RwLock<Tables>>;

#[derive(Clone, Default)]
pub struct MemoryBackend {
    tables: SharedTables,
}

impl MemoryBackend {
    pub fn new() -> Self { Self::default() }

    pub fn profile_count(&self) -> usize { self.tables.read().profiles.len() }

    pub fn activity_count(&self) -> usize { self.tables.read().activity.len() }

    pub fn vehicle_count(&self) -> usize { self.tables.read().vehicles.len() }

    /// Every activity row in insertion order.
    pub fn activity_snapshot(&self) -> Vec<ActivityLogEntry> {
        self.tables.read().activity.iter().map(|r| r.entry.clone()).collect()
    }
}

#[async_trait]
impl ProfileRepository for MemoryBackend {
    async fn get_by_id(&self, id: &Identity) -> Result<Option<Profile>, BackendError> {
        Ok(self.tables.read().profiles.get(id).cloned())
    }

    async fn insert(&self, profile: NewProfile) -> Result<Profile, BackendError> {
        let mut t = self.tables.write();
        if t.profiles.contains_key(&profile.id) {
            return Err(BackendError::AlreadyExists(format!("profile {}", profile.id)));
        }
        let created_at = t.stamp();
        let row = Profile { id: profile.id, name: profile.name, email: profile.email, role: profile.role, created_at };
        t.profiles.insert(row.id.clone(), row.clone());
        debug!(target: "fleetwatch::storage", profile = %row.id, "profile inserted");
        Ok(row)
    }

    async fn update(&self, id: &Identity, changes: ProfileChanges) -> Result<Profile, BackendError> {
        let mut t = self.tables.write();
        let row = t.profiles.get_mut(id).ok_or_else(|| BackendError::NotFound(format!("profile {}", id)))?;
        changes.apply_to(row);
        Ok(row.clone())
    }

    async fn delete(&self, id: &Identity) -> Result<(), BackendError> {
        let mut t = self.tables.write();
        if t.profiles.remove(id).is_none() {
            return Err(BackendError::NotFound(format!("profile {}", id)));
        }
        let before = t.vehicles.len();
        t.vehicles.retain(|_, v| &v.user_id != id);
        debug!(target: "fleetwatch::storage", profile = %id, vehicles = before - t.vehicles.len(), "profile deleted with its vehicles");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Profile>, BackendError> {
        let mut rows: Vec<Profile> = self.tables.read().profiles.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }
}

#[async_trait]
impl ActivityLogRepository for MemoryBackend {
    async fn insert(&self, entry: NewActivity) -> Result<(), BackendError> {
        let mut t = self.tables.write();
        let seq = t.next_seq;
        t.next_seq += 1;
        t.activity.push(ActivityRow { seq, entry: ActivityLogEntry::from_new(Uuid::new_v4(), entry) });
        Ok(())
    }

    async fn query(&self, query: &ActivityQuery) -> Result<Vec<ActivityLogEntry>, BackendError> {
        let t = self.tables.read();
        let mut rows: Vec<&ActivityRow> = t
            .activity
            .iter()
            .filter(|r| query.user_id.as_ref().map_or(true, |uid| &r.entry.user_id == uid))
            .collect();
        rows.sort_by(|a, b| b.entry.timestamp.cmp(&a.entry.timestamp).then(b.seq.cmp(&a.seq)));
        Ok(rows.into_iter().skip(query.offset).take(query.limit).map(|r| r.entry.clone()).collect())
    }
}

#[async_trait]
impl VehicleRepository for MemoryBackend {
    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Vehicle>, BackendError> {
        Ok(self.tables.read().vehicles.get(id).cloned())
    }

    async fn list(&self, owner: Option<&Identity>) -> Result<Vec<Vehicle>, BackendError> {
        let mut rows: Vec<Vehicle> = self
            .tables
            .read()
            .vehicles
            .values()
            .filter(|v| owner.map_or(true, |o| &v.user_id == o))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn insert(&self, owner: &Identity, draft: &VehicleDraft) -> Result<Vehicle, BackendError> {
        let mut t = self.tables.write();
        if !t.profiles.contains_key(owner) {
            return Err(BackendError::Rejected {
                status: 409,
                message: format!("vehicles.user_id references missing profile {}", owner),
            });
        }
        let created_at = t.stamp();
        let vehicle = Vehicle {
            id: Uuid::new_v4(),
            make: draft.make.clone(),
            model: draft.model.clone(),
            year: draft.year,
            vehicle_type: draft.vehicle_type,
            user_id: owner.clone(),
            created_at,
        };
        t.vehicles.insert(vehicle.id, vehicle.clone());
        Ok(vehicle)
    }

    async fn update(&self, id: &Uuid, draft: &VehicleDraft) -> Result<Vehicle, BackendError> {
        let mut t = self.tables.write();
        let row = t.vehicles.get_mut(id).ok_or_else(|| BackendError::NotFound(format!("vehicle {}", id)))?;
        draft.apply_to(row);
        Ok(row.clone())
    }

    async fn delete(&self, id: &Uuid) -> Result<(), BackendError> {
        match self.tables.write().vehicles.remove(id) {
            Some(_) => Ok(()),
            None => Err(BackendError::NotFound(format!("vehicle {}", id))),
        }
    }
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod tests;
