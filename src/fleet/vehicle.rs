use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BackendError, FleetError};
use crate::identity::Identity;

pub const MIN_YEAR: i32 = 1900;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleType {
    Sedan,
    #[serde(rename = "SUV")]
    Suv,
    Truck,
    Van,
    Coupe,
    Convertible,
    Hatchback,
    Wagon,
    Motorcycle,
    Other,
}

impl VehicleType {
    pub const ALL: [VehicleType; 10] = [
        VehicleType::Sedan,
        VehicleType::Suv,
        VehicleType::Truck,
        VehicleType::Van,
        VehicleType::Coupe,
        VehicleType::Convertible,
        VehicleType::Hatchback,
        VehicleType::Wagon,
        VehicleType::Motorcycle,
        VehicleType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleType::Sedan => "Sedan",
            VehicleType::Suv => "SUV",
            VehicleType::Truck => "Truck",
            VehicleType::Van => "Van",
            VehicleType::Coupe => "Coupe",
            VehicleType::Convertible => "Convertible",
            VehicleType::Hatchback => "Hatchback",
            VehicleType::Wagon => "Wagon",
            VehicleType::Motorcycle => "Motorcycle",
            VehicleType::Other => "Other",
        }
    }
}

impl fmt::Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for VehicleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        VehicleType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                let names: Vec<&str> = VehicleType::ALL.iter().map(|t| t.as_str()).collect();
                format!("unknown vehicle type '{}' (expected one of {})", wanted, names.join(", "))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: Uuid,
    pub make: String,
    pub model: String,
    pub year: i32,
    #[serde(rename = "type")]
    pub vehicle_type: VehicleType,
    /// Owning identity.
    pub user_id: Identity,
    pub created_at: DateTime<Utc>,
}

/// The user-editable columns of a vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleDraft {
    pub make: String,
    pub model: String,
    pub year: i32,
    #[serde(rename = "type")]
    pub vehicle_type: VehicleType,
}

impl VehicleDraft {
    pub fn new<S: Into<String>>(make: S, model: S, year: i32, vehicle_type: VehicleType) -> Self {
        Self { make: make.into(), model: model.into(), year, vehicle_type }
    }

    pub fn validate(&self) -> Result<(), FleetError> { self.validate_for_year(Utc::now().year()) }

    /// Next year's models are accepted.
    pub fn validate_for_year(&self, current_year: i32) -> Result<(), FleetError> {
        if self.make.trim().is_empty() {
            return Err(FleetError::Invalid("make is required".into()));
        }
        if self.model.trim().is_empty() {
            return Err(FleetError::Invalid("model is required".into()));
        }
        if self.year < MIN_YEAR {
            return Err(FleetError::Invalid(format!("year must be {} or later", MIN_YEAR)));
        }
        if self.year > current_year + 1 {
            return Err(FleetError::Invalid(format!("year cannot be later than {}", current_year + 1)));
        }
        Ok(())
    }

    pub fn apply_to(&self, vehicle: &mut Vehicle) {
        vehicle.make = self.make.clone();
        vehicle.model = self.model.clone();
        vehicle.year = self.year;
        vehicle.vehicle_type = self.vehicle_type;
    }
}

/// The `vehicles` table.
#[async_trait]
pub trait VehicleRepository: Send + Sync {
    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Vehicle>, BackendError>;
    /// Newest first; `owner` restricts to one identity's vehicles.
    async fn list(&self, owner: Option<&Identity>) -> Result<Vec<Vehicle>, BackendError>;
    async fn insert(&self, owner: &Identity, draft: &VehicleDraft) -> Result<Vehicle, BackendError>;
    async fn update(&self, id: &Uuid, draft: &VehicleDraft) -> Result<Vehicle, BackendError>;
    async fn delete(&self, id: &Uuid) -> Result<(), BackendError>;
}
