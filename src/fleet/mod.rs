//! Vehicles and administrative user management.

mod service;
mod vehicle;

pub use service::FleetService;
pub use vehicle::{Vehicle, VehicleDraft, VehicleRepository, VehicleType, MIN_YEAR};
