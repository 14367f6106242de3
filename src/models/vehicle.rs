use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum VehicleType {
    Truck,
    #[default]
    Van,
    Bike,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum VehicleStatus {
    Available,
    #[serde(rename = "On Trip")]
    OnTrip,
    #[serde(rename = "In Shop")]
    InShop,
    Retired,
}

impl VehicleStatus {
    pub const ALL: [VehicleStatus; 4] = [
        VehicleStatus::Available,
        VehicleStatus::OnTrip,
        VehicleStatus::InShop,
        VehicleStatus::Retired,
    ];

    pub fn label(self) -> &'static str {
        match self {
            VehicleStatus::Available => "Available",
            VehicleStatus::OnTrip => "On Trip",
            VehicleStatus::InShop => "In Shop",
            VehicleStatus::Retired => "Retired",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: Uuid,
    pub name: String,
    pub model: String,
    pub license_plate: String,
    pub vehicle_type: VehicleType,
    pub capacity_kg: f64,
    pub odometer: f64,
    pub status: VehicleStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Vehicle {
    pub fn out_of_service(&self) -> bool {
        self.status == VehicleStatus::Retired
    }

    /// Case-insensitive substring match on name, plate or model.
    pub fn matches(&self, needle: &str) -> bool {
        [&self.name, &self.license_plate, &self.model]
            .iter()
            .any(|field| field.to_lowercase().contains(needle))
    }
}

/// Vehicle as returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct VehicleView {
    #[serde(flatten)]
    pub vehicle: Vehicle,
    pub out_of_service: bool,
}

impl From<Vehicle> for VehicleView {
    fn from(vehicle: Vehicle) -> Self {
        Self {
            out_of_service: vehicle.out_of_service(),
            vehicle,
        }
    }
}

/// Plates are compared case- and whitespace-insensitively.
pub fn normalize_plate(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase()
}
