use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TripStatus {
    Draft,
    Dispatched,
    Completed,
    Cancelled,
}

impl TripStatus {
    /// Draft and Dispatched trips still reference their vehicle and driver.
    pub fn is_active(self) -> bool {
        matches!(self, TripStatus::Draft | TripStatus::Dispatched)
    }

    pub fn label(self) -> &'static str {
        match self {
            TripStatus::Draft => "Draft",
            TripStatus::Dispatched => "Dispatched",
            TripStatus::Completed => "Completed",
            TripStatus::Cancelled => "Cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub driver_id: Uuid,
    pub cargo_weight_kg: f64,
    pub origin: String,
    pub destination: String,
    pub estimated_fuel_cost: f64,
    pub final_odometer: Option<f64>,
    pub status: TripStatus,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TripView {
    #[serde(flatten)]
    pub trip: Trip,
    pub vehicle_name: Option<String>,
    pub driver_name: Option<String>,
}
