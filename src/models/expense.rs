use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuelLog {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub trip_id: Option<Uuid>,
    pub liters: f64,
    pub fuel_cost: f64,
    pub log_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FuelLogView {
    #[serde(flatten)]
    pub log: FuelLog,
    pub vehicle_name: Option<String>,
}

/// Non-fuel operational cost tied to a trip, a vehicle, or both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub trip_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub amount: f64,
    pub category: Option<String>,
    pub description: Option<String>,
    pub expense_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}
