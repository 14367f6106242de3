use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MaintenanceStatus {
    Open,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceLog {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub service_type: String,
    pub cost: f64,
    pub log_date: NaiveDate,
    pub notes: Option<String>,
    pub status: MaintenanceStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceView {
    #[serde(flatten)]
    pub log: MaintenanceLog,
    pub vehicle_name: Option<String>,
}
