use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DriverStatus {
    #[serde(rename = "On Duty")]
    OnDuty,
    #[serde(rename = "Off Duty")]
    OffDuty,
    Suspended,
}

impl DriverStatus {
    pub const ALL: [DriverStatus; 3] = [
        DriverStatus::OnDuty,
        DriverStatus::OffDuty,
        DriverStatus::Suspended,
    ];

    pub fn label(self) -> &'static str {
        match self {
            DriverStatus::OnDuty => "On Duty",
            DriverStatus::OffDuty => "Off Duty",
            DriverStatus::Suspended => "Suspended",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub license_number: String,
    pub license_expiry: NaiveDate,
    pub status: DriverStatus,
    pub safety_score: u8,
    pub trip_count: u32,
    pub completed_trips: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Driver {
    /// A license is still valid on its expiry date.
    pub fn license_expired(&self, today: NaiveDate) -> bool {
        self.license_expiry < today
    }

    /// Case-insensitive substring match on name or license number.
    pub fn matches(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
            || self.license_number.to_lowercase().contains(needle)
    }

    pub fn completion_rate(&self) -> Option<f64> {
        if self.trip_count == 0 {
            return None;
        }
        Some(f64::from(self.completed_trips) / f64::from(self.trip_count) * 100.0)
    }
}

/// Driver as returned by the API, with derived fields.
#[derive(Debug, Clone, Serialize)]
pub struct DriverView {
    #[serde(flatten)]
    pub driver: Driver,
    pub license_expired: bool,
    pub completion_rate: Option<f64>,
}

impl DriverView {
    pub fn new(driver: Driver, today: NaiveDate) -> Self {
        Self {
            license_expired: driver.license_expired(today),
            completion_rate: driver.completion_rate(),
            driver,
        }
    }
}

pub fn normalize_license(raw: &str) -> String {
    raw.trim().to_uppercase()
}
