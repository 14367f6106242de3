pub mod analytics;
pub mod maintenance;
pub mod trips;

use chrono::{NaiveDate, Utc};
use tracing::warn;

use crate::error::AppError;
use crate::state::AppState;

pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Counts the outcome of a workflow transition and logs rejections.
pub(crate) fn record<T>(
    state: &AppState,
    transition: &'static str,
    result: Result<T, AppError>,
) -> Result<T, AppError> {
    if let Err(err) = &result {
        warn!(transition, error = %err, "workflow transition rejected");
    }
    state.metrics.record_transition(transition, result.is_ok());
    result
}

pub(crate) fn require_text(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::bad_request(format!("{field} cannot be empty")));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn require_positive(field: &str, value: f64) -> Result<f64, AppError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(AppError::bad_request(format!("{field} must be > 0")));
    }
    Ok(value)
}

pub(crate) fn require_non_negative(field: &str, value: f64) -> Result<f64, AppError> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::bad_request(format!("{field} must be >= 0")));
    }
    Ok(value)
}

#[cfg(test)]
pub(crate) mod testutil {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use crate::auth::jwt::JwtKeys;
    use crate::models::driver::{Driver, DriverStatus};
    use crate::models::vehicle::{Vehicle, VehicleStatus, VehicleType};
    use crate::state::AppState;

    pub fn state() -> AppState {
        AppState::new(JwtKeys::new(b"unit-test-secret", 1), 4)
    }

    pub fn vehicle(state: &AppState, capacity_kg: f64) -> Vehicle {
        let now = Utc::now();
        let vehicle = Vehicle {
            id: Uuid::new_v4(),
            name: "Van-05".to_string(),
            model: "Transit".to_string(),
            license_plate: format!("FL-{}", &Uuid::new_v4().simple().to_string()[..6]),
            vehicle_type: VehicleType::Van,
            capacity_kg,
            odometer: 1_000.0,
            status: VehicleStatus::Available,
            created_at: now,
            updated_at: now,
        };
        state.vehicles.insert(vehicle.id, vehicle.clone());
        vehicle
    }

    pub fn driver(state: &AppState, status: DriverStatus, expires_in_days: i64) -> Driver {
        let now = Utc::now();
        let driver = Driver {
            id: Uuid::new_v4(),
            name: "Alex".to_string(),
            license_number: format!("DL-{}", &Uuid::new_v4().simple().to_string()[..8]),
            license_expiry: now.date_naive() + Duration::days(expires_in_days),
            status,
            safety_score: 100,
            trip_count: 0,
            completed_trips: 0,
            created_at: now,
            updated_at: now,
        };
        state.drivers.insert(driver.id, driver.clone());
        driver
    }
}
