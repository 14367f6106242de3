//! Maintenance episodes. Any open log keeps its vehicle In Shop, even one
//! that is out on a trip. When the last open log closes the vehicle goes back
//! to On Trip if its trip is still running, otherwise to Available.

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::engine::{record, require_non_negative, require_text, today};
use crate::error::AppError;
use crate::models::maintenance::{MaintenanceLog, MaintenanceStatus};
use crate::models::vehicle::VehicleStatus;
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct NewMaintenanceLog {
    pub vehicle_id: Uuid,
    pub service_type: String,
    pub cost: f64,
    #[serde(default)]
    pub log_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

pub async fn open_log(
    state: &AppState,
    input: NewMaintenanceLog,
) -> Result<MaintenanceLog, AppError> {
    let _guard = state.fleet_lock.lock().await;
    record(state, "maintenance_open", open_locked(state, input))
}

pub async fn complete_log(state: &AppState, id: Uuid) -> Result<MaintenanceLog, AppError> {
    let _guard = state.fleet_lock.lock().await;
    record(state, "maintenance_complete", complete_locked(state, id))
}

fn open_locked(state: &AppState, input: NewMaintenanceLog) -> Result<MaintenanceLog, AppError> {
    let service_type = require_text("service_type", &input.service_type)?;
    let cost = require_non_negative("cost", input.cost)?;
    let mut vehicle = state.referenced_vehicle(input.vehicle_id)?;

    if vehicle.status == VehicleStatus::Retired {
        return Err(AppError::bad_request(format!(
            "vehicle {} is retired and cannot be serviced",
            vehicle.license_plate
        )));
    }

    let now = Utc::now();
    let log = MaintenanceLog {
        id: Uuid::new_v4(),
        vehicle_id: vehicle.id,
        service_type,
        cost,
        log_date: input.log_date.unwrap_or_else(today),
        notes: input
            .notes
            .map(|notes| notes.trim().to_string())
            .filter(|notes| !notes.is_empty()),
        status: MaintenanceStatus::Open,
        completed_at: None,
        created_at: now,
        updated_at: now,
    };

    vehicle.status = VehicleStatus::InShop;
    vehicle.updated_at = now;

    state.vehicles.insert(vehicle.id, vehicle);
    state.maintenance.insert(log.id, log.clone());

    info!(log_id = %log.id, vehicle_id = %log.vehicle_id, "maintenance opened");

    Ok(log)
}

fn complete_locked(state: &AppState, id: Uuid) -> Result<MaintenanceLog, AppError> {
    let mut log = state.maintenance_log(id)?;
    if log.status == MaintenanceStatus::Completed {
        return Err(AppError::bad_request(format!(
            "maintenance log {id} is already completed"
        )));
    }

    let still_open = state.open_maintenance_count(log.vehicle_id, Some(log.id));
    let released_vehicle = match state.vehicle(log.vehicle_id) {
        Ok(mut vehicle) if still_open == 0 && vehicle.status == VehicleStatus::InShop => {
            vehicle.status = if state.vehicle_on_dispatched_trip(vehicle.id) {
                VehicleStatus::OnTrip
            } else {
                VehicleStatus::Available
            };
            vehicle.updated_at = Utc::now();
            Some(vehicle)
        }
        _ => None,
    };

    let now = Utc::now();
    log.status = MaintenanceStatus::Completed;
    log.completed_at = Some(now);
    log.updated_at = now;

    if let Some(vehicle) = released_vehicle {
        state.vehicles.insert(vehicle.id, vehicle);
    }
    state.maintenance.insert(log.id, log.clone());

    info!(
        log_id = %log.id,
        vehicle_id = %log.vehicle_id,
        still_open,
        "maintenance completed"
    );

    Ok(log)
}
