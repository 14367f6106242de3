use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::api::rest::{newest_first, search_term, ApiJson};
use crate::engine::{require_non_negative, require_positive, require_text};
use crate::error::AppError;
use crate::models::vehicle::{normalize_plate, Vehicle, VehicleStatus, VehicleType, VehicleView};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/vehicles", get(list_vehicles).post(create_vehicle))
        .route("/vehicles/available", get(available_vehicles))
        .route(
            "/vehicles/:id",
            get(get_vehicle).patch(update_vehicle).delete(delete_vehicle),
        )
}

#[derive(Deserialize)]
pub struct VehicleFilter {
    pub status: Option<VehicleStatus>,
    pub q: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateVehicleRequest {
    pub name: String,
    pub model: String,
    pub license_plate: String,
    #[serde(default)]
    pub vehicle_type: VehicleType,
    pub capacity_kg: f64,
    #[serde(default)]
    pub odometer: Option<f64>,
    #[serde(default)]
    pub out_of_service: bool,
}

#[derive(Deserialize, Default)]
pub struct UpdateVehicleRequest {
    pub name: Option<String>,
    pub model: Option<String>,
    pub license_plate: Option<String>,
    pub vehicle_type: Option<VehicleType>,
    pub capacity_kg: Option<f64>,
    pub odometer: Option<f64>,
    pub status: Option<VehicleStatus>,
    pub out_of_service: Option<bool>,
}

fn plate_taken(state: &AppState, plate: &str, except: Option<Uuid>) -> bool {
    state
        .vehicles
        .iter()
        .any(|entry| entry.license_plate == plate && Some(entry.id) != except)
}

async fn create_vehicle(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<CreateVehicleRequest>,
) -> Result<(StatusCode, Json<VehicleView>), AppError> {
    let name = require_text("name", &payload.name)?;
    let model = require_text("model", &payload.model)?;
    let license_plate = normalize_plate(&payload.license_plate);
    if license_plate.is_empty() {
        return Err(AppError::bad_request("license_plate cannot be empty"));
    }
    let capacity_kg = require_positive("capacity_kg", payload.capacity_kg)?;
    let odometer = require_non_negative("odometer", payload.odometer.unwrap_or(0.0))?;

    let _guard = state.fleet_lock.lock().await;
    if plate_taken(&state, &license_plate, None) {
        return Err(AppError::bad_request(format!(
            "license plate {license_plate} is already registered"
        )));
    }

    let now = Utc::now();
    let vehicle = Vehicle {
        id: Uuid::new_v4(),
        name,
        model,
        license_plate,
        vehicle_type: payload.vehicle_type,
        capacity_kg,
        odometer,
        status: if payload.out_of_service {
            VehicleStatus::Retired
        } else {
            VehicleStatus::Available
        },
        created_at: now,
        updated_at: now,
    };

    state.vehicles.insert(vehicle.id, vehicle.clone());
    info!(vehicle_id = %vehicle.id, plate = %vehicle.license_plate, "vehicle registered");

    Ok((StatusCode::CREATED, Json(vehicle.into())))
}

async fn list_vehicles(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<VehicleFilter>,
) -> Json<Vec<VehicleView>> {
    let needle = search_term(filter.q);
    let mut vehicles: Vec<Vehicle> = state
        .vehicles
        .iter()
        .filter(|entry| {
            filter.status.is_none_or(|status| entry.status == status)
                && needle.as_deref().is_none_or(|needle| entry.matches(needle))
        })
        .map(|entry| entry.value().clone())
        .collect();
    newest_first(&mut vehicles, |vehicle| vehicle.created_at);
    Json(vehicles.into_iter().map(VehicleView::from).collect())
}

async fn available_vehicles(State(state): State<Arc<AppState>>) -> Json<Vec<VehicleView>> {
    list_vehicles(
        State(state),
        Query(VehicleFilter {
            status: Some(VehicleStatus::Available),
            q: None,
        }),
    )
    .await
}

async fn get_vehicle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<VehicleView>, AppError> {
    state.vehicle(id).map(|vehicle| Json(vehicle.into()))
}

async fn update_vehicle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<UpdateVehicleRequest>,
) -> Result<Json<VehicleView>, AppError> {
    let _guard = state.fleet_lock.lock().await;
    let mut vehicle = state.vehicle(id)?;

    if let Some(name) = payload.name {
        vehicle.name = require_text("name", &name)?;
    }
    if let Some(model) = payload.model {
        vehicle.model = require_text("model", &model)?;
    }
    if let Some(vehicle_type) = payload.vehicle_type {
        vehicle.vehicle_type = vehicle_type;
    }
    if let Some(capacity) = payload.capacity_kg {
        vehicle.capacity_kg = require_positive("capacity_kg", capacity)?;
    }
    if let Some(plate) = payload.license_plate {
        let plate = normalize_plate(&plate);
        if plate.is_empty() {
            return Err(AppError::bad_request("license_plate cannot be empty"));
        }
        if plate_taken(&state, &plate, Some(id)) {
            return Err(AppError::bad_request(format!(
                "license plate {plate} is already registered"
            )));
        }
        vehicle.license_plate = plate;
    }
    if let Some(reading) = payload.odometer {
        let reading = require_non_negative("odometer", reading)?;
        if reading < vehicle.odometer {
            return Err(AppError::bad_request(format!(
                "odometer cannot decrease (current {})",
                vehicle.odometer
            )));
        }
        vehicle.odometer = reading;
    }
    // The client's out-of-service toggle only counts when it flips the flag.
    let toggled = payload
        .out_of_service
        .filter(|flag| *flag != vehicle.out_of_service())
        .map(|flag| {
            if flag {
                VehicleStatus::Retired
            } else {
                VehicleStatus::Available
            }
        });
    let requested = payload.status.or(toggled);
    if let Some(status) = requested.filter(|status| *status != vehicle.status) {
        // On Trip and In Shop belong to the trip and maintenance workflows.
        let user_settable = |s: VehicleStatus| {
            matches!(s, VehicleStatus::Available | VehicleStatus::Retired)
        };
        if !user_settable(vehicle.status) || !user_settable(status) {
            return Err(AppError::bad_request(format!(
                "vehicle status cannot change from {} to {} directly",
                vehicle.status.label(),
                status.label()
            )));
        }
        vehicle.status = status;
    }

    vehicle.updated_at = Utc::now();
    state.vehicles.insert(vehicle.id, vehicle.clone());

    Ok(Json(vehicle.into()))
}

async fn delete_vehicle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let _guard = state.fleet_lock.lock().await;
    let vehicle = state.vehicle(id)?;

    if state.vehicle_has_active_trip(id) {
        return Err(AppError::bad_request(format!(
            "vehicle {} has active trips",
            vehicle.license_plate
        )));
    }
    if state.open_maintenance_count(id, None) > 0 {
        return Err(AppError::bad_request(format!(
            "vehicle {} has open maintenance logs",
            vehicle.license_plate
        )));
    }

    state.vehicles.remove(&id);
    info!(vehicle_id = %id, "vehicle deleted");

    Ok(StatusCode::NO_CONTENT)
}
