use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::{newest_first, ApiJson};
use crate::engine::{require_non_negative, require_positive, today};
use crate::error::AppError;
use crate::models::expense::{FuelLog, FuelLogView};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/fuel", get(list_fuel_logs).post(create_fuel_log))
}

#[derive(Deserialize)]
pub struct FuelFilter {
    pub vehicle_id: Option<Uuid>,
    pub trip_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct CreateFuelLogRequest {
    pub vehicle_id: Uuid,
    #[serde(default)]
    pub trip_id: Option<Uuid>,
    pub liters: f64,
    pub fuel_cost: f64,
    #[serde(default)]
    pub log_date: Option<NaiveDate>,
}

async fn list_fuel_logs(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<FuelFilter>,
) -> Json<Vec<FuelLogView>> {
    let mut logs: Vec<FuelLog> = state
        .fuel_logs
        .iter()
        .filter(|entry| {
            filter.vehicle_id.is_none_or(|id| entry.vehicle_id == id)
                && filter.trip_id.is_none_or(|id| entry.trip_id == Some(id))
        })
        .map(|entry| entry.value().clone())
        .collect();
    newest_first(&mut logs, |log| log.created_at);

    Json(
        logs.into_iter()
            .map(|log| FuelLogView {
                vehicle_name: state.vehicle_name(log.vehicle_id),
                log,
            })
            .collect(),
    )
}

async fn create_fuel_log(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<CreateFuelLogRequest>,
) -> Result<(StatusCode, Json<FuelLogView>), AppError> {
    let liters = require_positive("liters", payload.liters)?;
    let fuel_cost = require_non_negative("fuel_cost", payload.fuel_cost)?;

    let _guard = state.fleet_lock.lock().await;
    let vehicle = state.referenced_vehicle(payload.vehicle_id)?;
    if let Some(trip_id) = payload.trip_id {
        let trip = state.referenced_trip(trip_id)?;
        if trip.vehicle_id != vehicle.id {
            return Err(AppError::bad_request(format!(
                "trip {trip_id} was not driven with vehicle {}",
                vehicle.license_plate
            )));
        }
    }

    let log = FuelLog {
        id: Uuid::new_v4(),
        vehicle_id: vehicle.id,
        trip_id: payload.trip_id,
        liters,
        fuel_cost,
        log_date: payload.log_date.unwrap_or_else(today),
        created_at: Utc::now(),
    };
    state.fuel_logs.insert(log.id, log.clone());

    Ok((
        StatusCode::CREATED,
        Json(FuelLogView {
            log,
            vehicle_name: Some(vehicle.name),
        }),
    ))
}
