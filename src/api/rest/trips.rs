use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::api::rest::{newest_first, ApiJson};
use crate::auth::AuthUser;
use crate::engine::trips::{self, NewTrip, TripChanges};
use crate::error::AppError;
use crate::models::trip::{Trip, TripStatus, TripView};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/trips", get(list_trips).post(create_trip))
        .route("/trips/:id", get(get_trip).patch(update_trip))
        .route("/trips/:id/dispatch", patch(dispatch_trip))
        .route("/trips/:id/complete", patch(complete_trip))
        .route("/trips/:id/cancel", patch(cancel_trip))
}

#[derive(Deserialize)]
pub struct TripFilter {
    pub status: Option<TripStatus>,
    pub vehicle_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
}

#[derive(Deserialize, Default)]
pub struct CompleteTripRequest {
    pub final_odometer: Option<f64>,
}

async fn list_trips(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<TripFilter>,
) -> Json<Vec<TripView>> {
    let mut trips: Vec<Trip> = state
        .trips
        .iter()
        .filter(|entry| {
            filter.status.is_none_or(|status| entry.status == status)
                && filter.vehicle_id.is_none_or(|id| entry.vehicle_id == id)
                && filter.driver_id.is_none_or(|id| entry.driver_id == id)
        })
        .map(|entry| entry.value().clone())
        .collect();
    newest_first(&mut trips, |trip| trip.created_at);

    Json(trips.into_iter().map(|trip| state.trip_view(trip)).collect())
}

async fn get_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TripView>, AppError> {
    let trip = state.trip(id)?;
    Ok(Json(state.trip_view(trip)))
}

async fn create_trip(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    ApiJson(payload): ApiJson<NewTrip>,
) -> Result<(StatusCode, Json<TripView>), AppError> {
    let trip = trips::create_trip(&state, payload)
        .instrument(info_span!("trip", actor = %user.id))
        .await?;
    Ok((StatusCode::CREATED, Json(state.trip_view(trip))))
}

async fn update_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
    ApiJson(payload): ApiJson<TripChanges>,
) -> Result<Json<TripView>, AppError> {
    let trip = trips::update_trip(&state, id, payload)
        .instrument(info_span!("trip", actor = %user.id))
        .await?;
    Ok(Json(state.trip_view(trip)))
}

async fn dispatch_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<TripView>, AppError> {
    let trip = trips::dispatch_trip(&state, id)
        .instrument(info_span!("trip", actor = %user.id))
        .await?;
    Ok(Json(state.trip_view(trip)))
}

/// The body is optional: clients may complete a trip without a reading.
async fn complete_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> Result<Json<TripView>, AppError> {
    let payload: CompleteTripRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CompleteTripRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| AppError::bad_request(format!("invalid request body: {err}")))?
    };

    let trip = trips::complete_trip(&state, id, payload.final_odometer)
        .instrument(info_span!("trip", actor = %user.id))
        .await?;
    Ok(Json(state.trip_view(trip)))
}

async fn cancel_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<TripView>, AppError> {
    let trip = trips::cancel_trip(&state, id)
        .instrument(info_span!("trip", actor = %user.id))
        .await?;
    Ok(Json(state.trip_view(trip)))
}
