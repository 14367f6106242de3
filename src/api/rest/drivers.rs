use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::api::rest::{newest_first, search_term, ApiJson};
use crate::engine::{require_text, today};
use crate::error::AppError;
use crate::models::driver::{normalize_license, Driver, DriverStatus, DriverView};
use crate::state::AppState;

const MAX_SAFETY_SCORE: u8 = 100;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", get(list_drivers).post(create_driver))
        .route("/drivers/available", get(available_drivers))
        .route(
            "/drivers/:id",
            get(get_driver).patch(update_driver).delete(delete_driver),
        )
}

#[derive(Deserialize)]
pub struct DriverFilter {
    pub status: Option<DriverStatus>,
    pub q: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateDriverRequest {
    pub name: String,
    pub license_number: String,
    pub license_expiry: NaiveDate,
    #[serde(default)]
    pub status: Option<DriverStatus>,
    #[serde(default)]
    pub safety_score: Option<u8>,
}

#[derive(Deserialize, Default)]
pub struct UpdateDriverRequest {
    pub name: Option<String>,
    pub license_number: Option<String>,
    pub license_expiry: Option<NaiveDate>,
    pub status: Option<DriverStatus>,
    pub safety_score: Option<u8>,
}

fn license_taken(state: &AppState, license: &str, except: Option<Uuid>) -> bool {
    state
        .drivers
        .iter()
        .any(|entry| entry.license_number == license && Some(entry.id) != except)
}

fn check_safety_score(score: u8) -> Result<u8, AppError> {
    if score > MAX_SAFETY_SCORE {
        return Err(AppError::bad_request(format!(
            "safety_score must be between 0 and {MAX_SAFETY_SCORE}"
        )));
    }
    Ok(score)
}

fn check_on_duty(driver: &Driver) -> Result<(), AppError> {
    if driver.status == DriverStatus::OnDuty && driver.license_expired(today()) {
        return Err(AppError::bad_request(format!(
            "driver {} cannot be On Duty with a license that expired on {}",
            driver.name, driver.license_expiry
        )));
    }
    Ok(())
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<CreateDriverRequest>,
) -> Result<(StatusCode, Json<DriverView>), AppError> {
    let name = require_text("name", &payload.name)?;
    let license_number = normalize_license(&payload.license_number);
    if license_number.is_empty() {
        return Err(AppError::bad_request("license_number cannot be empty"));
    }
    let safety_score = check_safety_score(payload.safety_score.unwrap_or(MAX_SAFETY_SCORE))?;

    let now = Utc::now();
    let driver = Driver {
        id: Uuid::new_v4(),
        name,
        license_number,
        license_expiry: payload.license_expiry,
        status: payload.status.unwrap_or(DriverStatus::OffDuty),
        safety_score,
        trip_count: 0,
        completed_trips: 0,
        created_at: now,
        updated_at: now,
    };
    check_on_duty(&driver)?;

    let _guard = state.fleet_lock.lock().await;
    if license_taken(&state, &driver.license_number, None) {
        return Err(AppError::bad_request(format!(
            "license number {} is already registered",
            driver.license_number
        )));
    }

    state.drivers.insert(driver.id, driver.clone());
    info!(driver_id = %driver.id, "driver registered");

    Ok((StatusCode::CREATED, Json(DriverView::new(driver, today()))))
}

async fn list_drivers(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<DriverFilter>,
) -> Json<Vec<DriverView>> {
    let today = today();
    let needle = search_term(filter.q);
    let mut drivers: Vec<Driver> = state
        .drivers
        .iter()
        .filter(|entry| {
            filter.status.is_none_or(|status| entry.status == status)
                && needle.as_deref().is_none_or(|needle| entry.matches(needle))
        })
        .map(|entry| entry.value().clone())
        .collect();
    newest_first(&mut drivers, |driver| driver.created_at);

    Json(
        drivers
            .into_iter()
            .map(|driver| DriverView::new(driver, today))
            .collect(),
    )
}

/// Drivers that a new trip could be dispatched with right now.
async fn available_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<DriverView>> {
    let today = today();
    let candidates: Vec<Driver> = state
        .drivers
        .iter()
        .map(|entry| entry.value().clone())
        .collect();

    let mut drivers: Vec<Driver> = candidates
        .into_iter()
        .filter(|driver| state.driver_is_assignable(driver, today))
        .collect();
    newest_first(&mut drivers, |driver| driver.created_at);

    Json(
        drivers
            .into_iter()
            .map(|driver| DriverView::new(driver, today))
            .collect(),
    )
}

async fn get_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DriverView>, AppError> {
    state
        .driver(id)
        .map(|driver| Json(DriverView::new(driver, today())))
}

async fn update_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<UpdateDriverRequest>,
) -> Result<Json<DriverView>, AppError> {
    let _guard = state.fleet_lock.lock().await;
    let mut driver = state.driver(id)?;
    let previous_status = driver.status;

    if let Some(name) = payload.name {
        driver.name = require_text("name", &name)?;
    }
    if let Some(license) = payload.license_number {
        let license = normalize_license(&license);
        if license.is_empty() {
            return Err(AppError::bad_request("license_number cannot be empty"));
        }
        if license_taken(&state, &license, Some(id)) {
            return Err(AppError::bad_request(format!(
                "license number {license} is already registered"
            )));
        }
        driver.license_number = license;
    }
    if let Some(expiry) = payload.license_expiry {
        driver.license_expiry = expiry;
    }
    if let Some(score) = payload.safety_score {
        driver.safety_score = check_safety_score(score)?;
    }
    if let Some(status) = payload.status {
        driver.status = status;
    }

    if previous_status == DriverStatus::OnDuty
        && driver.status != DriverStatus::OnDuty
        && state.driver_on_dispatched_trip(id, None)
    {
        return Err(AppError::bad_request(format!(
            "driver {} is on a dispatched trip and must stay On Duty",
            driver.name
        )));
    }
    check_on_duty(&driver)?;

    driver.updated_at = Utc::now();
    state.drivers.insert(driver.id, driver.clone());

    if driver.status != previous_status {
        info!(
            driver_id = %driver.id,
            from = previous_status.label(),
            to = driver.status.label(),
            "driver status changed"
        );
    }

    Ok(Json(DriverView::new(driver, today())))
}

async fn delete_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let _guard = state.fleet_lock.lock().await;
    let driver = state.driver(id)?;

    if state.driver_has_active_trip(id) {
        return Err(AppError::bad_request(format!(
            "driver {} has active trips",
            driver.name
        )));
    }

    state.drivers.remove(&id);
    info!(driver_id = %id, "driver deleted");

    Ok(StatusCode::NO_CONTENT)
}
