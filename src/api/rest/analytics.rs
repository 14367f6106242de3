use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use dashmap::DashMap;
use uuid::Uuid;

use crate::engine::analytics::{self, DashboardKpis, FuelTrendPoint, Reports};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/analytics/dashboard", get(dashboard))
        .route("/analytics/fuel-trend", get(fuel_trend))
        .route("/analytics/reports", get(reports))
}

fn collect<T: Clone>(map: &DashMap<Uuid, T>) -> Vec<T> {
    map.iter().map(|entry| entry.value().clone()).collect()
}

async fn dashboard(State(state): State<Arc<AppState>>) -> Json<DashboardKpis> {
    Json(analytics::dashboard(
        &collect(&state.vehicles),
        &collect(&state.drivers),
        &collect(&state.trips),
    ))
}

async fn fuel_trend(State(state): State<Arc<AppState>>) -> Json<Vec<FuelTrendPoint>> {
    Json(analytics::fuel_trend(&collect(&state.fuel_logs)))
}

async fn reports(State(state): State<Arc<AppState>>) -> Json<Reports> {
    Json(analytics::reports(
        &collect(&state.vehicles),
        &collect(&state.trips),
        &collect(&state.fuel_logs),
        &collect(&state.maintenance),
        &collect(&state.expenses),
    ))
}
