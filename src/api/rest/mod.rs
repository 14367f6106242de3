pub mod analytics;
pub mod auth;
pub mod drivers;
pub mod expenses;
pub mod fuel;
pub mod maintenance;
pub mod trips;
pub mod vehicles;

use std::sync::Arc;

use axum::extract::{FromRequest, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::require_auth;
use crate::error::AppError;
use crate::state::AppState;

/// JSON body extractor whose rejections render as a 400 `AppError`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .merge(vehicles::router())
        .merge(drivers::router())
        .merge(trips::router())
        .merge(maintenance::router())
        .merge(fuel::router())
        .merge(expenses::router())
        .merge(analytics::router())
        .route("/auth/me", get(auth::me))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let api = Router::new().merge(auth::router()).merge(protected);

    Router::new()
        .nest("/api", api)
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    vehicles: usize,
    drivers: usize,
    trips: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        vehicles: state.vehicles.len(),
        drivers: state.drivers.len(),
        trips: state.trips.len(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.refresh_gauges();

    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}

/// Normalizes a `q` search parameter; blank means no filter.
pub(crate) fn search_term(q: Option<String>) -> Option<String> {
    q.map(|q| q.trim().to_lowercase()).filter(|q| !q.is_empty())
}

/// Newest records first.
pub(crate) fn newest_first<T, F>(items: &mut [T], created_at: F)
where
    F: Fn(&T) -> chrono::DateTime<chrono::Utc>,
{
    items.sort_by_key(|item| std::cmp::Reverse(created_at(item)));
}
