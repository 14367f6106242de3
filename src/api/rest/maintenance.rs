use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::api::rest::{newest_first, ApiJson};
use crate::auth::AuthUser;
use crate::engine::maintenance::{self, NewMaintenanceLog};
use crate::error::AppError;
use crate::models::maintenance::{MaintenanceLog, MaintenanceStatus, MaintenanceView};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/maintenance", get(list_logs).post(open_log))
        .route("/maintenance/:id/complete", patch(complete_log))
}

#[derive(Deserialize)]
pub struct MaintenanceFilter {
    pub vehicle_id: Option<Uuid>,
    pub status: Option<MaintenanceStatus>,
}

fn view(state: &AppState, log: MaintenanceLog) -> MaintenanceView {
    MaintenanceView {
        vehicle_name: state.vehicle_name(log.vehicle_id),
        log,
    }
}

async fn list_logs(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<MaintenanceFilter>,
) -> Json<Vec<MaintenanceView>> {
    let mut logs: Vec<MaintenanceLog> = state
        .maintenance
        .iter()
        .filter(|entry| {
            filter.vehicle_id.is_none_or(|id| entry.vehicle_id == id)
                && filter.status.is_none_or(|status| entry.status == status)
        })
        .map(|entry| entry.value().clone())
        .collect();
    newest_first(&mut logs, |log| log.created_at);

    Json(logs.into_iter().map(|log| view(&state, log)).collect())
}

async fn open_log(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    ApiJson(payload): ApiJson<NewMaintenanceLog>,
) -> Result<(StatusCode, Json<MaintenanceView>), AppError> {
    let log = maintenance::open_log(&state, payload)
        .instrument(info_span!("maintenance", actor = %user.id))
        .await?;
    Ok((StatusCode::CREATED, Json(view(&state, log))))
}

async fn complete_log(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MaintenanceView>, AppError> {
    let log = maintenance::complete_log(&state, id)
        .instrument(info_span!("maintenance", actor = %user.id))
        .await?;
    Ok(Json(view(&state, log)))
}
