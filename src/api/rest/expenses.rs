use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::{newest_first, ApiJson};
use crate::engine::{require_non_negative, today};
use crate::error::AppError;
use crate::models::expense::Expense;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/expenses", get(list_expenses).post(create_expense))
}

#[derive(Deserialize)]
pub struct ExpenseFilter {
    pub vehicle_id: Option<Uuid>,
    pub trip_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct CreateExpenseRequest {
    #[serde(default)]
    pub trip_id: Option<Uuid>,
    #[serde(default)]
    pub vehicle_id: Option<Uuid>,
    pub amount: f64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub expense_date: Option<NaiveDate>,
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

async fn list_expenses(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ExpenseFilter>,
) -> Json<Vec<Expense>> {
    let mut expenses: Vec<Expense> = state
        .expenses
        .iter()
        .filter(|entry| {
            filter.vehicle_id.is_none_or(|id| entry.vehicle_id == Some(id))
                && filter.trip_id.is_none_or(|id| entry.trip_id == Some(id))
        })
        .map(|entry| entry.value().clone())
        .collect();
    newest_first(&mut expenses, |expense| expense.created_at);
    Json(expenses)
}

async fn create_expense(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<CreateExpenseRequest>,
) -> Result<(StatusCode, Json<Expense>), AppError> {
    let amount = require_non_negative("amount", payload.amount)?;

    let _guard = state.fleet_lock.lock().await;
    let trip = payload
        .trip_id
        .map(|id| state.referenced_trip(id))
        .transpose()?;

    let vehicle_id = match (payload.vehicle_id, &trip) {
        (Some(vehicle_id), Some(trip)) if trip.vehicle_id != vehicle_id => {
            return Err(AppError::bad_request(format!(
                "trip {} was not driven with vehicle {vehicle_id}",
                trip.id
            )));
        }
        (Some(vehicle_id), _) => state.referenced_vehicle(vehicle_id)?.id,
        (None, Some(trip)) => trip.vehicle_id,
        (None, None) => {
            return Err(AppError::bad_request(
                "an expense must reference a trip or a vehicle",
            ));
        }
    };

    let expense = Expense {
        id: Uuid::new_v4(),
        trip_id: trip.map(|trip| trip.id),
        vehicle_id: Some(vehicle_id),
        amount,
        category: optional_text(payload.category),
        description: optional_text(payload.description),
        expense_date: payload.expense_date.unwrap_or_else(today),
        created_at: Utc::now(),
    };
    state.expenses.insert(expense.id, expense.clone());

    Ok((StatusCode::CREATED, Json(expense)))
}
