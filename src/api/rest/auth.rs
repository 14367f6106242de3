use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Extension, Json, Router};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::api::rest::ApiJson;
use crate::auth::password::{hash_password, verify_password};
use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::user::{normalize_email, Role, User, UserProfile};
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 6;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub role: Role,
    pub name: String,
}

async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let result = register_user(&state, payload).await;
    state.metrics.record_auth("register", result.is_ok());
    result?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User created successfully" })),
    ))
}

async fn register_user(state: &AppState, payload: RegisterRequest) -> Result<(), AppError> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::bad_request("name cannot be empty"));
    }

    let email = normalize_email(&payload.email);
    if !email.contains('@') {
        return Err(AppError::bad_request("email is invalid"));
    }

    if payload.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::bad_request(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    if state.users.contains_key(&email) {
        return Err(AppError::bad_request("Email already exists"));
    }

    let password_hash = hash_password(payload.password, state.bcrypt_cost).await?;

    // Re-checked atomically: another registration may have won while hashing.
    match state.users.entry(email.clone()) {
        Entry::Occupied(_) => Err(AppError::bad_request("Email already exists")),
        Entry::Vacant(slot) => {
            let user = User {
                id: Uuid::new_v4(),
                name,
                email,
                password_hash,
                role: payload.role.unwrap_or_default(),
                created_at: Utc::now(),
            };
            info!(user_id = %user.id, role = ?user.role, "user registered");
            slot.insert(user);
            Ok(())
        }
    }
}

async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let result = authenticate(&state, payload).await;
    state.metrics.record_auth("login", result.is_ok());
    result.map(Json)
}

async fn authenticate(state: &AppState, payload: LoginRequest) -> Result<LoginResponse, AppError> {
    let invalid = || AppError::bad_request("Invalid credentials");

    let user = state
        .users
        .get(&normalize_email(&payload.email))
        .map(|entry| entry.value().clone())
        .ok_or_else(invalid)?;

    if !verify_password(payload.password, user.password_hash.clone()).await? {
        return Err(invalid());
    }

    let token = state.jwt.issue(user.id, user.role)?;
    info!(user_id = %user.id, "user logged in");

    Ok(LoginResponse {
        token,
        role: user.role,
        name: user.name,
    })
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserProfile>, AppError> {
    state
        .users
        .iter()
        .find(|entry| entry.id == user.id)
        .map(|entry| Json(UserProfile::from(entry.value())))
        .ok_or_else(|| AppError::Unauthorized("user no longer exists".to_string()))
}
