use std::sync::Arc;
use std::time::Duration;

use fleetflow::api;
use fleetflow::auth::jwt::JwtKeys;
use fleetflow::config::{Config, LogFormat};
use fleetflow::error::AppError;
use fleetflow::state::AppState;
use fleetflow::store::snapshot;
use tower_http::services::ServeDir;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    match config.log_format {
        LogFormat::Compact => subscriber.compact().init(),
        LogFormat::Json => subscriber.json().init(),
    }

    let state = Arc::new(AppState::new(
        JwtKeys::new(config.jwt_secret.as_bytes(), config.jwt_ttl_hours),
        config.bcrypt_cost,
    ));

    if let Some(path) = &config.data_path {
        if let Some(restored) = snapshot::load(path).await? {
            restored.restore_into(&state);
            tracing::info!(
                path = %path.display(),
                vehicles = state.vehicles.len(),
                drivers = state.drivers.len(),
                trips = state.trips.len(),
                "state restored from snapshot"
            );
        }

        tokio::spawn(snapshot::run_snapshot_flusher(
            state.clone(),
            path.clone(),
            Duration::from_secs(config.snapshot_interval_secs.max(1)),
        ));
    } else {
        tracing::warn!("DATA_PATH not set; state will not survive a restart");
    }

    let app = api::rest::router(state.clone()).fallback_service(ServeDir::new(&config.static_dir));

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    if let Some(path) = &config.data_path {
        snapshot::save(&state, path).await?;
        tracing::info!(path = %path.display(), "final snapshot written");
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
