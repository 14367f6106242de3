//! JSON snapshot of the whole fleet, used as the durable copy of the
//! in-memory collections.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::error::AppError;
use crate::models::driver::Driver;
use crate::models::expense::{Expense, FuelLog};
use crate::models::maintenance::MaintenanceLog;
use crate::models::trip::Trip;
use crate::models::user::User;
use crate::models::vehicle::Vehicle;
use crate::state::AppState;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub vehicles: Vec<Vehicle>,
    #[serde(default)]
    pub drivers: Vec<Driver>,
    #[serde(default)]
    pub trips: Vec<Trip>,
    #[serde(default)]
    pub maintenance: Vec<MaintenanceLog>,
    #[serde(default)]
    pub fuel_logs: Vec<FuelLog>,
    #[serde(default)]
    pub expenses: Vec<Expense>,
}

impl Snapshot {
    /// Copies every collection under the fleet lock, so no workflow
    /// transition is captured half-applied.
    pub async fn capture(state: &AppState) -> Self {
        let _guard = state.fleet_lock.lock().await;
        Self {
            users: state.users.iter().map(|e| e.value().clone()).collect(),
            vehicles: state.vehicles.iter().map(|e| e.value().clone()).collect(),
            drivers: state.drivers.iter().map(|e| e.value().clone()).collect(),
            trips: state.trips.iter().map(|e| e.value().clone()).collect(),
            maintenance: state.maintenance.iter().map(|e| e.value().clone()).collect(),
            fuel_logs: state.fuel_logs.iter().map(|e| e.value().clone()).collect(),
            expenses: state.expenses.iter().map(|e| e.value().clone()).collect(),
        }
    }

    pub fn restore_into(self, state: &AppState) {
        for user in self.users {
            state.users.insert(user.email.clone(), user);
        }
        for vehicle in self.vehicles {
            state.vehicles.insert(vehicle.id, vehicle);
        }
        for driver in self.drivers {
            state.drivers.insert(driver.id, driver);
        }
        for trip in self.trips {
            state.trips.insert(trip.id, trip);
        }
        for log in self.maintenance {
            state.maintenance.insert(log.id, log);
        }
        for log in self.fuel_logs {
            state.fuel_logs.insert(log.id, log);
        }
        for expense in self.expenses {
            state.expenses.insert(expense.id, expense);
        }
    }
}

/// Returns `None` when no snapshot has been written yet.
pub async fn load(path: &Path) -> Result<Option<Snapshot>, AppError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(AppError::Internal(format!(
                "failed to read snapshot {}: {err}",
                path.display()
            )));
        }
    };

    serde_json::from_slice(&bytes).map(Some).map_err(|err| {
        AppError::Internal(format!("corrupt snapshot {}: {err}", path.display()))
    })
}

pub async fn save(state: &AppState, path: &Path) -> Result<(), AppError> {
    let snapshot = Snapshot::capture(state).await;
    let result = write_atomically(&snapshot, path).await;
    let outcome = if result.is_ok() { "success" } else { "failure" };
    state
        .metrics
        .snapshot_writes_total
        .with_label_values(&[outcome])
        .inc();
    result
}

async fn write_atomically(snapshot: &Snapshot, path: &Path) -> Result<(), AppError> {
    let bytes = serde_json::to_vec_pretty(snapshot)
        .map_err(|err| AppError::Internal(format!("failed to encode snapshot: {err}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|err| {
            AppError::Internal(format!("failed to create {}: {err}", parent.display()))
        })?;
    }

    let tmp = temp_path(path);
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|err| AppError::Internal(format!("failed to write {}: {err}", tmp.display())))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|err| AppError::Internal(format!("failed to replace {}: {err}", path.display())))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

pub async fn run_snapshot_flusher(state: Arc<AppState>, path: PathBuf, period: Duration) {
    info!(path = %path.display(), period_secs = period.as_secs(), "snapshot flusher started");

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; nothing has changed yet.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if let Err(err) = save(&state, &path).await {
            error!(error = %err, "failed to flush snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{load, save, Snapshot};
    use crate::engine::testutil;
    use crate::models::driver::DriverStatus;

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let path = std::env::temp_dir().join(format!("fleetflow-{}.json", Uuid::new_v4()));
        assert!(load(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn saved_state_restores_into_fresh_state() {
        let path = std::env::temp_dir()
            .join(format!("fleetflow-{}", Uuid::new_v4()))
            .join("state.json");

        let state = testutil::state();
        let vehicle = testutil::vehicle(&state, 750.0);
        let driver = testutil::driver(&state, DriverStatus::OnDuty, 90);
        save(&state, &path).await.unwrap();

        let restored = testutil::state();
        load(&path)
            .await
            .unwrap()
            .expect("snapshot written")
            .restore_into(&restored);

        assert_eq!(restored.vehicles.len(), 1);
        assert_eq!(restored.vehicle(vehicle.id).unwrap().license_plate, vehicle.license_plate);
        assert_eq!(restored.driver(driver.id).unwrap().status, DriverStatus::OnDuty);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("fleetflow-{}.json", Uuid::new_v4()));
        std::fs::write(&path, b"{ not json").unwrap();

        assert!(load(&path).await.is_err());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn empty_document_is_an_empty_snapshot() {
        let snapshot: Snapshot = serde_json::from_str("{}").unwrap();
        assert!(snapshot.vehicles.is_empty());
        assert!(snapshot.users.is_empty());
    }
}
