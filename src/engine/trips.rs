//! Trip lifecycle: Draft → Dispatched → Completed, with Cancelled reachable
//! from either non-terminal state.
//!
//! Every transition takes the fleet lock, validates against the current trip,
//! vehicle and driver, and only then writes all affected records. A rejected
//! transition leaves every record untouched.

use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::engine::{record, require_non_negative, require_positive, require_text, today};
use crate::error::AppError;
use crate::models::driver::{Driver, DriverStatus};
use crate::models::trip::{Trip, TripStatus};
use crate::models::vehicle::{Vehicle, VehicleStatus};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct NewTrip {
    pub vehicle_id: Uuid,
    pub driver_id: Uuid,
    pub cargo_weight_kg: f64,
    pub origin: String,
    pub destination: String,
    #[serde(default, alias = "estimated_cost")]
    pub estimated_fuel_cost: Option<f64>,
}

/// Fields editable while a trip is still a draft.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TripChanges {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub cargo_weight_kg: Option<f64>,
    #[serde(alias = "estimated_cost")]
    pub estimated_fuel_cost: Option<f64>,
}

pub async fn create_trip(state: &AppState, input: NewTrip) -> Result<Trip, AppError> {
    let _guard = state.fleet_lock.lock().await;
    record(state, "trip_create", create_locked(state, input))
}

pub async fn update_trip(
    state: &AppState,
    id: Uuid,
    changes: TripChanges,
) -> Result<Trip, AppError> {
    let _guard = state.fleet_lock.lock().await;
    record(state, "trip_update", update_locked(state, id, changes))
}

pub async fn dispatch_trip(state: &AppState, id: Uuid) -> Result<Trip, AppError> {
    let _guard = state.fleet_lock.lock().await;
    record(state, "trip_dispatch", dispatch_locked(state, id))
}

pub async fn complete_trip(
    state: &AppState,
    id: Uuid,
    final_odometer: Option<f64>,
) -> Result<Trip, AppError> {
    let _guard = state.fleet_lock.lock().await;
    record(state, "trip_complete", complete_locked(state, id, final_odometer))
}

pub async fn cancel_trip(state: &AppState, id: Uuid) -> Result<Trip, AppError> {
    let _guard = state.fleet_lock.lock().await;
    record(state, "trip_cancel", cancel_locked(state, id))
}

fn check_assignment(vehicle: &Vehicle, driver: &Driver, cargo_weight_kg: f64) -> Result<(), AppError> {
    if vehicle.status != VehicleStatus::Available {
        return Err(AppError::bad_request(format!(
            "vehicle {} is {} and cannot be assigned",
            vehicle.license_plate,
            vehicle.status.label()
        )));
    }

    if driver.status != DriverStatus::OnDuty {
        return Err(AppError::bad_request(format!(
            "driver {} is {}; only On Duty drivers can be assigned",
            driver.name,
            driver.status.label()
        )));
    }

    if driver.license_expired(today()) {
        return Err(AppError::bad_request(format!(
            "driver {} has a license that expired on {}",
            driver.name, driver.license_expiry
        )));
    }

    check_capacity(vehicle, cargo_weight_kg)
}

fn check_capacity(vehicle: &Vehicle, cargo_weight_kg: f64) -> Result<(), AppError> {
    if cargo_weight_kg > vehicle.capacity_kg {
        return Err(AppError::bad_request(format!(
            "cargo weight {cargo_weight_kg} kg exceeds vehicle capacity ({} kg)",
            vehicle.capacity_kg
        )));
    }
    Ok(())
}

fn trip_vehicle(state: &AppState, trip: &Trip) -> Result<Vehicle, AppError> {
    state.vehicle(trip.vehicle_id).map_err(|_| {
        AppError::Internal(format!(
            "trip {} references missing vehicle {}",
            trip.id, trip.vehicle_id
        ))
    })
}

fn trip_driver(state: &AppState, trip: &Trip) -> Result<Driver, AppError> {
    state.driver(trip.driver_id).map_err(|_| {
        AppError::Internal(format!(
            "trip {} references missing driver {}",
            trip.id, trip.driver_id
        ))
    })
}

/// Status of a vehicle whose trip just ended. Open maintenance keeps it In Shop.
fn released_status(state: &AppState, vehicle: &Vehicle) -> VehicleStatus {
    if state.open_maintenance_count(vehicle.id, None) > 0 {
        VehicleStatus::InShop
    } else {
        VehicleStatus::Available
    }
}

fn create_locked(state: &AppState, input: NewTrip) -> Result<Trip, AppError> {
    let origin = require_text("origin", &input.origin)?;
    let destination = require_text("destination", &input.destination)?;
    let cargo_weight_kg = require_positive("cargo_weight_kg", input.cargo_weight_kg)?;
    let estimated_fuel_cost = match input.estimated_fuel_cost {
        Some(cost) => require_non_negative("estimated_fuel_cost", cost)?,
        None => 0.0,
    };

    let vehicle = state.referenced_vehicle(input.vehicle_id)?;
    let driver = state.referenced_driver(input.driver_id)?;
    check_assignment(&vehicle, &driver, cargo_weight_kg)?;

    let now = Utc::now();
    let trip = Trip {
        id: Uuid::new_v4(),
        vehicle_id: vehicle.id,
        driver_id: driver.id,
        cargo_weight_kg,
        origin,
        destination,
        estimated_fuel_cost,
        final_odometer: None,
        status: TripStatus::Draft,
        dispatched_at: None,
        completed_at: None,
        cancelled_at: None,
        created_at: now,
        updated_at: now,
    };

    state.trips.insert(trip.id, trip.clone());
    info!(
        trip_id = %trip.id,
        vehicle_id = %trip.vehicle_id,
        driver_id = %trip.driver_id,
        "trip drafted"
    );

    Ok(trip)
}

fn update_locked(state: &AppState, id: Uuid, changes: TripChanges) -> Result<Trip, AppError> {
    let mut trip = state.trip(id)?;
    if trip.status != TripStatus::Draft {
        return Err(AppError::bad_request(format!(
            "trip {id} is {}; only Draft trips can be edited",
            trip.status.label()
        )));
    }

    if let Some(origin) = changes.origin {
        trip.origin = require_text("origin", &origin)?;
    }
    if let Some(destination) = changes.destination {
        trip.destination = require_text("destination", &destination)?;
    }
    if let Some(cost) = changes.estimated_fuel_cost {
        trip.estimated_fuel_cost = require_non_negative("estimated_fuel_cost", cost)?;
    }
    if let Some(cargo) = changes.cargo_weight_kg {
        let cargo = require_positive("cargo_weight_kg", cargo)?;
        check_capacity(&trip_vehicle(state, &trip)?, cargo)?;
        trip.cargo_weight_kg = cargo;
    }

    trip.updated_at = Utc::now();
    state.trips.insert(trip.id, trip.clone());

    Ok(trip)
}

fn dispatch_locked(state: &AppState, id: Uuid) -> Result<Trip, AppError> {
    let mut trip = state.trip(id)?;
    if trip.status != TripStatus::Draft {
        return Err(AppError::bad_request(format!(
            "trip {id} is {}; only Draft trips can be dispatched",
            trip.status.label()
        )));
    }

    // The draft was validated at creation, but the fleet may have moved since.
    let mut vehicle = trip_vehicle(state, &trip)?;
    let mut driver = trip_driver(state, &trip)?;
    check_assignment(&vehicle, &driver, trip.cargo_weight_kg)?;
    if state.driver_on_dispatched_trip(driver.id, Some(trip.id)) {
        return Err(AppError::bad_request(format!(
            "driver {} is already on a dispatched trip",
            driver.name
        )));
    }

    let now = Utc::now();
    trip.status = TripStatus::Dispatched;
    trip.dispatched_at = Some(now);
    trip.updated_at = now;

    vehicle.status = VehicleStatus::OnTrip;
    vehicle.updated_at = now;

    driver.trip_count = driver.trip_count.saturating_add(1);
    driver.updated_at = now;

    state.vehicles.insert(vehicle.id, vehicle);
    state.drivers.insert(driver.id, driver);
    state.trips.insert(trip.id, trip.clone());

    info!(
        trip_id = %trip.id,
        vehicle_id = %trip.vehicle_id,
        driver_id = %trip.driver_id,
        "trip dispatched"
    );

    Ok(trip)
}

fn complete_locked(
    state: &AppState,
    id: Uuid,
    final_odometer: Option<f64>,
) -> Result<Trip, AppError> {
    let mut trip = state.trip(id)?;
    if trip.status != TripStatus::Dispatched {
        return Err(AppError::bad_request(format!(
            "trip {id} is {}; only Dispatched trips can be completed",
            trip.status.label()
        )));
    }

    let mut vehicle = trip_vehicle(state, &trip)?;
    let mut driver = trip_driver(state, &trip)?;

    if let Some(reading) = final_odometer {
        require_non_negative("final_odometer", reading)?;
        if reading < vehicle.odometer {
            return Err(AppError::bad_request(format!(
                "final odometer {reading} is below the vehicle's current reading {}",
                vehicle.odometer
            )));
        }
    }

    let now = Utc::now();
    trip.status = TripStatus::Completed;
    trip.final_odometer = final_odometer;
    trip.completed_at = Some(now);
    trip.updated_at = now;

    vehicle.status = released_status(state, &vehicle);
    if let Some(reading) = final_odometer {
        vehicle.odometer = reading;
    }
    vehicle.updated_at = now;

    driver.completed_trips = driver.completed_trips.saturating_add(1);
    driver.updated_at = now;

    state.vehicles.insert(vehicle.id, vehicle);
    state.drivers.insert(driver.id, driver);
    state.trips.insert(trip.id, trip.clone());

    info!(
        trip_id = %trip.id,
        vehicle_id = %trip.vehicle_id,
        driver_id = %trip.driver_id,
        "trip completed"
    );

    Ok(trip)
}

fn cancel_locked(state: &AppState, id: Uuid) -> Result<Trip, AppError> {
    let mut trip = state.trip(id)?;
    if !trip.status.is_active() {
        return Err(AppError::bad_request(format!(
            "trip {id} is already {}",
            trip.status.label()
        )));
    }

    let released_vehicle = if trip.status == TripStatus::Dispatched {
        let mut vehicle = trip_vehicle(state, &trip)?;
        (vehicle.status == VehicleStatus::OnTrip).then(|| {
            vehicle.status = released_status(state, &vehicle);
            vehicle.updated_at = Utc::now();
            vehicle
        })
    } else {
        None
    };

    let now = Utc::now();
    trip.status = TripStatus::Cancelled;
    trip.cancelled_at = Some(now);
    trip.updated_at = now;

    if let Some(vehicle) = released_vehicle {
        state.vehicles.insert(vehicle.id, vehicle);
    }
    state.trips.insert(trip.id, trip.clone());

    info!(trip_id = %trip.id, vehicle_id = %trip.vehicle_id, "trip cancelled");

    Ok(trip)
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{cancel_trip, complete_trip, create_trip, dispatch_trip, update_trip, NewTrip, TripChanges};
    use crate::engine::maintenance::{open_log, NewMaintenanceLog};
    use crate::engine::testutil;
    use crate::error::AppError;
    use crate::models::driver::DriverStatus;
    use crate::models::trip::TripStatus;
    use crate::models::vehicle::VehicleStatus;
    use crate::state::AppState;

    fn new_trip(vehicle_id: Uuid, driver_id: Uuid, cargo: f64) -> NewTrip {
        NewTrip {
            vehicle_id,
            driver_id,
            cargo_weight_kg: cargo,
            origin: "Rotterdam".to_string(),
            destination: "Antwerp".to_string(),
            estimated_fuel_cost: None,
        }
    }

    async fn dispatched(state: &AppState) -> (Uuid, Uuid, Uuid) {
        let vehicle = testutil::vehicle(state, 500.0);
        let driver = testutil::driver(state, DriverStatus::OnDuty, 30);
        let trip = create_trip(state, new_trip(vehicle.id, driver.id, 450.0))
            .await
            .unwrap();
        dispatch_trip(state, trip.id).await.unwrap();
        (trip.id, vehicle.id, driver.id)
    }

    #[tokio::test]
    async fn cargo_over_capacity_is_rejected() {
        let state = testutil::state();
        let vehicle = testutil::vehicle(&state, 500.0);
        let driver = testutil::driver(&state, DriverStatus::OnDuty, 30);

        let result = create_trip(&state, new_trip(vehicle.id, driver.id, 500.5)).await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert!(state.trips.is_empty());
    }

    #[tokio::test]
    async fn cargo_equal_to_capacity_is_accepted() {
        let state = testutil::state();
        let vehicle = testutil::vehicle(&state, 500.0);
        let driver = testutil::driver(&state, DriverStatus::OnDuty, 30);

        let trip = create_trip(&state, new_trip(vehicle.id, driver.id, 500.0))
            .await
            .unwrap();

        assert_eq!(trip.status, TripStatus::Draft);
    }

    #[tokio::test]
    async fn expired_license_is_rejected() {
        let state = testutil::state();
        let vehicle = testutil::vehicle(&state, 500.0);
        let driver = testutil::driver(&state, DriverStatus::OnDuty, -1);

        let result = create_trip(&state, new_trip(vehicle.id, driver.id, 100.0)).await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert!(state.trips.is_empty());
    }

    #[tokio::test]
    async fn license_expiring_today_is_still_valid() {
        let state = testutil::state();
        let vehicle = testutil::vehicle(&state, 500.0);
        let driver = testutil::driver(&state, DriverStatus::OnDuty, 0);

        assert!(create_trip(&state, new_trip(vehicle.id, driver.id, 100.0)).await.is_ok());
    }

    #[tokio::test]
    async fn off_duty_driver_is_rejected() {
        let state = testutil::state();
        let vehicle = testutil::vehicle(&state, 500.0);
        let driver = testutil::driver(&state, DriverStatus::OffDuty, 30);

        let result = create_trip(&state, new_trip(vehicle.id, driver.id, 100.0)).await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn unknown_vehicle_is_a_bad_request() {
        let state = testutil::state();
        let driver = testutil::driver(&state, DriverStatus::OnDuty, 30);

        let result = create_trip(&state, new_trip(Uuid::new_v4(), driver.id, 100.0)).await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn draft_leaves_vehicle_and_driver_untouched() {
        let state = testutil::state();
        let vehicle = testutil::vehicle(&state, 500.0);
        let driver = testutil::driver(&state, DriverStatus::OnDuty, 30);

        create_trip(&state, new_trip(vehicle.id, driver.id, 100.0))
            .await
            .unwrap();

        assert_eq!(state.vehicle(vehicle.id).unwrap().status, VehicleStatus::Available);
        assert_eq!(state.driver(driver.id).unwrap().trip_count, 0);
    }

    #[tokio::test]
    async fn dispatch_puts_vehicle_on_trip() {
        let state = testutil::state();
        let (trip_id, vehicle_id, driver_id) = dispatched(&state).await;

        assert_eq!(state.trip(trip_id).unwrap().status, TripStatus::Dispatched);
        assert_eq!(state.vehicle(vehicle_id).unwrap().status, VehicleStatus::OnTrip);
        assert_eq!(state.driver(driver_id).unwrap().trip_count, 1);
    }

    #[tokio::test]
    async fn dispatching_twice_fails_without_side_effects() {
        let state = testutil::state();
        let (trip_id, vehicle_id, driver_id) = dispatched(&state).await;
        let trip_before = state.trip(trip_id).unwrap();

        let result = dispatch_trip(&state, trip_id).await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
        let trip_after = state.trip(trip_id).unwrap();
        assert_eq!(trip_after.status, TripStatus::Dispatched);
        assert_eq!(trip_after.updated_at, trip_before.updated_at);
        assert_eq!(state.vehicle(vehicle_id).unwrap().status, VehicleStatus::OnTrip);
        assert_eq!(state.driver(driver_id).unwrap().trip_count, 1);
    }

    #[tokio::test]
    async fn dispatching_completed_trip_fails() {
        let state = testutil::state();
        let (trip_id, vehicle_id, driver_id) = dispatched(&state).await;
        complete_trip(&state, trip_id, None).await.unwrap();

        match dispatch_trip(&state, trip_id).await {
            Err(AppError::BadRequest(msg)) => assert!(msg.contains("is Completed"), "{msg}"),
            other => panic!("expected bad request, got {other:?}"),
        }
        assert_eq!(state.trip(trip_id).unwrap().status, TripStatus::Completed);
        assert_eq!(state.vehicle(vehicle_id).unwrap().status, VehicleStatus::Available);
        assert_eq!(state.driver(driver_id).unwrap().trip_count, 1);
    }

    #[tokio::test]
    async fn completing_returns_vehicle_and_counts_exactly_once() {
        let state = testutil::state();
        let (trip_id, vehicle_id, driver_id) = dispatched(&state).await;

        let trip = complete_trip(&state, trip_id, Some(1_250.0)).await.unwrap();

        assert_eq!(trip.status, TripStatus::Completed);
        assert!(trip.completed_at.is_some());
        let vehicle = state.vehicle(vehicle_id).unwrap();
        assert_eq!(vehicle.status, VehicleStatus::Available);
        assert_eq!(vehicle.odometer, 1_250.0);
        assert_eq!(state.driver(driver_id).unwrap().completed_trips, 1);

        assert!(complete_trip(&state, trip_id, None).await.is_err());
        assert_eq!(state.driver(driver_id).unwrap().completed_trips, 1);
    }

    #[tokio::test]
    async fn completing_a_draft_fails() {
        let state = testutil::state();
        let vehicle = testutil::vehicle(&state, 500.0);
        let driver = testutil::driver(&state, DriverStatus::OnDuty, 30);
        let trip = create_trip(&state, new_trip(vehicle.id, driver.id, 100.0))
            .await
            .unwrap();

        assert!(complete_trip(&state, trip.id, None).await.is_err());
        assert_eq!(state.driver(driver.id).unwrap().completed_trips, 0);
    }

    #[tokio::test]
    async fn odometer_cannot_run_backwards() {
        let state = testutil::state();
        let (trip_id, vehicle_id, _) = dispatched(&state).await;

        let result = complete_trip(&state, trip_id, Some(10.0)).await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert_eq!(state.trip(trip_id).unwrap().status, TripStatus::Dispatched);
        assert_eq!(state.vehicle(vehicle_id).unwrap().status, VehicleStatus::OnTrip);
    }

    #[tokio::test]
    async fn dispatch_rechecks_vehicle_availability() {
        let state = testutil::state();
        let vehicle = testutil::vehicle(&state, 500.0);
        let driver = testutil::driver(&state, DriverStatus::OnDuty, 30);
        let trip = create_trip(&state, new_trip(vehicle.id, driver.id, 100.0))
            .await
            .unwrap();

        open_log(
            &state,
            NewMaintenanceLog {
                vehicle_id: vehicle.id,
                service_type: "Brake pads".to_string(),
                cost: 220.0,
                log_date: None,
                notes: None,
            },
        )
        .await
        .unwrap();

        assert!(dispatch_trip(&state, trip.id).await.is_err());
        assert_eq!(state.trip(trip.id).unwrap().status, TripStatus::Draft);
        assert_eq!(state.vehicle(vehicle.id).unwrap().status, VehicleStatus::InShop);
    }

    #[tokio::test]
    async fn one_vehicle_cannot_run_two_trips() {
        let state = testutil::state();
        let vehicle = testutil::vehicle(&state, 500.0);
        let first_driver = testutil::driver(&state, DriverStatus::OnDuty, 30);
        let second_driver = testutil::driver(&state, DriverStatus::OnDuty, 30);
        let first = create_trip(&state, new_trip(vehicle.id, first_driver.id, 100.0))
            .await
            .unwrap();
        let second = create_trip(&state, new_trip(vehicle.id, second_driver.id, 100.0))
            .await
            .unwrap();

        dispatch_trip(&state, first.id).await.unwrap();

        assert!(dispatch_trip(&state, second.id).await.is_err());
        assert_eq!(state.driver(second_driver.id).unwrap().trip_count, 0);
    }

    #[tokio::test]
    async fn one_driver_cannot_drive_two_trips() {
        let state = testutil::state();
        let first_vehicle = testutil::vehicle(&state, 500.0);
        let second_vehicle = testutil::vehicle(&state, 500.0);
        let driver = testutil::driver(&state, DriverStatus::OnDuty, 30);
        let first = create_trip(&state, new_trip(first_vehicle.id, driver.id, 100.0))
            .await
            .unwrap();
        let second = create_trip(&state, new_trip(second_vehicle.id, driver.id, 100.0))
            .await
            .unwrap();

        dispatch_trip(&state, first.id).await.unwrap();

        assert!(dispatch_trip(&state, second.id).await.is_err());
        assert_eq!(
            state.vehicle(second_vehicle.id).unwrap().status,
            VehicleStatus::Available
        );
    }

    #[tokio::test]
    async fn cancelling_dispatched_trip_releases_vehicle() {
        let state = testutil::state();
        let (trip_id, vehicle_id, driver_id) = dispatched(&state).await;

        let trip = cancel_trip(&state, trip_id).await.unwrap();

        assert_eq!(trip.status, TripStatus::Cancelled);
        assert_eq!(state.vehicle(vehicle_id).unwrap().status, VehicleStatus::Available);
        assert!(!state.driver_on_dispatched_trip(driver_id, None));
        assert!(cancel_trip(&state, trip_id).await.is_err());
    }

    #[tokio::test]
    async fn draft_edits_are_checked_against_capacity() {
        let state = testutil::state();
        let vehicle = testutil::vehicle(&state, 500.0);
        let driver = testutil::driver(&state, DriverStatus::OnDuty, 30);
        let trip = create_trip(&state, new_trip(vehicle.id, driver.id, 100.0))
            .await
            .unwrap();

        let too_heavy = TripChanges {
            cargo_weight_kg: Some(900.0),
            ..TripChanges::default()
        };
        assert!(update_trip(&state, trip.id, too_heavy).await.is_err());

        let reroute = TripChanges {
            destination: Some("  Ghent ".to_string()),
            ..TripChanges::default()
        };
        let updated = update_trip(&state, trip.id, reroute).await.unwrap();
        assert_eq!(updated.destination, "Ghent");
        assert_eq!(updated.cargo_weight_kg, 100.0);
    }

    #[test]
    fn client_estimated_cost_field_is_accepted() {
        let trip: NewTrip = serde_json::from_value(serde_json::json!({
            "vehicle_id": Uuid::new_v4(),
            "driver_id": Uuid::new_v4(),
            "cargo_weight_kg": 10,
            "origin": "Rotterdam",
            "destination": "Antwerp",
            "estimated_cost": 250
        }))
        .unwrap();
        assert_eq!(trip.estimated_fuel_cost, Some(250.0));

        let changes: TripChanges =
            serde_json::from_value(serde_json::json!({ "estimated_cost": 75.5 })).unwrap();
        assert_eq!(changes.estimated_fuel_cost, Some(75.5));
    }

    #[tokio::test]
    async fn transitions_are_counted() {
        let state = testutil::state();
        let _ = dispatched(&state).await;
        let _ = dispatch_trip(&state, Uuid::new_v4()).await;

        let body = state.metrics.encode().unwrap();
        assert!(body.contains("transition=\"trip_dispatch\""));
        assert!(body.contains("outcome=\"rejected\""));
    }
}
