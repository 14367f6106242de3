use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::auth::jwt::JwtKeys;
use crate::error::AppError;
use crate::models::driver::{Driver, DriverStatus};
use crate::models::expense::{Expense, FuelLog};
use crate::models::maintenance::{MaintenanceLog, MaintenanceStatus};
use crate::models::trip::{Trip, TripStatus, TripView};
use crate::models::user::User;
use crate::models::vehicle::{Vehicle, VehicleStatus};
use crate::observability::metrics::Metrics;

pub struct AppState {
    /// Keyed by normalized email so registration is a single atomic insert.
    pub users: DashMap<String, User>,
    pub vehicles: DashMap<Uuid, Vehicle>,
    pub drivers: DashMap<Uuid, Driver>,
    pub trips: DashMap<Uuid, Trip>,
    pub maintenance: DashMap<Uuid, MaintenanceLog>,
    pub fuel_logs: DashMap<Uuid, FuelLog>,
    pub expenses: DashMap<Uuid, Expense>,
    /// Held for the whole validate-then-write sequence of every mutation that
    /// touches statuses, cross-record references or uniqueness.
    pub fleet_lock: Mutex<()>,
    pub jwt: JwtKeys,
    pub bcrypt_cost: u32,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(jwt: JwtKeys, bcrypt_cost: u32) -> Self {
        Self {
            users: DashMap::new(),
            vehicles: DashMap::new(),
            drivers: DashMap::new(),
            trips: DashMap::new(),
            maintenance: DashMap::new(),
            fuel_logs: DashMap::new(),
            expenses: DashMap::new(),
            fleet_lock: Mutex::new(()),
            jwt,
            bcrypt_cost,
            metrics: Metrics::new(),
        }
    }

    pub fn vehicle(&self, id: Uuid) -> Result<Vehicle, AppError> {
        self.vehicles
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::not_found("vehicle", id))
    }

    pub fn driver(&self, id: Uuid) -> Result<Driver, AppError> {
        self.drivers
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::not_found("driver", id))
    }

    pub fn trip(&self, id: Uuid) -> Result<Trip, AppError> {
        self.trips
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::not_found("trip", id))
    }

    pub fn maintenance_log(&self, id: Uuid) -> Result<MaintenanceLog, AppError> {
        self.maintenance
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::not_found("maintenance log", id))
    }

    /// Looks up a record referenced from a request body. A dangling reference
    /// is a validation failure, not a missing resource.
    pub fn referenced_vehicle(&self, id: Uuid) -> Result<Vehicle, AppError> {
        self.vehicle(id)
            .map_err(|_| AppError::bad_request(format!("vehicle {id} does not exist")))
    }

    pub fn referenced_driver(&self, id: Uuid) -> Result<Driver, AppError> {
        self.driver(id)
            .map_err(|_| AppError::bad_request(format!("driver {id} does not exist")))
    }

    pub fn referenced_trip(&self, id: Uuid) -> Result<Trip, AppError> {
        self.trip(id)
            .map_err(|_| AppError::bad_request(format!("trip {id} does not exist")))
    }

    pub fn vehicle_name(&self, id: Uuid) -> Option<String> {
        self.vehicles.get(&id).map(|entry| entry.name.clone())
    }

    pub fn driver_name(&self, id: Uuid) -> Option<String> {
        self.drivers.get(&id).map(|entry| entry.name.clone())
    }

    pub fn trip_view(&self, trip: Trip) -> TripView {
        TripView {
            vehicle_name: self.vehicle_name(trip.vehicle_id),
            driver_name: self.driver_name(trip.driver_id),
            trip,
        }
    }

    pub fn vehicle_has_active_trip(&self, vehicle_id: Uuid) -> bool {
        self.trips
            .iter()
            .any(|entry| entry.vehicle_id == vehicle_id && entry.status.is_active())
    }

    pub fn driver_has_active_trip(&self, driver_id: Uuid) -> bool {
        self.trips
            .iter()
            .any(|entry| entry.driver_id == driver_id && entry.status.is_active())
    }

    pub fn vehicle_on_dispatched_trip(&self, vehicle_id: Uuid) -> bool {
        self.trips.iter().any(|entry| {
            entry.vehicle_id == vehicle_id && entry.status == TripStatus::Dispatched
        })
    }

    pub fn driver_on_dispatched_trip(&self, driver_id: Uuid, except: Option<Uuid>) -> bool {
        self.trips.iter().any(|entry| {
            entry.driver_id == driver_id
                && entry.status == TripStatus::Dispatched
                && Some(entry.id) != except
        })
    }

    pub fn open_maintenance_count(&self, vehicle_id: Uuid, except: Option<Uuid>) -> usize {
        self.maintenance
            .iter()
            .filter(|entry| {
                entry.vehicle_id == vehicle_id
                    && entry.status == MaintenanceStatus::Open
                    && Some(entry.id) != except
            })
            .count()
    }

    /// On Duty, license valid today and not already driving.
    pub fn driver_is_assignable(&self, driver: &Driver, today: NaiveDate) -> bool {
        driver.status == DriverStatus::OnDuty
            && !driver.license_expired(today)
            && !self.driver_on_dispatched_trip(driver.id, None)
    }

    pub fn refresh_gauges(&self) {
        for status in VehicleStatus::ALL {
            let count = self
                .vehicles
                .iter()
                .filter(|entry| entry.status == status)
                .count();
            self.metrics
                .vehicles_by_status
                .with_label_values(&[status.label()])
                .set(count as i64);
        }

        for status in DriverStatus::ALL {
            let count = self
                .drivers
                .iter()
                .filter(|entry| entry.status == status)
                .count();
            self.metrics
                .drivers_by_status
                .with_label_values(&[status.label()])
                .set(count as i64);
        }
    }
}
