use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::models::driver::{Driver, DriverStatus};
use crate::models::expense::{Expense, FuelLog};
use crate::models::maintenance::MaintenanceLog;
use crate::models::trip::{Trip, TripStatus};
use crate::models::vehicle::{Vehicle, VehicleStatus};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardKpis {
    pub active_fleet: usize,
    pub maintenance_alerts: usize,
    pub utilization_rate: u32,
    pub pending_cargo: usize,
    pub total_vehicles: usize,
    pub total_drivers: usize,
    pub on_duty_drivers: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FuelTrendPoint {
    pub date: NaiveDate,
    pub liters: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VehicleCost {
    pub vehicle_id: Uuid,
    pub name: String,
    pub license_plate: String,
    pub fuel_cost: f64,
    pub maintenance_cost: f64,
    pub other_expenses: f64,
    pub total_operational: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VehicleFuel {
    pub vehicle_id: Uuid,
    pub name: String,
    pub liters: f64,
    pub fuel_cost: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reports {
    pub top_cost_vehicles: Vec<VehicleCost>,
    pub fuel_by_vehicle: Vec<VehicleFuel>,
}

pub fn dashboard(vehicles: &[Vehicle], drivers: &[Driver], trips: &[Trip]) -> DashboardKpis {
    let count = |status: VehicleStatus| vehicles.iter().filter(|v| v.status == status).count();

    let active_fleet = count(VehicleStatus::OnTrip);
    let in_service = vehicles.len() - count(VehicleStatus::Retired);
    let utilization_rate = if in_service == 0 {
        0
    } else {
        (active_fleet as f64 / in_service as f64 * 100.0).round() as u32
    };

    DashboardKpis {
        active_fleet,
        maintenance_alerts: count(VehicleStatus::InShop),
        utilization_rate,
        pending_cargo: trips
            .iter()
            .filter(|trip| trip.status == TripStatus::Draft)
            .count(),
        total_vehicles: vehicles.len(),
        total_drivers: drivers.len(),
        on_duty_drivers: drivers
            .iter()
            .filter(|driver| driver.status == DriverStatus::OnDuty)
            .count(),
    }
}

/// Daily fuel totals in ascending date order.
pub fn fuel_trend(logs: &[FuelLog]) -> Vec<FuelTrendPoint> {
    let mut by_day: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();
    for log in logs {
        let day = by_day.entry(log.log_date).or_insert((0.0, 0.0));
        day.0 += log.liters;
        day.1 += log.fuel_cost;
    }

    by_day
        .into_iter()
        .map(|(date, (liters, cost))| FuelTrendPoint { date, liters, cost })
        .collect()
}

pub fn reports(
    vehicles: &[Vehicle],
    trips: &[Trip],
    fuel_logs: &[FuelLog],
    maintenance: &[MaintenanceLog],
    expenses: &[Expense],
) -> Reports {
    let trip_vehicle: HashMap<Uuid, Uuid> = trips
        .iter()
        .map(|trip| (trip.id, trip.vehicle_id))
        .collect();

    let mut fuel: HashMap<Uuid, (f64, f64)> = HashMap::new();
    for log in fuel_logs {
        let entry = fuel.entry(log.vehicle_id).or_insert((0.0, 0.0));
        entry.0 += log.liters;
        entry.1 += log.fuel_cost;
    }

    let mut service: HashMap<Uuid, f64> = HashMap::new();
    for log in maintenance {
        *service.entry(log.vehicle_id).or_insert(0.0) += log.cost;
    }

    let mut other: HashMap<Uuid, f64> = HashMap::new();
    for expense in expenses {
        let vehicle_id = expense
            .vehicle_id
            .or_else(|| expense.trip_id.and_then(|trip| trip_vehicle.get(&trip).copied()));
        if let Some(vehicle_id) = vehicle_id {
            *other.entry(vehicle_id).or_insert(0.0) += expense.amount;
        }
    }

    let mut top_cost_vehicles: Vec<VehicleCost> = vehicles
        .iter()
        .map(|vehicle| {
            let (_, fuel_cost) = fuel.get(&vehicle.id).copied().unwrap_or_default();
            let maintenance_cost = service.get(&vehicle.id).copied().unwrap_or_default();
            let other_expenses = other.get(&vehicle.id).copied().unwrap_or_default();
            VehicleCost {
                vehicle_id: vehicle.id,
                name: vehicle.name.clone(),
                license_plate: vehicle.license_plate.clone(),
                fuel_cost,
                maintenance_cost,
                other_expenses,
                total_operational: fuel_cost + maintenance_cost + other_expenses,
            }
        })
        .collect();
    top_cost_vehicles.sort_by(|a, b| descending(a.total_operational, b.total_operational));

    let mut fuel_by_vehicle: Vec<VehicleFuel> = vehicles
        .iter()
        .filter_map(|vehicle| {
            fuel.get(&vehicle.id).map(|&(liters, fuel_cost)| VehicleFuel {
                vehicle_id: vehicle.id,
                name: vehicle.name.clone(),
                liters,
                fuel_cost,
            })
        })
        .collect();
    fuel_by_vehicle.sort_by(|a, b| descending(a.liters, b.liters));

    Reports {
        top_cost_vehicles,
        fuel_by_vehicle,
    }
}

fn descending(a: f64, b: f64) -> Ordering {
    b.total_cmp(&a)
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    use super::{dashboard, fuel_trend, reports};
    use crate::models::expense::{Expense, FuelLog};
    use crate::models::maintenance::{MaintenanceLog, MaintenanceStatus};
    use crate::models::vehicle::{Vehicle, VehicleStatus, VehicleType};

    fn vehicle(name: &str, status: VehicleStatus) -> Vehicle {
        let now = Utc::now();
        Vehicle {
            id: Uuid::new_v4(),
            name: name.to_string(),
            model: "Actros".to_string(),
            license_plate: format!("PL-{name}"),
            vehicle_type: VehicleType::Truck,
            capacity_kg: 12_000.0,
            odometer: 0.0,
            status,
            created_at: now,
            updated_at: now,
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    fn fuel(vehicle_id: Uuid, day: u32, liters: f64, cost: f64) -> FuelLog {
        FuelLog {
            id: Uuid::new_v4(),
            vehicle_id,
            trip_id: None,
            liters,
            fuel_cost: cost,
            log_date: date(day),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn utilization_ignores_retired_vehicles() {
        let vehicles = vec![
            vehicle("a", VehicleStatus::OnTrip),
            vehicle("b", VehicleStatus::Available),
            vehicle("c", VehicleStatus::InShop),
            vehicle("d", VehicleStatus::Retired),
        ];

        let kpis = dashboard(&vehicles, &[], &[]);

        assert_eq!(kpis.active_fleet, 1);
        assert_eq!(kpis.maintenance_alerts, 1);
        assert_eq!(kpis.utilization_rate, 33);
        assert_eq!(kpis.total_vehicles, 4);
    }

    #[test]
    fn empty_fleet_has_zero_utilization() {
        let kpis = dashboard(&[], &[], &[]);
        assert_eq!(kpis.utilization_rate, 0);
        assert_eq!(kpis.pending_cargo, 0);
    }

    #[test]
    fn fuel_trend_groups_by_day_in_order() {
        let id = Uuid::new_v4();
        let logs = vec![
            fuel(id, 5, 40.0, 70.0),
            fuel(id, 2, 10.0, 18.0),
            fuel(id, 5, 20.0, 35.0),
        ];

        let trend = fuel_trend(&logs);

        assert_eq!(trend.len(), 2);
        assert_eq!(trend[0].date, date(2));
        assert_eq!(trend[1].liters, 60.0);
        assert_eq!(trend[1].cost, 105.0);
    }

    #[test]
    fn reports_rank_vehicles_by_total_cost() {
        let cheap = vehicle("cheap", VehicleStatus::Available);
        let pricey = vehicle("pricey", VehicleStatus::Available);
        let now = Utc::now();

        let fuel_logs = vec![fuel(cheap.id, 1, 50.0, 90.0), fuel(pricey.id, 1, 20.0, 40.0)];
        let maintenance = vec![MaintenanceLog {
            id: Uuid::new_v4(),
            vehicle_id: pricey.id,
            service_type: "Gearbox".to_string(),
            cost: 1_500.0,
            log_date: date(3),
            notes: None,
            status: MaintenanceStatus::Completed,
            completed_at: Some(now),
            created_at: now,
            updated_at: now,
        }];
        let expenses = vec![Expense {
            id: Uuid::new_v4(),
            trip_id: None,
            vehicle_id: Some(cheap.id),
            amount: 25.0,
            category: Some("Tolls".to_string()),
            description: None,
            expense_date: date(4),
            created_at: now,
        }];

        let report = reports(
            &[cheap.clone(), pricey.clone()],
            &[],
            &fuel_logs,
            &maintenance,
            &expenses,
        );

        assert_eq!(report.top_cost_vehicles[0].vehicle_id, pricey.id);
        assert_eq!(report.top_cost_vehicles[0].total_operational, 1_540.0);
        assert_eq!(report.top_cost_vehicles[1].total_operational, 115.0);
        assert_eq!(report.fuel_by_vehicle[0].vehicle_id, cheap.id);
    }
}
