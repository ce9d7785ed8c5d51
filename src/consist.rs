use crate::car::{CarStatus, SubsystemSlot, TrainCar};
use crate::error::SimError;
use crate::fault::FaultLog;
use crate::interfaces::PowerGrid;
use crate::notice::NoticeChannel;
use crate::physics::KMH_PER_MS;
use crate::subsystems::{FaultType, SubsystemId, SubsystemStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

pub const BASE_MAX_SPEED: f32 = 80.0;
/// Per-car nominal load used for the overload penalty.
pub const NOMINAL_CAR_CAPACITY: u32 = 100;
const OVERLOAD_RATIO: f32 = 1.5;
const OVERLOAD_SPEED_FACTOR: f32 = 0.9;

const CAR_ERROR_SPEED_FACTOR: f32 = 0.5;
const CAR_WARNING_SPEED_FACTOR: f32 = 0.75;
const TRACTION_ERROR_SPEED_FACTOR: f32 = 0.8;
const BRAKE_ERROR_SPEED_FACTOR: f32 = 0.7;

// Power budget policy. These multipliers are kept for compatibility with
// existing calibrations; they are not derived from a traction model.
const POWER_UNITS_PER_LEVEL: f32 = 2.0;
const CARS_PER_POWER_GROUP: usize = 2;

pub const DEFAULT_MAX_POWER: f32 = 1000.0;
pub const DEFAULT_LOW_POWER_RATIO: f32 = 0.2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistConfig {
    pub max_power: f32,
    pub initial_power: f32,
    pub low_power_ratio: f32,
    pub capacity_factor: f32,
    pub atp_enabled: bool,
    pub ato_enabled: bool,
}

impl Default for ConsistConfig {
    fn default() -> Self {
        Self {
            max_power: DEFAULT_MAX_POWER,
            initial_power: DEFAULT_MAX_POWER,
            low_power_ratio: DEFAULT_LOW_POWER_RATIO,
            capacity_factor: crate::car::DEFAULT_CAPACITY_FACTOR,
            atp_enabled: true,
            ato_enabled: false,
        }
    }
}

/// Outcome of one consist-level power request.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PowerAllocation {
    pub requested_level: f32,
    pub applied_level: f32,
    pub required_power: f32,
    pub available_power: f32,
    pub drawn_external: f32,
    pub drawn_internal: f32,
    pub throttled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConsist {
    id: String,
    line_id: String,
    destination: String,
    next_station: String,
    cars: Vec<TrainCar>,
    max_speed: f32,
    atp_enabled: bool,
    ato_enabled: bool,
    total_passengers: u32,
    power_level: f32,
    max_power: f32,
    low_power_ratio: f32,
    capacity_factor: f32,
    using_external_power: bool,
    external_power_level: f32,
    position_m: f64,
    emergency_braking: bool,
    low_power_warned: bool,
    audit_tick: u64,
    reported_status: BTreeMap<String, CarStatus>,
    fault_log: FaultLog,
}

impl TrainConsist {
    pub fn new(id: impl Into<String>, line_id: impl Into<String>) -> Self {
        Self::with_config(id, line_id, &ConsistConfig::default())
    }

    pub fn with_config(
        id: impl Into<String>,
        line_id: impl Into<String>,
        config: &ConsistConfig,
    ) -> Self {
        let max_power = config.max_power.max(0.0);
        Self {
            id: id.into(),
            line_id: line_id.into(),
            destination: String::new(),
            next_station: String::new(),
            cars: Vec::new(),
            max_speed: BASE_MAX_SPEED,
            atp_enabled: config.atp_enabled,
            ato_enabled: config.ato_enabled,
            total_passengers: 0,
            power_level: config.initial_power.clamp(0.0, max_power),
            max_power,
            low_power_ratio: config.low_power_ratio,
            capacity_factor: config.capacity_factor,
            using_external_power: false,
            external_power_level: 0.0,
            position_m: 0.0,
            emergency_braking: false,
            low_power_warned: false,
            audit_tick: 0,
            reported_status: BTreeMap::new(),
            fault_log: FaultLog::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn line_id(&self) -> &str {
        &self.line_id
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn set_destination(&mut self, destination: impl Into<String>) {
        self.destination = destination.into();
    }

    pub fn next_station(&self) -> &str {
        &self.next_station
    }

    pub fn set_next_station(&mut self, station: impl Into<String>) {
        self.next_station = station.into();
    }

    pub fn cars(&self) -> &[TrainCar] {
        &self.cars
    }

    pub fn car(&self, car_id: &str) -> Option<&TrainCar> {
        self.cars.iter().find(|c| c.id() == car_id)
    }

    /// Mutable access to one car. Call [`TrainConsist::update`] (or
    /// [`TrainConsist::set_passengers`]) afterwards so aggregates follow.
    pub fn car_mut(&mut self, car_id: &str) -> Option<&mut TrainCar> {
        self.cars.iter_mut().find(|c| c.id() == car_id)
    }

    pub fn car_count(&self) -> usize {
        self.cars.len()
    }

    pub fn max_speed(&self) -> f32 {
        self.max_speed
    }

    pub fn atp_enabled(&self) -> bool {
        self.atp_enabled
    }

    pub fn set_atp_enabled(&mut self, enabled: bool) {
        self.atp_enabled = enabled;
    }

    pub fn ato_enabled(&self) -> bool {
        self.ato_enabled
    }

    pub fn set_ato_enabled(&mut self, enabled: bool) {
        self.ato_enabled = enabled;
    }

    pub fn total_passengers(&self) -> u32 {
        self.total_passengers
    }

    pub fn power_level(&self) -> f32 {
        self.power_level
    }

    pub fn set_power_level(&mut self, level: f32) {
        self.power_level = level.clamp(0.0, self.max_power);
    }

    pub fn max_power(&self) -> f32 {
        self.max_power
    }

    pub fn using_external_power(&self) -> bool {
        self.using_external_power
    }

    pub fn external_power_level(&self) -> f32 {
        self.external_power_level
    }

    pub fn position_m(&self) -> f64 {
        self.position_m
    }

    pub fn set_position_m(&mut self, position_m: f64) {
        self.position_m = position_m;
    }

    pub fn is_emergency_braking(&self) -> bool {
        self.emergency_braking
    }

    pub fn fault_log(&self) -> &FaultLog {
        &self.fault_log
    }

    pub fn add_car(&mut self, mut car: TrainCar) -> Result<(), SimError> {
        if let Some(owner) = car.owner() {
            if owner != self.id {
                return Err(SimError::CarOwned {
                    car_id: car.id().to_owned(),
                    consist_id: owner.to_owned(),
                });
            }
        }
        if self.car(car.id()).is_some() {
            return Err(SimError::DuplicateCar(car.id().to_owned()));
        }

        car.set_owner(Some(self.id.clone()));
        car.set_capacity_factor(self.capacity_factor);
        debug!("Consist {} coupled car {} ({:?})", self.id, car.id(), car.class());
        self.cars.push(car);
        self.recompute_passengers();
        Ok(())
    }

    pub fn remove_car(&mut self, car_id: &str) -> Result<TrainCar, SimError> {
        let index = self
            .cars
            .iter()
            .position(|c| c.id() == car_id)
            .ok_or_else(|| SimError::UnknownCar(car_id.to_owned()))?;

        let mut car = self.cars.remove(index);
        car.set_owner(None);
        self.reported_status.remove(car_id);
        self.fault_log.resolve_car(car_id, self.audit_tick);
        self.recompute_passengers();
        debug!("Consist {} uncoupled car {}", self.id, car_id);
        Ok(car)
    }

    /// Dissolves the consist. The returned cars are ownerless.
    pub fn dispose(self) -> Vec<TrainCar> {
        info!("Consist {} disposed", self.id);
        self.cars
            .into_iter()
            .map(|mut car| {
                car.set_owner(None);
                car
            })
            .collect()
    }

    pub fn set_passengers(&mut self, car_id: &str, passengers: u32) -> Result<u32, SimError> {
        let accepted = self
            .car_mut(car_id)
            .ok_or_else(|| SimError::UnknownCar(car_id.to_owned()))?
            .set_passengers(passengers);
        self.recompute_passengers();
        Ok(accepted)
    }

    pub fn recompute_passengers(&mut self) {
        self.total_passengers = self.cars.iter().map(TrainCar::passengers).sum();
    }

    /// Power the consist could deliver right now.
    pub fn available_power(&self) -> f32 {
        let external = if self.using_external_power {
            self.external_power_level
        } else {
            0.0
        };
        self.power_level + external
    }

    /// Budget needed to run every traction car at `level`.
    pub fn required_power(&self, level: f32) -> f32 {
        let groups = (self.cars.len() / CARS_PER_POWER_GROUP).max(1) as f32;
        level * POWER_UNITS_PER_LEVEL * groups
    }

    /// Draws `level` from the budget and applies it to every traction car.
    /// A short budget throttles the level in proportion instead of failing.
    pub fn apply_power(&mut self, level: f32, notices: &mut NoticeChannel) -> PowerAllocation {
        let level = level.clamp(0.0, 100.0);
        let required = self.required_power(level);
        let available = self.available_power();
        let external_cap = if self.using_external_power {
            self.external_power_level
        } else {
            0.0
        };

        let mut allocation = PowerAllocation {
            requested_level: level,
            applied_level: level,
            required_power: required,
            available_power: available,
            ..PowerAllocation::default()
        };

        if available >= required {
            let from_external = required.min(external_cap);
            let from_internal = required - from_external;
            self.external_power_level -= from_external;
            self.power_level = (self.power_level - from_internal).max(0.0);
            allocation.drawn_external = from_external;
            allocation.drawn_internal = from_internal;
        } else {
            allocation.applied_level = if required > 0.0 {
                level * available / required
            } else {
                0.0
            };
            allocation.throttled = true;
            allocation.drawn_external = external_cap;
            allocation.drawn_internal = self.power_level;
            if self.using_external_power {
                self.external_power_level = 0.0;
            }
            self.power_level = 0.0;
            debug!(
                "Consist {} power throttled: level {:.1} -> {:.1} (required {:.1}, available {:.1})",
                self.id, level, allocation.applied_level, required, available
            );
        }

        for car in self.cars.iter_mut().filter(|c| c.class().is_driving_end()) {
            car.apply_power(allocation.applied_level);
        }

        self.check_low_power(notices);
        allocation
    }

    fn check_low_power(&mut self, notices: &mut NoticeChannel) {
        let threshold = self.max_power * self.low_power_ratio;
        let low = !self.using_external_power && self.power_level < threshold;

        if low && !self.low_power_warned {
            self.low_power_warned = true;
            warn!(
                "Consist {} internal power low: {:.0}/{:.0}",
                self.id, self.power_level, self.max_power
            );
            notices.warning(
                None,
                format!(
                    "Low power: internal reserve at {:.0}%",
                    self.power_level / self.max_power.max(f32::EPSILON) * 100.0
                ),
            );
        } else if !low && self.low_power_warned {
            self.low_power_warned = false;
        }
    }

    /// Applies a service brake level to every car through the normal gate.
    pub fn apply_brake(&mut self, level: f32) {
        for car in &mut self.cars {
            car.apply_brake(level);
        }
    }

    /// Queries the grid at the consist position and recharges from it.
    pub fn check_power_supply(&mut self, grid: &dyn PowerGrid) {
        let offer = grid.power_at(self.position_m) as f32;

        if offer > 0.0 {
            if !self.using_external_power {
                debug!("Consist {} on external power ({:.0})", self.id, offer);
            }
            self.using_external_power = true;
            self.external_power_level = offer;
            self.power_level = (self.power_level + offer / 2.0).min(self.max_power);
        } else {
            if self.using_external_power {
                debug!("Consist {} left electrified section", self.id);
            }
            self.using_external_power = false;
            self.external_power_level = 0.0;
        }
    }

    /// Brake level 100 on every car, whatever the car status.
    pub fn apply_emergency_brake(&mut self) {
        if !self.emergency_braking {
            warn!("Consist {} emergency brake applied", self.id);
        }
        self.emergency_braking = true;
        for car in &mut self.cars {
            car.force_brake(100.0);
        }
    }

    pub fn release_brakes(&mut self) {
        if self.emergency_braking {
            info!("Consist {} brakes released", self.id);
        }
        self.emergency_braking = false;
        for car in &mut self.cars {
            car.force_brake(0.0);
        }
    }

    /// Per-tick health update, aggregates, grid check and status audit.
    pub fn update(&mut self, dt_s: f32, grid: &dyn PowerGrid, notices: &mut NoticeChannel) {
        self.audit_tick += 1;

        for car in &mut self.cars {
            car.update(dt_s);
        }

        self.recompute_passengers();
        self.recompute_max_speed();
        self.check_power_supply(grid);
        self.audit_car_status(notices);
    }

    /// Mass-weighted speed of the coupled cars.
    pub fn speed_kmh(&self) -> f32 {
        let total_mass: f32 = self.cars.iter().map(TrainCar::mass_kg).sum();
        if total_mass <= 0.0 {
            return 0.0;
        }
        self.cars
            .iter()
            .map(|c| c.mass_kg() * c.speed_kmh())
            .sum::<f32>()
            / total_mass
    }

    fn synchronize_speed(&mut self) -> f32 {
        let speed = self.speed_kmh();
        for car in &mut self.cars {
            car.set_speed_kmh(speed);
        }
        speed
    }

    /// Couples car speeds, integrates resistance and braking over `dt_s` and
    /// moves the consist along the line.
    pub fn advance(&mut self, dt_s: f32) -> f32 {
        let start = self.synchronize_speed();
        for car in &mut self.cars {
            car.advance(dt_s);
        }
        let end = self.synchronize_speed();

        let distance_m = (start + end) * 0.5 / KMH_PER_MS * dt_s;
        self.position_m += f64::from(distance_m);
        distance_m
    }

    pub fn worst_car_status(&self) -> CarStatus {
        self.cars
            .iter()
            .map(TrainCar::status)
            .fold(CarStatus::Ok, CarStatus::worst)
    }

    pub fn min_car_health(&self) -> Option<f32> {
        self.cars.iter().map(TrainCar::health).reduce(f32::min)
    }

    pub fn average_health(&self) -> f32 {
        if self.cars.is_empty() {
            return 100.0;
        }
        self.cars.iter().map(TrainCar::health).sum::<f32>() / self.cars.len() as f32
    }

    fn any_subsystem_in_error(&self, slot_matches: impl Fn(SubsystemSlot) -> bool) -> bool {
        self.cars.iter().any(|car| {
            SubsystemSlot::ALL
                .iter()
                .filter(|slot| slot_matches(**slot))
                .any(|slot| car.subsystem_status(*slot) == Some(SubsystemStatus::Error))
        })
    }

    fn status_speed_factor(&self) -> f32 {
        // First matching condition wins; the factors never multiply together.
        if self.cars.iter().any(|c| c.status() == CarStatus::Error) {
            CAR_ERROR_SPEED_FACTOR
        } else if self.cars.iter().any(|c| c.status() == CarStatus::Warning) {
            CAR_WARNING_SPEED_FACTOR
        } else if self.any_subsystem_in_error(|slot| slot == SubsystemSlot::Traction) {
            TRACTION_ERROR_SPEED_FACTOR
        } else if self.any_subsystem_in_error(|slot| slot == SubsystemSlot::Brake) {
            BRAKE_ERROR_SPEED_FACTOR
        } else {
            1.0
        }
    }

    fn passenger_speed_factor(&self) -> f32 {
        let overload_limit =
            (NOMINAL_CAR_CAPACITY as usize * self.cars.len()) as f32 * OVERLOAD_RATIO;
        if self.total_passengers as f32 > overload_limit {
            OVERLOAD_SPEED_FACTOR
        } else {
            1.0
        }
    }

    pub fn recompute_max_speed(&mut self) -> f32 {
        let max_speed = BASE_MAX_SPEED * self.status_speed_factor() * self.passenger_speed_factor();
        if (max_speed - self.max_speed).abs() > f32::EPSILON {
            debug!(
                "Consist {} max speed {:.1} -> {:.1}",
                self.id, self.max_speed, max_speed
            );
        }
        self.max_speed = max_speed;
        max_speed
    }

    fn audit_car_status(&mut self, notices: &mut NoticeChannel) {
        let tick = self.audit_tick;

        for car in &self.cars {
            let status = car.status();
            let previous = self
                .reported_status
                .insert(car.id().to_owned(), status)
                .unwrap_or(CarStatus::Ok);

            if status != previous {
                match status {
                    CarStatus::Error => notices.error(
                        Some(car.id()),
                        format!("Car {} has failed and must be repaired", car.id()),
                    ),
                    CarStatus::Warning if previous.severity() < status.severity() => notices
                        .warning(
                            Some(car.id()),
                            format!("Car {} is degraded ({:.0}% health)", car.id(), car.health()),
                        ),
                    CarStatus::Maintenance => notices.info(
                        Some(car.id()),
                        format!("Car {} is under maintenance", car.id()),
                    ),
                    _ => {}
                }
            }

            for slot in SubsystemSlot::ALL {
                let Some(subsystem_status) = car.subsystem_status(slot) else {
                    continue;
                };
                let subsystem = slot.id();

                if subsystem_status == SubsystemStatus::Error {
                    let new_fault = self
                        .fault_log
                        .record_fault(car.id(), subsystem, FaultType::Failed, tick)
                        .is_some();
                    if new_fault {
                        raise_subsystem_alert(notices, car.id(), subsystem);
                    }
                } else if self.fault_log.find_active(car.id(), subsystem).is_some()
                    && !car_has_failed_slot(car, subsystem)
                {
                    self.fault_log.resolve(car.id(), subsystem, tick);
                }
            }
        }
    }
}

fn car_has_failed_slot(car: &TrainCar, subsystem: SubsystemId) -> bool {
    SubsystemSlot::ALL
        .iter()
        .filter(|slot| slot.id() == subsystem)
        .any(|slot| car.subsystem_status(*slot) == Some(SubsystemStatus::Error))
}

fn raise_subsystem_alert(notices: &mut NoticeChannel, car_id: &str, subsystem: SubsystemId) {
    match subsystem {
        SubsystemId::Traction => notices.emergency(
            Some(car_id),
            format!("URGENT: traction failure on car {}, speed restricted", car_id),
        ),
        SubsystemId::Brake => notices.emergency(
            Some(car_id),
            format!("URGENT: brake failure on car {}, stop at the next station", car_id),
        ),
        SubsystemId::Bogie => notices.error(
            Some(car_id),
            format!("Bogie failure on car {}, inspect running gear", car_id),
        ),
    }
}
