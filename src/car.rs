use crate::interfaces::{CarSound, SoundSink};
use crate::physics::{CarClass, UnitPhysics};
use crate::subsystems::{
    BogieCommand, BogieDrive, BogieSystem, BrakeCommand, BrakeSystem, FaultType, Subsystem,
    SubsystemId, SubsystemStatus, TractionCommand, TractionSystem, ERROR_HEALTH_THRESHOLD,
    FULL_HEALTH, WARNING_HEALTH_THRESHOLD,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Doors refuse to open above this speed.
pub const DOOR_SPEED_THRESHOLD_KMH: f32 = 0.1;
/// Crush load as a multiple of seated capacity.
pub const DEFAULT_CAPACITY_FACTOR: f32 = 2.0;
pub const DEFAULT_TICK_S: f32 = 0.05;

const SERVICE_BRAKE_DECEL_M_S2: f32 = 1.0;
const EMERGENCY_BRAKE_DECEL_M_S2: f32 = 1.4;

const CLEANLINESS_INTERVAL_S: f32 = 60.0;
const CLEANLINESS_DECAY_PER_INTERVAL: f32 = 0.5;
const HIGH_OCCUPANCY_RATIO: f32 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CarStatus {
    Ok,
    Warning,
    Error,
    Maintenance,
}

impl CarStatus {
    pub fn from_health(health: f32) -> Self {
        if health < ERROR_HEALTH_THRESHOLD {
            CarStatus::Error
        } else if health < WARNING_HEALTH_THRESHOLD {
            CarStatus::Warning
        } else {
            CarStatus::Ok
        }
    }

    /// Ordering used when merging statuses: Error > Warning > Ok.
    /// Maintenance is handled separately and ranks with Ok here.
    pub fn severity(self) -> u8 {
        match self {
            CarStatus::Ok | CarStatus::Maintenance => 0,
            CarStatus::Warning => 1,
            CarStatus::Error => 2,
        }
    }

    pub fn worst(self, other: CarStatus) -> CarStatus {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    /// Whether normal power and brake commands are accepted.
    pub fn is_operational(self) -> bool {
        matches!(self, CarStatus::Ok | CarStatus::Warning)
    }
}

impl From<SubsystemStatus> for CarStatus {
    fn from(status: SubsystemStatus) -> Self {
        match status {
            SubsystemStatus::Ok => CarStatus::Ok,
            SubsystemStatus::Warning => CarStatus::Warning,
            SubsystemStatus::Error => CarStatus::Error,
        }
    }
}

/// Addresses one subsystem of a car.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubsystemSlot {
    Traction,
    Brake,
    FrontBogie,
    RearBogie,
}

impl SubsystemSlot {
    pub const ALL: [SubsystemSlot; 4] = [
        SubsystemSlot::Traction,
        SubsystemSlot::Brake,
        SubsystemSlot::FrontBogie,
        SubsystemSlot::RearBogie,
    ];

    pub fn id(self) -> SubsystemId {
        match self {
            SubsystemSlot::Traction => SubsystemId::Traction,
            SubsystemSlot::Brake => SubsystemId::Brake,
            SubsystemSlot::FrontBogie | SubsystemSlot::RearBogie => SubsystemId::Bogie,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainCar {
    id: String,
    class: CarClass,
    owner: Option<String>,
    health: f32,
    status: CarStatus,
    physics: UnitPhysics,
    powered: bool,
    doors_open: bool,
    passengers: u32,
    capacity_factor: f32,
    cleanliness: f32,
    cleanliness_timer_s: f32,
    operating_hours: f64,
    warnings: BTreeSet<String>,
    errors: BTreeSet<String>,
    power_level: f32,
    brake_level: f32,
    last_dt_s: f32,
    traction: Option<TractionSystem>,
    brake: BrakeSystem,
    bogies: [BogieSystem; 2],
}

impl TrainCar {
    pub fn new(id: impl Into<String>, class: CarClass) -> Self {
        let (traction, bogies) = match class {
            CarClass::HeadCar | CarClass::TailCar => (
                Some(TractionSystem::new()),
                [BogieSystem::new(BogieDrive::Powered), BogieSystem::new(BogieDrive::Powered)],
            ),
            CarClass::SpecialPurposeCar => (
                Some(TractionSystem::new()),
                [BogieSystem::new(BogieDrive::Powered), BogieSystem::new(BogieDrive::Unpowered)],
            ),
            CarClass::MiddleCar | CarClass::DoubleHeadedCar => (
                None,
                [BogieSystem::new(BogieDrive::Unpowered), BogieSystem::new(BogieDrive::Unpowered)],
            ),
        };

        Self {
            id: id.into(),
            class,
            owner: None,
            health: FULL_HEALTH,
            status: CarStatus::Ok,
            physics: UnitPhysics::new(class),
            powered: false,
            doors_open: false,
            passengers: 0,
            capacity_factor: DEFAULT_CAPACITY_FACTOR,
            cleanliness: 100.0,
            cleanliness_timer_s: 0.0,
            operating_hours: 0.0,
            warnings: BTreeSet::new(),
            errors: BTreeSet::new(),
            power_level: 0.0,
            brake_level: 0.0,
            last_dt_s: DEFAULT_TICK_S,
            traction,
            brake: BrakeSystem::new(),
            bogies,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn class(&self) -> CarClass {
        self.class
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub(crate) fn set_owner(&mut self, owner: Option<String>) {
        self.owner = owner;
    }

    pub fn health(&self) -> f32 {
        self.health
    }

    pub fn set_health(&mut self, health: f32) {
        self.health = health.clamp(0.0, FULL_HEALTH);
    }

    pub fn damage(&mut self, amount: f32) {
        self.set_health(self.health - amount.max(0.0));
    }

    pub fn status(&self) -> CarStatus {
        self.status
    }

    pub fn speed_kmh(&self) -> f32 {
        self.physics.speed_kmh()
    }

    pub fn set_speed_kmh(&mut self, speed_kmh: f32) {
        self.physics.set_speed_kmh(speed_kmh);
    }

    pub fn mass_kg(&self) -> f32 {
        self.physics.total_mass_kg()
    }

    pub fn physics(&self) -> &UnitPhysics {
        &self.physics
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    pub fn doors_open(&self) -> bool {
        self.doors_open
    }

    pub fn passengers(&self) -> u32 {
        self.passengers
    }

    pub fn capacity(&self) -> u32 {
        self.class.profile().seated_capacity
    }

    pub fn capacity_factor(&self) -> f32 {
        self.capacity_factor
    }

    pub fn set_capacity_factor(&mut self, factor: f32) {
        self.capacity_factor = factor.max(0.0);
        self.set_passengers(self.passengers);
    }

    pub fn max_passengers(&self) -> u32 {
        (self.capacity() as f32 * self.capacity_factor).floor() as u32
    }

    /// Sets the load, clamped to the crush capacity. Returns the accepted count.
    pub fn set_passengers(&mut self, passengers: u32) -> u32 {
        self.passengers = passengers.min(self.max_passengers());
        self.physics.set_passenger_load(self.passengers);
        self.passengers
    }

    pub fn board(&mut self, count: u32) -> u32 {
        let before = self.passengers;
        self.set_passengers(before.saturating_add(count)).saturating_sub(before)
    }

    pub fn alight(&mut self, count: u32) -> u32 {
        let before = self.passengers;
        before - self.set_passengers(before.saturating_sub(count))
    }

    pub fn occupancy_ratio(&self) -> f32 {
        match self.capacity() {
            0 => 0.0,
            capacity => self.passengers as f32 / capacity as f32,
        }
    }

    pub fn cleanliness(&self) -> f32 {
        self.cleanliness
    }

    pub fn clean(&mut self) {
        self.cleanliness = 100.0;
        self.cleanliness_timer_s = 0.0;
    }

    pub fn operating_hours(&self) -> f64 {
        self.operating_hours
    }

    pub fn warnings(&self) -> &BTreeSet<String> {
        &self.warnings
    }

    pub fn errors(&self) -> &BTreeSet<String> {
        &self.errors
    }

    pub fn power_level(&self) -> f32 {
        self.power_level
    }

    pub fn brake_level(&self) -> f32 {
        self.brake_level
    }

    pub fn traction(&self) -> Option<&TractionSystem> {
        self.traction.as_ref()
    }

    pub fn brake(&self) -> &BrakeSystem {
        &self.brake
    }

    pub fn bogies(&self) -> &[BogieSystem; 2] {
        &self.bogies
    }

    pub fn has_traction(&self) -> bool {
        self.traction.is_some()
    }

    pub fn subsystem_status(&self, slot: SubsystemSlot) -> Option<SubsystemStatus> {
        match slot {
            SubsystemSlot::Traction => self.traction.as_ref().map(Subsystem::status),
            SubsystemSlot::Brake => Some(self.brake.status()),
            SubsystemSlot::FrontBogie => Some(self.bogies[0].status()),
            SubsystemSlot::RearBogie => Some(self.bogies[1].status()),
        }
    }

    pub fn worst_subsystem_status(&self) -> SubsystemStatus {
        SubsystemSlot::ALL
            .iter()
            .filter_map(|slot| self.subsystem_status(*slot))
            .max()
            .unwrap_or(SubsystemStatus::Ok)
    }

    /// Returns false when the slot does not exist on this car.
    pub fn inject_fault(&mut self, slot: SubsystemSlot, fault: FaultType) -> bool {
        match slot {
            SubsystemSlot::Traction => match self.traction.as_mut() {
                Some(traction) => traction.inject_fault(fault),
                None => return false,
            },
            SubsystemSlot::Brake => self.brake.inject_fault(fault),
            SubsystemSlot::FrontBogie => self.bogies[0].inject_fault(fault),
            SubsystemSlot::RearBogie => self.bogies[1].inject_fault(fault),
        }
        debug!("Car {} {:?} fault injected: {:?}", self.id, slot, fault);
        true
    }

    pub fn apply_power(&mut self, level: f32) {
        if !self.status.is_operational() {
            return;
        }

        let level = level.clamp(0.0, 100.0);
        self.power_level = level;

        let output = match self.traction.as_mut() {
            Some(traction) if traction.status() != SubsystemStatus::Error => {
                command_subsystem(traction, &self.id, TractionCommand::SetPower(level));
                traction.output_level()
            }
            _ => {
                self.powered = false;
                return;
            }
        };

        self.powered = output > 0.0;
        let gain = self.physics.tractive_speed_gain_kmh(output / 100.0, self.last_dt_s);
        self.physics.accelerate(gain);

        for bogie in self.bogies.iter_mut().filter(|b| b.is_powered()) {
            command_subsystem(bogie, &self.id, BogieCommand::TransmitTraction(level / 2.0));
        }
    }

    pub fn apply_brake(&mut self, level: f32) {
        if !self.status.is_operational() {
            return;
        }

        let level = level.clamp(0.0, 100.0);
        self.brake_level = level;
        command_subsystem(&mut self.brake, &self.id, BrakeCommand::Service(level / 100.0));
        self.transmit_brake(level);
    }

    /// Brake command that ignores the car status. Level 100 is an emergency
    /// application and cuts traction, level 0 releases everything.
    pub fn force_brake(&mut self, level: f32) {
        let level = level.clamp(0.0, 100.0);
        self.brake_level = level;

        let command = if level >= 100.0 {
            BrakeCommand::Emergency
        } else if level <= 0.0 {
            BrakeCommand::Release
        } else {
            BrakeCommand::Service(level / 100.0)
        };
        command_subsystem(&mut self.brake, &self.id, command);
        if level >= 100.0 {
            self.cut_traction();
        }
        self.transmit_brake(level);
    }

    fn transmit_brake(&mut self, level: f32) {
        for bogie in &mut self.bogies {
            command_subsystem(bogie, &self.id, BogieCommand::TransmitBrake(level / 2.0));
        }
    }

    fn cut_traction(&mut self) {
        self.power_level = 0.0;
        self.powered = false;
        if let Some(traction) = self.traction.as_mut() {
            command_subsystem(traction, &self.id, TractionCommand::Cutoff);
        }
        for bogie in self.bogies.iter_mut().filter(|b| b.is_powered()) {
            command_subsystem(bogie, &self.id, BogieCommand::TransmitTraction(0.0));
        }
    }

    /// Opening is refused while the car is moving. Returns whether the doors
    /// are open afterwards.
    pub fn open_doors(&mut self, sound: &mut dyn SoundSink) -> bool {
        if self.doors_open {
            return true;
        }
        if self.speed_kmh() > DOOR_SPEED_THRESHOLD_KMH {
            return false;
        }

        self.doors_open = true;
        sound.play(&self.id, CarSound::DoorsOpening);
        true
    }

    pub fn close_doors(&mut self, sound: &mut dyn SoundSink) {
        if self.doors_open {
            self.doors_open = false;
            sound.play(&self.id, CarSound::DoorsClosing);
        }
    }

    pub fn start_maintenance(&mut self) {
        self.status = CarStatus::Maintenance;
        self.physics.set_speed_kmh(0.0);
        self.doors_open = true;
        self.cut_traction();
        info!("Car {} entered maintenance", self.id);
    }

    /// Returns false when the car was not in maintenance.
    pub fn end_maintenance(&mut self) -> bool {
        if self.status != CarStatus::Maintenance {
            return false;
        }

        self.repair_all();
        self.warnings.clear();
        self.errors.clear();
        self.status = CarStatus::Ok;
        info!("Car {} returned to service", self.id);
        true
    }

    /// Restores the car and all its subsystems to full health.
    pub fn repair(&mut self) {
        self.repair_all();
        if self.status != CarStatus::Maintenance {
            self.status = self.derive_status();
        }
    }

    fn repair_all(&mut self) {
        self.health = FULL_HEALTH;
        if let Some(traction) = self.traction.as_mut() {
            traction.repair();
        }
        self.brake.repair();
        for bogie in &mut self.bogies {
            bogie.repair();
        }
    }

    /// Returns true when the tag was not already present.
    pub fn add_warning(&mut self, tag: impl Into<String>) -> bool {
        let inserted = self.warnings.insert(tag.into());
        if inserted && self.status == CarStatus::Ok {
            self.status = CarStatus::Warning;
        }
        inserted
    }

    pub fn add_error(&mut self, tag: impl Into<String>) -> bool {
        let inserted = self.errors.insert(tag.into());
        if inserted && self.status != CarStatus::Maintenance {
            self.status = CarStatus::Error;
        }
        inserted
    }

    pub fn remove_warning(&mut self, tag: &str) -> bool {
        let removed = self.warnings.remove(tag);
        if removed {
            self.settle_after_tag_removal();
        }
        removed
    }

    pub fn remove_error(&mut self, tag: &str) -> bool {
        let removed = self.errors.remove(tag);
        if removed {
            self.settle_after_tag_removal();
        }
        removed
    }

    fn settle_after_tag_removal(&mut self) {
        if self.status == CarStatus::Maintenance {
            return;
        }
        if self.warnings.is_empty() && self.errors.is_empty() {
            self.status = CarStatus::Ok;
        } else if self.errors.is_empty() && self.status == CarStatus::Error {
            self.status = CarStatus::Warning;
        }
    }

    fn tag_status(&self) -> CarStatus {
        if !self.errors.is_empty() {
            CarStatus::Error
        } else if !self.warnings.is_empty() {
            CarStatus::Warning
        } else {
            CarStatus::Ok
        }
    }

    fn derive_status(&self) -> CarStatus {
        CarStatus::from_health(self.health)
            .worst(self.tag_status())
            .worst(self.worst_subsystem_status().into())
    }

    /// One tick of health, wear and sway. Returns the resulting status.
    pub fn update(&mut self, dt_s: f32) -> CarStatus {
        if dt_s > 0.0 {
            self.last_dt_s = dt_s;
        }
        self.operating_hours += f64::from(dt_s.max(0.0)) / 3600.0;

        if let Some(traction) = self.traction.as_mut() {
            update_subsystem(traction, &self.id, dt_s);
        }
        update_subsystem(&mut self.brake, &self.id, dt_s);
        for bogie in &mut self.bogies {
            update_subsystem(bogie, &self.id, dt_s);
        }

        self.degrade_cleanliness(dt_s);
        self.physics.update_physics_state(dt_s);

        if self.status == CarStatus::Maintenance {
            return self.status;
        }

        let previous = self.status;
        self.status = self.derive_status();
        if self.status != previous {
            if self.status.severity() > previous.severity() {
                warn!("Car {} status {:?} -> {:?}", self.id, previous, self.status);
            } else {
                debug!("Car {} status {:?} -> {:?}", self.id, previous, self.status);
            }
        }

        debug_assert!(
            (0.0..=FULL_HEALTH).contains(&self.health),
            "Car {} health {} outside [0, 100]",
            self.id,
            self.health
        );
        debug_assert!(
            self.passengers <= self.max_passengers(),
            "Car {} carries {} passengers over limit {}",
            self.id,
            self.passengers,
            self.max_passengers()
        );

        self.status
    }

    pub fn update_physics_state(&mut self, dt_s: f32) {
        self.physics.update_physics_state(dt_s);
    }

    pub fn calculate_total_resistance(&self) -> f32 {
        self.physics.total_resistance_n()
    }

    pub fn lateral_force_n(&self) -> f32 {
        self.physics.lateral_force_n()
    }

    pub fn vertical_force_n(&self) -> f32 {
        self.physics.vertical_force_n()
    }

    pub fn tilt_angle_deg(&self) -> f32 {
        self.physics.tilt_angle_deg()
    }

    /// Current brake retardation in m/s^2.
    pub fn brake_deceleration(&self) -> f32 {
        let demand = if self.brake.is_emergency() {
            EMERGENCY_BRAKE_DECEL_M_S2
        } else {
            self.brake_level / 100.0 * SERVICE_BRAKE_DECEL_M_S2
        };
        demand * self.brake.effectiveness()
    }

    /// Integrates speed over `dt_s`. Returns the distance covered in metres.
    pub fn advance(&mut self, dt_s: f32) -> f32 {
        let decel = self.brake_deceleration();
        let distance = self.physics.advance(dt_s, decel);
        for bogie in &mut self.bogies {
            bogie.record_travel(distance);
        }
        distance
    }

    fn degrade_cleanliness(&mut self, dt_s: f32) {
        self.cleanliness_timer_s += dt_s.max(0.0);
        while self.cleanliness_timer_s >= CLEANLINESS_INTERVAL_S {
            self.cleanliness_timer_s -= CLEANLINESS_INTERVAL_S;

            let ratio = self.occupancy_ratio();
            let mut decay = CLEANLINESS_DECAY_PER_INTERVAL * (1.0 + ratio.min(2.0));
            if ratio > HIGH_OCCUPANCY_RATIO {
                decay *= 2.0;
            }
            self.cleanliness = (self.cleanliness - decay).clamp(0.0, 100.0);
        }
    }
}

fn update_subsystem<S: Subsystem>(subsystem: &mut S, car_id: &str, dt_s: f32) {
    if let Err(fault) = subsystem.update(dt_s) {
        debug!("Car {} {:?} subsystem reports {:?}", car_id, subsystem.id(), fault);
    }
}

/// Returns whether the subsystem accepted the command.
fn command_subsystem<S: Subsystem>(subsystem: &mut S, car_id: &str, command: S::Command) -> bool {
    match subsystem.execute_command(command) {
        Ok(()) => true,
        Err(reason) => {
            debug!("Car {} {:?} command rejected: {}", car_id, subsystem.id(), reason);
            false
        }
    }
}
