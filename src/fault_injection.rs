use crate::car::SubsystemSlot;
use crate::consist::TrainConsist;
use crate::subsystems::{FaultType, SubsystemId, SubsystemStatus};
use heapless::Vec;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const MAX_ACTIVE_FAULTS: usize = 16;
const MAX_FAULTS_PER_TICK: usize = 8;

// Per-tick fault rates, in percent, per subsystem kind
const TRACTION_FAULT_RATE_PERCENT: f32 = 0.02;
const BRAKE_FAULT_RATE_PERCENT: f32 = 0.01;
const BOGIE_FAULT_RATE_PERCENT: f32 = 0.015;

// Fault type probability weights
const DEGRADED_WEIGHT: u8 = 75;
const FAILED_WEIGHT: u8 = 25;

const DEFAULT_SEED: u64 = 0x1234_5678_9ABC_DEF0;

/// A fault the injector placed on a car and is still tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjectedFault {
    pub car_id: String,
    pub slot: SubsystemSlot,
    pub fault_type: FaultType,
    pub injected_at_tick: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FaultInjectionStats {
    pub total_faults_injected: u32,
    pub traction_faults_injected: u32,
    pub brake_faults_injected: u32,
    pub bogie_faults_injected: u32,
    pub degraded_faults: u32,
    pub failed_faults: u32,
    pub repaired_faults: u32,
    pub manual_cleared_faults: u32,
    pub current_active_faults: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultInjectionConfig {
    pub enabled: bool,
    pub traction_rate_percent: f32,
    pub brake_rate_percent: f32,
    pub bogie_rate_percent: f32,
    pub degraded_weight: u8,
    pub failed_weight: u8,
    pub seed: u64,
}

impl Default for FaultInjectionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            traction_rate_percent: TRACTION_FAULT_RATE_PERCENT,
            brake_rate_percent: BRAKE_FAULT_RATE_PERCENT,
            bogie_rate_percent: BOGIE_FAULT_RATE_PERCENT,
            degraded_weight: DEGRADED_WEIGHT,
            failed_weight: FAILED_WEIGHT,
            seed: DEFAULT_SEED,
        }
    }
}

/// Probabilistic wear and failure injection over the subsystems of a consist.
/// Injected faults stay until the car is repaired.
#[derive(Debug)]
pub struct FaultInjector {
    config: FaultInjectionConfig,
    active_faults: Vec<InjectedFault, MAX_ACTIVE_FAULTS>,
    stats: FaultInjectionStats,
    tick: u64,

    // Linear congruential generator, seeded for reproducible runs
    rng_state: u64,
}

impl FaultInjector {
    pub fn new() -> Self {
        Self::new_with_config(FaultInjectionConfig::default())
    }

    pub fn new_with_config(config: FaultInjectionConfig) -> Self {
        let rng_state = config.seed;
        Self {
            config,
            active_faults: Vec::new(),
            stats: FaultInjectionStats::default(),
            tick: 0,
            rng_state,
        }
    }

    /// Call once per simulation tick. Returns the faults injected this tick.
    pub fn update(&mut self, consist: &mut TrainConsist) -> Vec<InjectedFault, MAX_FAULTS_PER_TICK> {
        let mut injected = Vec::new();
        if !self.config.enabled {
            return injected;
        }

        self.tick += 1;
        self.forget_repaired(consist);
        self.attempt_fault_injection(consist, &mut injected);
        self.stats.current_active_faults = self.active_faults.len() as u8;

        injected
    }

    /// Drops tracked faults whose subsystem has been restored.
    fn forget_repaired(&mut self, consist: &TrainConsist) {
        let before = self.active_faults.len();
        self.active_faults.retain(|fault| {
            consist
                .car(&fault.car_id)
                .and_then(|car| car.subsystem_status(fault.slot))
                .map_or(false, |status| status != SubsystemStatus::Ok)
        });
        self.stats.repaired_faults += (before - self.active_faults.len()) as u32;
    }

    fn attempt_fault_injection(
        &mut self,
        consist: &mut TrainConsist,
        injected: &mut Vec<InjectedFault, MAX_FAULTS_PER_TICK>,
    ) {
        let car_ids: std::vec::Vec<String> =
            consist.cars().iter().map(|c| c.id().to_owned()).collect();

        for car_id in car_ids {
            for slot in SubsystemSlot::ALL {
                if self.active_faults.is_full() || injected.is_full() {
                    return;
                }
                if self.is_tracked(&car_id, slot) {
                    continue;
                }

                let rate = self.rate_for(slot.id());
                if !self.should_inject_fault(rate) {
                    continue;
                }
                let Some(fault_type) = self.select_fault_type() else {
                    continue;
                };
                let Some(car) = consist.car_mut(&car_id) else {
                    continue;
                };
                if !car.inject_fault(slot, fault_type) {
                    continue;
                }

                let fault = InjectedFault {
                    car_id: car_id.clone(),
                    slot,
                    fault_type,
                    injected_at_tick: self.tick,
                };
                warn!(
                    "Injected {:?} fault into car {} {:?}",
                    fault_type, car_id, slot
                );
                self.update_injection_stats(slot.id(), fault_type);
                let _ = self.active_faults.push(fault.clone());
                let _ = injected.push(fault);
            }
        }
    }

    fn is_tracked(&self, car_id: &str, slot: SubsystemSlot) -> bool {
        self.active_faults
            .iter()
            .any(|f| f.car_id == car_id && f.slot == slot)
    }

    fn rate_for(&self, subsystem: SubsystemId) -> f32 {
        match subsystem {
            SubsystemId::Traction => self.config.traction_rate_percent,
            SubsystemId::Brake => self.config.brake_rate_percent,
            SubsystemId::Bogie => self.config.bogie_rate_percent,
        }
    }

    fn should_inject_fault(&mut self, rate_percent: f32) -> bool {
        self.random_float() < (rate_percent / 100.0)
    }

    /// Weighted choice between Degraded and Failed.
    fn select_fault_type(&mut self) -> Option<FaultType> {
        let total_weight =
            u16::from(self.config.degraded_weight) + u16::from(self.config.failed_weight);
        if total_weight == 0 {
            return None;
        }

        let normalized_value = u16::from(self.random_u8()) * total_weight / 256;
        if normalized_value < u16::from(self.config.degraded_weight) {
            Some(FaultType::Degraded)
        } else {
            Some(FaultType::Failed)
        }
    }

    fn update_injection_stats(&mut self, subsystem: SubsystemId, fault_type: FaultType) {
        self.stats.total_faults_injected += 1;

        match subsystem {
            SubsystemId::Traction => self.stats.traction_faults_injected += 1,
            SubsystemId::Brake => self.stats.brake_faults_injected += 1,
            SubsystemId::Bogie => self.stats.bogie_faults_injected += 1,
        }

        match fault_type {
            FaultType::Degraded => self.stats.degraded_faults += 1,
            FaultType::Failed => self.stats.failed_faults += 1,
        }
    }

    /// Repairs the cars carrying injected faults, either one car or all of
    /// them. Returns how many tracked faults were cleared.
    pub fn clear_faults(&mut self, consist: &mut TrainConsist, car_id: Option<&str>) -> usize {
        let initial_count = self.active_faults.len();

        for fault in self
            .active_faults
            .iter()
            .filter(|f| car_id.map_or(true, |id| f.car_id == id))
        {
            if let Some(car) = consist.car_mut(&fault.car_id) {
                car.repair();
            }
        }
        self.active_faults
            .retain(|f| car_id.map_or(false, |id| f.car_id != id));

        let cleared_count = initial_count - self.active_faults.len();
        self.stats.manual_cleared_faults += cleared_count as u32;
        self.stats.current_active_faults = self.active_faults.len() as u8;
        if cleared_count > 0 {
            info!("Cleared {} injected faults", cleared_count);
        }
        cleared_count
    }

    pub fn get_stats(&self) -> &FaultInjectionStats {
        &self.stats
    }

    pub fn get_config(&self) -> &FaultInjectionConfig {
        &self.config
    }

    pub fn update_config(&mut self, config: FaultInjectionConfig) {
        self.config = config;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn get_active_faults(&self) -> &[InjectedFault] {
        &self.active_faults
    }

    fn next_random(&mut self) -> u64 {
        // X(n+1) = (aX(n) + c) mod 2^64, Numerical Recipes constants
        self.rng_state = self.rng_state.wrapping_mul(1664525).wrapping_add(1013904223);
        self.rng_state
    }

    fn random_u8(&mut self) -> u8 {
        (self.next_random() >> 24) as u8
    }

    fn random_float(&mut self) -> f32 {
        (self.next_random() as f32) / (u64::MAX as f32)
    }
}

impl Default for FaultInjector {
    fn default() -> Self {
        Self::new()
    }
}
