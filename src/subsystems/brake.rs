use super::{FaultType, Health, Subsystem, SubsystemId, SubsystemStatus};
use serde::{Deserialize, Serialize};

const MAX_CYLINDER_PRESSURE_KPA: f32 = 380.0;
const EMERGENCY_CYLINDER_PRESSURE_KPA: f32 = 450.0;
const PRESSURE_RATE_KPA_PER_S: f32 = 250.0;

const WEAR_PER_SECOND_FULL_SERVICE: f32 = 0.001;
const EMERGENCY_WEAR_PER_SECOND: f32 = 0.01;

const DEGRADED_EFFECTIVENESS: f32 = 0.8;
const FAILED_EFFECTIVENESS: f32 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrakeState {
    pub health_percent: f32,
    pub status: SubsystemStatus,
    pub service_level: f32,
    pub emergency: bool,
    pub cylinder_pressure_kpa: f32,
}

#[derive(Debug, Clone)]
pub enum BrakeCommand {
    Service(f32),
    Emergency,
    Release,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrakeSystem {
    health: Health,
    service_level: f32,
    emergency: bool,
    cylinder_pressure_kpa: f32,
}

impl BrakeSystem {
    pub fn new() -> Self {
        Self {
            health: Health::new(),
            service_level: 0.0,
            emergency: false,
            cylinder_pressure_kpa: 0.0,
        }
    }

    /// Service application, `level` normalised to [0, 1].
    pub fn apply_service(&mut self, level: f32) {
        self.service_level = level.clamp(0.0, 1.0);
    }

    pub fn apply_emergency(&mut self) {
        self.emergency = true;
        self.service_level = 1.0;
    }

    pub fn release(&mut self) {
        self.emergency = false;
        self.service_level = 0.0;
    }

    pub fn service_level(&self) -> f32 {
        self.service_level
    }

    pub fn is_emergency(&self) -> bool {
        self.emergency
    }

    pub fn cylinder_pressure_kpa(&self) -> f32 {
        self.cylinder_pressure_kpa
    }

    /// Fraction of nominal retardation the pneumatic brake still produces.
    pub fn effectiveness(&self) -> f32 {
        match self.health.status() {
            SubsystemStatus::Ok => 1.0,
            SubsystemStatus::Warning => DEGRADED_EFFECTIVENESS,
            SubsystemStatus::Error => FAILED_EFFECTIVENESS,
        }
    }

    fn target_pressure(&self) -> f32 {
        if self.emergency {
            EMERGENCY_CYLINDER_PRESSURE_KPA
        } else {
            self.service_level * MAX_CYLINDER_PRESSURE_KPA
        }
    }
}

impl Default for BrakeSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl Subsystem for BrakeSystem {
    type State = BrakeState;
    type Command = BrakeCommand;

    fn id(&self) -> SubsystemId {
        SubsystemId::Brake
    }

    fn update(&mut self, dt_s: f32) -> Result<(), FaultType> {
        // Pressure keeps following the command even when failed so the
        // mechanical path stays usable.
        let target = self.target_pressure();
        let step = PRESSURE_RATE_KPA_PER_S * dt_s;
        let diff = target - self.cylinder_pressure_kpa;
        self.cylinder_pressure_kpa += diff.clamp(-step, step);

        if self.health.status() == SubsystemStatus::Error {
            return Err(FaultType::Failed);
        }

        let wear = if self.emergency {
            EMERGENCY_WEAR_PER_SECOND * dt_s
        } else {
            self.service_level * WEAR_PER_SECOND_FULL_SERVICE * dt_s
        };
        self.health.degrade(wear);

        self.health.as_result()
    }

    fn execute_command(&mut self, command: Self::Command) -> Result<(), &'static str> {
        match command {
            BrakeCommand::Service(level) => {
                if !(0.0..=1.0).contains(&level) {
                    return Err("Service brake level must be within [0, 1]");
                }
                self.apply_service(level);
                Ok(())
            }
            BrakeCommand::Emergency => {
                self.apply_emergency();
                Ok(())
            }
            BrakeCommand::Release => {
                self.release();
                Ok(())
            }
        }
    }

    fn get_state(&self) -> Self::State {
        BrakeState {
            health_percent: self.health.value(),
            status: self.health.status(),
            service_level: self.service_level,
            emergency: self.emergency,
            cylinder_pressure_kpa: self.cylinder_pressure_kpa,
        }
    }

    fn health(&self) -> &Health {
        &self.health
    }

    fn inject_fault(&mut self, fault: FaultType) {
        self.health.inject(fault);
    }

    fn repair(&mut self) {
        self.health.restore();
    }
}
