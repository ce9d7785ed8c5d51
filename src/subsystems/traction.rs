use super::{FaultType, Health, Subsystem, SubsystemId, SubsystemStatus};
use serde::{Deserialize, Serialize};

pub const TRACTION_EFFICIENCY: f32 = 0.95;
const DEGRADED_OUTPUT_FACTOR: f32 = 0.6;

const AMBIENT_TEMP_C: f32 = 20.0;
const MOTOR_TEMP_RISE_PER_PERCENT: f32 = 0.9;
const MOTOR_THERMAL_TIME_CONSTANT_S: f32 = 120.0;
const MOTOR_OVERHEAT_C: f32 = 95.0;

// Health lost per second at 100% power
const WEAR_PER_SECOND_FULL_POWER: f32 = 0.002;
const OVERHEAT_WEAR_PER_SECOND: f32 = 0.05;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TractionState {
    pub health_percent: f32,
    pub status: SubsystemStatus,
    pub power_level: f32,
    pub output_level: f32,
    pub motor_temp_c: f32,
}

#[derive(Debug, Clone)]
pub enum TractionCommand {
    SetPower(f32),
    Cutoff,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TractionSystem {
    health: Health,
    power_level: f32,
    motor_temp_c: f32,
}

impl TractionSystem {
    pub fn new() -> Self {
        Self {
            health: Health::new(),
            power_level: 0.0,
            motor_temp_c: AMBIENT_TEMP_C,
        }
    }

    /// Accepts a power demand in percent and returns the delivered output
    /// level after efficiency losses. A failed motor delivers nothing.
    pub fn apply_power(&mut self, level: f32) -> f32 {
        if self.health.status() == SubsystemStatus::Error {
            self.power_level = 0.0;
            return 0.0;
        }

        self.power_level = level.clamp(0.0, 100.0);
        self.output_level()
    }

    pub fn output_level(&self) -> f32 {
        let output = self.power_level * TRACTION_EFFICIENCY;
        match self.health.status() {
            SubsystemStatus::Ok => output,
            SubsystemStatus::Warning => output * DEGRADED_OUTPUT_FACTOR,
            SubsystemStatus::Error => 0.0,
        }
    }

    pub fn power_level(&self) -> f32 {
        self.power_level
    }

    pub fn motor_temp_c(&self) -> f32 {
        self.motor_temp_c
    }

    fn simulate_motor_temperature(&mut self, dt_s: f32) {
        let target = AMBIENT_TEMP_C + self.power_level * MOTOR_TEMP_RISE_PER_PERCENT;
        let blend = (dt_s / MOTOR_THERMAL_TIME_CONSTANT_S).min(1.0);
        self.motor_temp_c += (target - self.motor_temp_c) * blend;
    }
}

impl Default for TractionSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl Subsystem for TractionSystem {
    type State = TractionState;
    type Command = TractionCommand;

    fn id(&self) -> SubsystemId {
        SubsystemId::Traction
    }

    fn update(&mut self, dt_s: f32) -> Result<(), FaultType> {
        if self.health.status() == SubsystemStatus::Error {
            self.power_level = 0.0;
            return Err(FaultType::Failed);
        }

        self.simulate_motor_temperature(dt_s);

        let mut wear = self.power_level / 100.0 * WEAR_PER_SECOND_FULL_POWER * dt_s;
        if self.motor_temp_c > MOTOR_OVERHEAT_C {
            wear += OVERHEAT_WEAR_PER_SECOND * dt_s;
        }
        self.health.degrade(wear);

        self.health.as_result()
    }

    fn execute_command(&mut self, command: Self::Command) -> Result<(), &'static str> {
        match command {
            TractionCommand::SetPower(level) => {
                if self.health.status() == SubsystemStatus::Error {
                    return Err("Traction motor has failed");
                }
                self.apply_power(level);
                Ok(())
            }
            TractionCommand::Cutoff => {
                self.power_level = 0.0;
                Ok(())
            }
        }
    }

    fn get_state(&self) -> Self::State {
        TractionState {
            health_percent: self.health.value(),
            status: self.health.status(),
            power_level: self.power_level,
            output_level: self.output_level(),
            motor_temp_c: self.motor_temp_c,
        }
    }

    fn health(&self) -> &Health {
        &self.health
    }

    fn inject_fault(&mut self, fault: FaultType) {
        self.health.inject(fault);
        if fault == FaultType::Failed {
            self.power_level = 0.0;
        }
    }

    fn repair(&mut self) {
        self.health.restore();
        self.motor_temp_c = AMBIENT_TEMP_C;
    }
}
