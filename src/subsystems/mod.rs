pub mod traction;
pub mod brake;
pub mod bogie;

pub use traction::{TractionSystem, TractionState, TractionCommand};
pub use brake::{BrakeSystem, BrakeState, BrakeCommand};
pub use bogie::{BogieSystem, BogieState, BogieCommand, BogieDrive};

use serde::{Deserialize, Serialize};

pub const FULL_HEALTH: f32 = 100.0;
/// Health strictly below this is a failed component.
pub const ERROR_HEALTH_THRESHOLD: f32 = 30.0;
/// Health strictly below this is a degraded component.
pub const WARNING_HEALTH_THRESHOLD: f32 = 70.0;

// Health a component is knocked down to when a fault is injected
const DEGRADED_FAULT_HEALTH: f32 = 60.0;
const FAILED_FAULT_HEALTH: f32 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SubsystemId {
    Traction,
    Brake,
    Bogie,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultType {
    Degraded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SubsystemStatus {
    Ok,
    Warning,
    Error,
}

impl SubsystemStatus {
    pub fn from_health(health: f32) -> Self {
        if health < ERROR_HEALTH_THRESHOLD {
            SubsystemStatus::Error
        } else if health < WARNING_HEALTH_THRESHOLD {
            SubsystemStatus::Warning
        } else {
            SubsystemStatus::Ok
        }
    }
}

/// Health percentage plus the status derived from it.
///
/// `Error` is sticky: once a component has failed only [`Health::restore`]
/// brings it back, even if the stored percentage is raised in between.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Health {
    value: f32,
    status: SubsystemStatus,
}

impl Health {
    pub fn new() -> Self {
        Self {
            value: FULL_HEALTH,
            status: SubsystemStatus::Ok,
        }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn status(&self) -> SubsystemStatus {
        self.status
    }

    pub fn degrade(&mut self, amount: f32) -> SubsystemStatus {
        if amount > 0.0 {
            self.set(self.value - amount);
        }
        self.status
    }

    pub fn set(&mut self, value: f32) {
        self.value = value.clamp(0.0, FULL_HEALTH);

        let derived = SubsystemStatus::from_health(self.value);
        if self.status != SubsystemStatus::Error {
            self.status = derived;
        }
    }

    pub fn inject(&mut self, fault: FaultType) {
        match fault {
            FaultType::Degraded => {
                self.set(self.value.min(DEGRADED_FAULT_HEALTH));
            }
            FaultType::Failed => {
                self.set(self.value.min(FAILED_FAULT_HEALTH));
                self.status = SubsystemStatus::Error;
            }
        }
    }

    pub fn restore(&mut self) {
        self.value = FULL_HEALTH;
        self.status = SubsystemStatus::Ok;
    }

    /// Maps the current status onto the subsystem update result.
    pub fn as_result(&self) -> Result<(), FaultType> {
        match self.status {
            SubsystemStatus::Ok => Ok(()),
            SubsystemStatus::Warning => Err(FaultType::Degraded),
            SubsystemStatus::Error => Err(FaultType::Failed),
        }
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::new()
    }
}

pub trait Subsystem {
    type State: Clone + Serialize;
    type Command: Clone;

    fn id(&self) -> SubsystemId;
    fn update(&mut self, dt_s: f32) -> Result<(), FaultType>;
    fn execute_command(&mut self, command: Self::Command) -> Result<(), &'static str>;
    fn get_state(&self) -> Self::State;
    fn health(&self) -> &Health;
    fn inject_fault(&mut self, fault: FaultType);
    /// Full repair: health back to 100% and any latched failure cleared.
    fn repair(&mut self);

    fn status(&self) -> SubsystemStatus {
        self.health().status()
    }

    fn is_healthy(&self) -> bool {
        self.status() == SubsystemStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_thresholds() {
        assert_eq!(SubsystemStatus::from_health(100.0), SubsystemStatus::Ok);
        assert_eq!(SubsystemStatus::from_health(70.0), SubsystemStatus::Ok);
        assert_eq!(SubsystemStatus::from_health(69.9), SubsystemStatus::Warning);
        assert_eq!(SubsystemStatus::from_health(30.0), SubsystemStatus::Warning);
        assert_eq!(SubsystemStatus::from_health(29.9), SubsystemStatus::Error);
    }

    #[test]
    fn test_error_is_sticky_until_restored() {
        let mut health = Health::new();
        health.inject(FaultType::Failed);
        assert_eq!(health.status(), SubsystemStatus::Error);

        health.set(95.0);
        assert_eq!(health.status(), SubsystemStatus::Error);

        health.restore();
        assert_eq!(health.status(), SubsystemStatus::Ok);
        assert_eq!(health.value(), FULL_HEALTH);
    }

    #[test]
    fn test_health_is_clamped() {
        let mut health = Health::new();
        health.degrade(250.0);
        assert_eq!(health.value(), 0.0);
        health.set(140.0);
        assert_eq!(health.value(), FULL_HEALTH);
    }
}
