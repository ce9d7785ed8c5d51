use super::{FaultType, Health, Subsystem, SubsystemId, SubsystemStatus};
use serde::{Deserialize, Serialize};

// Health lost per kilometre travelled
const WEAR_PER_KM: f32 = 0.01;
// Extra wear per kilometre while transmitting brake force
const BRAKING_WEAR_PER_KM: f32 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BogieDrive {
    Powered,
    Unpowered,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BogieState {
    pub health_percent: f32,
    pub status: SubsystemStatus,
    pub drive: BogieDrive,
    pub tractive_force_level: f32,
    pub brake_force_level: f32,
    pub distance_km: f32,
}

#[derive(Debug, Clone)]
pub enum BogieCommand {
    TransmitTraction(f32),
    TransmitBrake(f32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BogieSystem {
    drive: BogieDrive,
    health: Health,
    tractive_force_level: f32,
    brake_force_level: f32,
    distance_km: f32,
    pending_km: f32,
}

impl BogieSystem {
    pub fn new(drive: BogieDrive) -> Self {
        Self {
            drive,
            health: Health::new(),
            tractive_force_level: 0.0,
            brake_force_level: 0.0,
            distance_km: 0.0,
            pending_km: 0.0,
        }
    }

    pub fn drive(&self) -> BogieDrive {
        self.drive
    }

    pub fn is_powered(&self) -> bool {
        self.drive == BogieDrive::Powered
    }

    /// Unpowered or failed bogies transmit no tractive force.
    pub fn transmit_traction(&mut self, level: f32) {
        self.tractive_force_level =
            if self.is_powered() && self.health.status() != SubsystemStatus::Error {
                level.clamp(0.0, 100.0)
            } else {
                0.0
            };
    }

    /// Brake force is always transmitted, whatever the drive or health.
    pub fn transmit_brake(&mut self, level: f32) {
        self.brake_force_level = level.clamp(0.0, 100.0);
    }

    pub fn tractive_force_level(&self) -> f32 {
        self.tractive_force_level
    }

    pub fn brake_force_level(&self) -> f32 {
        self.brake_force_level
    }

    pub fn distance_km(&self) -> f32 {
        self.distance_km
    }

    /// Accumulates travel to be turned into wear on the next update.
    pub fn record_travel(&mut self, distance_m: f32) {
        if distance_m > 0.0 {
            self.pending_km += distance_m / 1000.0;
        }
    }
}

impl Subsystem for BogieSystem {
    type State = BogieState;
    type Command = BogieCommand;

    fn id(&self) -> SubsystemId {
        SubsystemId::Bogie
    }

    fn update(&mut self, _dt_s: f32) -> Result<(), FaultType> {
        let km = core::mem::take(&mut self.pending_km);
        self.distance_km += km;

        if self.health.status() == SubsystemStatus::Error {
            self.tractive_force_level = 0.0;
            return Err(FaultType::Failed);
        }

        let braking = self.brake_force_level / 100.0;
        self.health.degrade(km * (WEAR_PER_KM + braking * BRAKING_WEAR_PER_KM));

        self.health.as_result()
    }

    fn execute_command(&mut self, command: Self::Command) -> Result<(), &'static str> {
        match command {
            BogieCommand::TransmitTraction(level) => {
                if !self.is_powered() {
                    return Err("Bogie is not powered");
                }
                self.transmit_traction(level);
                Ok(())
            }
            BogieCommand::TransmitBrake(level) => {
                self.transmit_brake(level);
                Ok(())
            }
        }
    }

    fn get_state(&self) -> Self::State {
        BogieState {
            health_percent: self.health.value(),
            status: self.health.status(),
            drive: self.drive,
            tractive_force_level: self.tractive_force_level,
            brake_force_level: self.brake_force_level,
            distance_km: self.distance_km,
        }
    }

    fn health(&self) -> &Health {
        &self.health
    }

    fn inject_fault(&mut self, fault: FaultType) {
        self.health.inject(fault);
        if fault == FaultType::Failed {
            self.tractive_force_level = 0.0;
        }
    }

    fn repair(&mut self) {
        self.health.restore();
    }
}
