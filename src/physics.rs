//! Per-car physical model: class defaults, running resistance, sway and the
//! kinematic response to traction and braking.

use serde::{Deserialize, Serialize};

pub const AIR_DENSITY_KG_M3: f32 = 1.225;
pub const GRAVITY_M_S2: f32 = 9.81;
/// Mass at which the class acceleration figure is quoted.
pub const REFERENCE_MASS_KG: f32 = 35_000.0;
pub const PASSENGER_MASS_KG: f32 = 75.0;
pub const KMH_PER_MS: f32 = 3.6;

const MAX_SWAY_AMPLITUDE_M: f32 = 0.06;
const SWAY_FREQUENCY_HZ: f32 = 0.8;
const SWAY_REFERENCE_SPEED_KMH: f32 = 80.0;
const NOMINAL_VERTICAL_BOUNCE: f32 = 0.04;

const STANDSTILL_KMH: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CarClass {
    HeadCar,
    MiddleCar,
    TailCar,
    DoubleHeadedCar,
    SpecialPurposeCar,
}

/// Class-default figures every car of a class starts with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassProfile {
    pub mass_kg: f32,
    pub length_m: f32,
    pub width_m: f32,
    pub height_m: f32,
    pub max_acceleration_m_s2: f32,
    pub drag_coefficient: f32,
    pub rolling_coefficient: f32,
    pub seated_capacity: u32,
    pub has_traction: bool,
}

impl CarClass {
    pub const ALL: [CarClass; 5] = [
        CarClass::HeadCar,
        CarClass::MiddleCar,
        CarClass::TailCar,
        CarClass::DoubleHeadedCar,
        CarClass::SpecialPurposeCar,
    ];

    pub fn profile(self) -> ClassProfile {
        match self {
            CarClass::HeadCar | CarClass::TailCar => ClassProfile {
                mass_kg: 38_000.0,
                length_m: 20.5,
                width_m: 2.8,
                height_m: 3.8,
                max_acceleration_m_s2: 1.0,
                drag_coefficient: 0.8,
                rolling_coefficient: 0.0020,
                seated_capacity: 80,
                has_traction: true,
            },
            CarClass::MiddleCar => ClassProfile {
                mass_kg: 32_000.0,
                length_m: 19.5,
                width_m: 2.8,
                height_m: 3.8,
                max_acceleration_m_s2: 0.0,
                drag_coefficient: 0.3,
                rolling_coefficient: 0.0018,
                seated_capacity: 100,
                has_traction: false,
            },
            CarClass::DoubleHeadedCar => ClassProfile {
                mass_kg: 42_000.0,
                length_m: 21.0,
                width_m: 2.8,
                height_m: 3.8,
                max_acceleration_m_s2: 0.0,
                drag_coefficient: 0.9,
                rolling_coefficient: 0.0022,
                seated_capacity: 70,
                has_traction: false,
            },
            CarClass::SpecialPurposeCar => ClassProfile {
                mass_kg: 45_000.0,
                length_m: 18.0,
                width_m: 3.0,
                height_m: 4.0,
                max_acceleration_m_s2: 0.7,
                drag_coefficient: 1.0,
                rolling_coefficient: 0.0025,
                seated_capacity: 20,
                has_traction: true,
            },
        }
    }

    pub fn has_traction(self) -> bool {
        self.profile().has_traction
    }

    /// Head and tail cars are the only ones fed by consist power.
    pub fn is_driving_end(self) -> bool {
        matches!(self, CarClass::HeadCar | CarClass::TailCar)
    }

    pub fn frontal_area_m2(self) -> f32 {
        let profile = self.profile();
        profile.width_m * profile.height_m
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitPhysics {
    class: CarClass,
    mass_kg: f32,
    payload_kg: f32,
    speed_kmh: f32,
    sway_phase: f32,
    sway_amplitude_m: f32,
    lateral_force_n: f32,
    vertical_force_n: f32,
    tilt_angle_deg: f32,
}

impl UnitPhysics {
    pub fn new(class: CarClass) -> Self {
        let mass_kg = class.profile().mass_kg;
        Self {
            class,
            mass_kg,
            payload_kg: 0.0,
            speed_kmh: 0.0,
            sway_phase: 0.0,
            sway_amplitude_m: 0.0,
            lateral_force_n: 0.0,
            vertical_force_n: mass_kg * GRAVITY_M_S2,
            tilt_angle_deg: 0.0,
        }
    }

    pub fn class(&self) -> CarClass {
        self.class
    }

    pub fn total_mass_kg(&self) -> f32 {
        self.mass_kg + self.payload_kg
    }

    pub fn set_passenger_load(&mut self, passengers: u32) {
        self.payload_kg = passengers as f32 * PASSENGER_MASS_KG;
    }

    pub fn speed_kmh(&self) -> f32 {
        self.speed_kmh
    }

    pub fn set_speed_kmh(&mut self, speed_kmh: f32) {
        self.speed_kmh = speed_kmh.max(0.0);
    }

    pub fn speed_ms(&self) -> f32 {
        self.speed_kmh / KMH_PER_MS
    }

    pub fn sway_phase(&self) -> f32 {
        self.sway_phase
    }

    pub fn sway_amplitude_m(&self) -> f32 {
        self.sway_amplitude_m
    }

    pub fn lateral_force_n(&self) -> f32 {
        self.lateral_force_n
    }

    pub fn vertical_force_n(&self) -> f32 {
        self.vertical_force_n
    }

    pub fn tilt_angle_deg(&self) -> f32 {
        self.tilt_angle_deg
    }

    /// `0.5 * rho * v^2 * A * Cd`, in newtons.
    pub fn aerodynamic_drag_n(&self) -> f32 {
        let v = self.speed_ms();
        0.5 * AIR_DENSITY_KG_M3
            * v
            * v
            * self.class.frontal_area_m2()
            * self.class.profile().drag_coefficient
    }

    /// `mu * m * g`, in newtons.
    pub fn rolling_resistance_n(&self) -> f32 {
        self.class.profile().rolling_coefficient * self.total_mass_kg() * GRAVITY_M_S2
    }

    pub fn total_resistance_n(&self) -> f32 {
        self.aerodynamic_drag_n() + self.rolling_resistance_n()
    }

    /// Speed gained in one step of `dt_s` at `output_fraction` of the class
    /// acceleration, weighted by how heavy this car is against the reference.
    pub fn tractive_speed_gain_kmh(&self, output_fraction: f32, dt_s: f32) -> f32 {
        let mass_weighting = REFERENCE_MASS_KG / self.total_mass_kg();
        output_fraction.clamp(0.0, 1.0)
            * self.class.profile().max_acceleration_m_s2
            * mass_weighting
            * dt_s
            * KMH_PER_MS
    }

    pub fn accelerate(&mut self, delta_kmh: f32) {
        self.set_speed_kmh(self.speed_kmh + delta_kmh);
    }

    /// Integrates running resistance plus `brake_decel_m_s2` over `dt_s`.
    /// Returns the distance covered in metres.
    pub fn advance(&mut self, dt_s: f32, brake_decel_m_s2: f32) -> f32 {
        let start_ms = self.speed_ms();
        if self.speed_kmh <= STANDSTILL_KMH {
            self.speed_kmh = 0.0;
            return 0.0;
        }

        let resistance_decel = self.total_resistance_n() / self.total_mass_kg();
        let decel = resistance_decel + brake_decel_m_s2.max(0.0);
        let end_ms = (start_ms - decel * dt_s).max(0.0);

        self.speed_kmh = end_ms * KMH_PER_MS;
        (start_ms + end_ms) * 0.5 * dt_s
    }

    /// Advances the sway oscillation and recomputes forces and tilt.
    pub fn update_physics_state(&mut self, dt_s: f32) {
        let normalized_speed = (self.speed_kmh / SWAY_REFERENCE_SPEED_KMH).clamp(0.0, 1.0);
        self.sway_amplitude_m = MAX_SWAY_AMPLITUDE_M * normalized_speed;

        let omega = 2.0 * core::f32::consts::PI * SWAY_FREQUENCY_HZ;
        self.sway_phase = (self.sway_phase + omega * dt_s) % (2.0 * core::f32::consts::PI);

        // Lateral acceleration of x = A sin(wt) is -A w^2 sin(wt)
        let lateral_accel = -self.sway_amplitude_m * omega * omega * self.sway_phase.sin();
        let mass = self.total_mass_kg();
        self.lateral_force_n = mass * lateral_accel;

        let bounce = NOMINAL_VERTICAL_BOUNCE * normalized_speed * (2.0 * self.sway_phase).cos();
        self.vertical_force_n = mass * GRAVITY_M_S2 * (1.0 + bounce);

        self.tilt_angle_deg = if self.vertical_force_n.abs() > f32::EPSILON {
            (self.lateral_force_n / self.vertical_force_n).atan().to_degrees()
        } else {
            0.0
        };

        debug_assert!(
            self.tilt_angle_deg.abs() < 10.0,
            "Tilt angle {} outside plausible range",
            self.tilt_angle_deg
        );
    }
}
