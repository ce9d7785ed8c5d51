//! # railcore
//!
//! Physics and safety core for a multi-car rail vehicle: running resistance
//! and sway per car, subsystem health (traction, brakes, bogies), a shared
//! consist power budget, cab-signal speed codes and an emergency brake
//! supervisor.
//!
//! ## Features
//!
//! - **Per-car physics**: aerodynamic and rolling resistance, sway and tilt,
//!   brake and traction response by car class
//! - **Subsystem health**: independent OK/WARNING/ERROR machines that bubble
//!   up into car status and consist speed derating
//! - **Power budget**: external supply first, internal reserve second,
//!   proportional throttling when short
//! - **Cab signalling**: four-aspect speed code with fail-safe Red on power
//!   or link loss
//! - **Safety supervision**: latched emergency brake with operator release
//! - **Persistence**: versioned key/value records for every entity
//!
//! ## Quick Start
//!
//! ```rust
//! use railcore::{
//!     CarClass, DriverInput, RecordingNotifier, SimConfig, Simulation, StaticPowerGrid,
//!     TrackLayout, TrainCar, TrainConsist,
//! };
//!
//! let mut consist = TrainConsist::new("T1", "Line 1");
//! consist.add_car(TrainCar::new("head", CarClass::HeadCar)).unwrap();
//! consist.add_car(TrainCar::new("tail", CarClass::TailCar)).unwrap();
//!
//! let grid = StaticPowerGrid::new().with_segment(0.0, 10_000.0, 600);
//! let mut sim = Simulation::new(
//!     SimConfig::default(),
//!     consist,
//!     TrackLayout::new(),
//!     grid,
//!     Box::new(RecordingNotifier::new()),
//! );
//!
//! let report = sim.tick(DriverInput::power(50.0));
//! assert!(report.speed_kmh > 0.0);
//! ```
//!
//! ## Architecture
//!
//! - [`physics`] - car classes and per-unit kinematics
//! - [`subsystems`] - traction, brake and bogie health models
//! - [`car`] - one rail car and its status aggregation
//! - [`consist`] - ordered cars, power budget, max speed
//! - [`signal`] - cab-signal speed code state machine
//! - [`safety`] - emergency brake supervision
//! - [`simulation`] - the per-tick orchestrator
//! - [`interfaces`] - host collaborator traits and reference implementations

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod car;
pub mod config;
pub mod consist;
pub mod error;
pub mod fault;
pub mod fault_injection;
pub mod interfaces;
pub mod notice;
pub mod persistence;
pub mod physics;
pub mod safety;
pub mod signal;
pub mod simulation;
pub mod subsystems;
pub mod telemetry;

// Re-export main public types for convenience
pub use car::{CarStatus, SubsystemSlot, TrainCar};
pub use config::SimConfig;
pub use consist::{ConsistConfig, PowerAllocation, TrainConsist};
pub use error::SimError;
pub use interfaces::{
    CarSound, LogNotifier, Notifier, NullSound, PowerGrid, RecordingNotifier, SignalLookup, SoundSink,
    SpatialQuery, StaticPowerGrid, TrackLayout,
};
pub use notice::{Notice, NoticeLevel};
pub use persistence::{Persist, Record};
pub use physics::CarClass;
pub use safety::{SafetyLevel, SafetySupervisor, SupervisorConfig};
pub use signal::{SignalAspect, SignalSpeedCode};
pub use simulation::{DriverInput, Simulation, TickReport};

// Each consist is an isolation unit a host may move onto its own task
static_assertions::assert_impl_all!(TrainConsist: Send, Sync);
static_assertions::assert_impl_all!(SignalSpeedCode: Send, Sync);
static_assertions::assert_impl_all!(Simulation<TrackLayout, StaticPowerGrid>: Send);
