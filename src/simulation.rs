use crate::config::SimConfig;
use crate::consist::{PowerAllocation, TrainConsist};
use crate::fault_injection::FaultInjector;
use crate::interfaces::{Notifier, PowerGrid, SignalLookup, SpatialQuery};
use crate::notice::NoticeChannel;
use crate::safety::{SafetyActions, SafetyLevel, SafetySupervisor};
use crate::signal::SignalSighting;
use crate::telemetry::{TelemetryCollector, TelemetryFrame};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Brake level added per km/h over the supervised limit.
const OVERSPEED_BRAKE_GAIN: f32 = 10.0;

/// Driver or automatic operation demand for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverInput {
    pub power_level: f32,
    pub brake_level: f32,
}

impl DriverInput {
    pub fn power(level: f32) -> Self {
        Self {
            power_level: level,
            brake_level: 0.0,
        }
    }

    pub fn brake(level: f32) -> Self {
        Self {
            power_level: 0.0,
            brake_level: level,
        }
    }

    pub fn coast() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub position_m: f64,
    pub distance_m: f32,
    pub speed_kmh: f32,
    pub max_speed_kmh: f32,
    pub speed_limit_kmh: Option<f32>,
    pub power: Option<PowerAllocation>,
    pub brake_level: f32,
    pub overspeed: bool,
    pub safety_level: SafetyLevel,
    pub emergency_latched: bool,
    pub advisory_speed: Option<f32>,
    pub signal: Option<SignalSighting>,
    pub signal_unavailable: bool,
    pub faults_injected: usize,
    pub notices_delivered: usize,
    pub telemetry: Option<TelemetryFrame>,
}

/// One consist on one line: the consist, its supervisor and the host
/// collaborators, advanced one fixed tick at a time.
pub struct Simulation<S: SpatialQuery, G: PowerGrid> {
    config: SimConfig,
    tick: u64,
    consist: TrainConsist,
    supervisor: SafetySupervisor,
    fault_injector: FaultInjector,
    telemetry: TelemetryCollector,
    notices: NoticeChannel,
    spatial: S,
    grid: G,
    notifier: Box<dyn Notifier + Send>,
}

impl<S: SpatialQuery, G: PowerGrid> Simulation<S, G> {
    pub fn new(
        config: SimConfig,
        consist: TrainConsist,
        spatial: S,
        grid: G,
        notifier: Box<dyn Notifier + Send>,
    ) -> Self {
        info!(
            "Simulation for consist {} ({} cars, tick {} ms)",
            consist.id(),
            consist.car_count(),
            config.tick_ms
        );

        Self {
            supervisor: SafetySupervisor::with_config(config.safety.clone()),
            fault_injector: FaultInjector::new_with_config(config.fault_injection.clone()),
            telemetry: TelemetryCollector::with_rate(config.telemetry_rate_ticks),
            notices: NoticeChannel::new(),
            tick: 0,
            config,
            consist,
            spatial,
            grid,
            notifier,
        }
    }

    pub fn tick(&mut self, input: DriverInput) -> TickReport {
        self.tick += 1;
        let tick = self.tick;
        let dt_s = self.config.tick_seconds();
        self.notices.begin_tick(tick);

        let lookup = self
            .spatial
            .lookup_signal(self.consist.position_m(), self.supervisor.config().lookahead_m);

        let actions = self
            .supervisor
            .evaluate(tick, &self.consist, &lookup, &mut self.notices);
        if actions.apply_emergency_brake {
            self.consist.apply_emergency_brake();
        }

        let faults_injected = self.fault_injector.update(&mut self.consist).len();

        self.consist.update(dt_s, &self.grid, &mut self.notices);

        let speed_limit = self.speed_limit(&lookup, &actions);
        let (power, brake_level, overspeed) = self.apply_commands(input, &actions, speed_limit);

        let distance_m = self.consist.advance(dt_s);
        self.consist.recompute_max_speed();

        let notices_delivered = self.notices.drain_into(self.notifier.as_mut());
        let safety = self.supervisor.get_state();
        let telemetry = self.telemetry.collect(tick, &self.consist, safety);

        TickReport {
            tick,
            position_m: self.consist.position_m(),
            distance_m,
            speed_kmh: self.consist.speed_kmh(),
            max_speed_kmh: self.consist.max_speed(),
            speed_limit_kmh: speed_limit,
            power,
            brake_level,
            overspeed,
            safety_level: safety.safety_level,
            emergency_latched: safety.emergency_latched,
            advisory_speed: safety.advisory_speed,
            signal: lookup.sighting().cloned(),
            signal_unavailable: lookup == SignalLookup::Unavailable,
            faults_injected,
            notices_delivered,
            telemetry,
        }
    }

    /// Supervised ceiling: consist max speed and signal ceiling under ATP,
    /// the advisory target under ATO.
    fn speed_limit(&self, lookup: &SignalLookup, actions: &SafetyActions) -> Option<f32> {
        let atp_limit = self.consist.atp_enabled().then(|| {
            let signal_limit = lookup.sighting().map_or(f32::INFINITY, |s| s.max_speed);
            self.consist.max_speed().min(signal_limit)
        });

        match (atp_limit, actions.advisory_speed) {
            (Some(atp), Some(advisory)) => Some(atp.min(advisory)),
            (limit, None) | (None, limit) => limit,
        }
    }

    fn apply_commands(
        &mut self,
        input: DriverInput,
        actions: &SafetyActions,
        speed_limit: Option<f32>,
    ) -> (Option<PowerAllocation>, f32, bool) {
        if actions.suppress_power {
            return (None, 100.0, false);
        }

        let speed = self.consist.speed_kmh();
        let excess = speed_limit.map_or(0.0, |limit| speed - limit);
        let overspeed = excess > 0.0;
        let overspeed_brake = (excess * OVERSPEED_BRAKE_GAIN).clamp(0.0, 100.0);
        if overspeed {
            debug!(
                "Overspeed {:.1} km/h over limit, service brake {:.0}",
                excess, overspeed_brake
            );
        }

        let power_level = if overspeed || input.brake_level > 0.0 {
            0.0
        } else {
            input.power_level
        };
        let power = self.consist.apply_power(power_level, &mut self.notices);

        let brake_level = input.brake_level.clamp(0.0, 100.0).max(overspeed_brake);
        self.consist.apply_brake(brake_level);

        (Some(power), brake_level, overspeed)
    }

    /// Operator acknowledgement of an emergency stop. Returns whether a
    /// latch was released.
    pub fn release_emergency(&mut self) -> bool {
        self.notices.begin_tick(self.tick);
        let actions = self.supervisor.release(self.tick, &mut self.notices);
        if actions.release_brakes {
            self.consist.release_brakes();
        }
        self.notices.drain_into(self.notifier.as_mut());
        actions.release_brakes
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn consist(&self) -> &TrainConsist {
        &self.consist
    }

    pub fn consist_mut(&mut self) -> &mut TrainConsist {
        &mut self.consist
    }

    pub fn supervisor(&self) -> &SafetySupervisor {
        &self.supervisor
    }

    pub fn fault_injector(&self) -> &FaultInjector {
        &self.fault_injector
    }

    pub fn fault_injector_mut(&mut self) -> &mut FaultInjector {
        &mut self.fault_injector
    }

    /// Repairs every car carrying an injected fault.
    pub fn clear_injected_faults(&mut self) -> usize {
        self.fault_injector.clear_faults(&mut self.consist, None)
    }

    pub fn telemetry(&self) -> &TelemetryCollector {
        &self.telemetry
    }

    pub fn track(&self) -> &S {
        &self.spatial
    }

    pub fn track_mut(&mut self) -> &mut S {
        &mut self.spatial
    }

    pub fn grid(&self) -> &G {
        &self.grid
    }

    /// Ends the run and hands the consist back.
    pub fn into_consist(self) -> TrainConsist {
        self.consist
    }
}
