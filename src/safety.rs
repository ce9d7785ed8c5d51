use crate::car::CarStatus;
use crate::consist::TrainConsist;
use crate::interfaces::SignalLookup;
use crate::notice::NoticeChannel;
use crate::signal::SignalAspect;
use heapless::Vec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const MAX_SAFETY_EVENTS: usize = 32;

pub const DEFAULT_NEAR_FIELD_M: f32 = 200.0;
pub const DEFAULT_ADVISORY_M: f32 = 800.0;
pub const DEFAULT_LOOKAHEAD_M: f32 = 1000.0;
pub const DEFAULT_HEALTH_FLOOR: f32 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SafetyLevel {
    Normal,
    Advisory,
    Emergency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SafetyEvent {
    RedSignalAhead,
    SignalEmergency,
    SignalDataMissing,
    CarFailure,
    LowHealth,
    CautionAspect,
}

impl SafetyEvent {
    pub fn level(self) -> SafetyLevel {
        match self {
            SafetyEvent::CautionAspect => SafetyLevel::Advisory,
            _ => SafetyLevel::Emergency,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            SafetyEvent::RedSignalAhead => "red signal ahead",
            SafetyEvent::SignalEmergency => "signal demands emergency stop",
            SafetyEvent::SignalDataMissing => "no signal data",
            SafetyEvent::CarFailure => "car failure",
            SafetyEvent::LowHealth => "car health below limit",
            SafetyEvent::CautionAspect => "caution aspect ahead",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyEventRecord {
    pub event: SafetyEvent,
    pub tick: u64,
    pub level: SafetyLevel,
    pub resolved: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// A Red aspect closer than this triggers the emergency brake.
    pub near_field_m: f32,
    /// A Yellow aspect closer than this triggers an ATO advisory.
    pub advisory_m: f32,
    /// How far ahead the block layer is asked for signals.
    pub lookahead_m: f32,
    /// Any car below this health triggers the emergency brake.
    pub health_floor: f32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            near_field_m: DEFAULT_NEAR_FIELD_M,
            advisory_m: DEFAULT_ADVISORY_M,
            lookahead_m: DEFAULT_LOOKAHEAD_M,
            health_floor: DEFAULT_HEALTH_FLOOR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyState {
    pub safety_level: SafetyLevel,
    pub emergency_latched: bool,
    pub latched_at_tick: u64,
    pub latch_count: u32,
    pub advisory_speed: Option<f32>,
    pub active_events: u8,
}

/// What the simulation must do this tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SafetyActions {
    pub apply_emergency_brake: bool,
    pub suppress_power: bool,
    pub release_brakes: bool,
    pub advisory_speed: Option<f32>,
}

impl SafetyActions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_actions(&self) -> bool {
        self.apply_emergency_brake
            || self.suppress_power
            || self.release_brakes
            || self.advisory_speed.is_some()
    }
}

/// Watches signals and car health and owns the emergency latch. Once
/// latched, only [`SafetySupervisor::release`] clears it.
#[derive(Debug)]
pub struct SafetySupervisor {
    config: SupervisorConfig,
    state: SafetyState,
    event_history: Vec<SafetyEventRecord, MAX_SAFETY_EVENTS>,
}

impl SafetySupervisor {
    pub fn new() -> Self {
        Self::with_config(SupervisorConfig::default())
    }

    pub fn with_config(config: SupervisorConfig) -> Self {
        Self {
            config,
            state: SafetyState {
                safety_level: SafetyLevel::Normal,
                emergency_latched: false,
                latched_at_tick: 0,
                latch_count: 0,
                advisory_speed: None,
                active_events: 0,
            },
            event_history: Vec::new(),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn get_state(&self) -> &SafetyState {
        &self.state
    }

    pub fn is_latched(&self) -> bool {
        self.state.emergency_latched
    }

    pub fn get_event_history(&self) -> &[SafetyEventRecord] {
        &self.event_history
    }

    pub fn clear_resolved_events(&mut self) {
        self.event_history.retain(|event| !event.resolved);
    }

    pub fn evaluate(
        &mut self,
        tick: u64,
        consist: &TrainConsist,
        lookup: &SignalLookup,
        notices: &mut NoticeChannel,
    ) -> SafetyActions {
        let mut actions = SafetyActions::new();
        let mut triggers: Vec<SafetyEvent, 8> = Vec::new();

        if consist.atp_enabled() {
            self.check_signal(lookup, &mut triggers);
        }
        self.check_cars(consist, &mut triggers);

        for event in &triggers {
            self.record_event(*event, tick);
        }

        if !triggers.is_empty() && !self.state.emergency_latched {
            self.latch(tick, &triggers, notices);
        }

        if self.state.emergency_latched {
            actions.apply_emergency_brake = true;
            actions.suppress_power = true;
        }

        let advisory = if consist.ato_enabled() {
            self.caution_advisory(lookup)
        } else {
            None
        };
        self.update_advisory(tick, advisory, notices);
        actions.advisory_speed = self.state.advisory_speed;

        self.update_safety_level();
        actions
    }

    fn check_signal(&self, lookup: &SignalLookup, triggers: &mut Vec<SafetyEvent, 8>) {
        match lookup {
            SignalLookup::Clear => {}
            // No answer from the block layer reads as Red at distance zero
            SignalLookup::Unavailable => {
                let _ = triggers.push(SafetyEvent::SignalDataMissing);
            }
            SignalLookup::Sighted(sighting) => {
                if sighting.aspect == SignalAspect::Red
                    && sighting.distance_m <= self.config.near_field_m
                {
                    let _ = triggers.push(SafetyEvent::RedSignalAhead);
                }
                if sighting.emergency_brake {
                    let _ = triggers.push(SafetyEvent::SignalEmergency);
                }
            }
        }
    }

    fn check_cars(&self, consist: &TrainConsist, triggers: &mut Vec<SafetyEvent, 8>) {
        if consist.cars().iter().any(|c| c.status() == CarStatus::Error) {
            let _ = triggers.push(SafetyEvent::CarFailure);
        }
        if consist
            .min_car_health()
            .map_or(false, |health| health < self.config.health_floor)
        {
            let _ = triggers.push(SafetyEvent::LowHealth);
        }
    }

    fn caution_advisory(&self, lookup: &SignalLookup) -> Option<f32> {
        lookup
            .sighting()
            .filter(|s| s.aspect == SignalAspect::Yellow && s.distance_m <= self.config.advisory_m)
            .map(|s| s.max_speed)
    }

    fn latch(&mut self, tick: u64, triggers: &[SafetyEvent], notices: &mut NoticeChannel) {
        self.state.emergency_latched = true;
        self.state.latched_at_tick = tick;
        self.state.latch_count = self.state.latch_count.saturating_add(1);

        let reasons: std::vec::Vec<&str> = triggers.iter().map(|e| e.describe()).collect();
        let reasons = reasons.join(", ");
        warn!("Emergency brake latched at tick {}: {}", tick, reasons);
        notices.emergency(None, format!("EMERGENCY BRAKE: {}", reasons));
    }

    fn update_advisory(&mut self, tick: u64, advisory: Option<f32>, notices: &mut NoticeChannel) {
        match (self.state.advisory_speed, advisory) {
            (None, Some(speed)) => {
                self.record_event(SafetyEvent::CautionAspect, tick);
                debug!("Caution advisory at tick {}: {:.0} km/h", tick, speed);
                notices.info(None, format!("Caution ahead, reduce speed to {:.0} km/h", speed));
            }
            (Some(_), None) => self.resolve_event(SafetyEvent::CautionAspect),
            _ => {}
        }
        self.state.advisory_speed = advisory;
    }

    /// Operator release of the emergency latch. Returns the brake release
    /// action, or no actions when nothing was latched.
    pub fn release(&mut self, tick: u64, notices: &mut NoticeChannel) -> SafetyActions {
        let mut actions = SafetyActions::new();
        if !self.state.emergency_latched {
            return actions;
        }

        self.state.emergency_latched = false;
        for event in &mut self.event_history {
            if !event.resolved && event.level == SafetyLevel::Emergency {
                event.resolved = true;
            }
        }
        self.update_safety_level();

        info!(
            "Emergency brake released at tick {} (latched at {})",
            tick, self.state.latched_at_tick
        );
        notices.info(None, "Emergency brake released by operator");
        actions.release_brakes = true;
        actions
    }

    fn update_safety_level(&mut self) {
        let active = self.event_history.iter().filter(|e| !e.resolved);
        self.state.active_events = active.clone().count() as u8;

        let level = active.map(|e| e.level).max().unwrap_or(SafetyLevel::Normal);
        self.state.safety_level = if self.state.emergency_latched {
            SafetyLevel::Emergency
        } else {
            level
        };
    }

    fn resolve_event(&mut self, event: SafetyEvent) {
        for record in self
            .event_history
            .iter_mut()
            .filter(|r| r.event == event && !r.resolved)
        {
            record.resolved = true;
        }
    }

    fn record_event(&mut self, event: SafetyEvent, tick: u64) {
        if let Some(existing) = self
            .event_history
            .iter_mut()
            .find(|e| e.event == event && !e.resolved)
        {
            existing.tick = tick;
            return;
        }

        let record = SafetyEventRecord {
            event,
            tick,
            level: event.level(),
            resolved: false,
        };

        if self.event_history.is_full() {
            let index = self
                .event_history
                .iter()
                .position(|e| e.resolved)
                .unwrap_or(0);
            self.event_history.remove(index);
        }
        let _ = self.event_history.push(record);
    }
}

impl Default for SafetySupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_history_dedupes_open_events() {
        let mut supervisor = SafetySupervisor::new();
        supervisor.record_event(SafetyEvent::CarFailure, 1);
        supervisor.record_event(SafetyEvent::CarFailure, 2);
        assert_eq!(supervisor.get_event_history().len(), 1);
        assert_eq!(supervisor.get_event_history()[0].tick, 2);
    }

    #[test]
    fn test_event_history_is_bounded() {
        let mut supervisor = SafetySupervisor::new();
        for tick in 0..(MAX_SAFETY_EVENTS as u64 * 2) {
            supervisor.record_event(SafetyEvent::CautionAspect, tick);
            supervisor.resolve_event(SafetyEvent::CautionAspect);
        }
        assert_eq!(supervisor.get_event_history().len(), MAX_SAFETY_EVENTS);

        supervisor.clear_resolved_events();
        assert!(supervisor.get_event_history().is_empty());
    }

    #[test]
    fn test_actions_summary() {
        assert!(!SafetyActions::new().has_actions());
        let actions = SafetyActions {
            advisory_speed: Some(20.0),
            ..SafetyActions::default()
        };
        assert!(actions.has_actions());
    }
}
