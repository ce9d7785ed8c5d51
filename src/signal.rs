//! Cab-signal speed code: the four-aspect state machine fed by block
//! occupancy and the signal's own power and communication links.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// An obstacle reported closer than this (but not at zero) latches the
/// emergency brake until cleared with `clear_obstacle_latch`.
pub const OBSTACLE_EMERGENCY_DISTANCE: f32 = 100.0;
pub const DEFAULT_LINE_MAX_SPEED: f32 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalAspect {
    Red,
    Yellow,
    Green,
    YellowGreen,
}

impl SignalAspect {
    pub fn from_free_sections(free_sections: i32) -> Self {
        match free_sections {
            n if n >= 3 => SignalAspect::Green,
            2 => SignalAspect::YellowGreen,
            1 => SignalAspect::Yellow,
            _ => SignalAspect::Red,
        }
    }

    /// Numeric encoding used by block storage and external consumers.
    /// Not monotonic in permissiveness: Green is 2 and YellowGreen is 3.
    pub fn legacy_code(self) -> u8 {
        match self {
            SignalAspect::Red => 0,
            SignalAspect::Yellow => 1,
            SignalAspect::Green => 2,
            SignalAspect::YellowGreen => 3,
        }
    }

    pub fn from_legacy_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(SignalAspect::Red),
            1 => Some(SignalAspect::Yellow),
            2 => Some(SignalAspect::Green),
            3 => Some(SignalAspect::YellowGreen),
            _ => None,
        }
    }

    /// Discrete hard ceiling for the aspect.
    pub fn max_speed(self) -> f32 {
        match self {
            SignalAspect::Red => 0.0,
            SignalAspect::Yellow => 20.0,
            SignalAspect::YellowGreen => 50.0,
            SignalAspect::Green => 80.0,
        }
    }

    /// Share of the configured line speed the aspect permits.
    pub fn derate_factor(self) -> f32 {
        match self {
            SignalAspect::Red => 0.0,
            SignalAspect::Yellow => 0.3,
            SignalAspect::YellowGreen => 0.7,
            SignalAspect::Green => 1.0,
        }
    }
}

/// What a train sees of a signal ahead of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSighting {
    pub signal_id: String,
    pub aspect: SignalAspect,
    pub emergency_brake: bool,
    pub distance_m: f32,
    pub max_speed: f32,
    pub suggested_speed: f32,
    pub aspect_speed_limit: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSpeedCode {
    id: String,
    position_m: f64,
    aspect: SignalAspect,
    free_sections: i32,
    line_max_speed: f32,
    suggested_speed: f32,
    obstacle_distance: f32,
    #[serde(default)]
    obstacle_latched: bool,
    route_clear: bool,
    occupancy: u32,
    powered: bool,
    comm_link: bool,
    emergency_brake: bool,
    dirty: bool,
}

impl SignalSpeedCode {
    /// A new signal starts powered and linked, but at Red until the block
    /// layer reports free sections.
    pub fn new(id: impl Into<String>, position_m: f64) -> Self {
        Self {
            id: id.into(),
            position_m,
            aspect: SignalAspect::Red,
            free_sections: 0,
            line_max_speed: DEFAULT_LINE_MAX_SPEED,
            suggested_speed: 0.0,
            obstacle_distance: 0.0,
            obstacle_latched: false,
            route_clear: true,
            occupancy: 0,
            powered: true,
            comm_link: true,
            emergency_brake: false,
            dirty: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn position_m(&self) -> f64 {
        self.position_m
    }

    pub fn aspect(&self) -> SignalAspect {
        self.aspect
    }

    pub fn free_sections(&self) -> i32 {
        self.free_sections
    }

    pub fn max_speed(&self) -> f32 {
        self.aspect.max_speed()
    }

    pub fn suggested_speed(&self) -> f32 {
        self.suggested_speed
    }

    pub fn line_max_speed(&self) -> f32 {
        self.line_max_speed
    }

    /// Configured line speed derated by the current aspect.
    pub fn speed_limit_from_aspect(&self) -> f32 {
        self.line_max_speed * self.aspect.derate_factor()
    }

    pub fn obstacle_distance(&self) -> f32 {
        self.obstacle_distance
    }

    pub fn obstacle_latched(&self) -> bool {
        self.obstacle_latched
    }

    pub fn is_route_clear(&self) -> bool {
        self.route_clear
    }

    pub fn occupancy(&self) -> u32 {
        self.occupancy
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    pub fn has_comm_link(&self) -> bool {
        self.comm_link
    }

    pub fn emergency_brake(&self) -> bool {
        self.emergency_brake
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns whether the signal changed since the last call and clears
    /// the flag.
    pub fn take_dirty(&mut self) -> bool {
        core::mem::take(&mut self.dirty)
    }

    pub fn set_free_sections(&mut self, free_sections: i32) {
        if self.free_sections != free_sections {
            self.free_sections = free_sections;
            self.dirty = true;
        }
        self.refresh();
    }

    pub fn set_powered(&mut self, powered: bool) {
        if self.powered != powered {
            self.powered = powered;
            self.dirty = true;
        }
        self.refresh();
    }

    pub fn set_comm_link(&mut self, linked: bool) {
        if self.comm_link != linked {
            self.comm_link = linked;
            self.dirty = true;
        }
        self.refresh();
    }

    /// Zero means no obstacle reported.
    pub fn set_obstacle_distance(&mut self, distance: f32) {
        let distance = distance.max(0.0);
        if self.obstacle_distance != distance {
            self.obstacle_distance = distance;
            self.dirty = true;
        }
        self.refresh();
    }

    /// Operator acknowledgement of a cleared obstacle. Re-latches at once if
    /// the reported obstacle is still inside the emergency distance.
    pub fn clear_obstacle_latch(&mut self) {
        if self.obstacle_latched {
            self.obstacle_latched = false;
            self.dirty = true;
        }
        self.refresh();
    }

    pub fn set_route_clear(&mut self, clear: bool) {
        if self.route_clear != clear {
            self.route_clear = clear;
            self.dirty = true;
        }
        self.refresh();
    }

    pub fn set_line_max_speed(&mut self, speed: f32) {
        let speed = speed.max(0.0);
        if self.line_max_speed != speed {
            self.line_max_speed = speed;
            self.dirty = true;
        }
    }

    pub fn train_entered(&mut self) {
        self.occupancy = self.occupancy.saturating_add(1);
        self.dirty = true;
    }

    pub fn train_left(&mut self) {
        if self.occupancy > 0 {
            self.occupancy -= 1;
            self.dirty = true;
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.occupancy > 0
    }

    pub fn sighting(&self, distance_m: f32) -> SignalSighting {
        SignalSighting {
            signal_id: self.id.clone(),
            aspect: self.aspect,
            emergency_brake: self.emergency_brake,
            distance_m,
            max_speed: self.max_speed(),
            suggested_speed: self.suggested_speed,
            aspect_speed_limit: self.speed_limit_from_aspect(),
        }
    }

    fn obstacle_near(&self) -> bool {
        self.obstacle_distance > 0.0 && self.obstacle_distance < OBSTACLE_EMERGENCY_DISTANCE
    }

    fn refresh(&mut self) {
        let link_lost = !self.powered || !self.comm_link;

        let aspect = if link_lost || !self.route_clear {
            SignalAspect::Red
        } else {
            SignalAspect::from_free_sections(self.free_sections)
        };
        if self.obstacle_near() {
            self.obstacle_latched = true;
        }
        let emergency = link_lost || self.obstacle_latched;

        if emergency && !self.emergency_brake {
            warn!(
                "Signal {} latched emergency brake (powered={}, link={}, obstacle={:.0})",
                self.id, self.powered, self.comm_link, self.obstacle_distance
            );
        } else if !emergency && self.emergency_brake {
            debug!("Signal {} emergency brake cleared", self.id);
        }

        if aspect != self.aspect {
            debug!("Signal {} aspect {:?} -> {:?}", self.id, self.aspect, aspect);
        }

        if aspect != self.aspect || emergency != self.emergency_brake {
            self.dirty = true;
        }

        self.aspect = aspect;
        self.emergency_brake = emergency;
        self.suggested_speed = if emergency { 0.0 } else { aspect.max_speed() };
    }
}
