//! Collaborator contracts the core consumes, plus the small in-crate
//! implementations used by the simulator binary and the tests.

use crate::notice::{Notice, NoticeLevel};
use crate::signal::{SignalSighting, SignalSpeedCode};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// Result of looking for a signal ahead of the train.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalLookup {
    /// No signal within the lookahead window.
    Clear,
    Sighted(SignalSighting),
    /// The block layer could not answer. Treated as Red at distance zero.
    Unavailable,
}

impl SignalLookup {
    pub fn sighting(&self) -> Option<&SignalSighting> {
        match self {
            SignalLookup::Sighted(sighting) => Some(sighting),
            _ => None,
        }
    }
}

pub trait SpatialQuery {
    fn lookup_signal(&self, position_m: f64, lookahead_m: f32) -> SignalLookup;
}

pub trait PowerGrid {
    /// Power on offer at `position_m`; zero where the line is not electrified.
    fn power_at(&self, position_m: f64) -> u32;
}

pub trait Notifier {
    fn deliver(&mut self, notice: &Notice);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CarSound {
    DoorsOpening,
    DoorsClosing,
}

pub trait SoundSink {
    fn play(&mut self, car_id: &str, sound: CarSound);
}

/// Signals placed along a straight line, owned on behalf of the block layer.
#[derive(Debug, Clone)]
pub struct TrackLayout {
    signals: Vec<SignalSpeedCode>,
    available: bool,
}

impl TrackLayout {
    pub fn new() -> Self {
        Self {
            signals: Vec::new(),
            available: true,
        }
    }

    pub fn add_signal(&mut self, signal: SignalSpeedCode) {
        let index = self
            .signals
            .iter()
            .position(|s| s.position_m() > signal.position_m())
            .unwrap_or(self.signals.len());
        self.signals.insert(index, signal);
    }

    pub fn signal(&self, id: &str) -> Option<&SignalSpeedCode> {
        self.signals.iter().find(|s| s.id() == id)
    }

    pub fn signal_mut(&mut self, id: &str) -> Option<&mut SignalSpeedCode> {
        self.signals.iter_mut().find(|s| s.id() == id)
    }

    pub fn signals(&self) -> &[SignalSpeedCode] {
        &self.signals
    }

    /// Simulates the block layer going silent.
    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }
}

impl Default for TrackLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl SpatialQuery for TrackLayout {
    fn lookup_signal(&self, position_m: f64, lookahead_m: f32) -> SignalLookup {
        if !self.available {
            return SignalLookup::Unavailable;
        }

        self.signals
            .iter()
            .find(|s| s.position_m() >= position_m)
            .map(|s| (s, (s.position_m() - position_m) as f32))
            .filter(|(_, distance)| *distance <= lookahead_m)
            .map_or(SignalLookup::Clear, |(s, distance)| {
                SignalLookup::Sighted(s.sighting(distance))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElectrifiedSegment {
    pub start_m: f64,
    pub end_m: f64,
    pub power_level: u32,
}

#[derive(Debug, Clone, Default)]
pub struct StaticPowerGrid {
    segments: Vec<ElectrifiedSegment>,
}

impl StaticPowerGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_segment(mut self, start_m: f64, end_m: f64, power_level: u32) -> Self {
        self.segments.push(ElectrifiedSegment {
            start_m,
            end_m,
            power_level,
        });
        self
    }
}

impl PowerGrid for StaticPowerGrid {
    fn power_at(&self, position_m: f64) -> u32 {
        self.segments
            .iter()
            .filter(|s| position_m >= s.start_m && position_m < s.end_m)
            .map(|s| s.power_level)
            .max()
            .unwrap_or(0)
    }
}

/// Forwards notices to `tracing` at a matching level.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn deliver(&mut self, notice: &Notice) {
        let car = notice.car_id.as_deref().unwrap_or("-");
        match notice.level {
            NoticeLevel::Info => info!("[tick {}] [{}] {}", notice.tick, car, notice.message),
            NoticeLevel::Warning => warn!("[tick {}] [{}] {}", notice.tick, car, notice.message),
            NoticeLevel::Error | NoticeLevel::Emergency => {
                error!("[tick {}] [{}] {}", notice.tick, car, notice.message)
            }
        }
    }
}

/// Keeps every delivered notice. Clones share one log, so a test can keep a
/// handle while the simulation owns the notifier.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    log: Arc<Mutex<Vec<Notice>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        match self.log.lock() {
            Ok(log) => log.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count_at(&self, level: NoticeLevel) -> usize {
        self.notices().iter().filter(|n| n.level == level).count()
    }
}

impl Notifier for RecordingNotifier {
    fn deliver(&mut self, notice: &Notice) {
        match self.log.lock() {
            Ok(mut log) => log.push(notice.clone()),
            Err(poisoned) => poisoned.into_inner().push(notice.clone()),
        }
    }
}

#[derive(Debug, Default)]
pub struct NullSound;

impl SoundSink for NullSound {
    fn play(&mut self, _car_id: &str, _sound: CarSound) {}
}

#[derive(Debug, Default)]
pub struct RecordingSound {
    pub played: Vec<(String, CarSound)>,
}

impl SoundSink for RecordingSound {
    fn play(&mut self, car_id: &str, sound: CarSound) {
        self.played.push((car_id.to_owned(), sound));
    }
}
