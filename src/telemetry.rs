use crate::car::{CarStatus, TrainCar};
use crate::consist::TrainConsist;
use crate::physics::CarClass;
use crate::safety::{SafetyLevel, SafetyState};
use heapless::Deque;
use serde::{Deserialize, Serialize};

const TELEMETRY_BUFFER_SIZE: usize = 32;
pub const DEFAULT_TELEMETRY_RATE_TICKS: u32 = 20;
const MAX_SEQUENCE_NUMBER: u32 = 65535;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarSummary {
    pub id: String,
    pub class: CarClass,
    pub status: CarStatus,
    pub health: f32,
    pub passengers: u32,
    pub power_level: f32,
    pub brake_level: f32,
    pub doors_open: bool,
    pub resistance_n: f32,
}

impl From<&TrainCar> for CarSummary {
    fn from(car: &TrainCar) -> Self {
        Self {
            id: car.id().to_owned(),
            class: car.class(),
            status: car.status(),
            health: car.health(),
            passengers: car.passengers(),
            power_level: car.power_level(),
            brake_level: car.brake_level(),
            doors_open: car.doors_open(),
            resistance_n: car.calculate_total_resistance(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    pub sequence_number: u32,
    pub tick: u64,
    pub consist_id: String,
    pub position_m: f64,
    pub speed_kmh: f32,
    pub max_speed_kmh: f32,
    pub power_level: f32,
    pub using_external_power: bool,
    pub external_power_level: f32,
    pub total_passengers: u32,
    pub safety_level: SafetyLevel,
    pub emergency_latched: bool,
    pub advisory_speed: Option<f32>,
    pub cars: Vec<CarSummary>,
}

impl TelemetryFrame {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryMetrics {
    pub frames_collected: u32,
    pub frames_dropped: u32,
    pub buffered_frames: u8,
    pub last_collection_tick: u64,
}

/// Samples the consist every `rate_ticks` ticks into a bounded buffer.
#[derive(Debug)]
pub struct TelemetryCollector {
    rate_ticks: u32,
    sequence_number: u32,
    buffer: Deque<TelemetryFrame, TELEMETRY_BUFFER_SIZE>,
    metrics: TelemetryMetrics,
}

impl TelemetryCollector {
    pub fn new() -> Self {
        Self::with_rate(DEFAULT_TELEMETRY_RATE_TICKS)
    }

    pub fn with_rate(rate_ticks: u32) -> Self {
        Self {
            rate_ticks: rate_ticks.max(1),
            sequence_number: 1,
            buffer: Deque::new(),
            metrics: TelemetryMetrics::default(),
        }
    }

    pub fn set_telemetry_rate(&mut self, rate_ticks: u32) {
        self.rate_ticks = rate_ticks.max(1);
    }

    pub fn should_collect(&self, tick: u64) -> bool {
        tick % u64::from(self.rate_ticks) == 0
    }

    /// Collects a frame when `tick` falls on the sampling rate.
    pub fn collect(
        &mut self,
        tick: u64,
        consist: &TrainConsist,
        safety: &SafetyState,
    ) -> Option<TelemetryFrame> {
        if !self.should_collect(tick) {
            return None;
        }

        let frame = TelemetryFrame {
            sequence_number: self.sequence_number,
            tick,
            consist_id: consist.id().to_owned(),
            position_m: consist.position_m(),
            speed_kmh: consist.speed_kmh(),
            max_speed_kmh: consist.max_speed(),
            power_level: consist.power_level(),
            using_external_power: consist.using_external_power(),
            external_power_level: consist.external_power_level(),
            total_passengers: consist.total_passengers(),
            safety_level: safety.safety_level,
            emergency_latched: safety.emergency_latched,
            advisory_speed: safety.advisory_speed,
            cars: consist.cars().iter().map(CarSummary::from).collect(),
        };
        self.sequence_number = (self.sequence_number % MAX_SEQUENCE_NUMBER) + 1;

        if self.buffer.is_full() {
            self.buffer.pop_front();
            self.metrics.frames_dropped += 1;
        }
        let _ = self.buffer.push_back(frame.clone());

        self.metrics.frames_collected += 1;
        self.metrics.buffered_frames = self.buffer.len() as u8;
        self.metrics.last_collection_tick = tick;
        Some(frame)
    }

    pub fn get_latest_telemetry(&self) -> Option<&TelemetryFrame> {
        self.buffer.back()
    }

    pub fn get_telemetry_buffer(&self) -> impl Iterator<Item = &TelemetryFrame> {
        self.buffer.iter()
    }

    pub fn get_metrics(&self) -> &TelemetryMetrics {
        &self.metrics
    }

    pub fn clear_buffer(&mut self) {
        self.buffer.clear();
        self.metrics.buffered_frames = 0;
    }

    pub fn export_csv_headers(&self) -> &'static str {
        "sequence,tick,position_m,speed_kmh,max_speed_kmh,power_level,external,passengers,safety_level"
    }

    pub fn export_frame_csv(&self, frame: &TelemetryFrame) -> String {
        format!(
            "{},{},{:.1},{:.2},{:.1},{:.1},{},{},{:?}",
            frame.sequence_number,
            frame.tick,
            frame.position_m,
            frame.speed_kmh,
            frame.max_speed_kmh,
            frame.power_level,
            frame.using_external_power,
            frame.total_passengers,
            frame.safety_level
        )
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}
