use crate::consist::ConsistConfig;
use crate::error::Result;
use crate::fault_injection::FaultInjectionConfig;
use crate::safety::SupervisorConfig;
use crate::telemetry::DEFAULT_TELEMETRY_RATE_TICKS;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_TICK_MS: u64 = 50;

/// Top-level tunables. Every field has a default, so a config file only
/// needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub tick_ms: u64,
    pub consist: ConsistConfig,
    pub safety: SupervisorConfig,
    pub fault_injection: FaultInjectionConfig,
    pub telemetry_rate_ticks: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_ms: DEFAULT_TICK_MS,
            consist: ConsistConfig::default(),
            safety: SupervisorConfig::default(),
            fault_injection: FaultInjectionConfig::default(),
            telemetry_rate_ticks: DEFAULT_TELEMETRY_RATE_TICKS,
        }
    }
}

impl SimConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn tick_seconds(&self) -> f32 {
        self.tick_ms.max(1) as f32 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = SimConfig::from_json_str(r#"{"tick_ms": 100, "safety": {"near_field_m": 150.0}}"#)
            .unwrap();
        assert_eq!(config.tick_ms, 100);
        assert_eq!(config.safety.near_field_m, 150.0);
        assert_eq!(config.safety.health_floor, 50.0);
        assert_eq!(config.consist, ConsistConfig::default());
        assert!((config.tick_seconds() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        assert!(SimConfig::from_json_str("{ tick_ms: }").is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = SimConfig::from_json_file("/nonexistent/railsim.json").unwrap_err();
        assert!(matches!(err, crate::error::SimError::Io(_)));
    }
}
