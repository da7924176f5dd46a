//! Configuration for SimulationClock

use crate::error::ClockError;
use crate::{
    DEFAULT_ACCELERATION_FACTOR, DEFAULT_METRICS_INTERVAL_MS, DEFAULT_TICK_CADENCE_MS,
    DEFAULT_WEEKS_PER_SEASON,
};
use chrono::{DateTime, TimeZone, Utc};
use scoring_engine::{Season, Week};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for the SimulationClock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Season being simulated
    pub season: Season,

    /// First instant of week 1 (RFC 3339)
    pub season_start: DateTime<Utc>,

    /// Number of regular-season weeks
    pub weeks_per_season: Week,

    /// Real-time interval between ticks of the run loop
    pub tick_cadence_ms: u64,

    /// Simulated time per unit of real time
    pub acceleration_factor: f64,

    /// Start running as soon as the service comes up
    pub auto_start: bool,

    /// Metrics emission interval in milliseconds
    pub metrics_interval_ms: u64,

    /// Monitoring configuration
    pub monitoring: MonitoringConfig,
}

/// Monitoring and observability configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Mirror clock counters into the metrics recorder
    pub emit_metrics: bool,

    /// Warn when a tick takes longer than this
    pub max_tick_duration_ms: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            season: 2024,
            season_start: Utc.with_ymd_and_hms(2024, 9, 5, 0, 0, 0).single().unwrap_or_default(),
            weeks_per_season: DEFAULT_WEEKS_PER_SEASON,
            tick_cadence_ms: DEFAULT_TICK_CADENCE_MS,
            acceleration_factor: DEFAULT_ACCELERATION_FACTOR,
            auto_start: false,
            metrics_interval_ms: DEFAULT_METRICS_INTERVAL_MS,
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self { emit_metrics: true, max_tick_duration_ms: 500 }
    }
}

impl ClockConfig {
    /// Get tick cadence as Duration
    pub fn tick_cadence(&self) -> Duration {
        Duration::from_millis(self.tick_cadence_ms)
    }

    /// Get metrics interval as Duration
    pub fn metrics_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_interval_ms)
    }

    /// Get max tick duration as Duration
    pub fn max_tick_duration(&self) -> Duration {
        Duration::from_millis(self.monitoring.max_tick_duration_ms)
    }

    pub fn validate(&self) -> Result<(), ClockError> {
        if self.tick_cadence_ms == 0 {
            return Err(ClockError::Config("tick_cadence_ms must be greater than 0".to_string()));
        }
        if self.weeks_per_season < 1 {
            return Err(ClockError::Config("weeks_per_season must be at least 1".to_string()));
        }
        if !(self.acceleration_factor.is_finite() && self.acceleration_factor > 0.0) {
            return Err(ClockError::InvalidSpeed(self.acceleration_factor));
        }
        Ok(())
    }

    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ClockError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ClockError::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        let config: ClockConfig = toml::from_str(&content).map_err(|e| ClockError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), ClockError> {
        let content = toml::to_string_pretty(self).map_err(|e| ClockError::Config(e.to_string()))?;
        std::fs::write(path.as_ref(), content)
            .map_err(|e| ClockError::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        Ok(())
    }
}
