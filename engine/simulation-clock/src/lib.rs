//! # SimulationClock
//!
//! The heartbeat of the simulated season. Owns the virtual "now", advances it either
//! continuously (scaled real time) or in discrete steps (one day, a jump to a week),
//! and hands every instant it crosses to the settlement service.
//!
//! Advances are serialized: while one pass is ingesting and settling, any other
//! advance is rejected with [`ClockError::Busy`] rather than queued.

pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod state;


#[cfg(test)]
mod integration_tests;

pub use clock::{ClockAdvance, DayAdvance, SimulationClock};
pub use config::{ClockConfig, MonitoringConfig};
pub use error::ClockError;
pub use metrics::{ClockMetrics, MetricsCollector, PassCounts};
pub use state::{ClockState, SimulatedClock};

/// Re-export commonly used types
pub use scoring_engine::{Season, Week};

/// Current version of the SimulationClock
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default run-loop cadence
pub const DEFAULT_TICK_CADENCE_MS: u64 = 1000;

/// Default speed: one simulated hour per real second
pub const DEFAULT_ACCELERATION_FACTOR: f64 = 3600.0;

/// Regular-season length
pub const DEFAULT_WEEKS_PER_SEASON: Week = 18;

/// Default metrics emission interval
pub const DEFAULT_METRICS_INTERVAL_MS: u64 = 10_000;
