//! Error types for SimulationClock

use scoring_engine::Week;
use settlement_service::SettlementError;
use thiserror::Error;

/// Errors that can occur in the SimulationClock
#[derive(Error, Debug)]
pub enum ClockError {
    #[error("processing already in progress")]
    Busy,

    #[error("Clock is already running")]
    ClockAlreadyRunning,

    #[error("Clock is not running")]
    ClockNotRunning,

    #[error("Week {week} is outside the season (1..={weeks_per_season})")]
    InvalidWeek { week: Week, weeks_per_season: Week },

    #[error("Acceleration factor must be positive and finite, got {0}")]
    InvalidSpeed(f64),

    #[error("Season reset requires explicit confirmation")]
    ResetNotConfirmed,

    #[error("Settlement error: {0}")]
    Settlement(#[from] SettlementError),

    #[error("Failed to save clock position: {0}")]
    Persistence(#[from] persistence::PersistenceError),

    #[error("Configuration error: {0}")]
    Config(String),
}
