//! Error types for the settlement service

use scoring_engine::{Season, Week};
use thiserror::Error;

/// Result type for settlement operations
pub type Result<T> = std::result::Result<T, SettlementError>;

/// Errors that can occur while ingesting games or settling a week
#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("week not yet complete - cannot settle (season {season}, week {week})")]
    WeekNotComplete { season: Season, week: Week },

    #[error("no games found for this week (season {season}, week {week})")]
    NoGamesForWeek { season: Season, week: Week },

    #[error("Persistence error: {0}")]
    Persistence(#[from] persistence::PersistenceError),

    #[error("Scoring error: {0}")]
    Scoring(#[from] scoring_engine::ScoringError),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
