//! Error types for the scoring engine

use thiserror::Error;

use crate::models::GameId;

/// Result type alias for scoring operations
pub type Result<T> = std::result::Result<T, ScoringError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScoringError {
    #[error("Invalid scoring rules: {0}")]
    InvalidRules(String),

    #[error("Game {game_id} has not completed")]
    GameNotCompleted { game_id: GameId },
}
