//! Mok Scoring Engine
//!
//! Pure scoring rules for the weekly fantasy contest. Converts completed games into
//! base points, evaluates lock and lock-and-load declarations, and finds the weekly
//! high and low scoring teams. Nothing in this crate touches storage or the clock.

pub mod calculator;
pub mod config;
pub mod error;
pub mod models;

pub use calculator::{PointsCalculator, WeeklyExtremes};
pub use config::{ScoringRules, ShutoutLowPolicy};
pub use error::{Result, ScoringError};
pub use models::*;
