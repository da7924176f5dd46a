//! Mok settlement service - turns final scores into settled weeks
//!
//! Ingests final scores for games the simulated clock has passed, attributes base points
//! to team owners, finalizes weekly-high/low and lock bonuses exactly once when a week is
//! over, and settles the weekly skins pot. Events describing each settlement are fanned out
//! to subscribers without waiting on delivery.

mod config;
mod error;
mod events;
mod finalizer;
mod ingestion;
mod ledger;
mod oracle;
mod providers;
mod service;
mod skins;


pub use config::{DataConfig, SettlementConfig};
pub use error::{Result, SettlementError};
pub use events::{EventBroadcaster, SettlementEvent};
pub use finalizer::{LeagueFinalization, WeekFinalizer};
pub use ingestion::{GameIngest, GameLedger, IngestReport};
pub use ledger::{ParticipantTotal, SettlementLedger};
pub use oracle::{games_complete, WeekCompletionOracle};
pub use providers::{
    FileScoreProvider, LockProvider, OwnershipResolver, ScoreEntry, ScoreProvider, StaticLockBook,
    StaticOwnership,
};
pub use service::{LeagueSettlement, ProcessReport, SettlementService, WeekSettlement};
pub use skins::SkinsPotManager;

/// Re-export commonly used types
pub use persistence::{ResetSummary, SettlementStore};
pub use scoring_engine::{ScoringRules, SkinsAward};
