//! External collaborators: final scores, team ownership and lock declarations
//!
//! Each collaborator is a trait so the engine can run against live systems or the
//! file-backed implementations below, which the simulation replays.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::NaiveDate;
use dashmap::DashMap;
use scoring_engine::{
    FinalScore, LeagueId, LockKind, LockSelection, Ownership, ParticipantId, Season, TeamCode, Week,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, SettlementError};

/// Supplier of final scores
#[async_trait::async_trait]
pub trait ScoreProvider: Send + Sync {
    /// Final score of the game played on `date`. `Ok(None)` while no final score is known.
    async fn final_score(&self, date: NaiveDate, away_team: &str, home_team: &str) -> Result<Option<FinalScore>>;
}

/// Team ownership per league, static for a season
#[async_trait::async_trait]
pub trait OwnershipResolver: Send + Sync {
    async fn leagues(&self) -> Result<Vec<LeagueId>>;

    /// Participants owning at least one team in the league
    async fn participants(&self, league_id: LeagueId) -> Result<Vec<ParticipantId>>;

    async fn owning_participants(&self, team: &str, league_id: LeagueId) -> Result<BTreeSet<ParticipantId>>;
}

/// Weekly lock declarations, read-only
#[async_trait::async_trait]
pub trait LockProvider: Send + Sync {
    async fn lock_selection(
        &self,
        participant_id: ParticipantId,
        league_id: LeagueId,
        season: Season,
        week: Week,
    ) -> Result<Option<LockSelection>>;
}

/// One line of the score file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub date: NaiveDate,
    pub away_team: TeamCode,
    pub home_team: TeamCode,
    pub away_score: i32,
    pub home_score: i32,
}

type ScoreKey = (NaiveDate, TeamCode, TeamCode);

/// Final scores replayed from a JSON file
#[derive(Debug, Default)]
pub struct FileScoreProvider {
    scores: DashMap<ScoreKey, FinalScore>,
}

impl FileScoreProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON array of [`ScoreEntry`]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let entries: Vec<ScoreEntry> = serde_json::from_str(&content)?;

        let provider = Self::new();
        for entry in entries {
            provider.insert(entry);
        }
        info!("Loaded {} final scores from {}", provider.len(), path.as_ref().display());
        Ok(provider)
    }

    pub fn insert(&self, entry: ScoreEntry) {
        self.scores.insert(
            (entry.date, entry.away_team, entry.home_team),
            FinalScore { home_score: entry.home_score, away_score: entry.away_score },
        );
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

#[async_trait::async_trait]
impl ScoreProvider for FileScoreProvider {
    async fn final_score(&self, date: NaiveDate, away_team: &str, home_team: &str) -> Result<Option<FinalScore>> {
        let key = (date, away_team.to_string(), home_team.to_string());
        Ok(self.scores.get(&key).map(|score| *score))
    }
}

/// In-memory ownership table
#[derive(Debug, Default)]
pub struct StaticOwnership {
    leagues: DashMap<LeagueId, Vec<Ownership>>,
}

impl StaticOwnership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON array of [`Ownership`]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let rows: Vec<Ownership> = serde_json::from_str(&content)?;
        Ok(Self::from_rows(rows))
    }

    pub fn from_rows(rows: impl IntoIterator<Item = Ownership>) -> Self {
        let ownership = Self::new();
        for row in rows {
            ownership.add(row);
        }
        ownership
    }

    /// Add an ownership row; duplicates are ignored
    pub fn add(&self, ownership: Ownership) {
        let mut rows = self.leagues.entry(ownership.league_id).or_default();
        if !rows.contains(&ownership) {
            rows.push(ownership);
        }
    }
}

#[async_trait::async_trait]
impl OwnershipResolver for StaticOwnership {
    async fn leagues(&self) -> Result<Vec<LeagueId>> {
        let mut leagues: Vec<LeagueId> = self.leagues.iter().map(|entry| *entry.key()).collect();
        leagues.sort_unstable();
        Ok(leagues)
    }

    async fn participants(&self, league_id: LeagueId) -> Result<Vec<ParticipantId>> {
        let participants: BTreeSet<ParticipantId> = self
            .leagues
            .get(&league_id)
            .map(|rows| rows.iter().map(|o| o.participant_id).collect())
            .unwrap_or_default();
        Ok(participants.into_iter().collect())
    }

    async fn owning_participants(&self, team: &str, league_id: LeagueId) -> Result<BTreeSet<ParticipantId>> {
        Ok(self
            .leagues
            .get(&league_id)
            .map(|rows| rows.iter().filter(|o| o.team == team).map(|o| o.participant_id).collect())
            .unwrap_or_default())
    }
}

type LockKey = (ParticipantId, LeagueId, Season, Week);

/// In-memory lock declarations
#[derive(Debug, Default)]
pub struct StaticLockBook {
    selections: DashMap<LockKey, LockSelection>,
}

impl StaticLockBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON array of [`LockSelection`]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let selections: Vec<LockSelection> = serde_json::from_str(&content)?;

        let book = Self::new();
        for selection in selections {
            if let Some(team) = &selection.locked_team {
                book.declare(
                    selection.participant_id,
                    selection.league_id,
                    selection.season,
                    selection.week,
                    LockKind::Lock,
                    team,
                )?;
            }
            if let Some(team) = &selection.lock_and_load_team {
                book.declare(
                    selection.participant_id,
                    selection.league_id,
                    selection.season,
                    selection.week,
                    LockKind::LockAndLoad,
                    team,
                )?;
            }
        }
        Ok(book)
    }

    /// Declare a lock or lock-and-load. Each kind can be declared once per week.
    pub fn declare(
        &self,
        participant_id: ParticipantId,
        league_id: LeagueId,
        season: Season,
        week: Week,
        kind: LockKind,
        team: &str,
    ) -> Result<()> {
        let mut selection = self
            .selections
            .entry((participant_id, league_id, season, week))
            .or_insert_with(|| LockSelection {
                participant_id,
                league_id,
                season,
                week,
                locked_team: None,
                lock_and_load_team: None,
            });

        let slot = match kind {
            LockKind::Lock => &mut selection.locked_team,
            LockKind::LockAndLoad => &mut selection.lock_and_load_team,
        };
        if let Some(existing) = slot.as_ref() {
            return Err(SettlementError::Provider(format!(
                "participant {participant_id} already declared {kind:?} on {existing} for week {week}"
            )));
        }
        *slot = Some(team.to_string());
        Ok(())
    }
}

#[async_trait::async_trait]
impl LockProvider for StaticLockBook {
    async fn lock_selection(
        &self,
        participant_id: ParticipantId,
        league_id: LeagueId,
        season: Season,
        week: Week,
    ) -> Result<Option<LockSelection>> {
        Ok(self
            .selections
            .get(&(participant_id, league_id, season, week))
            .map(|selection| selection.clone()))
    }
}
