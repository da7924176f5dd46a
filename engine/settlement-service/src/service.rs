//! Settlement service: one guarded path from final scores to settled weeks
//!
//! Every trigger (clock tick, day advance, manual recompute) goes through
//! [`SettlementService::settle_week`], which re-checks completion, finalizes each
//! league once and settles its skins pot with insert-or-skip semantics.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use persistence::{ResetSummary, SettlementStore};
use scoring_engine::{LeagueId, PointsCalculator, Season, ScoringRules, SkinsAward, Week};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::{Result, SettlementError};
use crate::events::{EventBroadcaster, SettlementEvent};
use crate::finalizer::{LeagueFinalization, WeekFinalizer};
use crate::ingestion::{GameLedger, IngestReport};
use crate::ledger::SettlementLedger;
use crate::oracle::{games_complete, WeekCompletionOracle};
use crate::providers::{LockProvider, OwnershipResolver, ScoreProvider};
use crate::skins::SkinsPotManager;

/// Settlement of one league week
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeagueSettlement {
    pub finalization: LeagueFinalization,
    /// Row written by this run, `None` when already settled or no records exist
    pub skins: Option<SkinsAward>,
}

/// Settlement of one week across all leagues
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekSettlement {
    pub season: Season,
    pub week: Week,
    pub leagues: Vec<LeagueSettlement>,
}

impl WeekSettlement {
    /// Whether this run applied anything
    pub fn applied(&self) -> bool {
        self.leagues.iter().any(|l| l.finalization.applied || l.skins.is_some())
    }
}

/// Result of a processing pass over pending games
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessReport {
    pub ingest: IngestReport,
    pub settled: Vec<WeekSettlement>,
}

pub struct SettlementService {
    store: Arc<dyn SettlementStore>,
    ownership: Arc<dyn OwnershipResolver>,
    games: GameLedger,
    ledger: SettlementLedger,
    oracle: WeekCompletionOracle,
    finalizer: WeekFinalizer,
    skins: SkinsPotManager,
    broadcaster: Arc<EventBroadcaster>,
}

impl SettlementService {
    pub fn new(
        store: Arc<dyn SettlementStore>,
        scores: Arc<dyn ScoreProvider>,
        ownership: Arc<dyn OwnershipResolver>,
        locks: Arc<dyn LockProvider>,
        rules: ScoringRules,
    ) -> Result<Self> {
        rules.validate()?;
        let calculator = Arc::new(PointsCalculator::new(rules));

        Ok(Self {
            games: GameLedger::new(store.clone(), calculator.clone(), scores, ownership.clone()),
            ledger: SettlementLedger::new(store.clone()),
            oracle: WeekCompletionOracle::new(store.clone()),
            finalizer: WeekFinalizer::new(store.clone(), calculator, ownership.clone(), locks),
            skins: SkinsPotManager::new(store.clone()),
            broadcaster: Arc::new(EventBroadcaster::new()),
            store,
            ownership,
        })
    }

    pub fn games(&self) -> &GameLedger {
        &self.games
    }

    pub fn ledger(&self) -> &SettlementLedger {
        &self.ledger
    }

    pub fn oracle(&self) -> &WeekCompletionOracle {
        &self.oracle
    }

    pub fn skins(&self) -> &SkinsPotManager {
        &self.skins
    }

    pub fn broadcaster(&self) -> Arc<EventBroadcaster> {
        self.broadcaster.clone()
    }

    pub fn store(&self) -> Arc<dyn SettlementStore> {
        self.store.clone()
    }

    /// Ingest games that kicked off by `as_of`, then settle any week they completed
    pub async fn process_pending(&self, season: Season, as_of: DateTime<Utc>) -> Result<ProcessReport> {
        let ingest = self.games.ingest_pending(season, as_of).await?;
        self.settle_touched(ingest, as_of).await
    }

    /// Ingest only the games scheduled from `first` through `last`, then settle any week they completed
    pub async fn process_dates(
        &self,
        season: Season,
        first: NaiveDate,
        last: NaiveDate,
        as_of: DateTime<Utc>,
    ) -> Result<ProcessReport> {
        let ingest = self.games.ingest_dates(season, first, last, as_of).await?;
        self.settle_touched(ingest, as_of).await
    }

    async fn settle_touched(&self, ingest: IngestReport, as_of: DateTime<Utc>) -> Result<ProcessReport> {
        let mut settled = Vec::new();
        for &(season, week) in &ingest.weeks_touched {
            if let Some(settlement) = self.settle_if_complete(season, week, as_of).await? {
                settled.push(settlement);
            }
        }
        Ok(ProcessReport { ingest, settled })
    }

    /// Settle the week if the oracle says it is over; `None` otherwise
    pub async fn settle_if_complete(
        &self,
        season: Season,
        week: Week,
        as_of: DateTime<Utc>,
    ) -> Result<Option<WeekSettlement>> {
        if !self.oracle.is_complete(season, week, as_of).await? {
            debug!(season, week, "Week not complete yet");
            return Ok(None);
        }
        self.settle_week(season, week, as_of).await.map(Some)
    }

    /// Settle every scheduled week that is over by `as_of`; returns the runs that applied something
    pub async fn settle_completed_weeks(&self, season: Season, as_of: DateTime<Utc>) -> Result<Vec<WeekSettlement>> {
        let mut settled = Vec::new();
        for week in self.store.season_weeks(season).await? {
            if let Some(settlement) = self.settle_if_complete(season, week, as_of).await? {
                if settlement.applied() {
                    settled.push(settlement);
                }
            }
        }
        Ok(settled)
    }

    /// Finalize bonuses and settle skins for every league. Safe to call repeatedly.
    pub async fn settle_week(&self, season: Season, week: Week, as_of: DateTime<Utc>) -> Result<WeekSettlement> {
        let games = self.store.games_for_week(season, week).await?;
        if games.is_empty() {
            return Err(SettlementError::NoGamesForWeek { season, week });
        }
        if !games_complete(&games, as_of) {
            return Err(SettlementError::WeekNotComplete { season, week });
        }

        let mut leagues = Vec::new();
        for league_id in self.ownership.leagues().await? {
            match self.settle_league(league_id, season, week, &games, as_of).await {
                Ok(settlement) => leagues.push(settlement),
                Err(e) => {
                    error!(league_id, season, week, "Week settlement failed: {}", e);
                    return Err(e);
                }
            }
        }

        Ok(WeekSettlement { season, week, leagues })
    }

    async fn settle_league(
        &self,
        league_id: LeagueId,
        season: Season,
        week: Week,
        games: &[scoring_engine::Game],
        as_of: DateTime<Utc>,
    ) -> Result<LeagueSettlement> {
        let finalization = self.finalizer.finalize_league(league_id, season, week, games).await?;
        if finalization.applied {
            self.broadcaster
                .publish(SettlementEvent::WeekSettled {
                    league_id,
                    season,
                    week,
                    high_teams: finalization.high_teams.clone(),
                    low_teams: finalization.low_teams.clone(),
                })
                .await;
        }

        let skins = self.skins.settle_week(league_id, season, week, as_of).await?;
        if let Some(award) = &skins {
            self.broadcaster
                .publish(SettlementEvent::SkinsAwarded {
                    league_id,
                    season,
                    week,
                    winner: award.winner,
                    pot_size: award.pot_size,
                    is_tie: award.is_tie,
                })
                .await;
        }

        Ok(LeagueSettlement { finalization, skins })
    }

    /// Forced re-run of a week's settlement; converges to the same state
    pub async fn recompute_week(&self, season: Season, week: Week, as_of: DateTime<Utc>) -> Result<WeekSettlement> {
        info!(season, week, "Recomputing week settlement");
        let settlement = self.settle_week(season, week, as_of).await?;
        if !settlement.applied() {
            info!(season, week, "Recompute found week already settled, nothing applied");
        }
        Ok(settlement)
    }

    /// Clear every derived row for the season and recorded scores
    pub async fn reset_season(&self, season: Season) -> Result<ResetSummary> {
        let summary = self.store.reset_season(season).await?;
        self.broadcaster.publish(SettlementEvent::SeasonReset { season }).await;
        info!(season, "Season reset: {:?}", summary);
        Ok(summary)
    }
}
