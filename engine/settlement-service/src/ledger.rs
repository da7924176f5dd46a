//! Per-participant-per-week point ledger

use std::collections::BTreeMap;
use std::sync::Arc;

use persistence::SettlementStore;
use scoring_engine::{
    Contribution, LeagueId, ParticipantId, PointComponent, Points, Season, SettlementRecord, Week,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A participant's season total
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantTotal {
    pub participant_id: ParticipantId,
    pub total_points: Points,
    pub weeks: usize,
}

/// Typed view of the point ledger.
///
/// Ingestion and finalization write through the store's batch methods
/// (`complete_game`, `finalize_week`) so a game's or a week's contributions land in one
/// unit; [`apply_contribution`](Self::apply_contribution) is the single-row path for manual
/// corrections. Increments happen inside the store in one statement, so concurrent
/// contributions to the same record never lose an update.
#[derive(Clone)]
pub struct SettlementLedger {
    store: Arc<dyn SettlementStore>,
}

impl SettlementLedger {
    pub fn new(store: Arc<dyn SettlementStore>) -> Self {
        Self { store }
    }

    /// Add `amount` to one component of a participant's week, creating the record if needed
    pub async fn apply_contribution(
        &self,
        participant_id: ParticipantId,
        league_id: LeagueId,
        season: Season,
        week: Week,
        component: PointComponent,
        amount: Points,
    ) -> Result<()> {
        let contribution = Contribution { participant_id, league_id, season, week, component, amount };
        self.store.apply_contribution(&contribution).await?;
        tracing::debug!(
            participant_id,
            league_id,
            season,
            week,
            component = component.column(),
            %amount,
            "Contribution applied"
        );
        Ok(())
    }

    pub async fn record(
        &self,
        participant_id: ParticipantId,
        league_id: LeagueId,
        season: Season,
        week: Week,
    ) -> Result<Option<SettlementRecord>> {
        Ok(self.store.settlement_record(participant_id, league_id, season, week).await?)
    }

    pub async fn week_records(&self, league_id: LeagueId, season: Season, week: Week) -> Result<Vec<SettlementRecord>> {
        Ok(self.store.week_records(league_id, season, week).await?)
    }

    /// Season standings, highest total first
    pub async fn season_totals(&self, league_id: LeagueId, season: Season) -> Result<Vec<ParticipantTotal>> {
        let records = self.store.season_records(league_id, season).await?;

        let mut totals: BTreeMap<ParticipantId, ParticipantTotal> = BTreeMap::new();
        for record in records {
            let entry = totals.entry(record.participant_id).or_insert(ParticipantTotal {
                participant_id: record.participant_id,
                total_points: Points::ZERO,
                weeks: 0,
            });
            entry.total_points += record.total_points;
            entry.weeks += 1;
        }

        let mut standings: Vec<ParticipantTotal> = totals.into_values().collect();
        standings.sort_by(|a, b| {
            b.total_points.cmp(&a.total_points).then(a.participant_id.cmp(&b.participant_id))
        });
        Ok(standings)
    }
}
