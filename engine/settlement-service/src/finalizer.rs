//! Single-shot weekly bonuses: weekly high/low and lock declarations

use std::sync::Arc;

use persistence::SettlementStore;
use scoring_engine::{
    Contribution, Game, LeagueId, PointComponent, PointsCalculator, Season, TeamCode, Week,
    WeeklyExtremes,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::providers::{LockProvider, OwnershipResolver};

/// Outcome of finalizing one league week
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeagueFinalization {
    pub league_id: LeagueId,
    /// False when the week had already been finalized and nothing was applied
    pub applied: bool,
    pub high_teams: Vec<TeamCode>,
    pub low_teams: Vec<TeamCode>,
    pub contributions: usize,
}

/// Computes and applies the bonuses that may land only once per league week
pub struct WeekFinalizer {
    store: Arc<dyn SettlementStore>,
    calculator: Arc<PointsCalculator>,
    ownership: Arc<dyn OwnershipResolver>,
    locks: Arc<dyn LockProvider>,
}

impl WeekFinalizer {
    pub fn new(
        store: Arc<dyn SettlementStore>,
        calculator: Arc<PointsCalculator>,
        ownership: Arc<dyn OwnershipResolver>,
        locks: Arc<dyn LockProvider>,
    ) -> Self {
        Self { store, calculator, ownership, locks }
    }

    /// Finalize one league week from its completed games.
    ///
    /// Callers must have confirmed completion first; an unfinished game fails the whole week.
    pub async fn finalize_league(
        &self,
        league_id: LeagueId,
        season: Season,
        week: Week,
        games: &[Game],
    ) -> Result<LeagueFinalization> {
        let mut performances = self.calculator.week_performances(games)?;
        let extremes = WeeklyExtremes::evaluate(&performances);

        let mut contributions = Vec::new();
        let (high_teams, low_teams) = match &extremes {
            Some(extremes) => {
                extremes.mark(&mut performances);
                for (team, component, amount) in self.calculator.weekly_modifiers(extremes) {
                    for participant_id in self.ownership.owning_participants(&team, league_id).await? {
                        contributions.push(Contribution { participant_id, league_id, season, week, component, amount });
                    }
                }
                (
                    extremes.high_teams.iter().cloned().collect(),
                    extremes.low_teams.iter().cloned().collect(),
                )
            }
            None => (Vec::new(), Vec::new()),
        };

        for participant_id in self.ownership.participants(league_id).await? {
            let Some(selection) = self.locks.lock_selection(participant_id, league_id, season, week).await? else {
                continue;
            };
            for (kind, amount) in self.calculator.lock_modifiers(&selection, &performances) {
                if amount.is_zero() {
                    continue;
                }
                contributions.push(Contribution {
                    participant_id,
                    league_id,
                    season,
                    week,
                    component: PointComponent::from(kind),
                    amount,
                });
            }
        }

        let applied = self
            .store
            .finalize_week(league_id, season, week, &performances, &contributions)
            .await?;

        if applied {
            info!(
                league_id,
                season,
                week,
                contributions = contributions.len(),
                "Week finalized: high {:?}, low {:?}",
                high_teams,
                low_teams
            );
        } else {
            debug!(league_id, season, week, "Week already finalized, skipping");
        }

        Ok(LeagueFinalization {
            league_id,
            applied,
            high_teams,
            low_teams,
            contributions: if applied { contributions.len() } else { 0 },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{StaticLockBook, StaticOwnership};
    use chrono::{TimeZone, Utc};
    use persistence::InMemoryStore;
    use scoring_engine::{LockKind, Ownership, Points, ScoringRules};

    fn game(id: i64, home: &str, away: &str, home_score: i32, away_score: i32) -> Game {
        Game {
            id,
            season: 2024,
            week: 1,
            scheduled_time: Utc.with_ymd_and_hms(2024, 9, 8, 17, 0, 0).unwrap(),
            home_team: home.to_string(),
            away_team: away.to_string(),
            home_score: Some(home_score),
            away_score: Some(away_score),
            completed: true,
        }
    }

    fn setup(locks: StaticLockBook) -> (Arc<InMemoryStore>, WeekFinalizer) {
        let store = Arc::new(InMemoryStore::new());
        let ownership = StaticOwnership::from_rows([
            Ownership { team: "KC".to_string(), participant_id: 1, league_id: 10 },
            Ownership { team: "BAL".to_string(), participant_id: 2, league_id: 10 },
            Ownership { team: "NYJ".to_string(), participant_id: 2, league_id: 10 },
        ]);
        let finalizer = WeekFinalizer::new(
            store.clone(),
            Arc::new(PointsCalculator::new(ScoringRules::default())),
            Arc::new(ownership),
            Arc::new(locks),
        );
        (store, finalizer)
    }

    #[tokio::test]
    async fn test_extremes_and_locks_applied_once() {
        let locks = StaticLockBook::new();
        locks.declare(1, 10, 2024, 1, LockKind::Lock, "KC").unwrap();
        locks.declare(2, 10, 2024, 1, LockKind::LockAndLoad, "NYJ").unwrap();
        let (store, finalizer) = setup(locks);

        let games = [game(1, "KC", "BAL", 41, 20), game(2, "NYJ", "SF", 3, 24)];
        let first = finalizer.finalize_league(10, 2024, 1, &games).await.unwrap();
        assert!(first.applied);
        assert_eq!(first.high_teams, vec!["KC".to_string()]);
        assert_eq!(first.low_teams, vec!["NYJ".to_string()]);

        let second = finalizer.finalize_league(10, 2024, 1, &games).await.unwrap();
        assert!(!second.applied);

        let kc_owner = store.settlement_record(1, 10, 2024, 1).await.unwrap().unwrap();
        assert_eq!(kc_owner.weekly_high_bonus, Points::ONE);
        assert_eq!(kc_owner.lock_bonus, Points::ONE);
        assert_eq!(kc_owner.total_points, Points::TWO);

        let nyj_owner = store.settlement_record(2, 10, 2024, 1).await.unwrap().unwrap();
        assert_eq!(nyj_owner.weekly_low_penalty, -Points::ONE);
        assert_eq!(nyj_owner.lock_and_load_bonus, -Points::ONE);
        assert_eq!(nyj_owner.total_points, Points::from(-2));

        let performances = store.team_performances(2024, 1).await.unwrap();
        assert_eq!(performances.len(), 4);
        assert!(performances.iter().any(|p| p.team == "KC" && p.is_weekly_high));
    }

    #[tokio::test]
    async fn test_unfinished_game_fails_whole_week() {
        let (store, finalizer) = setup(StaticLockBook::new());
        let mut pending = game(2, "NYJ", "SF", 0, 0);
        pending.completed = false;

        let games = [game(1, "KC", "BAL", 41, 20), pending];
        assert!(finalizer.finalize_league(10, 2024, 1, &games).await.is_err());
        assert!(!store.is_week_finalized(10, 2024, 1).await.unwrap());
        assert!(store.week_records(10, 2024, 1).await.unwrap().is_empty());
    }
}
