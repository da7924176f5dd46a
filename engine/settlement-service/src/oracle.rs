//! Week completion relative to the simulated clock

use std::sync::Arc;

use chrono::{DateTime, Utc};
use persistence::SettlementStore;
use scoring_engine::{Game, Season, Week};

use crate::error::Result;

/// True iff there is at least one game and every game has finished by `as_of`
pub fn games_complete(games: &[Game], as_of: DateTime<Utc>) -> bool {
    !games.is_empty() && games.iter().all(|g| g.completed && g.scheduled_time <= as_of)
}

/// Gate for week finalization and skins settlement
#[derive(Clone)]
pub struct WeekCompletionOracle {
    store: Arc<dyn SettlementStore>,
}

impl WeekCompletionOracle {
    pub fn new(store: Arc<dyn SettlementStore>) -> Self {
        Self { store }
    }

    /// A week with no games is never complete
    pub async fn is_complete(&self, season: Season, week: Week, as_of: DateTime<Utc>) -> Result<bool> {
        let games = self.store.games_for_week(season, week).await?;
        Ok(games_complete(&games, as_of))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn game(id: i64, completed: bool, kickoff: DateTime<Utc>) -> Game {
        Game {
            id,
            season: 2024,
            week: 1,
            scheduled_time: kickoff,
            home_team: format!("H{id}"),
            away_team: format!("A{id}"),
            home_score: completed.then_some(10),
            away_score: completed.then_some(7),
            completed,
        }
    }

    #[test]
    fn test_empty_week_is_not_complete() {
        assert!(!games_complete(&[], Utc::now()));
    }

    #[test]
    fn test_all_games_must_be_completed() {
        let kickoff = Utc.with_ymd_and_hms(2024, 9, 8, 17, 0, 0).unwrap();
        let later = kickoff + Duration::days(1);

        assert!(games_complete(&[game(1, true, kickoff), game(2, true, kickoff)], later));
        assert!(!games_complete(&[game(1, true, kickoff), game(2, false, kickoff)], later));
    }

    #[test]
    fn test_games_ahead_of_clock_block_completion() {
        let kickoff = Utc.with_ymd_and_hms(2024, 9, 8, 17, 0, 0).unwrap();
        let before = kickoff - Duration::hours(1);

        assert!(!games_complete(&[game(1, true, kickoff)], before));
        assert!(games_complete(&[game(1, true, kickoff)], kickoff));
    }
}
