//! Game result ledger: schedule import and final score ingestion

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use persistence::SettlementStore;
use scoring_engine::{
    Contribution, FinalScore, Game, PointComponent, PointsCalculator, ScheduledGame, Season, Week,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::providers::{OwnershipResolver, ScoreProvider};

/// What happened to one game during ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameIngest {
    /// Score recorded and base points attributed
    Completed,
    /// Provider has no final score yet
    Unavailable,
    /// Another trigger completed the game first
    AlreadyCompleted,
}

/// Summary of one ingestion pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub completed: usize,
    pub unavailable: usize,
    pub failed: usize,
    /// Weeks that gained a completed game in this pass
    pub weeks_touched: BTreeSet<(Season, Week)>,
}

impl IngestReport {
    pub fn attempted(&self) -> usize {
        self.completed + self.unavailable + self.failed
    }
}

pub struct GameLedger {
    store: Arc<dyn SettlementStore>,
    calculator: Arc<PointsCalculator>,
    scores: Arc<dyn ScoreProvider>,
    ownership: Arc<dyn OwnershipResolver>,
}

impl GameLedger {
    pub fn new(
        store: Arc<dyn SettlementStore>,
        calculator: Arc<PointsCalculator>,
        scores: Arc<dyn ScoreProvider>,
        ownership: Arc<dyn OwnershipResolver>,
    ) -> Self {
        Self { store, calculator, scores, ownership }
    }

    /// Insert schedule entries; games already on file are left untouched
    pub async fn import_schedule(&self, games: &[ScheduledGame]) -> Result<usize> {
        let inserted = self.store.import_games(games).await?;
        info!("Schedule import: {} new of {} games", inserted, games.len());
        Ok(inserted)
    }

    /// Import a JSON array of [`ScheduledGame`]
    pub async fn import_schedule_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let games: Vec<ScheduledGame> = serde_json::from_str(&content)?;
        self.import_schedule(&games).await
    }

    /// Ingest every uncompleted game that kicked off at or before `as_of`
    pub async fn ingest_pending(&self, season: Season, as_of: DateTime<Utc>) -> Result<IngestReport> {
        let games = self.store.pending_games(season, as_of).await?;
        Ok(self.ingest_all(&games).await)
    }

    /// Ingest the uncompleted games scheduled from `first` through `last` that kicked off at or before `as_of`
    pub async fn ingest_dates(
        &self,
        season: Season,
        first: NaiveDate,
        last: NaiveDate,
        as_of: DateTime<Utc>,
    ) -> Result<IngestReport> {
        let mut games = Vec::new();
        for date in first.iter_days().take_while(|d| *d <= last) {
            games.extend(
                self.store
                    .games_on_date(season, date)
                    .await?
                    .into_iter()
                    .filter(|g| !g.completed && g.scheduled_time <= as_of),
            );
        }
        Ok(self.ingest_all(&games).await)
    }

    /// Per-game failures are logged and counted; they never stop sibling games
    async fn ingest_all(&self, games: &[Game]) -> IngestReport {
        let mut report = IngestReport::default();
        for game in games {
            match self.ingest_game(game).await {
                Ok(GameIngest::Completed) => {
                    report.completed += 1;
                    report.weeks_touched.insert((game.season, game.week));
                }
                Ok(GameIngest::Unavailable) => report.unavailable += 1,
                Ok(GameIngest::AlreadyCompleted) => {
                    report.weeks_touched.insert((game.season, game.week));
                }
                Err(e) => {
                    warn!(game_id = game.id, "Failed to ingest {} @ {}: {}", game.away_team, game.home_team, e);
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Fetch a game's final score and record it with every owner's base points in one unit
    pub async fn ingest_game(&self, game: &Game) -> Result<GameIngest> {
        if game.completed {
            return Ok(GameIngest::AlreadyCompleted);
        }

        let date = game.scheduled_time.date_naive();
        let Some(score) = self.scores.final_score(date, &game.away_team, &game.home_team).await? else {
            debug!(game_id = game.id, "No final score yet for {} @ {}", game.away_team, game.home_team);
            return Ok(GameIngest::Unavailable);
        };

        let contributions = self.base_contributions(game, score).await?;
        if self.store.complete_game(game.id, score, &contributions).await? {
            info!(
                game_id = game.id,
                season = game.season,
                week = game.week,
                "Final {} {} @ {} {}",
                game.away_team,
                score.away_score,
                game.home_team,
                score.home_score
            );
            Ok(GameIngest::Completed)
        } else {
            debug!(game_id = game.id, "Game already completed, skipping");
            Ok(GameIngest::AlreadyCompleted)
        }
    }

    async fn base_contributions(&self, game: &Game, score: FinalScore) -> Result<Vec<Contribution>> {
        let finished = Game {
            home_score: Some(score.home_score),
            away_score: Some(score.away_score),
            completed: true,
            ..game.clone()
        };
        let Some(completed) = finished.completed_result() else {
            return Ok(Vec::new());
        };

        let leagues = self.ownership.leagues().await?;
        let mut contributions = Vec::new();
        for outcome in completed.outcomes() {
            let amount = self.calculator.base_points(&outcome);
            for &league_id in &leagues {
                for participant_id in self.ownership.owning_participants(outcome.team(), league_id).await? {
                    contributions.push(Contribution {
                        participant_id,
                        league_id,
                        season: game.season,
                        week: game.week,
                        component: PointComponent::Base,
                        amount,
                    });
                }
            }
        }
        Ok(contributions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{FileScoreProvider, ScoreEntry, StaticOwnership};
    use chrono::TimeZone;
    use persistence::InMemoryStore;
    use scoring_engine::{Ownership, Points, ScoringRules};

    struct Fixture {
        store: Arc<InMemoryStore>,
        scores: Arc<FileScoreProvider>,
        ledger: GameLedger,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let scores = Arc::new(FileScoreProvider::new());
        let ownership = StaticOwnership::from_rows([
            Ownership { team: "KC".to_string(), participant_id: 1, league_id: 10 },
            Ownership { team: "BAL".to_string(), participant_id: 2, league_id: 10 },
            Ownership { team: "KC".to_string(), participant_id: 3, league_id: 20 },
        ]);
        let ledger = GameLedger::new(
            store.clone(),
            Arc::new(PointsCalculator::new(ScoringRules::default())),
            scores.clone(),
            Arc::new(ownership),
        );
        Fixture { store, scores, ledger }
    }

    fn kickoff(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, day, 17, 0, 0).unwrap()
    }

    fn scheduled(day: u32, home: &str, away: &str) -> ScheduledGame {
        ScheduledGame {
            season: 2024,
            week: 1,
            scheduled_time: kickoff(day),
            home_team: home.to_string(),
            away_team: away.to_string(),
        }
    }

    fn final_score(day: u32, home: &str, away: &str, home_score: i32, away_score: i32) -> ScoreEntry {
        ScoreEntry {
            date: kickoff(day).date_naive(),
            away_team: away.to_string(),
            home_team: home.to_string(),
            away_score,
            home_score,
        }
    }

    #[tokio::test]
    async fn test_base_points_attributed_to_every_owner() {
        let f = fixture();
        f.ledger.import_schedule(&[scheduled(8, "KC", "BAL")]).await.unwrap();
        f.scores.insert(final_score(8, "KC", "BAL", 27, 20));

        let report = f.ledger.ingest_pending(2024, kickoff(9)).await.unwrap();
        assert_eq!(report.completed, 1);
        assert!(report.weeks_touched.contains(&(2024, 1)));

        let winner = f.store.settlement_record(1, 10, 2024, 1).await.unwrap().unwrap();
        assert_eq!(winner.base_points, Points::ONE);
        let loser = f.store.settlement_record(2, 10, 2024, 1).await.unwrap().unwrap();
        assert_eq!(loser.base_points, Points::ZERO);
        let other_league = f.store.settlement_record(3, 20, 2024, 1).await.unwrap().unwrap();
        assert_eq!(other_league.base_points, Points::ONE);
    }

    #[tokio::test]
    async fn test_unavailable_score_leaves_game_pending() {
        let f = fixture();
        f.ledger.import_schedule(&[scheduled(8, "KC", "BAL")]).await.unwrap();

        let report = f.ledger.ingest_pending(2024, kickoff(9)).await.unwrap();
        assert_eq!(report.unavailable, 1);
        assert_eq!(report.completed, 0);
        assert_eq!(f.store.pending_games(2024, kickoff(9)).await.unwrap().len(), 1);

        f.scores.insert(final_score(8, "KC", "BAL", 27, 20));
        let report = f.ledger.ingest_pending(2024, kickoff(9)).await.unwrap();
        assert_eq!(report.completed, 1);
    }

    #[tokio::test]
    async fn test_reingest_does_not_double_count() {
        let f = fixture();
        f.ledger.import_schedule(&[scheduled(8, "KC", "BAL")]).await.unwrap();
        f.scores.insert(final_score(8, "KC", "BAL", 47, 10));

        let game = f.store.games_for_week(2024, 1).await.unwrap().remove(0);
        assert_eq!(f.ledger.ingest_game(&game).await.unwrap(), GameIngest::Completed);
        assert_eq!(f.ledger.ingest_game(&game).await.unwrap(), GameIngest::AlreadyCompleted);

        let record = f.store.settlement_record(1, 10, 2024, 1).await.unwrap().unwrap();
        assert_eq!(record.base_points, Points::TWO);
    }

    #[tokio::test]
    async fn test_failed_game_is_isolated() {
        let f = fixture();
        f.ledger
            .import_schedule(&[scheduled(8, "KC", "BAL"), scheduled(8, "NYJ", "SF")])
            .await
            .unwrap();
        f.scores.insert(final_score(8, "KC", "BAL", 27, 20));
        f.scores.insert(final_score(8, "NYJ", "SF", 10, 13));

        f.store.fail_next_write();
        let report = f.ledger.ingest_pending(2024, kickoff(9)).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.completed, 1);
        assert_eq!(report.attempted(), 2);

        let report = f.ledger.ingest_pending(2024, kickoff(9)).await.unwrap();
        assert_eq!(report.completed, 1);
        assert!(f.store.pending_games(2024, kickoff(9)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_dates_only_touches_that_range() {
        let f = fixture();
        f.ledger
            .import_schedule(&[scheduled(7, "PHI", "GB"), scheduled(8, "KC", "BAL"), scheduled(9, "NYJ", "SF")])
            .await
            .unwrap();
        f.scores.insert(final_score(7, "PHI", "GB", 34, 29));
        f.scores.insert(final_score(8, "KC", "BAL", 27, 20));
        f.scores.insert(final_score(9, "NYJ", "SF", 10, 13));

        let report = f
            .ledger
            .ingest_dates(2024, kickoff(8).date_naive(), kickoff(9).date_naive(), kickoff(10))
            .await
            .unwrap();
        assert_eq!(report.completed, 2);
        assert_eq!(f.store.pending_games(2024, kickoff(10)).await.unwrap()[0].home_team, "PHI");

        let single = f
            .ledger
            .ingest_dates(2024, kickoff(7).date_naive(), kickoff(7).date_naive(), kickoff(10))
            .await
            .unwrap();
        assert_eq!(single.completed, 1);
    }
}
