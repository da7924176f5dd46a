//! End-to-end season replays: SimulationClock driving SettlementService on the in-memory store

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use persistence::{InMemoryStore, SettlementStore};
use scoring_engine::{LockKind, Ownership, Points, ScheduledGame, ScoringRules, SettlementRecord, Week};
use settlement_service::{
    FileScoreProvider, ScoreEntry, SettlementEvent, SettlementService, StaticLockBook, StaticOwnership,
};

use crate::{ClockConfig, SimulationClock};

const LEAGUE: i64 = 7;

struct Season {
    store: Arc<InMemoryStore>,
    scores: Arc<FileScoreProvider>,
    clock: Arc<SimulationClock>,
}

fn sunday(week: Week) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 8, 17, 0, 0).unwrap() + chrono::Duration::weeks((week - 1) as i64)
}

fn scheduled(week: Week, home: &str, away: &str) -> ScheduledGame {
    ScheduledGame {
        season: 2024,
        week,
        scheduled_time: sunday(week),
        home_team: home.to_string(),
        away_team: away.to_string(),
    }
}

fn final_score(week: Week, home: &str, away: &str, home_score: i32, away_score: i32) -> ScoreEntry {
    ScoreEntry {
        date: sunday(week).date_naive(),
        away_team: away.to_string(),
        home_team: home.to_string(),
        away_score,
        home_score,
    }
}

/// Two participants, four teams, two weeks on the schedule.
/// Participant 1 owns KC and GB; participant 2 owns BAL and PHI.
async fn two_week_season(report_all_scores: bool) -> Season {
    let store = Arc::new(InMemoryStore::new());
    let scores = Arc::new(FileScoreProvider::new());
    let locks = Arc::new(StaticLockBook::new());
    let ownership = StaticOwnership::from_rows(
        [("KC", 1), ("GB", 1), ("BAL", 2), ("PHI", 2)].into_iter().map(|(team, participant_id)| Ownership {
            team: team.to_string(),
            participant_id,
            league_id: LEAGUE,
        }),
    );
    locks.declare(1, LEAGUE, 2024, 1, LockKind::Lock, "KC").unwrap();

    let settlement = SettlementService::new(
        store.clone(),
        scores.clone(),
        Arc::new(ownership),
        locks,
        ScoringRules::default(),
    )
    .unwrap();
    settlement
        .games()
        .import_schedule(&[
            scheduled(1, "KC", "BAL"),
            scheduled(1, "PHI", "GB"),
            scheduled(2, "KC", "BAL"),
            scheduled(2, "GB", "PHI"),
        ])
        .await
        .unwrap();

    scores.insert(final_score(1, "KC", "BAL", 27, 20));
    if report_all_scores {
        scores.insert(final_score(1, "PHI", "GB", 34, 0));
    }
    scores.insert(final_score(2, "KC", "BAL", 20, 20));
    scores.insert(final_score(2, "GB", "PHI", 13, 10));

    let config = ClockConfig { tick_cadence_ms: 10, ..ClockConfig::default() };
    let clock = Arc::new(SimulationClock::new(Arc::new(settlement), config).unwrap());

    Season { store, scores, clock }
}

impl Season {
    async fn record(&self, participant_id: i64, week: Week) -> SettlementRecord {
        self.store
            .settlement_record(participant_id, LEAGUE, 2024, week)
            .await
            .unwrap()
            .unwrap_or_else(|| SettlementRecord::empty(participant_id, LEAGUE, 2024, week))
    }

    async fn finalized(&self, week: Week) -> bool {
        self.store.is_week_finalized(LEAGUE, 2024, week).await.unwrap()
    }

    async fn advance_to(&self, date: NaiveDate) {
        while self.clock.get_state().current_date < date {
            self.clock.advance_day().await.unwrap();
        }
    }

    async fn skins_outcomes(&self) -> Vec<(Week, Option<i64>, i32, bool)> {
        self.store
            .skins_history(LEAGUE, 2024)
            .await
            .unwrap()
            .into_iter()
            .map(|a| (a.week, a.winner, a.pot_size, a.is_tie))
            .collect()
    }
}

#[tokio::test]
async fn test_day_by_day_settles_week_when_last_game_final() {
    let season = two_week_season(true).await;
    let mut events = season.clock.settlement().broadcaster().subscribe().await;

    season.advance_to(NaiveDate::from_ymd_opt(2024, 9, 7).unwrap()).await;
    assert!(!season.finalized(1).await);
    assert_eq!(season.record(1, 1).await.total_points, Points::ZERO);

    let day = season.clock.advance_day().await.unwrap();
    assert_eq!(day.new_date, NaiveDate::from_ymd_opt(2024, 9, 8).unwrap());
    assert_eq!(day.games_processed, 2);
    assert_eq!(day.report.settled.len(), 1);
    assert!(season.finalized(1).await);

    let p1 = season.record(1, 1).await;
    assert_eq!(p1.base_points, Points::ONE);
    assert_eq!(p1.lock_bonus, Points::ONE);

    let p2 = season.record(2, 1).await;
    assert_eq!(p2.base_points, Points::TWO);
    assert_eq!(p2.weekly_high_bonus, Points::ONE);
    assert_eq!(p2.total_points, p2.components_sum());

    let award = season.store.skins_award(LEAGUE, 2024, 1).await.unwrap().unwrap();
    assert_eq!(award.winner, Some(2));
    assert_eq!(award.pot_size, 1);
    assert_eq!(award.awarded_at, Some(season.clock.now()));

    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        names.push(event.name());
    }
    assert_eq!(names.iter().filter(|n| **n == "week_settled").count(), 1);
    assert_eq!(names.iter().filter(|n| **n == "skins_awarded").count(), 1);
    assert_eq!(names.iter().filter(|n| **n == "day_advanced").count(), 3);
    assert_eq!(names.last(), Some(&"day_advanced"));
}

#[tokio::test]
async fn test_day_advanced_event_payload() {
    let season = two_week_season(true).await;
    let mut events = season.clock.settlement().broadcaster().subscribe().await;

    season.clock.advance_day().await.unwrap();

    let event = events.recv().await.unwrap();
    assert_eq!(
        event,
        SettlementEvent::DayAdvanced {
            new_date: NaiveDate::from_ymd_opt(2024, 9, 6).unwrap(),
            games_processed: 0,
            current_week: 1,
        }
    );
}

#[tokio::test]
async fn test_jump_to_week_settles_every_passed_week() {
    let season = two_week_season(true).await;

    let advance = season.clock.jump_to_week(3).await.unwrap();
    assert_eq!(advance.current_week, 3);
    assert_eq!(advance.report.ingest.completed, 4);
    assert_eq!(season.clock.get_state().current_week, 3);

    assert!(season.finalized(1).await);
    assert!(season.finalized(2).await);

    let p1 = season.record(1, 2).await;
    assert_eq!(p1.base_points, Points::new(15, 1));
    assert_eq!(p1.weekly_high_bonus, Points::ONE);

    let outcomes = season.skins_outcomes().await;
    assert_eq!(outcomes, vec![(1, Some(2), 1, false), (2, Some(1), 1, false)]);
}

#[tokio::test]
async fn test_week_waits_for_missing_final_score() {
    let season = two_week_season(false).await;

    season.advance_to(NaiveDate::from_ymd_opt(2024, 9, 13).unwrap()).await;
    assert_eq!(season.clock.get_state().current_week, 2);
    assert!(!season.finalized(1).await);
    assert!(season.store.skins_award(LEAGUE, 2024, 1).await.unwrap().is_none());
    assert_eq!(season.record(1, 1).await.base_points, Points::ONE);

    season.scores.insert(final_score(1, "PHI", "GB", 34, 0));
    assert!(season.clock.recompute_week(2024, 1).await.is_err());

    // Only a pending pass re-fetches games from past days
    season.clock.start().unwrap();
    let tick = season.clock.tick_elapsed(Duration::from_millis(1)).await.unwrap();
    assert_eq!(tick.report.ingest.completed, 1);
    assert!(season.finalized(1).await);
    assert_eq!(season.record(2, 1).await.base_points, Points::TWO);
}

#[tokio::test]
async fn test_continuous_ticks_cross_week_boundary() {
    let season = two_week_season(true).await;
    season.clock.set_speed(86_400.0).unwrap();
    season.clock.start().unwrap();

    let advance = season.clock.tick_elapsed(Duration::from_secs(7)).await.unwrap();

    assert_eq!(advance.current_week, 2);
    assert_eq!(advance.now, Utc.with_ymd_and_hms(2024, 9, 12, 0, 0, 0).unwrap());
    assert_eq!(advance.report.settled.len(), 1);
    assert!(advance.transition_settlements.is_empty());
    assert!(season.finalized(1).await);
    assert!(!season.finalized(2).await);
    assert_eq!(season.clock.get_metrics().weeks_settled, 1);
}

#[tokio::test]
async fn test_recompute_is_idempotent() {
    let season = two_week_season(true).await;
    season.clock.jump_to_week(2).await.unwrap();

    let before = season.store.season_records(LEAGUE, 2024).await.unwrap();
    let skins_before = season.skins_outcomes().await;

    let settlement = season.clock.recompute_week(2024, 1).await.unwrap();
    assert!(!settlement.applied());
    let settlement = season.clock.recompute_week(2024, 1).await.unwrap();
    assert!(!settlement.applied());

    assert_eq!(season.store.season_records(LEAGUE, 2024).await.unwrap(), before);
    assert_eq!(season.skins_outcomes().await, skins_before);
}

#[tokio::test]
async fn test_reset_then_replay_is_deterministic() {
    let season = two_week_season(true).await;

    season.clock.jump_to_week(3).await.unwrap();
    let records = season.store.season_records(LEAGUE, 2024).await.unwrap();
    let skins = season.skins_outcomes().await;
    assert!(!records.is_empty());

    let summary = season.clock.reset(true).await.unwrap();
    assert_eq!(summary.games_cleared, 4);
    assert_eq!(summary.skins_awards, 2);

    let state = season.clock.get_state();
    assert_eq!(state.current_week, 1);
    assert!(!state.running);
    assert!(season.store.season_records(LEAGUE, 2024).await.unwrap().is_empty());
    assert!(!season.finalized(1).await);

    // Replay day by day instead of jumping; settled state must match
    season.advance_to(NaiveDate::from_ymd_opt(2024, 9, 19).unwrap()).await;

    assert_eq!(season.store.season_records(LEAGUE, 2024).await.unwrap(), records);
    assert_eq!(season.skins_outcomes().await, skins);
}

/// Week 1 opens on the clock's start date and week 2 opens on a week boundary
async fn opener_season() -> (Arc<InMemoryStore>, Arc<SettlementService>) {
    let store = Arc::new(InMemoryStore::new());
    let scores = Arc::new(FileScoreProvider::new());
    let ownership = StaticOwnership::from_rows([
        Ownership { team: "KC".to_string(), participant_id: 1, league_id: LEAGUE },
        Ownership { team: "BAL".to_string(), participant_id: 2, league_id: LEAGUE },
    ]);
    let settlement = SettlementService::new(
        store.clone(),
        scores.clone(),
        Arc::new(ownership),
        Arc::new(StaticLockBook::new()),
        ScoringRules::default(),
    )
    .unwrap();

    let opener = Utc.with_ymd_and_hms(2024, 9, 5, 20, 0, 0).unwrap();
    let rematch = Utc.with_ymd_and_hms(2024, 9, 12, 20, 0, 0).unwrap();
    settlement
        .games()
        .import_schedule(&[
            ScheduledGame {
                season: 2024,
                week: 1,
                scheduled_time: opener,
                home_team: "KC".to_string(),
                away_team: "BAL".to_string(),
            },
            ScheduledGame {
                season: 2024,
                week: 2,
                scheduled_time: rematch,
                home_team: "BAL".to_string(),
                away_team: "KC".to_string(),
            },
        ])
        .await
        .unwrap();

    for (kickoff, home, away) in [(opener, "KC", "BAL"), (rematch, "BAL", "KC")] {
        scores.insert(ScoreEntry {
            date: kickoff.date_naive(),
            away_team: away.to_string(),
            home_team: home.to_string(),
            away_score: 20,
            home_score: 27,
        });
    }

    (store, Arc::new(settlement))
}

#[tokio::test]
async fn test_day_advance_covers_the_start_date() {
    let (store, settlement) = opener_season().await;
    let clock = SimulationClock::new(settlement, ClockConfig::default()).unwrap();

    let day = clock.advance_day().await.unwrap();
    assert_eq!(day.new_date, NaiveDate::from_ymd_opt(2024, 9, 6).unwrap());
    assert_eq!(day.games_processed, 1);
    assert_eq!(day.report.settled.len(), 1);
    assert!(store.is_week_finalized(LEAGUE, 2024, 1).await.unwrap());
    assert_eq!(clock.get_state().processed_through, day.new_date);

    let day = clock.advance_day().await.unwrap();
    assert_eq!(day.games_processed, 0);
}

#[tokio::test]
async fn test_day_advance_after_jump_covers_week_opening_day() {
    let (store, settlement) = opener_season().await;
    let clock = SimulationClock::new(settlement, ClockConfig::default()).unwrap();

    clock.jump_to_week(2).await.unwrap();
    assert!(store.is_week_finalized(LEAGUE, 2024, 1).await.unwrap());
    assert!(!store.is_week_finalized(LEAGUE, 2024, 2).await.unwrap());

    let day = clock.advance_day().await.unwrap();
    assert_eq!(day.new_date, NaiveDate::from_ymd_opt(2024, 9, 13).unwrap());
    assert_eq!(day.games_processed, 1);
    assert!(store.is_week_finalized(LEAGUE, 2024, 2).await.unwrap());

    let record = store.settlement_record(2, LEAGUE, 2024, 2).await.unwrap().unwrap();
    assert_eq!(record.base_points, Points::ONE);
}

#[tokio::test]
async fn test_clock_resumes_from_saved_position() {
    let (store, settlement) = opener_season().await;
    let config = ClockConfig::default();

    let clock = SimulationClock::restore(settlement.clone(), config.clone()).await.unwrap();
    assert_eq!(clock.now(), config.season_start);
    clock.advance_day().await.unwrap();
    clock.advance_day().await.unwrap();
    clock.set_speed(60.0).unwrap();
    clock.save_position().await.unwrap();
    let saved = clock.get_state();
    drop(clock);

    let resumed = SimulationClock::restore(settlement, config).await.unwrap();
    let state = resumed.get_state();
    assert_eq!(state.current_time, saved.current_time);
    assert_eq!(state.current_date, NaiveDate::from_ymd_opt(2024, 9, 7).unwrap());
    assert_eq!(state.processed_through, saved.processed_through);
    assert_eq!(state.acceleration_factor, 60.0);
    assert!(!state.running);

    let day = resumed.advance_day().await.unwrap();
    assert_eq!(day.new_date, NaiveDate::from_ymd_opt(2024, 9, 8).unwrap());
    assert_eq!(store.load_clock(2024).await.unwrap().unwrap().processed_through, day.new_date);
}
