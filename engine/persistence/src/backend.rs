//! Settlement store trait and the in-memory implementation

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, NaiveDate, Utc};
use scoring_engine::{
    Contribution, FinalScore, Game, GameId, LeagueId, ParticipantId, Points, ScheduledGame,
    Season, SettlementRecord, SkinsAward, TeamCode, TeamWeekPerformance, Week,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{PersistenceError, Result};

/// Result of a week's standings as handed to the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkinsOutcome {
    /// Single holder of the week's maximum
    Winner { participant_id: ParticipantId, score: Points },
    /// Several holders tied at the maximum
    Tie { score: Points },
}

/// Rows removed by a season reset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetSummary {
    pub games_cleared: u64,
    pub settlement_records: u64,
    pub skins_awards: u64,
    pub team_performances: u64,
    pub finalizations: u64,
}

/// Saved position of a season's simulation clock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockPosition {
    pub season: Season,
    pub simulated_time: DateTime<Utc>,
    /// Last date whose games a day advance has fully covered
    pub processed_through: NaiveDate,
    pub acceleration_factor: f64,
}

/// Storage contract for the settlement engine.
///
/// Every method is one unit of work: it either lands completely or not at all.
#[async_trait::async_trait]
pub trait SettlementStore: Send + Sync {
    /// Insert schedule entries, skipping games already present. Returns the number inserted.
    async fn import_games(&self, games: &[ScheduledGame]) -> Result<usize>;

    /// All games of a week, ordered by kickoff
    async fn games_for_week(&self, season: Season, week: Week) -> Result<Vec<Game>>;

    /// Uncompleted games whose kickoff is at or before `as_of`, ordered by kickoff
    async fn pending_games(&self, season: Season, as_of: DateTime<Utc>) -> Result<Vec<Game>>;

    /// Games whose kickoff falls on `date` (UTC)
    async fn games_on_date(&self, season: Season, date: NaiveDate) -> Result<Vec<Game>>;

    /// Distinct weeks on the season's schedule, ascending
    async fn season_weeks(&self, season: Season) -> Result<Vec<Week>>;

    /// Record a final score together with every owner's base-point contribution.
    ///
    /// Returns `false` without applying anything when the game was already completed.
    async fn complete_game(
        &self,
        game_id: GameId,
        score: FinalScore,
        contributions: &[Contribution],
    ) -> Result<bool>;

    /// Additive upsert of one ledger component
    async fn apply_contribution(&self, contribution: &Contribution) -> Result<()>;

    async fn settlement_record(
        &self,
        participant_id: ParticipantId,
        league_id: LeagueId,
        season: Season,
        week: Week,
    ) -> Result<Option<SettlementRecord>>;

    /// Records of one league week, ordered by participant
    async fn week_records(
        &self,
        league_id: LeagueId,
        season: Season,
        week: Week,
    ) -> Result<Vec<SettlementRecord>>;

    /// Records of one league season, ordered by week then participant
    async fn season_records(&self, league_id: LeagueId, season: Season) -> Result<Vec<SettlementRecord>>;

    async fn is_week_finalized(&self, league_id: LeagueId, season: Season, week: Week) -> Result<bool>;

    /// Apply a league week's single-shot bonuses and store the week's team performances.
    ///
    /// Returns `false` without applying anything when the week was already finalized
    /// or any record of the league week already carries weekly-high/low points.
    async fn finalize_week(
        &self,
        league_id: LeagueId,
        season: Season,
        week: Week,
        performances: &[TeamWeekPerformance],
        contributions: &[Contribution],
    ) -> Result<bool>;

    async fn team_performances(&self, season: Season, week: Week) -> Result<Vec<TeamWeekPerformance>>;

    /// Insert-or-skip a league week's skins row.
    ///
    /// Pot size is `1 + unresolved rollovers before this week`. An outright winner
    /// resolves those rollovers. Returns `None` when the row already existed.
    async fn record_skins(
        &self,
        league_id: LeagueId,
        season: Season,
        week: Week,
        outcome: SkinsOutcome,
        now: DateTime<Utc>,
    ) -> Result<Option<SkinsAward>>;

    async fn skins_award(&self, league_id: LeagueId, season: Season, week: Week) -> Result<Option<SkinsAward>>;

    /// Skins rows of one league season, ascending by week
    async fn skins_history(&self, league_id: LeagueId, season: Season) -> Result<Vec<SkinsAward>>;

    /// Clear every derived row for the season and wipe recorded scores
    async fn reset_season(&self, season: Season) -> Result<ResetSummary>;

    async fn load_clock(&self, season: Season) -> Result<Option<ClockPosition>>;

    /// Upsert the season's clock position
    async fn save_clock(&self, position: &ClockPosition) -> Result<()>;
}

type RecordKey = (LeagueId, Season, Week, ParticipantId);
type WeekKey = (LeagueId, Season, Week);

#[derive(Debug, Default)]
struct MemoryState {
    next_game_id: GameId,
    games: BTreeMap<GameId, Game>,
    records: BTreeMap<RecordKey, SettlementRecord>,
    performances: BTreeMap<(Season, Week, TeamCode), TeamWeekPerformance>,
    finalizations: BTreeSet<WeekKey>,
    skins: BTreeMap<WeekKey, SkinsAward>,
    clocks: BTreeMap<Season, ClockPosition>,
}

impl MemoryState {
    fn apply(&mut self, c: &Contribution) {
        self.records
            .entry((c.league_id, c.season, c.week, c.participant_id))
            .or_insert_with(|| SettlementRecord::empty(c.participant_id, c.league_id, c.season, c.week))
            .apply(c.component, c.amount);
    }

    fn sorted_games(&self, filter: impl Fn(&Game) -> bool) -> Vec<Game> {
        let mut games: Vec<Game> = self.games.values().filter(|g| filter(g)).cloned().collect();
        games.sort_by(|a, b| a.scheduled_time.cmp(&b.scheduled_time).then(a.id.cmp(&b.id)));
        games
    }
}

/// In-memory settlement store (for testing and local simulation).
///
/// A single mutex serializes every operation, which makes each call atomic.
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
    fail_next_write: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState { next_game_id: 1, ..Default::default() }),
            fail_next_write: AtomicBool::new(false),
        }
    }

    /// Make the next mutating call fail before it touches any state
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(PersistenceError::write_failed("injected write failure"));
        }
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SettlementStore for InMemoryStore {
    async fn import_games(&self, games: &[ScheduledGame]) -> Result<usize> {
        self.check_write()?;
        let mut state = self.state.lock().await;

        let mut inserted = 0;
        for scheduled in games {
            let exists = state.games.values().any(|g| {
                g.season == scheduled.season
                    && g.week == scheduled.week
                    && g.home_team == scheduled.home_team
                    && g.away_team == scheduled.away_team
            });
            if exists {
                continue;
            }

            let id = state.next_game_id;
            state.next_game_id += 1;
            state.games.insert(
                id,
                Game {
                    id,
                    season: scheduled.season,
                    week: scheduled.week,
                    scheduled_time: scheduled.scheduled_time,
                    home_team: scheduled.home_team.clone(),
                    away_team: scheduled.away_team.clone(),
                    home_score: None,
                    away_score: None,
                    completed: false,
                },
            );
            inserted += 1;
        }

        Ok(inserted)
    }

    async fn games_for_week(&self, season: Season, week: Week) -> Result<Vec<Game>> {
        let state = self.state.lock().await;
        Ok(state.sorted_games(|g| g.season == season && g.week == week))
    }

    async fn pending_games(&self, season: Season, as_of: DateTime<Utc>) -> Result<Vec<Game>> {
        let state = self.state.lock().await;
        Ok(state.sorted_games(|g| g.season == season && !g.completed && g.scheduled_time <= as_of))
    }

    async fn games_on_date(&self, season: Season, date: NaiveDate) -> Result<Vec<Game>> {
        let state = self.state.lock().await;
        Ok(state.sorted_games(|g| g.season == season && g.scheduled_time.date_naive() == date))
    }

    async fn season_weeks(&self, season: Season) -> Result<Vec<Week>> {
        let state = self.state.lock().await;
        let weeks: BTreeSet<Week> =
            state.games.values().filter(|g| g.season == season).map(|g| g.week).collect();
        Ok(weeks.into_iter().collect())
    }

    async fn complete_game(
        &self,
        game_id: GameId,
        score: FinalScore,
        contributions: &[Contribution],
    ) -> Result<bool> {
        self.check_write()?;
        let mut state = self.state.lock().await;

        let game = state
            .games
            .get_mut(&game_id)
            .ok_or_else(|| PersistenceError::not_found(format!("game {game_id}")))?;
        if game.completed {
            return Ok(false);
        }

        game.home_score = Some(score.home_score);
        game.away_score = Some(score.away_score);
        game.completed = true;

        for contribution in contributions {
            state.apply(contribution);
        }
        Ok(true)
    }

    async fn apply_contribution(&self, contribution: &Contribution) -> Result<()> {
        self.check_write()?;
        self.state.lock().await.apply(contribution);
        Ok(())
    }

    async fn settlement_record(
        &self,
        participant_id: ParticipantId,
        league_id: LeagueId,
        season: Season,
        week: Week,
    ) -> Result<Option<SettlementRecord>> {
        let state = self.state.lock().await;
        Ok(state.records.get(&(league_id, season, week, participant_id)).cloned())
    }

    async fn week_records(
        &self,
        league_id: LeagueId,
        season: Season,
        week: Week,
    ) -> Result<Vec<SettlementRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .records
            .range((league_id, season, week, ParticipantId::MIN)..=(league_id, season, week, ParticipantId::MAX))
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn season_records(&self, league_id: LeagueId, season: Season) -> Result<Vec<SettlementRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .records
            .range(
                (league_id, season, Week::MIN, ParticipantId::MIN)
                    ..=(league_id, season, Week::MAX, ParticipantId::MAX),
            )
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn is_week_finalized(&self, league_id: LeagueId, season: Season, week: Week) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state.finalizations.contains(&(league_id, season, week)))
    }

    async fn finalize_week(
        &self,
        league_id: LeagueId,
        season: Season,
        week: Week,
        performances: &[TeamWeekPerformance],
        contributions: &[Contribution],
    ) -> Result<bool> {
        self.check_write()?;
        let mut state = self.state.lock().await;

        if state.finalizations.contains(&(league_id, season, week)) {
            return Ok(false);
        }
        let extremes_applied = state
            .records
            .values()
            .any(|r| r.league_id == league_id && r.season == season && r.week == week && r.has_weekly_extremes());
        if extremes_applied {
            return Ok(false);
        }

        for performance in performances {
            state.performances.insert(
                (performance.season, performance.week, performance.team.clone()),
                performance.clone(),
            );
        }
        for contribution in contributions {
            state.apply(contribution);
        }
        state.finalizations.insert((league_id, season, week));
        Ok(true)
    }

    async fn team_performances(&self, season: Season, week: Week) -> Result<Vec<TeamWeekPerformance>> {
        let state = self.state.lock().await;
        Ok(state
            .performances
            .values()
            .filter(|p| p.season == season && p.week == week)
            .cloned()
            .collect())
    }

    async fn record_skins(
        &self,
        league_id: LeagueId,
        season: Season,
        week: Week,
        outcome: SkinsOutcome,
        now: DateTime<Utc>,
    ) -> Result<Option<SkinsAward>> {
        self.check_write()?;
        let mut state = self.state.lock().await;

        if state.skins.contains_key(&(league_id, season, week)) {
            return Ok(None);
        }

        let unresolved = state
            .skins
            .values()
            .filter(|a| a.league_id == league_id && a.season == season && a.week < week)
            .filter(|a| a.is_unresolved_rollover())
            .count() as i32;

        let award = match outcome {
            SkinsOutcome::Winner { participant_id, score } => {
                for prior in state.skins.values_mut() {
                    if prior.league_id == league_id
                        && prior.season == season
                        && prior.week < week
                        && prior.is_unresolved_rollover()
                    {
                        prior.resolved_in_week = Some(week);
                    }
                }
                SkinsAward {
                    league_id,
                    season,
                    week,
                    winner: Some(participant_id),
                    winning_score: score,
                    pot_size: 1 + unresolved,
                    is_tie: false,
                    is_rollover: false,
                    awarded_at: Some(now),
                    resolved_in_week: None,
                }
            }
            SkinsOutcome::Tie { score } => SkinsAward {
                league_id,
                season,
                week,
                winner: None,
                winning_score: score,
                pot_size: 1 + unresolved,
                is_tie: true,
                is_rollover: true,
                awarded_at: None,
                resolved_in_week: None,
            },
        };

        state.skins.insert((league_id, season, week), award.clone());
        Ok(Some(award))
    }

    async fn skins_award(&self, league_id: LeagueId, season: Season, week: Week) -> Result<Option<SkinsAward>> {
        let state = self.state.lock().await;
        Ok(state.skins.get(&(league_id, season, week)).cloned())
    }

    async fn skins_history(&self, league_id: LeagueId, season: Season) -> Result<Vec<SkinsAward>> {
        let state = self.state.lock().await;
        Ok(state
            .skins
            .range((league_id, season, Week::MIN)..=(league_id, season, Week::MAX))
            .map(|(_, a)| a.clone())
            .collect())
    }

    async fn reset_season(&self, season: Season) -> Result<ResetSummary> {
        self.check_write()?;
        let mut state = self.state.lock().await;
        let mut summary = ResetSummary::default();

        for game in state.games.values_mut().filter(|g| g.season == season) {
            if game.completed || game.home_score.is_some() {
                summary.games_cleared += 1;
            }
            game.home_score = None;
            game.away_score = None;
            game.completed = false;
        }

        let before = state.records.len();
        state.records.retain(|(_, s, _, _), _| *s != season);
        summary.settlement_records = (before - state.records.len()) as u64;

        let before = state.skins.len();
        state.skins.retain(|(_, s, _), _| *s != season);
        summary.skins_awards = (before - state.skins.len()) as u64;

        let before = state.performances.len();
        state.performances.retain(|(s, _, _), _| *s != season);
        summary.team_performances = (before - state.performances.len()) as u64;

        let before = state.finalizations.len();
        state.finalizations.retain(|(_, s, _)| *s != season);
        summary.finalizations = (before - state.finalizations.len()) as u64;

        Ok(summary)
    }

    async fn load_clock(&self, season: Season) -> Result<Option<ClockPosition>> {
        let state = self.state.lock().await;
        Ok(state.clocks.get(&season).cloned())
    }

    async fn save_clock(&self, position: &ClockPosition) -> Result<()> {
        self.check_write()?;
        self.state.lock().await.clocks.insert(position.season, position.clone());
        Ok(())
    }
}
