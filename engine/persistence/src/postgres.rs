//! PostgreSQL settlement store

use chrono::{DateTime, NaiveDate, Utc};
use scoring_engine::{
    Contribution, FinalScore, Game, GameId, LeagueId, ParticipantId, Points, ScheduledGame,
    Season, SettlementRecord, SkinsAward, TeamWeekPerformance, Week,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgExecutor, PgPool};
use tracing::{debug, info};

use crate::backend::{ClockPosition, ResetSummary, SettlementStore, SkinsOutcome};
use crate::config::DatabaseConfig;
use crate::error::{PersistenceError, Result};

const GAME_COLUMNS: &str =
    "id, season, week, scheduled_time, home_team, away_team, home_score, away_score, completed";
const RECORD_COLUMNS: &str = "participant_id, league_id, season, week, base_points, lock_bonus, \
     lock_and_load_bonus, weekly_high_bonus, weekly_low_penalty, total_points";
const SKINS_COLUMNS: &str = "league_id, season, week, winner, winning_score, pot_size, is_tie, \
     is_rollover, awarded_at, resolved_in_week";

#[derive(FromRow)]
struct GameRow {
    id: i64,
    season: i32,
    week: i32,
    scheduled_time: DateTime<Utc>,
    home_team: String,
    away_team: String,
    home_score: Option<i32>,
    away_score: Option<i32>,
    completed: bool,
}

impl From<GameRow> for Game {
    fn from(row: GameRow) -> Self {
        Game {
            id: row.id,
            season: row.season,
            week: row.week,
            scheduled_time: row.scheduled_time,
            home_team: row.home_team,
            away_team: row.away_team,
            home_score: row.home_score,
            away_score: row.away_score,
            completed: row.completed,
        }
    }
}

#[derive(FromRow)]
struct RecordRow {
    participant_id: i64,
    league_id: i64,
    season: i32,
    week: i32,
    base_points: Points,
    lock_bonus: Points,
    lock_and_load_bonus: Points,
    weekly_high_bonus: Points,
    weekly_low_penalty: Points,
    total_points: Points,
}

impl From<RecordRow> for SettlementRecord {
    fn from(row: RecordRow) -> Self {
        SettlementRecord {
            participant_id: row.participant_id,
            league_id: row.league_id,
            season: row.season,
            week: row.week,
            base_points: row.base_points,
            lock_bonus: row.lock_bonus,
            lock_and_load_bonus: row.lock_and_load_bonus,
            weekly_high_bonus: row.weekly_high_bonus,
            weekly_low_penalty: row.weekly_low_penalty,
            total_points: row.total_points,
        }
    }
}

#[derive(FromRow)]
struct PerformanceRow {
    team: String,
    season: i32,
    week: i32,
    score: i32,
    opponent_score: i32,
    is_win: bool,
    is_tie: bool,
    is_blowout: bool,
    is_shutout: bool,
    is_weekly_high: bool,
    is_weekly_low: bool,
}

impl From<PerformanceRow> for TeamWeekPerformance {
    fn from(row: PerformanceRow) -> Self {
        TeamWeekPerformance {
            team: row.team,
            season: row.season,
            week: row.week,
            score: row.score,
            opponent_score: row.opponent_score,
            is_win: row.is_win,
            is_tie: row.is_tie,
            is_blowout: row.is_blowout,
            is_shutout: row.is_shutout,
            is_weekly_high: row.is_weekly_high,
            is_weekly_low: row.is_weekly_low,
        }
    }
}

#[derive(FromRow)]
struct SkinsRow {
    league_id: i64,
    season: i32,
    week: i32,
    winner: Option<i64>,
    winning_score: Points,
    pot_size: i32,
    is_tie: bool,
    is_rollover: bool,
    awarded_at: Option<DateTime<Utc>>,
    resolved_in_week: Option<i32>,
}

#[derive(FromRow)]
struct ClockRow {
    season: i32,
    simulated_time: DateTime<Utc>,
    processed_through: NaiveDate,
    acceleration_factor: f64,
}

impl From<ClockRow> for ClockPosition {
    fn from(row: ClockRow) -> Self {
        ClockPosition {
            season: row.season,
            simulated_time: row.simulated_time,
            processed_through: row.processed_through,
            acceleration_factor: row.acceleration_factor,
        }
    }
}

impl From<SkinsRow> for SkinsAward {
    fn from(row: SkinsRow) -> Self {
        SkinsAward {
            league_id: row.league_id,
            season: row.season,
            week: row.week,
            winner: row.winner,
            winning_score: row.winning_score,
            pot_size: row.pot_size,
            is_tie: row.is_tie,
            is_rollover: row.is_rollover,
            awarded_at: row.awarded_at,
            resolved_in_week: row.resolved_in_week,
        }
    }
}

/// Additive upsert of one component, keeping the total in step
async fn upsert_contribution<'e, E: PgExecutor<'e>>(executor: E, c: &Contribution) -> Result<()> {
    let column = c.component.column();
    let sql = format!(
        "INSERT INTO settlement_records (participant_id, league_id, season, week, {column}, total_points) \
         VALUES ($1, $2, $3, $4, $5, $5) \
         ON CONFLICT (participant_id, league_id, season, week) DO UPDATE SET \
         {column} = settlement_records.{column} + EXCLUDED.{column}, \
         total_points = settlement_records.total_points + EXCLUDED.total_points"
    );

    sqlx::query(&sql)
        .bind(c.participant_id)
        .bind(c.league_id)
        .bind(c.season)
        .bind(c.week)
        .bind(c.amount)
        .execute(executor)
        .await?;
    Ok(())
}

/// Settlement store backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and, optionally, apply the bundled migrations
    pub async fn connect(config: &DatabaseConfig, run_migrations: bool) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;

        if run_migrations {
            sqlx::migrate!("./migrations").run(&pool).await?;
            info!("Settlement schema migrations applied");
        }

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_games(&self, filter: &str, season: Season, arg: GameFilterArg) -> Result<Vec<Game>> {
        let sql = format!(
            "SELECT {GAME_COLUMNS} FROM games WHERE season = $1 AND {filter} ORDER BY scheduled_time, id"
        );
        let query = sqlx::query_as::<_, GameRow>(&sql).bind(season);
        let query = match arg {
            GameFilterArg::Week(week) => query.bind(week),
            GameFilterArg::AsOf(as_of) => query.bind(as_of),
            GameFilterArg::Date(date) => query.bind(date),
        };
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Game::from).collect())
    }
}

enum GameFilterArg {
    Week(Week),
    AsOf(DateTime<Utc>),
    Date(NaiveDate),
}

#[async_trait::async_trait]
impl SettlementStore for PgStore {
    async fn import_games(&self, games: &[ScheduledGame]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for game in games {
            let result = sqlx::query(
                "INSERT INTO games (season, week, scheduled_time, home_team, away_team) \
                 VALUES ($1, $2, $3, $4, $5) \
                 ON CONFLICT (season, week, home_team, away_team) DO NOTHING",
            )
            .bind(game.season)
            .bind(game.week)
            .bind(game.scheduled_time)
            .bind(&game.home_team)
            .bind(&game.away_team)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }

        tx.commit().await?;
        debug!("Imported {} of {} scheduled games", inserted, games.len());
        Ok(inserted)
    }

    async fn games_for_week(&self, season: Season, week: Week) -> Result<Vec<Game>> {
        self.fetch_games("week = $2", season, GameFilterArg::Week(week)).await
    }

    async fn pending_games(&self, season: Season, as_of: DateTime<Utc>) -> Result<Vec<Game>> {
        self.fetch_games("completed = FALSE AND scheduled_time <= $2", season, GameFilterArg::AsOf(as_of))
            .await
    }

    async fn games_on_date(&self, season: Season, date: NaiveDate) -> Result<Vec<Game>> {
        self.fetch_games("(scheduled_time AT TIME ZONE 'UTC')::date = $2", season, GameFilterArg::Date(date))
            .await
    }

    async fn season_weeks(&self, season: Season) -> Result<Vec<Week>> {
        let weeks = sqlx::query_scalar::<_, i32>(
            "SELECT DISTINCT week FROM games WHERE season = $1 ORDER BY week",
        )
        .bind(season)
        .fetch_all(&self.pool)
        .await?;
        Ok(weeks)
    }

    async fn complete_game(
        &self,
        game_id: GameId,
        score: FinalScore,
        contributions: &[Contribution],
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE games SET home_score = $2, away_score = $3, completed = TRUE \
             WHERE id = $1 AND completed = FALSE",
        )
        .bind(game_id)
        .bind(score.home_score)
        .bind(score.away_score)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM games WHERE id = $1)")
                .bind(game_id)
                .fetch_one(&mut *tx)
                .await?;
            tx.rollback().await?;
            if !exists {
                return Err(PersistenceError::not_found(format!("game {game_id}")));
            }
            return Ok(false);
        }

        for contribution in contributions {
            upsert_contribution(&mut *tx, contribution).await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn apply_contribution(&self, contribution: &Contribution) -> Result<()> {
        upsert_contribution(&self.pool, contribution).await
    }

    async fn settlement_record(
        &self,
        participant_id: ParticipantId,
        league_id: LeagueId,
        season: Season,
        week: Week,
    ) -> Result<Option<SettlementRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM settlement_records \
             WHERE participant_id = $1 AND league_id = $2 AND season = $3 AND week = $4"
        );
        let row = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(participant_id)
            .bind(league_id)
            .bind(season)
            .bind(week)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(SettlementRecord::from))
    }

    async fn week_records(
        &self,
        league_id: LeagueId,
        season: Season,
        week: Week,
    ) -> Result<Vec<SettlementRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM settlement_records \
             WHERE league_id = $1 AND season = $2 AND week = $3 ORDER BY participant_id"
        );
        let rows = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(league_id)
            .bind(season)
            .bind(week)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(SettlementRecord::from).collect())
    }

    async fn season_records(&self, league_id: LeagueId, season: Season) -> Result<Vec<SettlementRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM settlement_records \
             WHERE league_id = $1 AND season = $2 ORDER BY week, participant_id"
        );
        let rows = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(league_id)
            .bind(season)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(SettlementRecord::from).collect())
    }

    async fn is_week_finalized(&self, league_id: LeagueId, season: Season, week: Week) -> Result<bool> {
        let finalized = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM week_finalizations WHERE league_id = $1 AND season = $2 AND week = $3)",
        )
        .bind(league_id)
        .bind(season)
        .bind(week)
        .fetch_one(&self.pool)
        .await?;
        Ok(finalized)
    }

    async fn finalize_week(
        &self,
        league_id: LeagueId,
        season: Season,
        week: Week,
        performances: &[TeamWeekPerformance],
        contributions: &[Contribution],
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let marked = sqlx::query(
            "INSERT INTO week_finalizations (league_id, season, week) VALUES ($1, $2, $3) \
             ON CONFLICT (league_id, season, week) DO NOTHING",
        )
        .bind(league_id)
        .bind(season)
        .bind(week)
        .execute(&mut *tx)
        .await?;
        if marked.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        let extremes_applied = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM settlement_records \
             WHERE league_id = $1 AND season = $2 AND week = $3 \
             AND (weekly_high_bonus <> 0 OR weekly_low_penalty <> 0))",
        )
        .bind(league_id)
        .bind(season)
        .bind(week)
        .fetch_one(&mut *tx)
        .await?;
        if extremes_applied {
            tx.rollback().await?;
            return Ok(false);
        }

        for p in performances {
            sqlx::query(
                "INSERT INTO team_week_performances \
                 (team, season, week, score, opponent_score, is_win, is_tie, is_blowout, is_shutout, \
                  is_weekly_high, is_weekly_low) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
                 ON CONFLICT (team, season, week) DO UPDATE SET \
                 score = EXCLUDED.score, opponent_score = EXCLUDED.opponent_score, \
                 is_win = EXCLUDED.is_win, is_tie = EXCLUDED.is_tie, \
                 is_blowout = EXCLUDED.is_blowout, is_shutout = EXCLUDED.is_shutout, \
                 is_weekly_high = EXCLUDED.is_weekly_high, is_weekly_low = EXCLUDED.is_weekly_low",
            )
            .bind(&p.team)
            .bind(p.season)
            .bind(p.week)
            .bind(p.score)
            .bind(p.opponent_score)
            .bind(p.is_win)
            .bind(p.is_tie)
            .bind(p.is_blowout)
            .bind(p.is_shutout)
            .bind(p.is_weekly_high)
            .bind(p.is_weekly_low)
            .execute(&mut *tx)
            .await?;
        }

        for contribution in contributions {
            upsert_contribution(&mut *tx, contribution).await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn team_performances(&self, season: Season, week: Week) -> Result<Vec<TeamWeekPerformance>> {
        let rows = sqlx::query_as::<_, PerformanceRow>(
            "SELECT team, season, week, score, opponent_score, is_win, is_tie, is_blowout, is_shutout, \
             is_weekly_high, is_weekly_low FROM team_week_performances \
             WHERE season = $1 AND week = $2 ORDER BY team",
        )
        .bind(season)
        .bind(week)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(TeamWeekPerformance::from).collect())
    }

    async fn record_skins(
        &self,
        league_id: LeagueId,
        season: Season,
        week: Week,
        outcome: SkinsOutcome,
        now: DateTime<Utc>,
    ) -> Result<Option<SkinsAward>> {
        let mut tx = self.pool.begin().await?;

        let unresolved = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM skins_awards \
             WHERE league_id = $1 AND season = $2 AND week < $3 \
             AND is_rollover = TRUE AND resolved_in_week IS NULL",
        )
        .bind(league_id)
        .bind(season)
        .bind(week)
        .fetch_one(&mut *tx)
        .await?;
        let pot_size = 1 + unresolved as i32;

        let (winner, score, is_tie, awarded_at) = match &outcome {
            SkinsOutcome::Winner { participant_id, score } => (Some(*participant_id), *score, false, Some(now)),
            SkinsOutcome::Tie { score } => (None, *score, true, None),
        };

        let sql = format!(
            "INSERT INTO skins_awards ({SKINS_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7, $8, NULL) \
             ON CONFLICT (league_id, season, week) DO NOTHING \
             RETURNING {SKINS_COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, SkinsRow>(&sql)
            .bind(league_id)
            .bind(season)
            .bind(week)
            .bind(winner)
            .bind(score)
            .bind(pot_size)
            .bind(is_tie)
            .bind(awarded_at)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = inserted else {
            tx.rollback().await?;
            return Ok(None);
        };

        if winner.is_some() {
            sqlx::query(
                "UPDATE skins_awards SET resolved_in_week = $3 \
                 WHERE league_id = $1 AND season = $2 AND week < $3 \
                 AND is_rollover = TRUE AND resolved_in_week IS NULL",
            )
            .bind(league_id)
            .bind(season)
            .bind(week)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Some(row.into()))
    }

    async fn skins_award(&self, league_id: LeagueId, season: Season, week: Week) -> Result<Option<SkinsAward>> {
        let sql = format!(
            "SELECT {SKINS_COLUMNS} FROM skins_awards WHERE league_id = $1 AND season = $2 AND week = $3"
        );
        let row = sqlx::query_as::<_, SkinsRow>(&sql)
            .bind(league_id)
            .bind(season)
            .bind(week)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(SkinsAward::from))
    }

    async fn skins_history(&self, league_id: LeagueId, season: Season) -> Result<Vec<SkinsAward>> {
        let sql = format!(
            "SELECT {SKINS_COLUMNS} FROM skins_awards WHERE league_id = $1 AND season = $2 ORDER BY week"
        );
        let rows = sqlx::query_as::<_, SkinsRow>(&sql)
            .bind(league_id)
            .bind(season)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(SkinsAward::from).collect())
    }

    async fn reset_season(&self, season: Season) -> Result<ResetSummary> {
        let mut tx = self.pool.begin().await?;
        let mut summary = ResetSummary::default();

        summary.settlement_records = sqlx::query("DELETE FROM settlement_records WHERE season = $1")
            .bind(season)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        summary.skins_awards = sqlx::query("DELETE FROM skins_awards WHERE season = $1")
            .bind(season)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        summary.team_performances = sqlx::query("DELETE FROM team_week_performances WHERE season = $1")
            .bind(season)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        summary.finalizations = sqlx::query("DELETE FROM week_finalizations WHERE season = $1")
            .bind(season)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        summary.games_cleared = sqlx::query(
            "UPDATE games SET home_score = NULL, away_score = NULL, completed = FALSE \
             WHERE season = $1 AND (completed = TRUE OR home_score IS NOT NULL)",
        )
        .bind(season)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        info!(
            "Season {} reset: {} games, {} records, {} skins rows cleared",
            season, summary.games_cleared, summary.settlement_records, summary.skins_awards
        );
        Ok(summary)
    }

    async fn load_clock(&self, season: Season) -> Result<Option<ClockPosition>> {
        let row = sqlx::query_as::<_, ClockRow>(
            "SELECT season, simulated_time, processed_through, acceleration_factor \
             FROM clock_positions WHERE season = $1",
        )
        .bind(season)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ClockPosition::from))
    }

    async fn save_clock(&self, position: &ClockPosition) -> Result<()> {
        sqlx::query(
            "INSERT INTO clock_positions (season, simulated_time, processed_through, acceleration_factor) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (season) DO UPDATE SET simulated_time = EXCLUDED.simulated_time, \
             processed_through = EXCLUDED.processed_through, \
             acceleration_factor = EXCLUDED.acceleration_factor, updated_at = NOW()",
        )
        .bind(position.season)
        .bind(position.simulated_time)
        .bind(position.processed_through)
        .bind(position.acceleration_factor)
        .execute(&self.pool)
        .await?;
        debug!(season = position.season, "Clock position saved at {}", position.simulated_time);
        Ok(())
    }
}
