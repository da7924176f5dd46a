//! The simulated clock value and the season calendar

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use persistence::ClockPosition;
use scoring_engine::{Season, Week};
use serde::{Deserialize, Serialize};

use crate::config::ClockConfig;
use crate::error::ClockError;

/// Virtual "now" for one season.
///
/// Owned by the [`SimulationClock`](crate::SimulationClock); everything else receives
/// the instant it needs as an argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedClock {
    season: Season,
    season_start: DateTime<Utc>,
    weeks_per_season: Week,
    current: DateTime<Utc>,
    processed_through: NaiveDate,
    running: bool,
    acceleration_factor: f64,
}

/// Read-only snapshot for the admin surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockState {
    pub season: Season,
    pub current_time: DateTime<Utc>,
    pub current_date: NaiveDate,
    pub current_week: Week,
    pub processed_through: NaiveDate,
    pub running: bool,
    pub acceleration_factor: f64,
    pub processing: bool,
}

impl SimulatedClock {
    /// A stopped clock at season start
    pub fn new(config: &ClockConfig) -> Self {
        Self {
            season: config.season,
            season_start: config.season_start,
            weeks_per_season: config.weeks_per_season,
            current: config.season_start,
            processed_through: day_before(config.season_start),
            running: false,
            acceleration_factor: config.acceleration_factor,
        }
    }

    pub fn season(&self) -> Season {
        self.season
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.current
    }

    pub fn current_date(&self) -> NaiveDate {
        self.current.date_naive()
    }

    pub fn current_week(&self) -> Week {
        self.week_of(self.current)
    }

    /// Last date whose games have all been handed to ingestion
    pub fn processed_through(&self) -> NaiveDate {
        self.processed_through
    }

    /// First date a day advance still has to cover
    pub fn first_unprocessed_date(&self) -> NaiveDate {
        self.processed_through + Duration::days(1)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn acceleration_factor(&self) -> f64 {
        self.acceleration_factor
    }

    pub fn weeks_per_season(&self) -> Week {
        self.weeks_per_season
    }

    /// Week containing `instant`, clamped to the season
    pub fn week_of(&self, instant: DateTime<Utc>) -> Week {
        let days = (instant - self.season_start).num_days();
        let week = if instant < self.season_start { 1 } else { days / 7 + 1 };
        week.clamp(1, self.weeks_per_season as i64) as Week
    }

    /// First instant of `week`
    pub fn week_start(&self, week: Week) -> Result<DateTime<Utc>, ClockError> {
        if week < 1 || week > self.weeks_per_season {
            return Err(ClockError::InvalidWeek { week, weeks_per_season: self.weeks_per_season });
        }
        Ok(self.season_start + Duration::days(7 * (week as i64 - 1)))
    }

    /// Last second of the day after the current date
    pub fn end_of_next_day(&self) -> DateTime<Utc> {
        let next = self.current_date() + Duration::days(1);
        let end = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
        next.and_time(end).and_utc()
    }

    /// Simulated time covered by `real` elapsed time at the current speed
    pub fn scaled(&self, real: std::time::Duration) -> Duration {
        let millis = real.as_secs_f64() * 1000.0 * self.acceleration_factor;
        Duration::milliseconds(millis.round() as i64)
    }

    /// Move to `instant`; its own date is still open for day processing
    pub(crate) fn set_time(&mut self, instant: DateTime<Utc>) {
        self.current = instant;
        self.processed_through = day_before(instant);
    }

    /// Move to `instant` with every game up to the end of its date processed
    pub(crate) fn close_day(&mut self, instant: DateTime<Utc>) {
        self.current = instant;
        self.processed_through = instant.date_naive();
    }

    pub(crate) fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    pub(crate) fn set_acceleration(&mut self, factor: f64) {
        self.acceleration_factor = factor;
    }

    /// Copy the time position of `other`, leaving run state and speed alone
    pub(crate) fn take_time(&mut self, other: &SimulatedClock) {
        self.current = other.current;
        self.processed_through = other.processed_through;
    }

    /// Back to season start, stopped
    pub(crate) fn rewind(&mut self) {
        self.set_time(self.season_start);
        self.running = false;
    }

    pub fn position(&self) -> ClockPosition {
        ClockPosition {
            season: self.season,
            simulated_time: self.current,
            processed_through: self.processed_through,
            acceleration_factor: self.acceleration_factor,
        }
    }

    /// Resume from a saved position of the same season
    pub(crate) fn restore(&mut self, position: &ClockPosition) {
        self.current = position.simulated_time;
        self.processed_through = position.processed_through;
        self.acceleration_factor = position.acceleration_factor;
    }

    pub fn snapshot(&self, processing: bool) -> ClockState {
        ClockState {
            season: self.season,
            current_time: self.current,
            current_date: self.current_date(),
            current_week: self.current_week(),
            processed_through: self.processed_through,
            running: self.running,
            acceleration_factor: self.acceleration_factor,
            processing,
        }
    }
}

fn day_before(instant: DateTime<Utc>) -> NaiveDate {
    instant.date_naive() - Duration::days(1)
}
