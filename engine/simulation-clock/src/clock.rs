//! Core SimulationClock implementation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::{Mutex, RwLock};
use persistence::ClockPosition;
use scoring_engine::{Season, Week};
use serde::{Deserialize, Serialize};
use settlement_service::{
    ProcessReport, ResetSummary, SettlementEvent, SettlementService, WeekSettlement,
};
use tokio::time::MissedTickBehavior;

use crate::config::ClockConfig;
use crate::error::ClockError;
use crate::metrics::{ClockMetrics, MetricsCollector, PassCounts};
use crate::state::{ClockState, SimulatedClock};

/// Result of a tick or week jump
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockAdvance {
    pub now: DateTime<Utc>,
    pub current_week: Week,
    pub report: ProcessReport,
    /// Settlements applied by the week-transition check
    pub transition_settlements: Vec<WeekSettlement>,
}

/// Result of a discrete one-day advance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayAdvance {
    pub new_date: NaiveDate,
    pub current_week: Week,
    pub games_processed: usize,
    pub report: ProcessReport,
    pub transition_settlements: Vec<WeekSettlement>,
}

/// Clears the processing flag on every exit path
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives simulated time and triggers ingestion and settlement for the time it crosses
pub struct SimulationClock {
    clock: RwLock<SimulatedClock>,
    last_tick: Mutex<Option<Instant>>,
    processing: AtomicBool,
    shutdown: AtomicBool,

    settlement: Arc<SettlementService>,
    config: ClockConfig,
    metrics_collector: Arc<MetricsCollector>,
}

impl SimulationClock {
    /// Create a stopped clock at season start
    pub fn new(settlement: Arc<SettlementService>, config: ClockConfig) -> Result<Self, ClockError> {
        config.validate()?;
        let clock = SimulatedClock::new(&config);

        tracing::info!(
            season = clock.season(),
            "Creating SimulationClock at {} (x{})",
            clock.now(),
            clock.acceleration_factor()
        );

        Ok(Self {
            clock: RwLock::new(clock),
            last_tick: Mutex::new(None),
            processing: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            metrics_collector: Arc::new(MetricsCollector::new(config.monitoring.emit_metrics)),
            settlement,
            config,
        })
    }

    /// Create a stopped clock at the season's saved position, or at season start when none is saved
    pub async fn restore(settlement: Arc<SettlementService>, config: ClockConfig) -> Result<Self, ClockError> {
        let clock = Self::new(settlement, config)?;
        let season = clock.config.season;

        if let Some(position) = clock.settlement.store().load_clock(season).await? {
            clock.clock.write().restore(&position);
            tracing::info!(
                season,
                "Resumed SimulationClock at {} (days processed through {})",
                position.simulated_time,
                position.processed_through
            );
        }
        Ok(clock)
    }

    pub fn config(&self) -> &ClockConfig {
        &self.config
    }

    pub fn settlement(&self) -> &Arc<SettlementService> {
        &self.settlement
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.read().now()
    }

    pub fn is_running(&self) -> bool {
        self.clock.read().is_running()
    }

    pub fn get_state(&self) -> ClockState {
        self.clock.read().snapshot(self.processing.load(Ordering::SeqCst))
    }

    pub fn get_metrics(&self) -> ClockMetrics {
        self.metrics_collector.get_metrics()
    }

    pub fn position(&self) -> ClockPosition {
        self.clock.read().position()
    }

    /// Write the current position and speed to the store
    pub async fn save_position(&self) -> Result<(), ClockError> {
        let position = self.position();
        self.settlement.store().save_clock(&position).await?;
        Ok(())
    }

    /// Save the position `update` produces, then take it over
    async fn commit(&self, update: impl FnOnce(&mut SimulatedClock)) -> Result<(), ClockError> {
        let mut next = self.clock.read().clone();
        update(&mut next);
        self.settlement.store().save_clock(&next.position()).await?;
        self.clock.write().take_time(&next);
        Ok(())
    }

    /// Stopped -> Running
    pub fn start(&self) -> Result<(), ClockError> {
        let mut clock = self.clock.write();
        if clock.is_running() {
            return Err(ClockError::ClockAlreadyRunning);
        }
        clock.set_running(true);
        *self.last_tick.lock() = Some(Instant::now());

        tracing::info!("SimulationClock started at {}", clock.now());
        Ok(())
    }

    /// Running -> Stopped
    pub fn stop(&self) -> Result<(), ClockError> {
        let mut clock = self.clock.write();
        if !clock.is_running() {
            return Err(ClockError::ClockNotRunning);
        }
        clock.set_running(false);
        *self.last_tick.lock() = None;

        tracing::info!("SimulationClock stopped at {}", clock.now());
        Ok(())
    }

    /// Change the acceleration factor without jumping time
    pub fn set_speed(&self, factor: f64) -> Result<(), ClockError> {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(ClockError::InvalidSpeed(factor));
        }

        let mut clock = self.clock.write();
        clock.set_acceleration(factor);
        if clock.is_running() {
            *self.last_tick.lock() = Some(Instant::now());
        }

        tracing::info!("Acceleration factor set to {}", factor);
        Ok(())
    }

    fn begin_processing(&self) -> Result<ProcessingGuard<'_>, ClockError> {
        if self
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.metrics_collector.record_rejected_advance();
            return Err(ClockError::Busy);
        }
        Ok(ProcessingGuard(&self.processing))
    }

    /// Advance by the real time elapsed since the last tick, scaled by the acceleration factor
    pub async fn tick(&self) -> Result<ClockAdvance, ClockError> {
        if !self.is_running() {
            return Err(ClockError::ClockNotRunning);
        }
        let _guard = self.begin_processing()?;

        let tick_at = Instant::now();
        let elapsed = self.last_tick.lock().map(|t| tick_at.duration_since(t)).unwrap_or_default();
        let advance = self.advance_running(elapsed).await?;

        if self.is_running() {
            *self.last_tick.lock() = Some(tick_at);
        }
        Ok(advance)
    }

    /// Advance as if `real_elapsed` had passed since the last tick
    pub async fn tick_elapsed(&self, real_elapsed: Duration) -> Result<ClockAdvance, ClockError> {
        if !self.is_running() {
            return Err(ClockError::ClockNotRunning);
        }
        let _guard = self.begin_processing()?;
        self.advance_running(real_elapsed).await
    }

    async fn advance_running(&self, real_elapsed: Duration) -> Result<ClockAdvance, ClockError> {
        let started = Instant::now();
        let (season, previous_week, target) = {
            let clock = self.clock.read();
            (clock.season(), clock.current_week(), clock.now() + clock.scaled(real_elapsed))
        };

        let report = self.settlement.process_pending(season, target).await?;
        let current_week = self.clock.read().week_of(target);
        let transition_settlements = self.settle_transition(season, previous_week, current_week, target).await?;

        self.commit(|clock| clock.set_time(target)).await?;
        self.metrics_collector.record_tick();
        self.record_pass(started.elapsed(), &report, &transition_settlements);

        Ok(ClockAdvance { now: target, current_week, report, transition_settlements })
    }

    /// Move to the end of the next day and process the games of every day not yet covered,
    /// which is the new date plus any open day the clock was sitting on.
    ///
    /// When the day opens a new week, the week just ended is re-checked and settled
    /// before the clock accepts the new week. A settlement failure aborts the advance.
    pub async fn advance_day(&self) -> Result<DayAdvance, ClockError> {
        let _guard = self.begin_processing()?;
        let started = Instant::now();

        let (season, previous_week, first_date, target) = {
            let clock = self.clock.read();
            (clock.season(), clock.current_week(), clock.first_unprocessed_date(), clock.end_of_next_day())
        };
        let new_date = target.date_naive();

        let report = self.settlement.process_dates(season, first_date, new_date, target).await?;
        let current_week = self.clock.read().week_of(target);
        let transition_settlements = self.settle_transition(season, previous_week, current_week, target).await?;

        self.commit(|clock| clock.close_day(target)).await?;
        self.metrics_collector.record_day_advance();
        self.record_pass(started.elapsed(), &report, &transition_settlements);

        let games_processed = report.ingest.completed;
        self.settlement
            .broadcaster()
            .publish(SettlementEvent::DayAdvanced { new_date, games_processed, current_week })
            .await;

        tracing::info!(season, week = current_week, "Advanced to {} ({} games processed)", new_date, games_processed);
        Ok(DayAdvance { new_date, current_week, games_processed, report, transition_settlements })
    }

    /// Set the clock to the start of `week` and process everything up to it in one pass
    pub async fn jump_to_week(&self, week: Week) -> Result<ClockAdvance, ClockError> {
        let _guard = self.begin_processing()?;
        let started = Instant::now();

        let (season, target) = {
            let clock = self.clock.read();
            (clock.season(), clock.week_start(week)?)
        };

        let report = self.settlement.process_pending(season, target).await?;
        let transition_settlements = self.settlement.settle_completed_weeks(season, target).await?;

        self.commit(|clock| clock.set_time(target)).await?;
        if self.is_running() {
            *self.last_tick.lock() = Some(Instant::now());
        }
        self.record_pass(started.elapsed(), &report, &transition_settlements);

        tracing::info!(season, week, "Jumped to {}", target);
        Ok(ClockAdvance { now: target, current_week: week, report, transition_settlements })
    }

    /// Stop at season start and clear every derived row for the season
    pub async fn reset(&self, confirm: bool) -> Result<ResetSummary, ClockError> {
        if !confirm {
            return Err(ClockError::ResetNotConfirmed);
        }
        let _guard = self.begin_processing()?;

        let season = self.clock.read().season();
        let summary = self.settlement.reset_season(season).await?;

        self.commit(SimulatedClock::rewind).await?;
        self.clock.write().set_running(false);
        *self.last_tick.lock() = None;
        self.metrics_collector.reset();

        tracing::warn!(season, "Season reset to {}", self.now());
        Ok(summary)
    }

    /// Forced, idempotent re-run of one week's settlement at the current simulated time
    pub async fn recompute_week(&self, season: Season, week: Week) -> Result<WeekSettlement, ClockError> {
        Ok(self.settlement.recompute_week(season, week, self.now()).await?)
    }

    async fn settle_transition(
        &self,
        season: Season,
        previous_week: Week,
        current_week: Week,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<WeekSettlement>, ClockError> {
        if current_week == previous_week {
            return Ok(Vec::new());
        }

        match self.settlement.settle_if_complete(season, previous_week, as_of).await? {
            Some(settlement) if settlement.applied() => Ok(vec![settlement]),
            Some(_) => Ok(Vec::new()),
            None => {
                tracing::warn!(season, week = previous_week, "Week {} not complete at week transition", previous_week);
                Ok(Vec::new())
            }
        }
    }

    fn record_pass(&self, duration: Duration, report: &ProcessReport, transitions: &[WeekSettlement]) {
        let leagues = || report.settled.iter().chain(transitions).flat_map(|s| s.leagues.iter());
        let counts = PassCounts {
            games_processed: report.ingest.completed as u64,
            games_pending: report.ingest.unavailable as u64,
            ingest_failures: report.ingest.failed as u64,
            weeks_settled: leagues().filter(|l| l.finalization.applied).count() as u64,
            skins_settled: leagues().filter(|l| l.skins.is_some()).count() as u64,
        };
        self.metrics_collector.record_pass(duration, counts);

        if duration > self.config.max_tick_duration() {
            tracing::warn!("Processing pass took {:?}, limit is {:?}", duration, self.config.max_tick_duration());
        }
    }

    /// Tick every `tick_cadence_ms` while running, until [`shutdown`](Self::shutdown)
    pub async fn run_clock_loop(&self) -> Result<(), ClockError> {
        if self.config.auto_start && !self.is_running() {
            self.start()?;
        }

        tracing::info!("Starting SimulationClock main loop");

        let mut interval = tokio::time::interval(self.config.tick_cadence());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_metrics_emission = Instant::now();

        while !self.shutdown.load(Ordering::SeqCst) {
            interval.tick().await;
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            if self.is_running() {
                match self.tick().await {
                    Ok(advance) => {
                        for settlement in advance.report.settled.iter().chain(&advance.transition_settlements) {
                            tracing::info!(season = settlement.season, week = settlement.week, "Week settled");
                        }
                    }
                    Err(ClockError::Busy) => tracing::debug!("Tick skipped, processing in progress"),
                    Err(ClockError::ClockNotRunning) => {}
                    Err(e) => tracing::error!("Tick failed: {}", e),
                }
            }

            if last_metrics_emission.elapsed() >= self.config.metrics_interval() {
                self.emit_metrics();
                last_metrics_emission = Instant::now();
            }
        }

        tracing::info!("SimulationClock main loop stopped");
        Ok(())
    }

    /// Ask the run loop to exit and stop the clock
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.stop();
    }

    fn emit_metrics(&self) {
        let metrics = self.metrics_collector.get_metrics();
        let state = self.get_state();

        tracing::debug!(
            now = %state.current_time,
            week = state.current_week,
            ticks = metrics.total_ticks,
            games_processed = metrics.games_processed,
            games_pending = metrics.games_pending,
            weeks_settled = metrics.weeks_settled,
            "Clock metrics"
        );
    }
}
