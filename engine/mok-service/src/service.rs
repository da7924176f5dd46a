//! Service state management and component initialization

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::ServiceConfig;
use persistence::SettlementStore;
use scoring_engine::{Season, Week};
use settlement_service::{
    FileScoreProvider, ParticipantTotal, ResetSummary, SettlementService, StaticLockBook,
    StaticOwnership, WeekSettlement,
};
use simulation_clock::{ClockAdvance, ClockMetrics, ClockState, DayAdvance, SimulationClock};

/// Service state containing all initialized components
pub struct ServiceState {
    /// Service configuration
    pub config: ServiceConfig,

    /// Settlement store shared by every component
    pub store: Arc<dyn SettlementStore>,

    /// Settlement service instance
    pub settlement: Arc<SettlementService>,

    /// SimulationClock instance
    pub clock: Arc<SimulationClock>,

    pub started_at: DateTime<Utc>,
}

/// Admin view of the running service
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub clock: ClockState,
    pub metrics: ClockMetrics,
    pub started_at: DateTime<Utc>,
}

impl ServiceState {
    /// Create a new service state with all components initialized
    pub async fn new(config: ServiceConfig) -> Result<Self> {
        info!("Initializing service components...");

        info!("Initializing settlement store ({:?})...", config.persistence.backend);
        let store = persistence::create_store(&config.persistence)
            .await
            .context("Failed to create settlement store")?;

        let data = &config.settlement.data;
        let scores = if data.scores_path.exists() {
            FileScoreProvider::from_file(&data.scores_path).context("Failed to load final scores")?
        } else {
            warn!("No score file at {:?}, every game will stay pending", data.scores_path);
            FileScoreProvider::new()
        };

        let ownership = if data.ownership_path.exists() {
            StaticOwnership::from_file(&data.ownership_path).context("Failed to load team ownership")?
        } else {
            warn!("No ownership file at {:?}, no league will be settled", data.ownership_path);
            StaticOwnership::new()
        };

        let locks = if data.locks_path.exists() {
            StaticLockBook::from_file(&data.locks_path).context("Failed to load lock declarations")?
        } else {
            info!("No lock file at {:?}", data.locks_path);
            StaticLockBook::new()
        };

        info!("Initializing SettlementService...");
        let settlement = Arc::new(
            SettlementService::new(
                store.clone(),
                Arc::new(scores),
                Arc::new(ownership),
                Arc::new(locks),
                config.settlement.scoring.clone(),
            )
            .context("Failed to create SettlementService")?,
        );

        if config.service.import_schedule {
            import_schedule(&settlement, &data.schedule_path).await?;
        }

        info!("Initializing SimulationClock...");
        let clock = Arc::new(
            SimulationClock::restore(settlement.clone(), config.clock.clone())
                .await
                .context("Failed to create SimulationClock")?,
        );

        Ok(Self { config, store, settlement, clock, started_at: Utc::now() })
    }

    /// Install the Prometheus exporter when enabled
    pub fn install_metrics_exporter(&self) -> Result<()> {
        if !self.config.metrics.enabled {
            return Ok(());
        }

        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], self.config.metrics.port))
            .install()
            .context("Failed to install Prometheus exporter")?;
        metrics::gauge!("mok_service_up", 1.0);

        info!("Prometheus exporter listening on port {}", self.config.metrics.port);
        Ok(())
    }

    /// Log settlement events until the broadcaster is dropped
    pub async fn spawn_event_logger(&self) -> Option<tokio::task::JoinHandle<()>> {
        if !self.config.service.log_events {
            return None;
        }

        let mut events = self.settlement.broadcaster().subscribe().await;
        Some(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match serde_json::to_string(&event) {
                    Ok(payload) => info!(event = event.name(), "{}", payload),
                    Err(e) => warn!("Failed to serialize {} event: {}", event.name(), e),
                }
            }
        }))
    }

    /// Run the clock loop until shutdown
    pub async fn start_simulation_clock(&self) -> Result<()> {
        self.clock.run_clock_loop().await.context("SimulationClock loop failed")
    }

    pub fn stop_simulation_clock(&self) {
        info!("Stopping SimulationClock...");
        self.clock.shutdown();
    }

    pub async fn advance_day(&self) -> Result<DayAdvance> {
        Ok(self.clock.advance_day().await?)
    }

    pub async fn set_speed(&self, factor: f64) -> Result<ClockState> {
        self.clock.set_speed(factor)?;
        self.clock.save_position().await?;
        Ok(self.clock.get_state())
    }

    pub async fn jump_to_week(&self, week: Week) -> Result<ClockAdvance> {
        Ok(self.clock.jump_to_week(week).await?)
    }

    pub async fn reset_season(&self, confirm: bool) -> Result<ResetSummary> {
        Ok(self.clock.reset(confirm).await?)
    }

    pub async fn recompute_week(&self, season: Season, week: Week) -> Result<WeekSettlement> {
        Ok(self.clock.recompute_week(season, week).await?)
    }

    /// Season standings of one league
    pub async fn standings(&self, league_id: i64) -> Result<Vec<ParticipantTotal>> {
        let season = self.clock.get_state().season;
        Ok(self.settlement.ledger().season_totals(league_id, season).await?)
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            clock: self.clock.get_state(),
            metrics: self.clock.get_metrics(),
            started_at: self.started_at,
        }
    }
}

async fn import_schedule(settlement: &SettlementService, path: &Path) -> Result<()> {
    if !path.exists() {
        warn!("No schedule file at {:?}, nothing to simulate", path);
        return Ok(());
    }

    let imported = settlement
        .games()
        .import_schedule_file(path)
        .await
        .with_context(|| format!("Failed to import schedule from {:?}", path))?;
    info!("Schedule imported: {} new games", imported);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use settlement_service::DataConfig;

    fn write_season(dir: &Path) {
        std::fs::write(
            dir.join("schedule.json"),
            r#"[
  {"season": 2024, "week": 1, "scheduled_time": "2024-09-08T17:00:00Z", "home_team": "KC", "away_team": "BAL"}
]"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("scores.json"),
            r#"[
  {"date": "2024-09-08", "away_team": "BAL", "home_team": "KC", "away_score": 20, "home_score": 27}
]"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("ownership.json"),
            r#"[
  {"team": "KC", "participant_id": 1, "league_id": 5},
  {"team": "BAL", "participant_id": 2, "league_id": 5}
]"#,
        )
        .unwrap();
    }

    fn config_for(dir: &Path) -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.settlement.data = DataConfig::in_dir(dir);
        config.service.log_events = false;
        config
    }

    #[tokio::test]
    async fn test_service_wires_data_files() {
        let dir = tempfile::tempdir().unwrap();
        write_season(dir.path());

        let state = ServiceState::new(config_for(dir.path())).await.unwrap();
        assert_eq!(state.store.games_for_week(2024, 1).await.unwrap().len(), 1);

        let advance = state.jump_to_week(2).await.unwrap();
        assert_eq!(advance.report.ingest.completed, 1);

        let standings = state.standings(5).await.unwrap();
        assert_eq!(standings[0].participant_id, 1);
        assert_eq!(state.status().clock.current_week, 2);
    }

    #[tokio::test]
    async fn test_service_starts_without_data_files() {
        let dir = tempfile::tempdir().unwrap();

        let state = ServiceState::new(config_for(dir.path())).await.unwrap();
        assert!(state.store.season_weeks(2024).await.unwrap().is_empty());

        let day = state.advance_day().await.unwrap();
        assert_eq!(day.games_processed, 0);
    }

    #[tokio::test]
    async fn test_admin_operations() {
        let dir = tempfile::tempdir().unwrap();
        write_season(dir.path());
        let state = ServiceState::new(config_for(dir.path())).await.unwrap();

        assert!(state.set_speed(-1.0).await.is_err());
        assert_eq!(state.set_speed(7200.0).await.unwrap().acceleration_factor, 7200.0);

        state.jump_to_week(2).await.unwrap();
        assert!(!state.recompute_week(2024, 1).await.unwrap().applied());

        assert!(state.reset_season(false).await.is_err());
        let summary = state.reset_season(true).await.unwrap();
        assert_eq!(summary.games_cleared, 1);
        assert_eq!(state.status().clock.current_week, 1);
    }

    #[tokio::test]
    async fn test_clock_position_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        write_season(dir.path());
        let state = ServiceState::new(config_for(dir.path())).await.unwrap();

        state.jump_to_week(2).await.unwrap();
        state.advance_day().await.unwrap();
        state.set_speed(600.0).await.unwrap();
        let before = state.status().clock;

        let clock = SimulationClock::restore(state.settlement.clone(), state.config.clock.clone())
            .await
            .unwrap();
        let after = clock.get_state();
        assert_eq!(after.current_time, before.current_time);
        assert_eq!(after.current_week, 2);
        assert_eq!(after.processed_through, before.processed_through);
        assert_eq!(after.acceleration_factor, 600.0);
    }
}
