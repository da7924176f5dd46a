//! Mok Service
//!
//! Main entry point for the league settlement engine. `serve` runs the simulation
//! clock until Ctrl+C/SIGTERM; the other subcommands perform one administrative
//! operation against the configured store and print the result as JSON. The clock
//! resumes from the position saved in the store, so those subcommands need the
//! `postgres` backend.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use mok_service::{
    config, graceful_shutdown, initialize_logging, load_configuration, setup_signal_handlers,
    ServiceState,
};
use persistence::StoreBackend;

#[derive(Debug, Parser)]
#[command(name = "mok-service", version, about = "Mok league settlement engine")]
struct Cli {
    /// TOML configuration file (overrides MOK_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the simulation clock until shutdown (default)
    Serve,
    /// Advance the clock by one day and process that day's games
    AdvanceDay,
    /// Change the acceleration factor
    SetSpeed { factor: f64 },
    /// Move the clock to the start of a week, settling every week passed
    JumpToWeek { week: i32 },
    /// Clear all derived data for the season and rewind the clock
    ResetSeason {
        #[arg(long)]
        confirm: bool,
    },
    /// Re-run a week's settlement; a no-op when already settled
    RecomputeWeek {
        week: i32,
        #[arg(long)]
        season: Option<i32>,
    },
    /// Print the clock state and metrics
    State,
    /// Print season standings of a league
    Standings { league_id: i64 },
    /// Print the effective configuration as TOML
    Config,
}

impl Command {
    /// Reads or changes season state that only a durable store keeps between runs
    fn needs_durable_store(&self) -> bool {
        !matches!(self, Command::Serve | Command::Config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_configuration(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(Command::Config) = cli.command {
        println!("{}", config::to_toml(&config)?);
        return Ok(());
    }

    let command = cli.command.unwrap_or(Command::Serve);
    if command.needs_durable_store() && config.persistence.backend == StoreBackend::Memory {
        anyhow::bail!(
            "{:?} needs persistence.backend = \"postgres\"; the in-memory store does not outlive this process",
            command
        );
    }

    let _log_guard = initialize_logging(&config.logging)?;
    info!("Starting Mok Service v{}", env!("CARGO_PKG_VERSION"));

    let service_state = Arc::new(ServiceState::new(config).await?);
    info!("Service state initialized");

    match command {
        Command::Serve => serve(service_state).await,
        Command::AdvanceDay => print_json(&service_state.advance_day().await?),
        Command::SetSpeed { factor } => print_json(&service_state.set_speed(factor).await?),
        Command::JumpToWeek { week } => print_json(&service_state.jump_to_week(week).await?),
        Command::ResetSeason { confirm } => print_json(&service_state.reset_season(confirm).await?),
        Command::RecomputeWeek { week, season } => {
            let season = season.unwrap_or(service_state.config.clock.season);
            print_json(&service_state.recompute_week(season, week).await?)
        }
        Command::State => print_json(&service_state.status()),
        Command::Standings { league_id } => print_json(&service_state.standings(league_id).await?),
        Command::Config => Ok(()),
    }
}

async fn serve(service_state: Arc<ServiceState>) -> Result<()> {
    service_state.install_metrics_exporter()?;
    let _event_logger = service_state.spawn_event_logger().await;

    let shutdown_signal = setup_signal_handlers()?;
    info!("Signal handlers configured");

    info!("Starting SimulationClock...");
    let clock_handle = {
        let state = service_state.clone();
        tokio::spawn(async move {
            if let Err(e) = state.start_simulation_clock().await {
                error!("SimulationClock failed: {}", e);
            }
        })
    };

    info!("Mok Service is running. Press Ctrl+C to shutdown gracefully.");
    let _ = shutdown_signal.await;

    info!("Shutdown signal received. Initiating graceful shutdown...");
    graceful_shutdown(service_state, clock_handle).await?;

    info!("Mok Service shutdown complete");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Command {
        Cli::try_parse_from(args).unwrap().command.unwrap_or(Command::Serve)
    }

    #[test]
    fn test_stateful_commands_need_durable_store() {
        assert!(!parse(&["mok-service"]).needs_durable_store());
        assert!(!parse(&["mok-service", "config"]).needs_durable_store());
        assert!(parse(&["mok-service", "advance-day"]).needs_durable_store());
        assert!(parse(&["mok-service", "state"]).needs_durable_store());
        assert!(parse(&["mok-service", "reset-season", "--confirm"]).needs_durable_store());
        assert!(parse(&["mok-service", "recompute-week", "3", "--season", "2024"]).needs_durable_store());
    }
}
