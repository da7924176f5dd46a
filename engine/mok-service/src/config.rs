//! Service configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use persistence::PersistenceConfig;
use settlement_service::SettlementConfig;
use simulation_clock::ClockConfig;

/// Environment variable naming an optional TOML configuration file
pub const CONFIG_PATH_ENV: &str = "MOK_CONFIG";

/// Prefix of environment overrides, e.g. `MOK__CLOCK__SEASON=2025`
pub const ENV_PREFIX: &str = "MOK";

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// SimulationClock configuration
    pub clock: ClockConfig,

    /// Persistence configuration
    pub persistence: PersistenceConfig,

    /// Scoring rules and data files
    pub settlement: SettlementConfig,

    /// Service-level configuration
    pub service: ServiceSettings,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Import the schedule file on startup
    pub import_schedule: bool,

    /// Log every settlement event at info level
    pub log_events: bool,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins when set
    pub level: String,

    /// Log format (json, pretty)
    pub format: String,

    /// Also write to a daily rolling file
    pub file_output: bool,

    /// Directory for log files
    pub directory: PathBuf,

    /// Log file name prefix
    pub file_prefix: String,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Install the Prometheus exporter
    pub enabled: bool,

    /// Metrics export port
    pub port: u16,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self { import_schedule: true, log_events: true, shutdown_timeout_secs: 10 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_output: false,
            directory: PathBuf::from("./logs"),
            file_prefix: "mok-service.log".to_string(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: false, port: 9090 }
    }
}

/// Load configuration: defaults, then the `MOK_CONFIG` file, then `MOK__*` variables
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig> {
    dotenv::dotenv().ok();

    let env_path = std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
    let path = path.map(Path::to_path_buf).or(env_path);

    let config = load_layered(path.as_deref(), ENV_PREFIX)?;
    validate_config(&config)?;

    Ok(config)
}

/// Layer a TOML file and prefixed environment variables over the defaults
pub fn load_layered(path: Option<&Path>, env_prefix: &str) -> Result<ServiceConfig> {
    let defaults = ::config::Config::try_from(&ServiceConfig::default())
        .context("Failed to serialize default configuration")?;

    let mut builder = ::config::Config::builder().add_source(defaults);
    if let Some(path) = path {
        tracing::debug!("Loading configuration from file: {:?}", path);
        builder = builder.add_source(::config::File::from(path).format(::config::FileFormat::Toml));
    }
    builder = builder.add_source(::config::Environment::with_prefix(env_prefix).separator("__"));

    builder
        .build()
        .context("Failed to build configuration")?
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

/// Validate configuration
pub fn validate_config(config: &ServiceConfig) -> Result<()> {
    match config.logging.level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow::anyhow!("Invalid log level: {}", config.logging.level)),
    }

    match config.logging.format.as_str() {
        "json" | "pretty" => {}
        _ => return Err(anyhow::anyhow!("Invalid log format: {}", config.logging.format)),
    }

    if config.metrics.enabled && config.metrics.port == 0 {
        return Err(anyhow::anyhow!("Invalid metrics port: {}", config.metrics.port));
    }

    config.clock.validate().context("Invalid clock configuration")?;
    config.settlement.validate().context("Invalid scoring rules")?;
    config.persistence.validate().map_err(|e| anyhow::anyhow!("Invalid persistence configuration: {}", e))?;

    Ok(())
}

/// Save configuration to a TOML file
pub fn save_config(config: &ServiceConfig, path: &Path) -> Result<()> {
    let content = to_toml(config)?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(())
}

pub fn to_toml(config: &ServiceConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use persistence::StoreBackend;

    #[test]
    fn test_default_config_is_valid() {
        let config = load_layered(None, "MOK_TEST_NONE").unwrap();
        validate_config(&config).unwrap();
        assert_eq!(config.clock.season, 2024);
        assert_eq!(config.persistence.backend, StoreBackend::Memory);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_logging_rejected() {
        let mut config = ServiceConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = ServiceConfig::default();
        config.logging.format = "xml".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_clock_rejected() {
        let mut config = ServiceConfig::default();
        config.clock.acceleration_factor = 0.0;
        assert!(validate_config(&config).is_err());

        let mut config = ServiceConfig::default();
        config.clock.tick_cadence_ms = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mok.toml");
        std::fs::write(
            &path,
            r#"
[clock]
season = 2025
acceleration_factor = 60.0

[logging]
format = "json"

[persistence]
backend = "postgres"
"#,
        )
        .unwrap();

        let config = load_layered(Some(&path), "MOK_TEST_FILE").unwrap();
        assert_eq!(config.clock.season, 2025);
        assert_eq!(config.clock.acceleration_factor, 60.0);
        assert_eq!(config.clock.weeks_per_season, 18);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.persistence.backend, StoreBackend::Postgres);
    }

    #[test]
    fn test_environment_overrides_defaults() {
        std::env::set_var("MOK_TEST_ENV__CLOCK__WEEKS_PER_SEASON", "17");
        std::env::set_var("MOK_TEST_ENV__LOGGING__LEVEL", "debug");

        let config = load_layered(None, "MOK_TEST_ENV").unwrap();
        assert_eq!(config.clock.weeks_per_season, 17);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.toml");

        let mut config = ServiceConfig::default();
        config.clock.season = 2023;
        config.service.log_events = false;
        save_config(&config, &path).unwrap();

        let reloaded = load_layered(Some(&path), "MOK_TEST_SAVE").unwrap();
        assert_eq!(reloaded.clock.season, 2023);
        assert!(!reloaded.service.log_events);
    }
}
