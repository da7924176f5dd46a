//! Mok Service Library
//!
//! Configuration loading, logging, signal handling and component wiring for the
//! settlement engine, shared by the `mok-service` binary and its admin subcommands.

use anyhow::{Context, Result};
use std::path::Path;

pub mod config;
pub mod logging;
pub mod service;
pub mod signals;

pub use crate::config::ServiceConfig;
pub use logging::initialize_logging;
pub use service::{ServiceState, ServiceStatus};
pub use signals::{graceful_shutdown, setup_signal_handlers};

/// Load configuration from files and environment variables
pub fn load_configuration(path: Option<&Path>) -> Result<ServiceConfig> {
    crate::config::load_config(path).context("Failed to load service configuration")
}
