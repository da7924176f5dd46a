//! # Persistence Layer
//!
//! Durable state for the Mok weekly contest: the game result ledger, the
//! per-participant point ledger, finalization markers, the skins pot and the
//! simulation clock position.
//!
//! ## Architecture
//!
//! - **SettlementStore**: storage contract; every method is one atomic unit of work
//! - **InMemoryStore**: process-local implementation used by tests and local simulation
//! - **PgStore**: PostgreSQL implementation through sqlx
//!
//! ## Usage
//!
//! ```rust
//! use persistence::{create_store, PersistenceConfig, SettlementStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = create_store(&PersistenceConfig::default()).await?;
//!     assert!(store.season_weeks(2024).await?.is_empty());
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod postgres;

use std::sync::Arc;

pub use backend::{ClockPosition, InMemoryStore, ResetSummary, SettlementStore, SkinsOutcome};
pub use config::{DatabaseConfig, PersistenceConfig, StoreBackend};
pub use error::{PersistenceError, Result};
pub use postgres::PgStore;

/// Build the configured store
pub async fn create_store(config: &PersistenceConfig) -> Result<Arc<dyn SettlementStore>> {
    config.validate().map_err(PersistenceError::config)?;

    match config.backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory settlement store");
            Ok(Arc::new(InMemoryStore::new()))
        }
        StoreBackend::Postgres => {
            tracing::info!("Connecting settlement store to PostgreSQL");
            let store = PgStore::connect(&config.database, config.run_migrations).await?;
            Ok(Arc::new(store))
        }
    }
}
