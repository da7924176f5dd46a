//! Configuration for the settlement service

use scoring_engine::ScoringRules;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the settlement service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Scoring rule set
    pub scoring: ScoringRules,

    /// Static data files feeding the collaborators
    pub data: DataConfig,
}

/// Locations of the JSON files the simulation replays
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Season schedule (array of scheduled games)
    pub schedule_path: PathBuf,

    /// Final scores keyed by date, away and home team
    pub scores_path: PathBuf,

    /// Team ownership per league
    pub ownership_path: PathBuf,

    /// Weekly lock declarations
    pub locks_path: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            schedule_path: PathBuf::from("data/schedule.json"),
            scores_path: PathBuf::from("data/scores.json"),
            ownership_path: PathBuf::from("data/ownership.json"),
            locks_path: PathBuf::from("data/locks.json"),
        }
    }
}

impl SettlementConfig {
    pub fn validate(&self) -> crate::Result<()> {
        self.scoring.validate()?;
        Ok(())
    }
}

impl DataConfig {
    /// Standard file names under one directory
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            schedule_path: dir.join("schedule.json"),
            scores_path: dir.join("scores.json"),
            ownership_path: dir.join("ownership.json"),
            locks_path: dir.join("locks.json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_paths_in_dir() {
        let data = DataConfig::in_dir("/srv/mok");
        assert_eq!(data.scores_path, PathBuf::from("/srv/mok/scores.json"));
        assert_eq!(data.locks_path, PathBuf::from("/srv/mok/locks.json"));
    }

    #[test]
    fn test_invalid_rules_rejected() {
        let mut config = SettlementConfig::default();
        assert!(config.validate().is_ok());

        config.scoring.blowout_margin = 0;
        assert!(config.validate().is_err());
    }
}
