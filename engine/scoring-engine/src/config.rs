use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoringError};
use crate::models::Points;

/// Scoring rule set applied to every league
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringRules {
    /// Points for a win
    pub win_points: Points,

    /// Points for a tie
    pub tie_points: Points,

    /// Minimum winning margin that counts as a blowout
    pub blowout_margin: i32,

    /// Extra point for a blowout win (winner only)
    pub blowout_bonus: Points,

    /// Extra point when the opponent did not score
    pub shutout_bonus: Points,

    /// Regular lock on a win
    pub lock_win_bonus: Points,

    /// Regular lock on a tie
    pub lock_tie_bonus: Points,

    /// Lock-and-load on a win
    pub lock_and_load_win_bonus: Points,

    /// Lock-and-load on a loss (negative)
    pub lock_and_load_loss_penalty: Points,

    /// Owners of the week's top scoring team(s)
    pub weekly_high_bonus: Points,

    /// Owners of the week's lowest scoring team(s) (negative)
    pub weekly_low_penalty: Points,

    /// Whether a shut-out loser also takes the weekly-low penalty
    pub shutout_low_policy: ShutoutLowPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutoutLowPolicy {
    /// Weekly-low penalty applies on top of the shutout loss
    Stack,
    /// Teams shut out are skipped when handing out the weekly-low penalty
    Exempt,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            win_points: Decimal::ONE,
            tie_points: Decimal::new(5, 1),
            blowout_margin: 20,
            blowout_bonus: Decimal::ONE,
            shutout_bonus: Decimal::ONE,
            lock_win_bonus: Decimal::ONE,
            lock_tie_bonus: Decimal::new(5, 1),
            lock_and_load_win_bonus: Decimal::TWO,
            lock_and_load_loss_penalty: Decimal::NEGATIVE_ONE,
            weekly_high_bonus: Decimal::ONE,
            weekly_low_penalty: Decimal::NEGATIVE_ONE,
            shutout_low_policy: ShutoutLowPolicy::Stack,
        }
    }
}

impl ScoringRules {
    pub fn validate(&self) -> Result<()> {
        if self.blowout_margin <= 0 {
            return Err(ScoringError::InvalidRules(format!(
                "blowout_margin must be positive, got {}",
                self.blowout_margin
            )));
        }

        let non_negative = [
            ("win_points", self.win_points),
            ("tie_points", self.tie_points),
            ("blowout_bonus", self.blowout_bonus),
            ("shutout_bonus", self.shutout_bonus),
            ("lock_win_bonus", self.lock_win_bonus),
            ("lock_tie_bonus", self.lock_tie_bonus),
            ("lock_and_load_win_bonus", self.lock_and_load_win_bonus),
            ("weekly_high_bonus", self.weekly_high_bonus),
        ];
        for (name, value) in non_negative {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(ScoringError::InvalidRules(format!("{name} must not be negative")));
            }
        }

        if self.lock_and_load_loss_penalty > Decimal::ZERO {
            return Err(ScoringError::InvalidRules(
                "lock_and_load_loss_penalty must not be positive".to_string(),
            ));
        }
        if self.weekly_low_penalty > Decimal::ZERO {
            return Err(ScoringError::InvalidRules(
                "weekly_low_penalty must not be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_are_valid() {
        let rules = ScoringRules::default();
        assert!(rules.validate().is_ok());
        assert_eq!(rules.lock_and_load_win_bonus, Decimal::TWO);
        assert_eq!(rules.shutout_low_policy, ShutoutLowPolicy::Stack);
    }

    #[test]
    fn test_rejects_positive_penalty() {
        let rules = ScoringRules { weekly_low_penalty: Decimal::ONE, ..Default::default() };
        assert!(matches!(rules.validate(), Err(ScoringError::InvalidRules(_))));

        let rules = ScoringRules { blowout_margin: 0, ..Default::default() };
        assert!(rules.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let rules: ScoringRules =
            serde_json::from_str(r#"{"lock_and_load_win_bonus": 1, "shutout_low_policy": "exempt"}"#)
                .unwrap();
        assert_eq!(rules.lock_and_load_win_bonus, Decimal::ONE);
        assert_eq!(rules.shutout_low_policy, ShutoutLowPolicy::Exempt);
        assert_eq!(rules.blowout_margin, 20);
    }
}
