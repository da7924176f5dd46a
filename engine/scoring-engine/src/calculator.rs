use std::collections::BTreeSet;

use rust_decimal::Decimal;
use tracing::debug;

use crate::config::{ScoringRules, ShutoutLowPolicy};
use crate::error::{Result, ScoringError};
use crate::models::*;

/// Turns completed games into Mok points under one rule set
#[derive(Debug, Clone)]
pub struct PointsCalculator {
    rules: ScoringRules,
}

impl PointsCalculator {
    pub fn new(rules: ScoringRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &ScoringRules {
        &self.rules
    }

    /// Base points for one side of a completed game.
    ///
    /// Win/tie/loss, plus one margin bonus: the shutout bonus (opponent held to zero,
    /// any outcome) or else the blowout bonus (winner only, margin at or above
    /// `blowout_margin`). A shutout win that is also a blowout earns the shutout bonus only.
    pub fn base_points(&self, outcome: &TeamOutcome) -> Points {
        let mut points = match outcome.result() {
            GameOutcome::Win => self.rules.win_points,
            GameOutcome::Tie => self.rules.tie_points,
            GameOutcome::Loss => Decimal::ZERO,
        };

        if outcome.opponent_score() == 0 {
            points += self.rules.shutout_bonus;
        } else if self.is_blowout(outcome) {
            points += self.rules.blowout_bonus;
        }

        points
    }

    fn is_blowout(&self, outcome: &TeamOutcome) -> bool {
        outcome.result() == GameOutcome::Win && outcome.margin() >= self.rules.blowout_margin
    }

    /// Both teams' derived performances for a completed game. Weekly flags start unset.
    pub fn performances(&self, game: CompletedGame<'_>) -> [TeamWeekPerformance; 2] {
        let g = game.game();
        game.outcomes().map(|outcome| TeamWeekPerformance {
            team: outcome.team().to_string(),
            season: g.season,
            week: g.week,
            score: outcome.score(),
            opponent_score: outcome.opponent_score(),
            is_win: outcome.result() == GameOutcome::Win,
            is_tie: outcome.result() == GameOutcome::Tie,
            is_blowout: self.is_blowout(&outcome),
            is_shutout: outcome.opponent_score() == 0,
            is_weekly_high: false,
            is_weekly_low: false,
        })
    }

    /// Performances for every team in a week. Fails on any unfinished game.
    pub fn week_performances(&self, games: &[Game]) -> Result<Vec<TeamWeekPerformance>> {
        let mut performances = Vec::with_capacity(games.len() * 2);
        for game in games {
            let completed = game
                .completed_result()
                .ok_or(ScoringError::GameNotCompleted { game_id: game.id })?;
            performances.extend(self.performances(completed));
        }
        Ok(performances)
    }

    /// Lock modifier for a team's week. A team without a game that week earns nothing.
    pub fn lock_modifier(&self, kind: LockKind, performance: Option<&TeamWeekPerformance>) -> Points {
        let Some(performance) = performance else {
            return Decimal::ZERO;
        };

        match (kind, performance.outcome()) {
            (LockKind::Lock, GameOutcome::Win) => self.rules.lock_win_bonus,
            (LockKind::Lock, GameOutcome::Tie) => self.rules.lock_tie_bonus,
            (LockKind::Lock, GameOutcome::Loss) => Decimal::ZERO,
            (LockKind::LockAndLoad, GameOutcome::Win) => self.rules.lock_and_load_win_bonus,
            (LockKind::LockAndLoad, GameOutcome::Tie) => Decimal::ZERO,
            (LockKind::LockAndLoad, GameOutcome::Loss) => self.rules.lock_and_load_loss_penalty,
        }
    }

    /// Lock and lock-and-load modifiers for one participant's selection
    pub fn lock_modifiers(
        &self,
        selection: &LockSelection,
        performances: &[TeamWeekPerformance],
    ) -> Vec<(LockKind, Points)> {
        let find = |team: &str| performances.iter().find(|p| p.team == team);

        let mut modifiers = Vec::with_capacity(2);
        if let Some(team) = &selection.locked_team {
            modifiers.push((LockKind::Lock, self.lock_modifier(LockKind::Lock, find(team))));
        }
        if let Some(team) = &selection.lock_and_load_team {
            modifiers.push((
                LockKind::LockAndLoad,
                self.lock_modifier(LockKind::LockAndLoad, find(team)),
            ));
        }
        modifiers
    }

    /// Weekly-high and weekly-low modifiers per team, honoring the shutout policy
    pub fn weekly_modifiers(&self, extremes: &WeeklyExtremes) -> Vec<(TeamCode, PointComponent, Points)> {
        let mut modifiers = Vec::new();
        for team in &extremes.high_teams {
            modifiers.push((team.clone(), PointComponent::WeeklyHigh, self.rules.weekly_high_bonus));
        }
        for team in &extremes.low_teams {
            if self.rules.shutout_low_policy == ShutoutLowPolicy::Exempt
                && extremes.shut_out_teams.contains(team)
            {
                debug!(team = %team, "Weekly-low penalty skipped for shut-out team");
                continue;
            }
            modifiers.push((team.clone(), PointComponent::WeeklyLow, self.rules.weekly_low_penalty));
        }
        modifiers
    }
}

/// Top and bottom scorers of a fully completed week
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklyExtremes {
    pub high_score: i32,
    pub low_score: i32,
    pub high_teams: BTreeSet<TeamCode>,
    pub low_teams: BTreeSet<TeamCode>,
    shut_out_teams: BTreeSet<TeamCode>,
}

impl WeeklyExtremes {
    /// Scan every team's score for the week. `None` when there are no teams.
    pub fn evaluate(performances: &[TeamWeekPerformance]) -> Option<Self> {
        let high_score = performances.iter().map(|p| p.score).max()?;
        let low_score = performances.iter().map(|p| p.score).min()?;

        let teams_at = |score: i32| -> BTreeSet<TeamCode> {
            performances.iter().filter(|p| p.score == score).map(|p| p.team.clone()).collect()
        };

        Some(Self {
            high_score,
            low_score,
            high_teams: teams_at(high_score),
            low_teams: teams_at(low_score),
            shut_out_teams: performances
                .iter()
                .filter(|p| p.was_shut_out())
                .map(|p| p.team.clone())
                .collect(),
        })
    }

    /// Set the weekly flags on the matching performances
    pub fn mark(&self, performances: &mut [TeamWeekPerformance]) {
        for performance in performances.iter_mut() {
            performance.is_weekly_high = self.high_teams.contains(&performance.team);
            performance.is_weekly_low = self.low_teams.contains(&performance.team);
        }
    }
}
