use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Mok points. Half points exist (ties), so points are decimal.
pub type Points = Decimal;

pub type GameId = i64;
pub type LeagueId = i64;
pub type ParticipantId = i64;
pub type Season = i32;
pub type Week = i32;

/// Team abbreviation as used by the schedule (e.g. "KC")
pub type TeamCode = String;

/// A scheduled game and, once known, its final score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub season: Season,
    pub week: Week,
    pub scheduled_time: DateTime<Utc>,
    pub home_team: TeamCode,
    pub away_team: TeamCode,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub completed: bool,
}

/// Schedule entry before the store has assigned an id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledGame {
    pub season: Season,
    pub week: Week,
    pub scheduled_time: DateTime<Utc>,
    pub home_team: TeamCode,
    pub away_team: TeamCode,
}

/// Final score as reported by the score supplier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalScore {
    pub home_score: i32,
    pub away_score: i32,
}

impl Game {
    /// The game as a completed result, if and only if it has finished
    pub fn completed_result(&self) -> Option<CompletedGame<'_>> {
        match (self.completed, self.home_score, self.away_score) {
            (true, Some(home_score), Some(away_score)) => {
                Some(CompletedGame { game: self, home_score, away_score })
            }
            _ => None,
        }
    }
}

/// Borrowed view of a finished game. The only way to obtain a [`TeamOutcome`].
#[derive(Debug, Clone, Copy)]
pub struct CompletedGame<'a> {
    game: &'a Game,
    home_score: i32,
    away_score: i32,
}

impl<'a> CompletedGame<'a> {
    pub fn game(&self) -> &'a Game {
        self.game
    }

    /// Home outcome first, away outcome second
    pub fn outcomes(&self) -> [TeamOutcome; 2] {
        [
            TeamOutcome::new(&self.game.home_team, self.home_score, self.away_score),
            TeamOutcome::new(&self.game.away_team, self.away_score, self.home_score),
        ]
    }
}

/// One team's side of a completed game
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamOutcome {
    team: TeamCode,
    score: i32,
    opponent_score: i32,
}

impl TeamOutcome {
    pub(crate) fn new(team: &str, score: i32, opponent_score: i32) -> Self {
        Self { team: team.to_string(), score, opponent_score }
    }

    pub fn team(&self) -> &str {
        &self.team
    }

    pub fn score(&self) -> i32 {
        self.score
    }

    pub fn opponent_score(&self) -> i32 {
        self.opponent_score
    }

    pub fn margin(&self) -> i32 {
        self.score - self.opponent_score
    }

    pub fn result(&self) -> GameOutcome {
        match self.score.cmp(&self.opponent_score) {
            std::cmp::Ordering::Greater => GameOutcome::Win,
            std::cmp::Ordering::Equal => GameOutcome::Tie,
            std::cmp::Ordering::Less => GameOutcome::Loss,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameOutcome {
    Win,
    Tie,
    Loss,
}

/// Derived per-team result for one week
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamWeekPerformance {
    pub team: TeamCode,
    pub season: Season,
    pub week: Week,
    pub score: i32,
    pub opponent_score: i32,
    pub is_win: bool,
    pub is_tie: bool,
    pub is_blowout: bool,
    pub is_shutout: bool,
    /// Only set once the whole week has completed
    pub is_weekly_high: bool,
    /// Only set once the whole week has completed
    pub is_weekly_low: bool,
}

impl TeamWeekPerformance {
    pub fn outcome(&self) -> GameOutcome {
        if self.is_win {
            GameOutcome::Win
        } else if self.is_tie {
            GameOutcome::Tie
        } else {
            GameOutcome::Loss
        }
    }

    /// Lost without scoring
    pub fn was_shut_out(&self) -> bool {
        self.score == 0 && self.opponent_score > 0
    }
}

/// Team ownership inside a league, static for a season
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownership {
    pub team: TeamCode,
    pub participant_id: ParticipantId,
    pub league_id: LeagueId,
}

/// A participant's weekly lock declarations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockSelection {
    pub participant_id: ParticipantId,
    pub league_id: LeagueId,
    pub season: Season,
    pub week: Week,
    pub locked_team: Option<TeamCode>,
    pub lock_and_load_team: Option<TeamCode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockKind {
    Lock,
    LockAndLoad,
}

/// Ledger column a contribution lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointComponent {
    Base,
    Lock,
    LockAndLoad,
    WeeklyHigh,
    WeeklyLow,
}

impl PointComponent {
    pub const ALL: [PointComponent; 5] = [
        PointComponent::Base,
        PointComponent::Lock,
        PointComponent::LockAndLoad,
        PointComponent::WeeklyHigh,
        PointComponent::WeeklyLow,
    ];

    /// Column name in the settlement_records table
    pub fn column(&self) -> &'static str {
        match self {
            PointComponent::Base => "base_points",
            PointComponent::Lock => "lock_bonus",
            PointComponent::LockAndLoad => "lock_and_load_bonus",
            PointComponent::WeeklyHigh => "weekly_high_bonus",
            PointComponent::WeeklyLow => "weekly_low_penalty",
        }
    }
}

impl From<LockKind> for PointComponent {
    fn from(kind: LockKind) -> Self {
        match kind {
            LockKind::Lock => PointComponent::Lock,
            LockKind::LockAndLoad => PointComponent::LockAndLoad,
        }
    }
}

/// A single additive ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub participant_id: ParticipantId,
    pub league_id: LeagueId,
    pub season: Season,
    pub week: Week,
    pub component: PointComponent,
    pub amount: Points,
}

/// Per-participant-per-week point record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub participant_id: ParticipantId,
    pub league_id: LeagueId,
    pub season: Season,
    pub week: Week,
    pub base_points: Points,
    pub lock_bonus: Points,
    pub lock_and_load_bonus: Points,
    pub weekly_high_bonus: Points,
    pub weekly_low_penalty: Points,
    pub total_points: Points,
}

impl SettlementRecord {
    pub fn empty(
        participant_id: ParticipantId,
        league_id: LeagueId,
        season: Season,
        week: Week,
    ) -> Self {
        Self {
            participant_id,
            league_id,
            season,
            week,
            base_points: Points::ZERO,
            lock_bonus: Points::ZERO,
            lock_and_load_bonus: Points::ZERO,
            weekly_high_bonus: Points::ZERO,
            weekly_low_penalty: Points::ZERO,
            total_points: Points::ZERO,
        }
    }

    pub fn component(&self, component: PointComponent) -> Points {
        match component {
            PointComponent::Base => self.base_points,
            PointComponent::Lock => self.lock_bonus,
            PointComponent::LockAndLoad => self.lock_and_load_bonus,
            PointComponent::WeeklyHigh => self.weekly_high_bonus,
            PointComponent::WeeklyLow => self.weekly_low_penalty,
        }
    }

    /// Adds to one component and the total together. The only mutation path.
    pub fn apply(&mut self, component: PointComponent, amount: Points) {
        let slot = match component {
            PointComponent::Base => &mut self.base_points,
            PointComponent::Lock => &mut self.lock_bonus,
            PointComponent::LockAndLoad => &mut self.lock_and_load_bonus,
            PointComponent::WeeklyHigh => &mut self.weekly_high_bonus,
            PointComponent::WeeklyLow => &mut self.weekly_low_penalty,
        };
        *slot += amount;
        self.total_points += amount;
    }

    pub fn components_sum(&self) -> Points {
        PointComponent::ALL.iter().map(|c| self.component(*c)).sum()
    }

    pub fn has_weekly_extremes(&self) -> bool {
        !self.weekly_high_bonus.is_zero() || !self.weekly_low_penalty.is_zero()
    }
}

/// Weekly prize pool row, one per (league, season, week)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkinsAward {
    pub league_id: LeagueId,
    pub season: Season,
    pub week: Week,
    pub winner: Option<ParticipantId>,
    pub winning_score: Points,
    pub pot_size: i32,
    pub is_tie: bool,
    pub is_rollover: bool,
    pub awarded_at: Option<DateTime<Utc>>,
    /// Week whose outright winner collected this rollover
    pub resolved_in_week: Option<Week>,
}

impl SkinsAward {
    pub fn is_unresolved_rollover(&self) -> bool {
        self.is_rollover && self.resolved_in_week.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn game(home: Option<i32>, away: Option<i32>, completed: bool) -> Game {
        Game {
            id: 1,
            season: 2024,
            week: 1,
            scheduled_time: Utc.with_ymd_and_hms(2024, 9, 8, 17, 0, 0).unwrap(),
            home_team: "KC".to_string(),
            away_team: "BAL".to_string(),
            home_score: home,
            away_score: away,
            completed,
        }
    }

    #[test]
    fn test_completed_result_requires_completion() {
        assert!(game(Some(27), Some(20), false).completed_result().is_none());
        assert!(game(None, None, true).completed_result().is_none());

        let g = game(Some(27), Some(20), true);
        let [home, away] = g.completed_result().unwrap().outcomes();
        assert_eq!(home.team(), "KC");
        assert_eq!(home.result(), GameOutcome::Win);
        assert_eq!(away.team(), "BAL");
        assert_eq!(away.margin(), -7);
    }

    #[test]
    fn test_record_apply_keeps_total_in_sync() {
        let mut record = SettlementRecord::empty(7, 1, 2024, 3);
        record.apply(PointComponent::Base, Points::ONE);
        record.apply(PointComponent::Base, Points::new(5, 1));
        record.apply(PointComponent::LockAndLoad, -Points::ONE);
        record.apply(PointComponent::WeeklyHigh, Points::ONE);

        assert_eq!(record.base_points, Points::new(15, 1));
        assert_eq!(record.total_points, Points::new(15, 1));
        assert_eq!(record.total_points, record.components_sum());
        assert!(record.has_weekly_extremes());
    }
}
