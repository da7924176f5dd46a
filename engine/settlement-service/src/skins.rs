//! Weekly skins pot: award to the outright top scorer, roll over on a tie

use std::sync::Arc;

use chrono::{DateTime, Utc};
use persistence::{SettlementStore, SkinsOutcome};
use scoring_engine::{LeagueId, Season, SkinsAward, Week};
use tracing::{debug, info, warn};

use crate::error::Result;

#[derive(Clone)]
pub struct SkinsPotManager {
    store: Arc<dyn SettlementStore>,
}

impl SkinsPotManager {
    pub fn new(store: Arc<dyn SettlementStore>) -> Self {
        Self { store }
    }

    /// Settle the pot for a finalized league week.
    ///
    /// Returns the newly written row, or `None` when the week was already settled
    /// or the league has no records for it.
    pub async fn settle_week(
        &self,
        league_id: LeagueId,
        season: Season,
        week: Week,
        now: DateTime<Utc>,
    ) -> Result<Option<SkinsAward>> {
        let records = self.store.week_records(league_id, season, week).await?;
        let Some(top_score) = records.iter().map(|r| r.total_points).max() else {
            warn!(league_id, season, week, "No settlement records, skins not settled");
            return Ok(None);
        };

        let leaders: Vec<_> = records.iter().filter(|r| r.total_points == top_score).collect();
        let outcome = match leaders.as_slice() {
            [leader] => SkinsOutcome::Winner { participant_id: leader.participant_id, score: top_score },
            _ => SkinsOutcome::Tie { score: top_score },
        };

        let award = self.store.record_skins(league_id, season, week, outcome, now).await?;
        match &award {
            Some(award) if award.is_tie => info!(
                league_id,
                season,
                week,
                pot_size = award.pot_size,
                "Skins tied at {}, pot rolls over",
                top_score
            ),
            Some(award) => info!(
                league_id,
                season,
                week,
                pot_size = award.pot_size,
                "Skins awarded to participant {:?} with {}",
                award.winner,
                top_score
            ),
            None => debug!(league_id, season, week, "Skins already settled, skipping"),
        }
        Ok(award)
    }

    /// Settled weeks of a league season, ascending
    pub async fn history(&self, league_id: LeagueId, season: Season) -> Result<Vec<SkinsAward>> {
        Ok(self.store.skins_history(league_id, season).await?)
    }

    /// Pot the next unsettled week would pay
    pub async fn current_pot(&self, league_id: LeagueId, season: Season) -> Result<i32> {
        let history = self.history(league_id, season).await?;
        let unresolved = history.iter().filter(|a| a.is_unresolved_rollover()).count() as i32;
        Ok(1 + unresolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use persistence::InMemoryStore;
    use scoring_engine::{Contribution, PointComponent, Points};

    async fn score(store: &InMemoryStore, participant_id: i64, week: Week, amount: Points) {
        store
            .apply_contribution(&Contribution {
                participant_id,
                league_id: 10,
                season: 2024,
                week,
                component: PointComponent::Base,
                amount,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_single_leader_wins_pot() {
        let store = Arc::new(InMemoryStore::new());
        score(&store, 1, 1, Points::from(5)).await;
        score(&store, 2, 1, Points::from(3)).await;

        let skins = SkinsPotManager::new(store.clone());
        let award = skins.settle_week(10, 2024, 1, Utc::now()).await.unwrap().unwrap();
        assert!(!award.is_tie);
        assert_eq!(award.winner, Some(1));
        assert_eq!(award.pot_size, 1);
        assert!(award.awarded_at.is_some());

        assert!(skins.settle_week(10, 2024, 1, Utc::now()).await.unwrap().is_none());
        assert_eq!(skins.history(10, 2024).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_tie_rolls_over() {
        let store = Arc::new(InMemoryStore::new());
        let five = Points::new(50, 1);
        score(&store, 1, 1, five).await;
        score(&store, 2, 1, five).await;
        score(&store, 3, 1, Points::ONE).await;

        let skins = SkinsPotManager::new(store.clone());
        let week1 = skins.settle_week(10, 2024, 1, Utc::now()).await.unwrap().unwrap();
        assert!(week1.is_tie && week1.is_rollover);
        assert_eq!(week1.winner, None);
        assert_eq!(week1.awarded_at, None);
        assert_eq!(skins.current_pot(10, 2024).await.unwrap(), 2);

        score(&store, 3, 2, Points::from(4)).await;
        let week2 = skins.settle_week(10, 2024, 2, Utc::now()).await.unwrap().unwrap();
        assert_eq!(week2.pot_size, week1.pot_size + 1);
        assert_eq!(week2.winner, Some(3));
        assert_eq!(skins.current_pot(10, 2024).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_no_records_no_award() {
        let skins = SkinsPotManager::new(Arc::new(InMemoryStore::new()));
        assert!(skins.settle_week(10, 2024, 1, Utc::now()).await.unwrap().is_none());
        assert!(skins.history(10, 2024).await.unwrap().is_empty());
    }
}
