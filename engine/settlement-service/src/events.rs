//! Settlement events and their broadcaster

use chrono::NaiveDate;
use scoring_engine::{LeagueId, ParticipantId, Season, TeamCode, Week};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Events emitted to the real-time transport, fire-and-forget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SettlementEvent {
    WeekSettled {
        league_id: LeagueId,
        season: Season,
        week: Week,
        high_teams: Vec<TeamCode>,
        low_teams: Vec<TeamCode>,
    },
    SkinsAwarded {
        league_id: LeagueId,
        season: Season,
        week: Week,
        winner: Option<ParticipantId>,
        pot_size: i32,
        is_tie: bool,
    },
    DayAdvanced {
        new_date: NaiveDate,
        games_processed: usize,
        current_week: Week,
    },
    SeasonReset {
        season: Season,
    },
}

impl SettlementEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SettlementEvent::WeekSettled { .. } => "week_settled",
            SettlementEvent::SkinsAwarded { .. } => "skins_awarded",
            SettlementEvent::DayAdvanced { .. } => "day_advanced",
            SettlementEvent::SeasonReset { .. } => "season_reset",
        }
    }
}

/// Fans events out to every subscriber
pub struct EventBroadcaster {
    subscribers: Arc<RwLock<Vec<mpsc::UnboundedSender<SettlementEvent>>>>,
}

impl EventBroadcaster {
    /// Create a new event broadcaster
    pub fn new() -> Self {
        Self { subscribers: Arc::new(RwLock::new(Vec::new())) }
    }

    /// Register a new subscriber
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<SettlementEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers.write().await.push(sender);
        receiver
    }

    /// Send an event to all subscribers. Closed subscribers are dropped.
    pub async fn publish(&self, event: SettlementEvent) {
        let mut subscribers = self.subscribers.write().await;
        subscribers.retain(|sender| match sender.send(event.clone()) {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!("Dropping closed {} subscriber", event.name());
                false
            }
        });
    }

    /// Get number of active subscribers
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fan_out_and_drop_closed() {
        let broadcaster = EventBroadcaster::new();
        let mut first = broadcaster.subscribe().await;
        let second = broadcaster.subscribe().await;
        drop(second);

        broadcaster.publish(SettlementEvent::SeasonReset { season: 2024 }).await;

        assert_eq!(first.recv().await, Some(SettlementEvent::SeasonReset { season: 2024 }));
        assert_eq!(broadcaster.subscriber_count().await, 1);
    }

    #[test]
    fn test_wire_format() {
        let event = SettlementEvent::SkinsAwarded {
            league_id: 1,
            season: 2024,
            week: 3,
            winner: None,
            pot_size: 2,
            is_tie: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "skins_awarded");
        assert_eq!(json["pot_size"], 2);
        assert!(json["winner"].is_null());
    }
}
