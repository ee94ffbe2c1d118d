//! Sync lifecycle events.
//!
//! Every round publishes exactly one `syncStarted` and one `syncCompleted`,
//! both carrying the same round id.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

use super::ports::EventSink;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum SyncEvent {
    /// A round began. Published before any check runs.
    #[serde(rename = "syncStarted")]
    Started { round_id: Uuid },
    /// A round ended. `successfully` is true only when a snapshot was fetched
    /// and fully committed; skips report false.
    #[serde(rename = "syncCompleted")]
    Completed { round_id: Uuid, successfully: bool },
}

impl SyncEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "syncStarted",
            Self::Completed { .. } => "syncCompleted",
        }
    }

    /// Id shared by the two events of one round.
    pub fn round_id(&self) -> Uuid {
        match self {
            Self::Started { round_id } | Self::Completed { round_id, .. } => *round_id,
        }
    }
}

/// Fans events out over a broadcast channel.
pub struct BroadcastEventSink {
    tx: broadcast::Sender<SyncEvent>,
}

impl BroadcastEventSink {
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Receive every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastEventSink {
    fn publish(&self, event: SyncEvent) {
        // No receivers is fine; nobody is listening yet
        if self.tx.send(event).is_err() {
            trace!("Dropped sync event with no subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_delivers_in_order() {
        let sink = BroadcastEventSink::new(4);
        let mut rx = sink.subscribe();
        let round_id = Uuid::new_v4();

        sink.publish(SyncEvent::Started { round_id });
        sink.publish(SyncEvent::Completed {
            round_id,
            successfully: true,
        });

        assert_eq!(rx.recv().await.unwrap().name(), "syncStarted");
        let completed = rx.recv().await.unwrap();
        assert_eq!(
            completed,
            SyncEvent::Completed {
                round_id,
                successfully: true
            }
        );
        assert_eq!(completed.round_id(), round_id);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let sink = BroadcastEventSink::new(1);
        sink.publish(SyncEvent::Started {
            round_id: Uuid::new_v4(),
        });
    }

    #[test]
    fn test_event_serializes_with_command_name() {
        let json = serde_json::to_value(SyncEvent::Completed {
            round_id: Uuid::nil(),
            successfully: false,
        })
        .unwrap();
        assert_eq!(json["command"], "syncCompleted");
        assert_eq!(json["successfully"], false);
    }
}
