// src/event/mod.rs

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// One-way progress hints emitted while an investigation runs. These are
/// fire-and-forget: a publish with no subscribers is not an error, and a
/// lagging subscriber just misses events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Status {
        message: String,
    },
    MoveExplored {
        move_san: String,
        fen: String,
        eval_cp: Option<i32>,
        depth: u32,
    },
    BranchAdded {
        move_san: String,
        depth: u32,
    },
    MoveInvestigationStart {
        move_san: String,
        fen: String,
    },
    MovePlayed {
        move_san: String,
        fen: String,
    },
    InvestigationComplete {
        fen: String,
        move_san: Option<String>,
    },
}

pub struct EventBroker {
    sender: broadcast::Sender<ProgressEvent>,
}

impl EventBroker {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self { sender }
    }

    pub fn publish(&self, event: ProgressEvent) {
        // Ignore errors, as it's fine if there are no subscribers
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let broker = EventBroker::new();
        broker.publish(ProgressEvent::Status {
            message: "no one is listening".into(),
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let broker = EventBroker::new();
        let mut rx = broker.subscribe();
        broker.publish(ProgressEvent::BranchAdded {
            move_san: "Nf3".into(),
            depth: 1,
        });
        let event = rx.recv().await.unwrap();
        match event {
            ProgressEvent::BranchAdded { move_san, depth } => {
                assert_eq!(move_san, "Nf3");
                assert_eq!(depth, 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = ProgressEvent::Status {
            message: "working".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"status\""));
    }
}
