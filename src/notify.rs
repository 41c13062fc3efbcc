use tokio::sync::broadcast;

use crate::model::GateEvent;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for gate events (plate decisions, entries, exits).
/// The engine never emits; the controller publishes after each outcome.
pub struct NotifyHub {
    sender: broadcast::Sender<GateEvent>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            sender: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GateEvent> {
        self.sender.subscribe()
    }

    /// Send an event. No-op if nobody is listening.
    pub fn send(&self, event: GateEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);

        let event = GateEvent::PlateDecided {
            plate: "京A12345".into(),
        };
        hub.send(event.clone());

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        // No subscriber, should not panic
        hub.send(GateEvent::RateUpdated { hourly_rate: 6.0 });
        assert_eq!(hub.subscriber_count(), 0);
    }
}
