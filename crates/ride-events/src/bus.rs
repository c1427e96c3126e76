//! `EventBus` trait boundary + the default in-process implementation.
//!
//! Publishing is always fire-and-forget from the caller's perspective: the
//! actual send happens on a spawned task under a 5 second deadline (§4.2
//! "Event fan-out", §5 "Timeouts"), and a failure is logged, never returned
//! to the publisher.

use {
    crate::event::DomainEvent,
    dashmap::DashMap,
    std::{sync::Arc, time::Duration},
    tokio::sync::broadcast,
    tokio_stream::wrappers::BroadcastStream,
};

const PUBLISH_DEADLINE: Duration = Duration::from_secs(5);
const CHANNEL_CAPACITY: usize = 1024;

#[async_trait::async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes best-effort in the background; never blocks the caller
    /// beyond enqueueing the publish task, and never surfaces a failure.
    async fn publish(&self, subject: &str, event: DomainEvent);

    /// Registers a durable subscription name against a subject and returns a
    /// stream of events. Delivery is at-least-once to subscribers that are
    /// listening at publish time (§4.5).
    fn subscribe(&self, subject: &str, durable_name: &str) -> BroadcastStream<DomainEvent>;
}

/// `tokio::sync::broadcast`-backed adapter, one channel per subject. This is
/// the default the coordinator wires up; a production deployment would swap
/// in a real broker (NATS, Kafka, ...) behind the same trait.
#[derive(Clone, Default)]
pub struct InMemoryEventBus {
    channels: Arc<DashMap<String, broadcast::Sender<DomainEvent>>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn channel(&self, subject: &str) -> broadcast::Sender<DomainEvent> {
        self.channels
            .entry(subject.to_owned())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait::async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, subject: &str, event: DomainEvent) {
        let sender = self.channel(subject);
        let subject = subject.to_owned();
        tokio::spawn(async move {
            let send = async { sender.send(event) };
            match tokio::time::timeout(PUBLISH_DEADLINE, send).await {
                Ok(Ok(_subscriber_count)) => {}
                // No subscribers is not a failure: at-least-once delivery
                // only binds receivers that are listening.
                Ok(Err(broadcast::error::SendError(_))) => {}
                Err(_) => tracing::warn!(%subject, "event publish exceeded 5s deadline"),
            }
        });
    }

    fn subscribe(&self, subject: &str, durable_name: &str) -> BroadcastStream<DomainEvent> {
        tracing::debug!(%subject, %durable_name, "subscribing to event subject");
        BroadcastStream::new(self.channel(subject).subscribe())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, futures::StreamExt};

    #[tokio::test]
    async fn published_event_reaches_subscriber() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.subscribe("negotiation.started", "test-sub");

        bus.publish(
            "negotiation.started",
            DomainEvent::new("negotiation", "started", serde_json::json!({"id": "s1"})),
        )
        .await;

        let event = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("event within deadline")
            .expect("stream item")
            .expect("no lag error");
        assert_eq!(event.subject(), "negotiation.started");
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let bus = InMemoryEventBus::new();
        bus.publish(
            "negotiation.cancelled",
            DomainEvent::new("negotiation", "cancelled", serde_json::json!({})),
        )
        .await;
    }
}
