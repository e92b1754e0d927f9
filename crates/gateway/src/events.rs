//! Notification events emitted after each durable write.
//!
//! The real-time transport is an external collaborator; the gateway only
//! publishes onto a sink. The broadcast implementation fans out to any
//! number of in-process subscribers and silently drops events when nobody
//! is listening.

use {async_trait::async_trait, serde::Serialize, tokio::sync::broadcast};

/// Events the notification transport consumes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    ConversationCreated {
        conversation_id: String,
        workspace_id: String,
        channel_type: String,
        external_thread_id: String,
        preview: String,
    },
    MessageCreated {
        conversation_id: String,
        message_id: String,
        role: String,
        content: String,
    },
    StatusChanged {
        conversation_id: String,
        status: String,
    },
    DeliveryUpdated {
        conversation_id: String,
        message_id: String,
        status: String,
    },
}

/// Sink for notification events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: Event);
}

/// Tokio-broadcast-backed sink.
pub struct BroadcastEventSink {
    tx: broadcast::Sender<Event>,
}

impl BroadcastEventSink {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl EventSink for BroadcastEventSink {
    async fn emit(&self, event: Event) {
        // A send error only means there are no subscribers right now.
        let _ = self.tx.send(event);
    }
}

/// Sink that drops everything; used in tests and headless runs.
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn emit(&self, _event: Event) {}
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_subscriber() {
        let sink = BroadcastEventSink::new(8);
        let mut rx = sink.subscribe();

        sink.emit(Event::StatusChanged {
            conversation_id: "c1".into(),
            status: "human".into(),
        })
        .await;

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, Event::StatusChanged { .. }));
    }

    #[tokio::test]
    async fn emit_without_subscribers_is_fine() {
        let sink = BroadcastEventSink::new(8);
        sink.emit(Event::StatusChanged {
            conversation_id: "c1".into(),
            status: "bot".into(),
        })
        .await;
    }
}
