//! In-process broadcast hub backed by a `tokio::sync::broadcast` channel.
//!
//! [`BroadcastBus`] is the central publish/subscribe hub for
//! [`BroadcastMessage`]s. It is designed to be shared via `Arc<BroadcastBus>`
//! across the application; the cross-process relay lives in
//! [`crate::relay`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// BroadcastMessage
// ---------------------------------------------------------------------------

/// Message kinds carried on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// A task record changed (status, progress, logs).
    TaskUpdated,
    /// The model binding configuration changed.
    BindingsUpdated,
    /// Global settings changed.
    SettingsUpdated,
    /// Free-form administrative announcement.
    AdminBroadcast,
}

/// A UI notification message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,

    /// Message-specific JSON payload (e.g. the updated task id and status).
    pub payload: serde_json::Value,

    /// When the message was created (UTC).
    pub timestamp: DateTime<Utc>,

    /// Identifier of the publishing process; used by the relay to drop
    /// its own echoes.
    pub origin: String,
}

impl BroadcastMessage {
    /// Create a message with an empty payload.
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
            origin: String::new(),
        }
    }

    /// Set the JSON payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// BroadcastBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`BroadcastMessage`].
pub struct BroadcastBus {
    sender: broadcast::Sender<BroadcastMessage>,
    origin: String,
}

impl BroadcastBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            origin: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Stable identifier of this process's bus instance.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Publish a message to all current subscribers, stamping it with this
    /// bus's origin.
    ///
    /// If there are no active subscribers the message is silently dropped.
    pub fn publish(&self, mut message: BroadcastMessage) {
        if message.origin.is_empty() {
            message.origin = self.origin.clone();
        }
        // A SendError only means there are zero receivers right now.
        let _ = self.sender.send(message);
    }

    /// Subscribe to all messages published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastMessage> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = BroadcastBus::default();
        let mut rx = bus.subscribe();

        bus.publish(
            BroadcastMessage::new(MessageKind::TaskUpdated)
                .with_payload(serde_json::json!({"task_id": 42, "status": "running"})),
        );

        let received = rx.recv().await.expect("should receive the message");
        assert_eq!(received.kind, MessageKind::TaskUpdated);
        assert_eq!(received.payload["task_id"], 42);
        assert_eq!(received.origin, bus.origin());
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_message() {
        let bus = BroadcastBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(BroadcastMessage::new(MessageKind::SettingsUpdated));

        assert_eq!(
            rx1.recv().await.unwrap().kind,
            MessageKind::SettingsUpdated
        );
        assert_eq!(
            rx2.recv().await.unwrap().kind,
            MessageKind::SettingsUpdated
        );
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = BroadcastBus::default();
        bus.publish(BroadcastMessage::new(MessageKind::AdminBroadcast));
    }

    #[test]
    fn message_kind_serialises_snake_case() {
        let v = serde_json::to_value(MessageKind::BindingsUpdated).unwrap();
        assert_eq!(v, "bindings_updated");
    }

    #[test]
    fn message_wire_shape_uses_type_key() {
        let m = BroadcastMessage::new(MessageKind::TaskUpdated);
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["type"], "task_updated");
        assert!(v["payload"].is_object());
    }

    #[test]
    fn foreign_origin_is_preserved() {
        let bus = BroadcastBus::default();
        let mut rx = bus.subscribe();
        let mut m = BroadcastMessage::new(MessageKind::TaskUpdated);
        m.origin = "other-process".into();
        bus.publish(m);
        assert_eq!(rx.try_recv().unwrap().origin, "other-process");
    }
}
