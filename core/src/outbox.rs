//! Outbound MQTT messages, drained by the broker connection

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QoS {
    AtMostOnce,
    #[default]
    AtLeastOnce,
    ExactlyOnce,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl Outbox {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a message. Returns false if the connection side has gone away.
    pub fn post(&self, message: OutboundMessage) -> bool {
        trace!(topic = %message.topic, len = message.payload.len(), "posting");
        self.tx.send(message).is_ok()
    }

    /// Serialize `payload` as JSON and queue it with QoS 1, not retained
    pub fn publish_json<T: Serialize>(&self, topic: impl Into<String>, payload: &T) -> bool {
        let topic = topic.into();
        let payload = match serde_json::to_vec(payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(%topic, error = %e, "could not serialize payload");
                return false;
            }
        };
        self.post(OutboundMessage {
            topic,
            payload,
            qos: QoS::AtLeastOnce,
            retain: false,
        })
    }
}
