//! Messaging abstraction for the remote command channel.
//!
//! The gate listens on two inbound topics and answers on one outbound topic,
//! all below a configurable base:
//!
//! ```text
//! <base>/gate/action        - inbound, "0" open, "1" close, "2" stop
//! <base>/gate/state         - inbound, any payload requests the state
//! <base>/gate/state/answer  - outbound, objective state or "-1"
//! ```

extern crate alloc;
use alloc::string::String;
use alloc::vec::Vec;

// ============================================================================
// MQTT Client Trait (Sync-First Design)
// ============================================================================

/// MQTT client trait for pub/sub messaging.
///
/// Sync-first: works with the blocking ESP-IDF client and with a desktop
/// client that runs its event loop on a background task.
///
/// # Implementation Notes
///
/// - `publish` and `subscribe` may block briefly
/// - `try_recv` never blocks; messages arrive on a collaborator-owned
///   context and are buffered until polled
/// - The client should handle reconnection internally
///
/// # Example
///
/// ```rust
/// use rs_gate::hal::MockMqtt;
/// use rs_gate::traits::MqttClient;
///
/// fn answer<M: MqttClient>(client: &mut M, value: i8) -> Result<(), M::Error> {
///     let payload = value.to_string();
///     client.publish("gate/state/answer", payload.as_bytes(), false)
/// }
///
/// let mut mqtt = MockMqtt::new();
/// answer(&mut mqtt, -1).unwrap();
/// assert_eq!(mqtt.published_to("gate/state/answer"), vec!["-1"]);
/// ```
pub trait MqttClient {
    /// Error type for MQTT operations.
    type Error;

    /// Publish a message to a topic.
    ///
    /// # Arguments
    /// - `topic`: MQTT topic path
    /// - `payload`: Message bytes
    /// - `retain`: If true, broker keeps message for new subscribers
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), Self::Error>;

    /// Subscribe to a topic.
    fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error>;

    /// Try to receive the next message (non-blocking).
    ///
    /// Returns `None` if no message is available.
    fn try_recv(&mut self) -> Option<MqttMessage>;

    /// Check if connected to broker.
    fn is_connected(&self) -> bool;
}

/// An MQTT message received from a subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttMessage {
    /// Topic the message was published to.
    pub topic: String,
    /// Message payload as raw bytes.
    pub payload: Vec<u8>,
}

impl MqttMessage {
    /// Create a new MQTT message.
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Returns the payload as a UTF-8 string, if valid.
    pub fn payload_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.payload).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_str_valid() {
        let msg = MqttMessage::new("base/gate/action", b" 1 ".to_vec());
        assert_eq!(msg.payload_str(), Some(" 1 "));
    }

    #[test]
    fn payload_str_invalid_utf8() {
        let msg = MqttMessage::new("base/gate/action", vec![0xff, 0xfe]);
        assert_eq!(msg.payload_str(), None);
    }
}
