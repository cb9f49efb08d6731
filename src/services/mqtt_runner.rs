//! MQTT service runner for unified polling across platforms.
//!
//! Provides a platform-agnostic gate service that works with any
//! implementation of the `MqttClient` trait.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use rs_gate::config::MqttConfig;
//! use rs_gate::hal::{MockMqtt, MockParts};
//! use rs_gate::services::GateService;
//! use rs_gate::GateMotor;
//!
//! let mock = MockParts::new();
//! let motor = Arc::new(GateMotor::new(mock.motor_parts()));
//! let config = MqttConfig::default().with_topic_prefix("home");
//! let mut service = GateService::new(motor, MockMqtt::new(), config);
//!
//! service.subscribe_topics().unwrap();
//! service.client_mut().queue_message("home/gate/state", b"".to_vec());
//!
//! // In main loop:
//! assert_eq!(service.poll().unwrap(), 1);
//! assert_eq!(service.client().published_to("home/gate/state/answer"), vec!["2"]);
//! ```

use std::sync::Arc;

use log::{debug, info, warn};

use crate::config::{LongString, MqttConfig};
use crate::gate::{GateCoordinator, GateError, GateTopics, ACTION_TOPIC, STATE_TOPIC};
use crate::motor::GateMotor;
use crate::traits::{MotorHardware, MqttClient, MqttMessage};

/// Maximum number of topics a service subscribes to.
pub const MAX_SUBSCRIPTIONS: usize = 10;

/// Payload published to the last-will topic once connected.
pub const ONLINE_PAYLOAD: &str = "online";

// ============================================================================
// Gate Service
// ============================================================================

/// Unified MQTT gate service for both desktop and ESP32.
///
/// Wraps any `MqttClient` implementation and provides:
/// - Subscription to the action and state topics
/// - Message polling with dispatch to the [`GateCoordinator`]
/// - Online status publishing
pub struct GateService<H, C>
where
    H: MotorHardware,
    C: MqttClient,
{
    coordinator: GateCoordinator<H>,
    client: C,
    config: MqttConfig,
    subscriptions: heapless::Vec<LongString, MAX_SUBSCRIPTIONS>,
}

impl<H, C> GateService<H, C>
where
    H: MotorHardware,
    C: MqttClient,
{
    /// Create a new gate service.
    pub fn new(motor: Arc<GateMotor<H>>, client: C, config: MqttConfig) -> Self {
        let coordinator = GateCoordinator::new(motor, GateTopics::from_config(&config));
        Self {
            coordinator,
            client,
            config,
            subscriptions: heapless::Vec::new(),
        }
    }

    /// Get a reference to the MQTT client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Get a mutable reference to the MQTT client.
    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    /// The coordinator messages are dispatched to.
    pub fn coordinator(&self) -> &GateCoordinator<H> {
        &self.coordinator
    }

    /// Topics subscribed so far.
    pub fn subscriptions(&self) -> &[LongString] {
        &self.subscriptions
    }

    /// Subscribe to the action and state topics.
    pub fn subscribe_topics(&mut self) -> Result<(), C::Error> {
        for suffix in [ACTION_TOPIC, STATE_TOPIC] {
            let topic = self.config.topic(suffix);
            self.subscribe(topic)?;
        }
        Ok(())
    }

    /// Subscribe to one topic and record it.
    ///
    /// Returns `Ok(false)` without subscribing when the table is full or the
    /// topic is already present.
    pub fn subscribe(&mut self, topic: LongString) -> Result<bool, C::Error> {
        if self.subscriptions.contains(&topic) {
            return Ok(false);
        }
        if self.subscriptions.is_full() {
            warn!("mqtt: subscription table full, skipping {}", topic);
            return Ok(false);
        }
        self.client.subscribe(topic.as_str())?;
        info!("mqtt: subscribed to {}", topic);
        let _ = self.subscriptions.push(topic);
        Ok(true)
    }

    /// Re-send every recorded subscription, e.g. after the broker dropped
    /// the session. Returns how many were sent.
    pub fn resubscribe(&mut self) -> Result<usize, C::Error> {
        for topic in &self.subscriptions {
            self.client.subscribe(topic.as_str())?;
        }
        debug!("mqtt: restored {} subscription(s)", self.subscriptions.len());
        Ok(self.subscriptions.len())
    }

    /// Publish the retained online marker on the last-will topic.
    pub fn announce_online(&mut self) -> Result<(), C::Error> {
        let topic = self.config.last_will_topic();
        self.client
            .publish(topic.as_str(), ONLINE_PAYLOAD.as_bytes(), true)
    }

    /// Poll for incoming MQTT messages and dispatch them.
    ///
    /// This should be called regularly in the main loop. Rejected action
    /// payloads are logged and skipped. Returns the number of messages
    /// handled.
    pub fn poll(&mut self) -> Result<usize, C::Error> {
        let mut handled = 0;
        while let Some(msg) = self.client.try_recv() {
            if self.dispatch(&msg)? {
                handled += 1;
            }
        }
        Ok(handled)
    }

    /// Route one message by topic suffix. Returns `Ok(false)` if ignored.
    fn dispatch(&mut self, msg: &MqttMessage) -> Result<bool, C::Error> {
        let Some(suffix) = self.suffix(&msg.topic) else {
            debug!("mqtt: ignoring message on {}", msg.topic);
            return Ok(false);
        };

        let result = match suffix {
            ACTION_TOPIC => self
                .coordinator
                .handle_action_payload(&mut self.client, &msg.payload)
                .map(|_| ()),
            STATE_TOPIC => self
                .coordinator
                .handle_state_query(&mut self.client)
                .map(|_| ()),
            _ => {
                debug!("mqtt: ignoring message on {}", msg.topic);
                return Ok(false);
            }
        };

        match result {
            Ok(()) => Ok(true),
            Err(GateError::InvalidActionCode(_)) => Ok(false),
            Err(GateError::Publish(e)) => Err(e),
        }
    }

    fn suffix<'a>(&self, topic: &'a str) -> Option<&'a str> {
        topic
            .strip_prefix(self.config.topic_prefix.as_str())?
            .strip_prefix('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::long_string;
    use crate::hal::{MockHardware, MockMqtt, MockParts};
    use crate::traits::MotorDriver;
    use crate::{MotorAction, MotorDirectionState};

    const BASE: &str = "Inatel/C115/2024/Semester/02";

    fn setup() -> (GateService<MockHardware, MockMqtt>, MockParts) {
        let mock = MockParts::new();
        let motor = Arc::new(GateMotor::new(mock.motor_parts()));
        let service = GateService::new(motor, MockMqtt::new(), MqttConfig::default());
        (service, mock)
    }

    fn answers(service: &GateService<MockHardware, MockMqtt>) -> Vec<String> {
        service
            .client()
            .published_to(&format!("{}/gate/state/answer", BASE))
    }

    // ========================================================================
    // Subscription tests
    // ========================================================================

    #[test]
    fn test_service_creation() {
        let (service, _) = setup();
        // MockMqtt::new() starts connected
        assert!(service.client().is_connected());
        assert!(service.subscriptions().is_empty());
    }

    #[test]
    fn test_subscribe_topics() {
        let (mut service, _) = setup();
        service.subscribe_topics().unwrap();

        let client = service.client();
        assert!(client.is_subscribed(&format!("{}/gate/action", BASE)));
        assert!(client.is_subscribed(&format!("{}/gate/state", BASE)));
        assert_eq!(service.subscriptions().len(), 2);
    }

    #[test]
    fn test_subscribe_twice_is_deduplicated() {
        let (mut service, _) = setup();
        service.subscribe_topics().unwrap();
        service.subscribe_topics().unwrap();
        assert_eq!(service.client().subscriptions.len(), 2);
    }

    #[test]
    fn test_subscription_table_bounded() {
        let (mut service, _) = setup();
        for n in 0..12 {
            let topic = long_string(&format!("extra/{}", n));
            let added = service.subscribe(topic).unwrap();
            assert_eq!(added, n < MAX_SUBSCRIPTIONS);
        }
        assert_eq!(service.client().subscriptions.len(), MAX_SUBSCRIPTIONS);
    }

    #[test]
    fn test_resubscribe_resends_recorded() {
        let (mut service, _) = setup();
        service.subscribe_topics().unwrap();
        assert_eq!(service.resubscribe().unwrap(), 2);
        assert_eq!(service.client().subscriptions.len(), 4);
        assert_eq!(service.subscriptions().len(), 2);
    }

    #[test]
    fn test_announce_online_retained() {
        let (mut service, _) = setup();
        service.announce_online().unwrap();
        let (topic, payload, retained) = &service.client().published[0];
        assert_eq!(topic, &format!("{}/gate/status", BASE));
        assert_eq!(payload, b"online");
        assert!(*retained);
    }

    // ========================================================================
    // Action tests
    // ========================================================================

    #[test]
    fn test_poll_with_open() {
        let (mut service, mock) = setup();
        service
            .client_mut()
            .queue_message(format!("{}/gate/action", BASE), b"0".to_vec());

        assert_eq!(service.poll().unwrap(), 1);
        assert_eq!(mock.driver.current(), MotorAction::Clockwise);
        assert_eq!(answers(&service), vec!["0"]);
    }

    #[test]
    fn test_poll_with_repeated_close() {
        let (mut service, mock) = setup();
        let topic = format!("{}/gate/action", BASE);
        service.client_mut().queue_message(topic.clone(), b"1".to_vec());
        service.client_mut().queue_message(topic, b"1".to_vec());

        service.poll().unwrap();

        assert_eq!(mock.driver.history(), vec![MotorAction::CounterClockwise]);
        assert_eq!(answers(&service), vec!["1", "-1"]);
    }

    #[test]
    fn test_answers_not_retained() {
        let (mut service, _) = setup();
        service
            .client_mut()
            .queue_message(format!("{}/gate/action", BASE), b"2".to_vec());
        service.poll().unwrap();
        assert!(service.client().published.iter().all(|(_, _, r)| !r));
    }

    // ========================================================================
    // Invalid payload tests
    // ========================================================================

    #[test]
    fn test_poll_with_invalid_action() {
        let (mut service, mock) = setup();
        service
            .client_mut()
            .queue_message(format!("{}/gate/action", BASE), b"9".to_vec());

        assert_eq!(service.poll().unwrap(), 0);
        assert!(service.client().published.is_empty());
        assert_eq!(mock.driver.call_count(), 0);
    }

    #[test]
    fn test_poll_with_invalid_utf8() {
        let (mut service, _) = setup();
        service
            .client_mut()
            .queue_message(format!("{}/gate/action", BASE), vec![0xFF, 0xFE]);
        assert_eq!(service.poll().unwrap(), 0);
    }

    #[test]
    fn test_poll_with_unknown_topic() {
        let (mut service, _) = setup();
        service
            .client_mut()
            .queue_message(format!("{}/gate/unknown", BASE), b"0".to_vec());
        assert_eq!(service.poll().unwrap(), 0);
        assert!(service.client().published.is_empty());
    }

    #[test]
    fn test_poll_with_wrong_prefix() {
        let (mut service, mock) = setup();
        service
            .client_mut()
            .queue_message("other/gate/action", b"0".to_vec());

        service.poll().unwrap();
        assert_eq!(
            service.coordinator().motor().current(),
            MotorDirectionState::Stopped
        );
        assert_eq!(mock.driver.call_count(), 0);
    }

    #[test]
    fn test_invalid_then_valid_continues() {
        let (mut service, _) = setup();
        let topic = format!("{}/gate/action", BASE);
        service.client_mut().queue_message(topic.clone(), b"x".to_vec());
        service.client_mut().queue_message(topic, b"0".to_vec());

        assert_eq!(service.poll().unwrap(), 1);
        assert_eq!(answers(&service), vec!["0"]);
    }

    #[test]
    fn test_publish_failure_propagates() {
        let (mut service, _) = setup();
        service.client_mut().fail_publish = true;
        service
            .client_mut()
            .queue_message(format!("{}/gate/state", BASE), b"".to_vec());
        assert!(service.poll().is_err());
    }

    // ========================================================================
    // Custom topic prefix tests
    // ========================================================================

    #[test]
    fn test_custom_topic_prefix() {
        let mock = MockParts::new();
        let motor = Arc::new(GateMotor::new(mock.motor_parts()));
        let config = MqttConfig::default().with_topic_prefix("site/north");
        let mut service = GateService::new(motor, MockMqtt::new(), config);

        service
            .client_mut()
            .queue_message("site/north/gate/action", b"1".to_vec());
        service.poll().unwrap();

        assert_eq!(
            service.client().published_to("site/north/gate/state/answer"),
            vec!["1"]
        );
    }
}
