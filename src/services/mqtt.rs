//! Desktop MQTT client built on `rumqttc`.
//!
//! [`RumqttcClient`] adapts the async `rumqttc` client to the synchronous
//! [`MqttClient`] trait so the same [`GateService`](super::GateService)
//! loop runs on desktop and on the ESP32. The event loop runs as a tokio
//! task; incoming publishes are buffered in a channel until polled.
//!
//! **Subscribe Topics:**
//! - `<prefix>/gate/action` - `0` open, `1` close, `2` stop
//! - `<prefix>/gate/state` - any payload
//!
//! **Publish Topics:**
//! - `<prefix>/gate/state/answer` - objective state or `-1`
//! - `<prefix>/gate/status` - `online` (retained), `offline` as last will

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};
use rumqttc::{AsyncClient, Event, LastWill, MqttOptions, Packet, QoS, Transport};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::MqttConfig as SharedMqttConfig;
use crate::traits::{MqttClient, MqttMessage};

/// Delay before the event loop retries after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Capacity of the outgoing request channel.
const REQUEST_CAPACITY: usize = 10;

// ============================================================================
// Configuration
// ============================================================================

/// Runtime MQTT client configuration for `rumqttc`.
///
/// This struct uses `String` for runtime compatibility with the `rumqttc` library.
/// For embedded/no-alloc contexts, use [`crate::config::MqttConfig`] which uses
/// fixed-size strings and convert with [`MqttRuntimeConfig::from_config`].
#[derive(Debug, Clone)]
pub struct MqttRuntimeConfig {
    /// MQTT broker hostname
    pub host: String,
    /// MQTT broker port
    pub port: u16,
    /// Client ID
    pub client_id: String,
    /// Keep-alive interval in seconds
    pub keep_alive_secs: u16,
    /// Username and password, if the broker requires them
    pub credentials: Option<(String, String)>,
    /// Last-will topic and payload
    pub last_will: Option<(String, String)>,
    /// Connect over TLS
    pub tls: bool,
}

impl Default for MqttRuntimeConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "rs-gate".to_string(),
            keep_alive_secs: 30,
            credentials: None,
            last_will: None,
            tls: false,
        }
    }
}

impl MqttRuntimeConfig {
    /// Create a new config with the given broker address
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            tls: port != 1883,
            ..Default::default()
        }
    }

    /// Create from shared MqttConfig
    pub fn from_config(config: &SharedMqttConfig) -> Self {
        Self {
            host: config.host.as_str().to_string(),
            port: config.port,
            client_id: config.client_id.as_str().to_string(),
            keep_alive_secs: config.keep_alive_secs,
            credentials: config.has_auth().then(|| {
                (
                    config.username.as_str().to_string(),
                    config.password.as_str().to_string(),
                )
            }),
            last_will: Some((
                config.last_will_topic().as_str().to_string(),
                config.last_will_payload.as_str().to_string(),
            )),
            tls: config.uses_tls(),
        }
    }

    /// Set the client ID
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = id.into();
        self
    }

    /// Set the broker credentials
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Set the last-will message
    pub fn last_will(mut self, topic: impl Into<String>, payload: impl Into<String>) -> Self {
        self.last_will = Some((topic.into(), payload.into()));
        self
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(Duration::from_secs(self.keep_alive_secs as u64));
        if let Some((username, password)) = &self.credentials {
            options.set_credentials(username, password);
        }
        if let Some((topic, payload)) = &self.last_will {
            options.set_last_will(LastWill::new(
                topic,
                payload.as_bytes().to_vec(),
                QoS::AtLeastOnce,
                true,
            ));
        }
        if self.tls {
            options.set_transport(Transport::tls_with_default_config());
        }
        options
    }
}

// ============================================================================
// Client
// ============================================================================

/// `rumqttc` client behind the synchronous [`MqttClient`] trait.
///
/// Topics are re-subscribed after every reconnect.
pub struct RumqttcClient {
    client: AsyncClient,
    incoming: mpsc::UnboundedReceiver<MqttMessage>,
    connected: Arc<AtomicBool>,
    topics: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl RumqttcClient {
    /// Start the event loop. Must be called inside a tokio runtime.
    ///
    /// Returns immediately; use [`is_connected`](MqttClient::is_connected)
    /// or [`connect`](Self::connect) to wait for the broker.
    pub fn spawn(config: &MqttRuntimeConfig) -> Self {
        let (client, mut eventloop) = AsyncClient::new(config.options(), REQUEST_CAPACITY);
        let (tx, incoming) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));
        let topics: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let task = {
            let client = client.clone();
            let connected = Arc::clone(&connected);
            let topics = Arc::clone(&topics);
            let broker = format!("{}:{}", config.host, config.port);
            tokio::spawn(async move {
                loop {
                    match eventloop.poll().await {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            connected.store(true, Ordering::Release);
                            info!("mqtt: connected to {}", broker);
                            let topics = topics.lock().unwrap_or_else(PoisonError::into_inner);
                            for topic in topics.iter() {
                                if let Err(e) = client.try_subscribe(topic, QoS::AtLeastOnce) {
                                    warn!("mqtt: resubscribe to {} failed: {}", topic, e);
                                }
                            }
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            debug!("mqtt: message on {}", publish.topic);
                            let msg = MqttMessage::new(publish.topic, publish.payload.to_vec());
                            if tx.send(msg).is_err() {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            if connected.swap(false, Ordering::AcqRel) {
                                warn!("mqtt: connection lost: {}", e);
                            } else {
                                debug!("mqtt: connect to {} failed: {}", broker, e);
                            }
                            tokio::time::sleep(RECONNECT_DELAY).await;
                        }
                    }
                }
            })
        };

        Self {
            client,
            incoming,
            connected,
            topics,
            task,
        }
    }

    /// Start the event loop and wait up to `timeout` for the broker.
    pub async fn connect(config: &MqttRuntimeConfig, timeout: Duration) -> Result<Self, MqttError> {
        let client = Self::spawn(config);
        let wait = async {
            while !client.is_connected() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };
        if tokio::time::timeout(timeout, wait).await.is_err() {
            return Err(MqttError::Connect(format!(
                "no response from {}:{} within {:?}",
                config.host, config.port, timeout
            )));
        }
        Ok(client)
    }
}

impl Drop for RumqttcClient {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl MqttClient for RumqttcClient {
    type Error = MqttError;

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), MqttError> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, retain, payload.to_vec())
            .map_err(|e| MqttError::Publish(e.to_string()))
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), MqttError> {
        self.client
            .try_subscribe(topic, QoS::AtLeastOnce)
            .map_err(|e| MqttError::Subscribe(e.to_string()))?;
        self.topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(topic.to_string());
        Ok(())
    }

    fn try_recv(&mut self) -> Option<MqttMessage> {
        self.incoming.try_recv().ok()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// MQTT-related errors
#[derive(Debug)]
pub enum MqttError {
    /// Failed to connect to broker
    Connect(String),
    /// Failed to subscribe to topic
    Subscribe(String),
    /// Failed to publish message
    Publish(String),
}

impl fmt::Display for MqttError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MqttError::Connect(e) => write!(f, "MQTT connect failed: {}", e),
            MqttError::Subscribe(e) => write!(f, "MQTT subscribe failed: {}", e),
            MqttError::Publish(e) => write!(f, "MQTT publish failed: {}", e),
        }
    }
}

impl std::error::Error for MqttError {}

#[cfg(test)]
mod tests {
    use super::*;

    // Nothing listens on port 1 locally.
    fn unreachable() -> MqttRuntimeConfig {
        MqttRuntimeConfig::new("127.0.0.1", 1)
    }

    #[test]
    fn test_config_default() {
        let config = MqttRuntimeConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 1883);
        assert_eq!(config.client_id, "rs-gate");
        assert!(config.credentials.is_none());
        assert!(!config.tls);
    }

    #[test]
    fn test_config_from_shared() {
        let shared = SharedMqttConfig::default()
            .with_host("broker.hivemq.com")
            .with_client_id("gate-7")
            .with_topic_prefix("home")
            .with_auth("user", "secret");

        let config = MqttRuntimeConfig::from_config(&shared);
        assert_eq!(config.host, "broker.hivemq.com");
        assert_eq!(config.client_id, "gate-7");
        assert_eq!(
            config.credentials,
            Some(("user".to_string(), "secret".to_string()))
        );
        assert_eq!(
            config.last_will,
            Some(("home/gate/status".to_string(), "offline".to_string()))
        );
        assert!(!config.tls);
    }

    #[test]
    fn test_config_tls_by_port() {
        let shared = SharedMqttConfig::default().with_port(8883);
        assert!(MqttRuntimeConfig::from_config(&shared).tls);
        assert!(MqttRuntimeConfig::new("broker", 8883).tls);
        assert!(!MqttRuntimeConfig::new("broker", 1883).tls);
    }

    #[test]
    fn test_config_builder() {
        let config = MqttRuntimeConfig::new("10.0.0.2", 1883)
            .client_id("desk")
            .credentials("u", "p")
            .last_will("t", "gone");
        assert_eq!(config.client_id, "desk");
        assert_eq!(config.credentials, Some(("u".into(), "p".into())));
        assert_eq!(config.last_will, Some(("t".into(), "gone".into())));
    }

    #[test]
    fn test_client_id_overrides_shared() {
        let shared = SharedMqttConfig::default().with_client_id("gate1");
        let config = MqttRuntimeConfig::from_config(&shared).client_id("gate1-desktop");
        assert_eq!(config.client_id, "gate1-desktop");
        assert!(config.last_will.is_some());
    }

    #[test]
    fn test_error_display() {
        let e = MqttError::Publish("request channel full".into());
        assert_eq!(e.to_string(), "MQTT publish failed: request channel full");
    }

    #[tokio::test]
    async fn test_not_connected_without_broker() {
        let mut client = RumqttcClient::spawn(&unreachable());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!client.is_connected());
        assert!(client.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_requests_buffer_while_offline() {
        let mut client = RumqttcClient::spawn(&unreachable());
        client.subscribe("base/gate/action").unwrap();
        client.publish("base/gate/state/answer", b"2", false).unwrap();
    }

    #[tokio::test]
    async fn test_connect_times_out() {
        let result = RumqttcClient::connect(&unreachable(), Duration::from_millis(200)).await;
        assert!(matches!(result, Err(MqttError::Connect(_))));
    }
}
