//! MQTT client for ESP32.
//!
//! Provides MQTT pub/sub using esp-idf-svc for remote gate control.
//! Implements the `MqttClient` trait so the shared
//! [`GateService`](crate::services::GateService) drives it.
//!
//! # Topics
//!
//! Using the default prefix `Inatel/C115/2024/Semester/02`:
//! - `.../gate/action` - Subscribe for open/close/stop
//! - `.../gate/state` - Subscribe for state queries
//! - `.../gate/state/answer` - Published answers
//! - `.../gate/status` - `offline` last will
//!
//! # Example
//!
//! ```ignore
//! use rs_gate::hal::esp32::Esp32Mqtt;
//! use rs_gate::config::MqttConfig;
//! use rs_gate::traits::MqttClient;
//!
//! let config = MqttConfig::default().with_host("broker.hivemq.com");
//! let mut mqtt = Esp32Mqtt::new(&config)?;
//! mqtt.subscribe(config.topic("gate/action").as_str())?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use esp_idf_svc::mqtt::client::{
    EspMqttClient, EspMqttConnection, EventPayload, LwtConfiguration, MqttClientConfiguration,
    QoS,
};
use log::{debug, info, warn};

use crate::config::MqttConfig;
use crate::traits::{MqttClient, MqttMessage};

/// MQTT client for gate control.
///
/// Incoming messages are queued by a background thread and polled via
/// `try_recv()`.
pub struct Esp32Mqtt {
    client: EspMqttClient<'static>,
    message_rx: Receiver<MqttMessage>,
    connected: Arc<AtomicBool>,
}

impl Esp32Mqtt {
    /// Create a new MQTT client and start connecting to the broker.
    ///
    /// Uses `mqtt://` on port 1883 and `mqtts://` otherwise, with the
    /// configured credentials and last will. TLS connections verify the
    /// broker against the ESP-IDF certificate bundle.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be created.
    pub fn new(config: &MqttConfig) -> anyhow::Result<Self> {
        let broker_url = config.broker_url();
        let will_topic = config.last_will_topic();

        let mqtt_config = MqttClientConfiguration {
            client_id: Some(config.client_id.as_str()),
            keep_alive_interval: Some(Duration::from_secs(config.keep_alive_secs as u64)),
            username: config.has_auth().then(|| config.username.as_str()),
            password: config.has_auth().then(|| config.password.as_str()),
            lwt: Some(LwtConfiguration {
                topic: will_topic.as_str(),
                payload: config.last_will_payload.as_bytes(),
                qos: QoS::AtLeastOnce,
                retain: true,
            }),
            crt_bundle_attach: if config.uses_tls() {
                Some(esp_idf_sys::esp_crt_bundle_attach)
            } else {
                None
            },
            ..Default::default()
        };

        let (message_tx, message_rx) = channel::<MqttMessage>();
        let connected = Arc::new(AtomicBool::new(false));

        let (client, mut connection) = EspMqttClient::new(broker_url.as_str(), &mqtt_config)?;

        // Spawn a thread to handle incoming messages
        let flag = Arc::clone(&connected);
        thread::Builder::new()
            .name("mqtt_events".into())
            .stack_size(6 * 1024)
            .spawn(move || handle_mqtt_events(&mut connection, message_tx, flag))?;

        info!("[MQTT] Connecting to {}", broker_url);

        Ok(Self {
            client,
            message_rx,
            connected,
        })
    }
}

// ============================================================================
// MqttClient Trait Implementation
// ============================================================================

/// Error type for ESP32 MQTT operations.
#[derive(Debug)]
pub struct Esp32MqttError(pub String);

impl core::fmt::Display for Esp32MqttError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "MQTT error: {}", self.0)
    }
}

impl std::error::Error for Esp32MqttError {}

impl MqttClient for Esp32Mqtt {
    type Error = Esp32MqttError;

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), Self::Error> {
        self.client
            .enqueue(topic, QoS::AtLeastOnce, retain, payload)
            .map_err(|e| Esp32MqttError(format!("{:?}", e)))?;
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error> {
        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .map_err(|e| Esp32MqttError(format!("{:?}", e)))?;
        Ok(())
    }

    fn try_recv(&mut self) -> Option<MqttMessage> {
        match self.message_rx.try_recv() {
            Ok(msg) => Some(msg),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.connected.store(false, Ordering::Release);
                None
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn handle_mqtt_events(
    connection: &mut EspMqttConnection,
    message_tx: Sender<MqttMessage>,
    connected: Arc<AtomicBool>,
) {
    loop {
        match connection.next() {
            Err(e) => {
                warn!("[MQTT] Connection closed: {:?}", e);
                connected.store(false, Ordering::Release);
                return;
            }
            Ok(event) => match event.payload() {
                EventPayload::Connected(_) => {
                    info!("[MQTT] Connected");
                    connected.store(true, Ordering::Release);
                }
                EventPayload::Disconnected => {
                    warn!("[MQTT] Disconnected");
                    connected.store(false, Ordering::Release);
                }
                EventPayload::Received {
                    topic: Some(topic),
                    data,
                    ..
                } => {
                    debug!("[MQTT] Message on {}", topic);
                    let msg = MqttMessage::new(topic.to_string(), data.to_vec());
                    if message_tx.send(msg).is_err() {
                        return;
                    }
                }
                _ => {}
            },
        }
    }
}
