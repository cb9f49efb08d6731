//! Network services connecting the gate to an MQTT broker.
//!
//! - `mqtt_runner`: platform-agnostic [`GateService`] that polls any
//!   [`MqttClient`](crate::traits::MqttClient) and dispatches to the
//!   [`GateCoordinator`](crate::GateCoordinator)
//! - `mqtt` feature: desktop client over `rumqttc`
//!
//! The ESP32 client lives in `hal::esp32` and plugs into the same runner:
//!
//! ```ignore
//! let motor = motor_init(parts)?;
//! let mut service = GateService::new(motor, mqtt_client, config.mqtt.clone());
//! service.subscribe_topics()?;
//!
//! loop {
//!     service.poll()?;
//!     sleep(poll_interval);
//! }
//! ```

// MQTT service runner (platform-agnostic)
pub mod mqtt_runner;

#[cfg(feature = "mqtt")]
pub mod mqtt;

pub use mqtt_runner::*;

#[cfg(feature = "mqtt")]
pub use mqtt::*;
